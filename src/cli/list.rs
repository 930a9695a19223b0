// src/cli/list.rs — Inspect recorded sessions and stored documents

use crate::infra::config::Config;
use crate::infra::errors::PagecapError;
use crate::infra::paths;
use crate::store::{DocumentStore, JsonDirStore, Ledger, SessionRow, SessionStatus};

/// Print the most recent ledger sessions.
pub async fn run_list(limit: u32) -> anyhow::Result<()> {
    let ledger_path = paths::ledger_path();
    if !ledger_path.exists() {
        println!("No captures recorded yet.");
        return Ok(());
    }

    let ledger = Ledger::open(&ledger_path)?;
    let rows = ledger.sessions(limit)?;
    if rows.is_empty() {
        println!("No captures recorded yet.");
        return Ok(());
    }
    for row in &rows {
        println!("{}", format_row(row));
    }
    Ok(())
}

fn format_row(row: &SessionRow) -> String {
    let progress = match row.last_total {
        Some(total) => format!("{}/{}", row.pages, total),
        None => format!("{}/?", row.pages),
    };
    let marker = match row.status {
        SessionStatus::Active => "",
        SessionStatus::Superseded => "  (superseded)",
    };
    format!(
        "  {:<48} {:>9}  {}  {}{}",
        row.document, progress, row.started_at, row.command, marker
    )
}

/// Print a stored document as pretty JSON.
pub async fn run_show(config: &Config, document: &str) -> anyhow::Result<()> {
    let store = JsonDirStore::new(config.store.captures_dir());
    let pages = store
        .read(document)
        .await?
        .ok_or_else(|| PagecapError::DocumentNotFound(document.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&pages)?);
    Ok(())
}
