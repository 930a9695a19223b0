// src/cli/watch.rs — Long-running capture loop

use std::sync::Arc;

use crate::capture::pipeline::{CapturePipeline, PipelineParts};
use crate::infra::config::Config;
use crate::infra::paths;
use crate::integrations::discord::DiscordSource;
use crate::integrations::types::{MessageSource, PageAdvancer};
use crate::store::{DocumentStore, JsonDirStore, Ledger, MemoryStore};

/// Watch the configured channel until Ctrl+C.
pub async fn run_watch(config: &Config, dry_run: bool) -> anyhow::Result<()> {
    let channel = config.channel()?.to_string();
    let token = config.discord.token()?;
    let discord = Arc::new(
        DiscordSource::new(token, config.advance.reaction.clone())?
            .connect()
            .await?,
    );
    // Fail early on a wrong channel id or missing permissions
    let summary = discord.validate(&channel).await?;
    tracing::info!("{}", summary);

    let (store, ledger) = open_storage(config, dry_run).await;
    let source: Arc<dyn MessageSource> = discord.clone();
    let advancer: Arc<dyn PageAdvancer> = discord;

    let pipeline = CapturePipeline::start(
        config,
        &channel,
        PipelineParts {
            source,
            advancer: Some(advancer),
            store,
            ledger,
        },
    );

    println!(
        "Watching for {}… commands from {}. Press Ctrl+C to stop.",
        config.watch.trigger_prefix, config.watch.responder
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    println!("\nStopping, saving pending pages...");

    pipeline.stop().await?;
    tracing::info!("Watcher stopped.");
    Ok(())
}

/// Document store plus ledger. A ledger that cannot be opened only disables
/// the ledger; captures still go to disk.
async fn open_storage(config: &Config, dry_run: bool) -> (Arc<dyn DocumentStore>, Option<Ledger>) {
    if dry_run {
        tracing::info!("Dry run: captures are kept in memory only");
        return (Arc::new(MemoryStore::new()), None);
    }

    let dir = config.store.captures_dir();
    tracing::info!("Saving captures to {}", dir.display());
    if let Err(e) = paths::ensure_dirs().await {
        tracing::warn!("Could not create data directories: {}", e);
    }

    let ledger = if config.store.ledger {
        match Ledger::open(&paths::ledger_path()) {
            Ok(ledger) => Some(ledger),
            Err(e) => {
                tracing::warn!("Could not open capture ledger: {}. Ledger disabled.", e);
                None
            }
        }
    } else {
        None
    };

    (Arc::new(JsonDirStore::new(dir)), ledger)
}
