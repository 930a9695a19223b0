// src/store/ledger.rs — SQLite record of capture sessions
//
// One row per document: when it started, how far it got, and whether a later
// trigger left it behind. Partial documents are never deleted or renamed; the
// ledger is where they can be found again.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::infra::errors::PagecapError;

struct Migration {
    version: u32,
    name: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "capture_ledger",
    up: include_str!("migrations/001_capture_ledger.up.sql"),
}];

fn run_migrations(conn: &Connection) -> Result<(), PagecapError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            "Applying ledger migration {}: {}",
            migration.version, migration.name
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up)?;
        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// A newer trigger replaced this session before it finished.
    Superseded,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Superseded => "superseded",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "superseded" => SessionStatus::Superseded,
            _ => SessionStatus::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub document: String,
    pub command: String,
    pub started_at: String,
    pub pages: u32,
    pub last_total: Option<u32>,
    pub status: SessionStatus,
    pub updated_at: String,
}

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (or create) the ledger at `path`.
    pub fn open(path: &Path) -> Result<Self, PagecapError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, PagecapError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Record a session start. A document seen again (same trigger replayed
    /// after a restart) starts over.
    pub fn begin_session(
        &self,
        document: &str,
        command: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), PagecapError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO capture_sessions (document, command, started_at, pages, status, updated_at)
             VALUES (?1, ?2, ?3, 0, 'active', ?4)
             ON CONFLICT(document) DO UPDATE SET
                pages = 0, last_total = NULL, status = 'active', updated_at = ?4",
            params![document, command, started_at.to_rfc3339(), now],
        )?;
        Ok(())
    }

    pub fn record_pages(
        &self,
        document: &str,
        pages: u32,
        last_total: Option<u32>,
    ) -> Result<(), PagecapError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE capture_sessions SET pages = ?1, last_total = ?2, updated_at = ?3
             WHERE document = ?4",
            params![pages, last_total, now, document],
        )?;
        Ok(())
    }

    pub fn mark_superseded(&self, document: &str) -> Result<(), PagecapError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE capture_sessions SET status = 'superseded', updated_at = ?1
             WHERE document = ?2",
            params![now, document],
        )?;
        Ok(())
    }

    pub fn get(&self, document: &str) -> Result<Option<SessionRow>, PagecapError> {
        let row = self
            .conn
            .query_row(
                "SELECT document, command, started_at, pages, last_total, status, updated_at
                 FROM capture_sessions WHERE document = ?1",
                [document],
                row_to_session,
            )
            .optional()?;
        Ok(row)
    }

    /// Most recently started first.
    pub fn sessions(&self, limit: u32) -> Result<Vec<SessionRow>, PagecapError> {
        let mut stmt = self.conn.prepare(
            "SELECT document, command, started_at, pages, last_total, status, updated_at
             FROM capture_sessions ORDER BY started_at DESC, updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        document: row.get(0)?,
        command: row.get(1)?,
        started_at: row.get(2)?,
        pages: row.get(3)?,
        last_total: row.get(4)?,
        status: SessionStatus::parse(&row.get::<_, String>(5)?),
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 19, 5, 3, sec).unwrap()
    }

    #[test]
    fn test_begin_and_record() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.begin_session("top_a", "$top", at(1)).unwrap();
        ledger.record_pages("top_a", 2, Some(67)).unwrap();

        let row = ledger.get("top_a").unwrap().unwrap();
        assert_eq!(row.command, "$top");
        assert_eq!(row.pages, 2);
        assert_eq!(row.last_total, Some(67));
        assert_eq!(row.status, SessionStatus::Active);
    }

    #[test]
    fn test_superseded_status() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.begin_session("top_a", "$top", at(1)).unwrap();
        ledger.mark_superseded("top_a").unwrap();
        assert_eq!(
            ledger.get("top_a").unwrap().unwrap().status,
            SessionStatus::Superseded
        );
    }

    #[test]
    fn test_restart_resets_row() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.begin_session("top_a", "$top", at(1)).unwrap();
        ledger.record_pages("top_a", 5, Some(9)).unwrap();
        ledger.mark_superseded("top_a").unwrap();
        ledger.begin_session("top_a", "$top", at(1)).unwrap();

        let row = ledger.get("top_a").unwrap().unwrap();
        assert_eq!(row.pages, 0);
        assert_eq!(row.last_total, None);
        assert_eq!(row.status, SessionStatus::Active);
        assert_eq!(ledger.sessions(10).unwrap().len(), 1);
    }

    #[test]
    fn test_sessions_newest_first() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.begin_session("a", "$a", at(1)).unwrap();
        ledger.begin_session("c", "$c", at(3)).unwrap();
        ledger.begin_session("b", "$b", at(2)).unwrap();

        let docs: Vec<String> = ledger
            .sessions(10)
            .unwrap()
            .into_iter()
            .map(|r| r.document)
            .collect();
        assert_eq!(docs, vec!["c", "b", "a"]);
        assert_eq!(ledger.sessions(1).unwrap().len(), 1);
    }

    #[test]
    fn test_get_unknown_document() {
        let ledger = Ledger::in_memory().unwrap();
        assert!(ledger.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_migrations_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        Ledger::open(&path).unwrap().begin_session("a", "$a", at(1)).unwrap();
        let reopened = Ledger::open(&path).unwrap();
        assert!(reopened.get("a").unwrap().is_some());
    }
}
