// src/store/mod.rs — Durable storage for captured documents

pub mod json;
pub mod ledger;
pub mod memory;

use async_trait::async_trait;

use crate::capture::session::Page;
use crate::infra::errors::PagecapError;

pub use json::JsonDirStore;
pub use ledger::{Ledger, SessionRow, SessionStatus};
pub use memory::MemoryStore;

/// A store of named, ordered page lists.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Replace the whole document. Readers must never observe a partial write.
    async fn write(&self, document: &str, pages: &[Page]) -> Result<(), PagecapError>;

    async fn read(&self, document: &str) -> Result<Option<Vec<Page>>, PagecapError>;

    /// Document names, sorted.
    async fn list(&self) -> Result<Vec<String>, PagecapError>;
}
