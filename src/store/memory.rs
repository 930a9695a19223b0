// src/store/memory.rs — In-process document store (dry runs, tests)

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::capture::session::Page;
use crate::infra::errors::PagecapError;
use crate::store::DocumentStore;

#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, Vec<Page>>>,
    writes: Mutex<Vec<(String, usize)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write so far as `(document, page count)`, in order.
    pub fn write_log(&self) -> Vec<(String, usize)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn poisoned(document: &str) -> PagecapError {
        PagecapError::Store {
            document: document.to_string(),
            message: "memory store lock poisoned".into(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn write(&self, document: &str, pages: &[Page]) -> Result<(), PagecapError> {
        self.documents
            .lock()
            .map_err(|_| Self::poisoned(document))?
            .insert(document.to_string(), pages.to_vec());
        self.writes
            .lock()
            .map_err(|_| Self::poisoned(document))?
            .push((document.to_string(), pages.len()));
        Ok(())
    }

    async fn read(&self, document: &str) -> Result<Option<Vec<Page>>, PagecapError> {
        Ok(self
            .documents
            .lock()
            .map_err(|_| Self::poisoned(document))?
            .get(document)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<String>, PagecapError> {
        Ok(self
            .documents
            .lock()
            .map_err(|_| Self::poisoned(""))?
            .keys()
            .cloned()
            .collect())
    }
}
