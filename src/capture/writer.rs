// src/capture/writer.rs — Persistence writer task
//
// Receives session events and page snapshots in acceptance order and applies
// them to the document store and the ledger. Failures are logged and never fed
// back: the next accepted page rewrites the whole document anyway.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::capture::tracker::Snapshot;
use crate::infra::errors::PagecapError;
use crate::store::{DocumentStore, Ledger};

#[derive(Debug)]
pub enum WriteJob {
    Begin {
        document: String,
        command: String,
        started_at: DateTime<Utc>,
    },
    Supersede {
        document: String,
    },
    Pages(Snapshot),
    /// Answered once every job queued before it has been applied.
    Barrier(oneshot::Sender<()>),
}

pub struct PersistenceWriter {
    store: Arc<dyn DocumentStore>,
    // The connection is not Sync; the lock is only taken between awaits.
    ledger: Option<Mutex<Ledger>>,
}

impl PersistenceWriter {
    pub fn new(store: Arc<dyn DocumentStore>, ledger: Option<Ledger>) -> Self {
        Self {
            store,
            ledger: ledger.map(Mutex::new),
        }
    }

    fn with_ledger(
        &self,
        what: &str,
        document: &str,
        f: impl FnOnce(&Ledger) -> Result<(), PagecapError>,
    ) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let result = match ledger.lock() {
            Ok(guard) => f(&*guard),
            Err(_) => Err(PagecapError::Config("ledger lock poisoned".into())),
        };
        if let Err(e) = result {
            tracing::warn!("Ledger: could not {} {}: {}", what, document, e);
        }
    }

    /// Spawn the writer and return the queue feeding it.
    pub fn spawn(self) -> (mpsc::Sender<WriteJob>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    pub async fn run(self, mut rx: mpsc::Receiver<WriteJob>) {
        while let Some(job) = rx.recv().await {
            self.apply(job).await;
        }
        tracing::debug!("Persistence writer stopped");
    }

    async fn apply(&self, job: WriteJob) {
        match job {
            WriteJob::Begin {
                document,
                command,
                started_at,
            } => self.with_ledger("record start of", &document, |l| {
                l.begin_session(&document, &command, started_at)
            }),
            WriteJob::Supersede { document } => {
                self.with_ledger("mark superseded", &document, |l| {
                    l.mark_superseded(&document)
                })
            }
            WriteJob::Pages(snapshot) => self.write_pages(snapshot).await,
            WriteJob::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    async fn write_pages(&self, snapshot: Snapshot) {
        let count = snapshot.pages.len();
        match self
            .store
            .write(&snapshot.document_name, &snapshot.pages)
            .await
        {
            Ok(()) => {
                tracing::debug!(document = %snapshot.document_name, pages = count, "Saved");
            }
            Err(e) => {
                tracing::error!(
                    document = %snapshot.document_name,
                    pages = count,
                    "Failed to save document: {}",
                    e
                );
                return;
            }
        }

        self.with_ledger("record pages for", &snapshot.document_name, |l| {
            l.record_pages(&snapshot.document_name, count as u32, snapshot.last_total())
        });
    }
}
