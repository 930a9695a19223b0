// src/capture/pipeline.rs — Start and stop the full watch pipeline
//
// source ──> Poller ──> CaptureService ──> PersistenceWriter ──> store + ledger
//                          │    ^
//                          v    │
//                         PageTurner (optional)

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::capture::advance::PageTurner;
use crate::capture::poller::Poller;
use crate::capture::service::{CaptureHandle, CaptureService};
use crate::capture::tracker::SessionTracker;
use crate::capture::trigger::TriggerRules;
use crate::capture::writer::PersistenceWriter;
use crate::infra::config::Config;
use crate::infra::errors::PagecapError;
use crate::integrations::types::{MessageSource, PageAdvancer};
use crate::store::{DocumentStore, Ledger};

/// Collaborators the pipeline is built from.
pub struct PipelineParts {
    pub source: Arc<dyn MessageSource>,
    /// Only used when `[advance].enabled` is set.
    pub advancer: Option<Arc<dyn PageAdvancer>>,
    pub store: Arc<dyn DocumentStore>,
    pub ledger: Option<Ledger>,
}

pub struct CapturePipeline {
    handle: CaptureHandle,
    shutdown_tx: broadcast::Sender<()>,
    loops: Vec<JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
}

impl CapturePipeline {
    pub fn start(config: &Config, channel: &str, parts: PipelineParts) -> Self {
        let rules = TriggerRules::from_config(&config.watch, parts.source.self_id());
        let (writes, writer_task) = PersistenceWriter::new(parts.store, parts.ledger).spawn();
        let mut service = CaptureService::new(SessionTracker::new(rules), writes);

        // The advancer needs a handle to the service it is fed by
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel(100);
        let handle = CaptureHandle::from_sender(cmd_tx);
        let mut background = vec![writer_task];

        match (&parts.advancer, config.advance.enabled) {
            (Some(advancer), true) => {
                let turner = PageTurner::new(
                    advancer.clone(),
                    parts.source.clone(),
                    handle.clone(),
                    &config.advance,
                );
                let (advance_tx, advance_task) = turner.spawn();
                service = service.with_advancer(advance_tx);
                background.push(advance_task);
                tracing::info!("Page advancing enabled ({} attempts)", config.advance.max_attempts);
            }
            (None, true) => {
                tracing::warn!("Page advancing is enabled but the source cannot turn pages");
            }
            _ => {}
        }
        background.push(tokio::spawn(service.run(cmd_rx)));

        let (shutdown_tx, _) = broadcast::channel(1);
        let poller = Poller::new(parts.source, handle.clone(), channel, &config.watch);
        let loops = vec![tokio::spawn(poller.run(shutdown_tx.subscribe()))];

        Self {
            handle,
            shutdown_tx,
            loops,
            background,
        }
    }

    pub fn handle(&self) -> &CaptureHandle {
        &self.handle
    }

    /// Stop polling, wait for queued writes, then tear down the rest.
    pub async fn stop(self) -> Result<(), PagecapError> {
        let _ = self.shutdown_tx.send(());
        for task in self.loops {
            let _ = task.await;
        }
        let flushed = self.handle.flush().await;
        for task in self.background {
            task.abort();
        }
        flushed
    }
}
