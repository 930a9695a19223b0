// src/capture/service.rs — The capture actor
//
// One task owns the SessionTracker. The poller and the page advancer talk to
// it through a CaptureHandle; commands are applied one at a time in the order
// they were queued, so a reset can never interleave with a page acceptance. The actor never awaits I/O other than handing
// snapshots to the persistence writer.

use tokio::sync::{mpsc, oneshot};

use crate::capture::advance::AdvanceRequest;
use crate::capture::gatekeeper::PageDecision;
use crate::capture::tracker::{Observation, SessionTracker};
use crate::capture::writer::WriteJob;
use crate::infra::errors::PagecapError;
use crate::integrations::types::Message;

#[derive(Debug)]
pub enum CaptureCommand {
    /// A message seen for the first time.
    Observe {
        message: Message,
        resp: oneshot::Sender<Observation>,
    },
    /// A message seen before whose pages may have changed.
    Revisit {
        message: Message,
        resp: oneshot::Sender<Observation>,
    },
    Current {
        resp: oneshot::Sender<Option<SessionView>>,
    },
    /// Wait until every write queued so far has been applied.
    Flush { resp: oneshot::Sender<()> },
}

/// Read-only summary of the live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub command: String,
    pub document_name: String,
    pub expected_page: u32,
    pub pages: usize,
    pub waiting: bool,
}

/// Cloneable handle to the capture actor.
#[derive(Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<CaptureCommand>,
}

impl CaptureHandle {
    /// Handle for a service that will be run on the matching receiver.
    pub fn from_sender(tx: mpsc::Sender<CaptureCommand>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CaptureCommand,
    ) -> Result<T, PagecapError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(make(resp_tx))
            .await
            .map_err(|_| PagecapError::ServiceStopped)?;
        resp_rx.await.map_err(|_| PagecapError::ServiceStopped)
    }

    pub async fn observe(&self, message: Message) -> Result<Observation, PagecapError> {
        self.request(|resp| CaptureCommand::Observe { message, resp })
            .await
    }

    pub async fn revisit(&self, message: Message) -> Result<Observation, PagecapError> {
        self.request(|resp| CaptureCommand::Revisit { message, resp })
            .await
    }

    pub async fn current(&self) -> Result<Option<SessionView>, PagecapError> {
        self.request(|resp| CaptureCommand::Current { resp }).await
    }

    pub async fn flush(&self) -> Result<(), PagecapError> {
        self.request(|resp| CaptureCommand::Flush { resp }).await
    }
}

pub struct CaptureService {
    tracker: SessionTracker,
    writes: mpsc::Sender<WriteJob>,
    advance: Option<mpsc::Sender<AdvanceRequest>>,
}

impl CaptureService {
    pub fn new(tracker: SessionTracker, writes: mpsc::Sender<WriteJob>) -> Self {
        Self {
            tracker,
            writes,
            advance: None,
        }
    }

    /// Builder: forward accepted pages to the page advancer.
    pub fn with_advancer(mut self, advance: mpsc::Sender<AdvanceRequest>) -> Self {
        self.advance = Some(advance);
        self
    }

    pub fn spawn(self) -> (CaptureHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(100);
        let join_handle = tokio::spawn(self.run(rx));
        (CaptureHandle { tx }, join_handle)
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<CaptureCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                CaptureCommand::Observe { message, resp } => {
                    let obs = self.tracker.observe(&message);
                    self.react(&obs, &message).await;
                    let _ = resp.send(obs);
                }
                CaptureCommand::Revisit { message, resp } => {
                    let obs = self.tracker.revisit(&message);
                    self.react(&obs, &message).await;
                    let _ = resp.send(obs);
                }
                CaptureCommand::Current { resp } => {
                    let view = self.tracker.session().map(|s| SessionView {
                        command: s.command().to_string(),
                        document_name: s.document_name().to_string(),
                        expected_page: s.expected_page(),
                        pages: s.pages().len(),
                        waiting: s.is_waiting(),
                    });
                    let _ = resp.send(view);
                }
                CaptureCommand::Flush { resp } => {
                    let (done_tx, done_rx) = oneshot::channel();
                    self.write(WriteJob::Barrier(done_tx)).await;
                    // Wait off the actor so observations keep flowing
                    tokio::spawn(async move {
                        let _ = done_rx.await;
                        let _ = resp.send(());
                    });
                }
            }
        }
        tracing::debug!("Capture service stopped");
    }

    async fn write(&self, job: WriteJob) {
        if self.writes.send(job).await.is_err() {
            tracing::error!("Persistence writer is gone; capture results are not being saved");
        }
    }

    /// Emit notices and queue follow-up work for an observation.
    async fn react(&self, obs: &Observation, message: &Message) {
        match obs {
            Observation::Ignored | Observation::SameTrigger => {}
            Observation::OlderTrigger => {
                tracing::debug!("Ignoring trigger older than the live session: {}", message.id);
            }
            Observation::MalformedTrigger { text } => {
                let shown: String = text.chars().take(80).collect();
                tracing::warn!("Ignoring trigger without a usable command: {:?}", shown);
            }
            Observation::SessionStarted {
                trigger,
                superseded,
            } => {
                if let Some(old) = superseded {
                    tracing::warn!(
                        document = %old.document_name,
                        pages = old.pages,
                        "New command replaces an unfinished capture; the partial document is kept as is"
                    );
                    self.write(WriteJob::Supersede {
                        document: old.document_name.clone(),
                    })
                    .await;
                }
                tracing::info!(
                    document = %trigger.document_name,
                    "Tracking new command {}",
                    trigger.command
                );
                self.write(WriteJob::Begin {
                    document: trigger.document_name.clone(),
                    command: trigger.command.clone(),
                    started_at: trigger.started_at,
                })
                .await;
            }
            Observation::Pages {
                decisions,
                snapshot,
            } => {
                let mut last_accepted = None;
                for decision in decisions {
                    match *decision {
                        PageDecision::Accepted { number, total } => {
                            tracing::info!(page = number, total, "Captured page {} / {}", number, total);
                            last_accepted = Some((number, total));
                        }
                        PageDecision::Waiting {
                            expected,
                            observed,
                            notify: true,
                        } => {
                            tracing::info!(expected, observed, "Waiting for page {}", expected);
                        }
                        PageDecision::Waiting { .. } | PageDecision::NotAPage => {}
                        PageDecision::Stale { expected, observed } => {
                            tracing::debug!(expected, observed, "Ignoring already captured page");
                        }
                    }
                }

                if let Some(snapshot) = snapshot {
                    let document = snapshot.document_name.clone();
                    self.write(WriteJob::Pages(snapshot.clone())).await;

                    if let (Some(advance), Some((number, total))) = (&self.advance, last_accepted) {
                        if number < total {
                            let req = AdvanceRequest {
                                message: message.clone(),
                                document,
                                next_page: number + 1,
                            };
                            if advance.try_send(req).is_err() {
                                tracing::debug!("Page advancer busy; page {} left to the user", number + 1);
                            }
                        }
                    }
                }
            }
        }
    }
}
