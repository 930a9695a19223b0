// src/capture/advance.rs — Advance-and-confirm paging
//
// After a page is accepted and more remain, ask the responder for the next
// page, re-read the message and check that it really moved on. A confirmed
// message goes back through the capture service like any other observation;
// nothing here touches session state directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::capture::page::parse_position;
use crate::capture::service::CaptureHandle;
use crate::infra::config::AdvanceConfig;
use crate::infra::errors::PagecapError;
use crate::integrations::types::{Message, MessageSource, PageAdvancer};

#[derive(Debug, Clone)]
pub struct AdvanceRequest {
    /// The responder message whose page was just accepted.
    pub message: Message,
    pub document: String,
    pub next_page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Confirmed { page: u32, attempts: u32 },
    /// The message never showed the next page.
    Unconfirmed { attempts: u32 },
    /// The session moved on (new trigger, or the page arrived by other means).
    NotNeeded,
}

pub struct PageTurner {
    advancer: Arc<dyn PageAdvancer>,
    source: Arc<dyn MessageSource>,
    handle: CaptureHandle,
    max_attempts: u32,
    settle: Duration,
}

impl PageTurner {
    pub fn new(
        advancer: Arc<dyn PageAdvancer>,
        source: Arc<dyn MessageSource>,
        handle: CaptureHandle,
        config: &AdvanceConfig,
    ) -> Self {
        Self {
            advancer,
            source,
            handle,
            max_attempts: config.max_attempts.max(1),
            settle: Duration::from_millis(config.settle_ms),
        }
    }

    pub fn spawn(self) -> (mpsc::Sender<AdvanceRequest>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    pub async fn run(self, mut rx: mpsc::Receiver<AdvanceRequest>) {
        while let Some(req) = rx.recv().await {
            match self.advance(&req).await {
                Ok(AdvanceOutcome::Confirmed { page, attempts }) => {
                    tracing::debug!(document = %req.document, page, attempts, "Advance confirmed");
                }
                Ok(AdvanceOutcome::Unconfirmed { attempts }) => {
                    tracing::info!(
                        document = %req.document,
                        "Could not advance to page {} after {} attempts; waiting for it to be shown",
                        req.next_page,
                        attempts
                    );
                }
                Ok(AdvanceOutcome::NotNeeded) => {}
                Err(PagecapError::ServiceStopped) => break,
                Err(e) => {
                    tracing::warn!(document = %req.document, "Page advance failed: {}", e);
                }
            }
        }
        tracing::debug!("Page advancer stopped");
    }

    /// Whether the live session still wants `req.next_page`.
    async fn still_wanted(&self, req: &AdvanceRequest) -> Result<bool, PagecapError> {
        Ok(self
            .handle
            .current()
            .await?
            .is_some_and(|s| s.document_name == req.document && s.expected_page == req.next_page))
    }

    fn shows_page(message: &Message, page: u32) -> bool {
        message
            .blocks
            .iter()
            .filter_map(|b| b.footer.as_deref().and_then(parse_position))
            .any(|pos| pos.current == page)
    }

    pub async fn advance(&self, req: &AdvanceRequest) -> Result<AdvanceOutcome, PagecapError> {
        for attempt in 1..=self.max_attempts {
            if !self.still_wanted(req).await? {
                return Ok(AdvanceOutcome::NotNeeded);
            }

            if let Err(e) = self.advancer.request_next(&req.message).await {
                if !e.is_retriable() {
                    return Err(e);
                }
                tracing::debug!(attempt, "Advance request failed: {}", e);
            }

            // Give the responder longer on each attempt
            tokio::time::sleep(self.settle * attempt).await;

            let refreshed = match self
                .source
                .fetch_message(&req.message.channel, &req.message.id)
                .await
            {
                Ok(Some(m)) => m,
                Ok(None) => return Ok(AdvanceOutcome::NotNeeded),
                Err(e) if e.is_retriable() => {
                    tracing::debug!(attempt, "Re-reading message failed: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if Self::shows_page(&refreshed, req.next_page) {
                self.handle.revisit(refreshed).await?;
                return Ok(AdvanceOutcome::Confirmed {
                    page: req.next_page,
                    attempts: attempt,
                });
            }
        }
        Ok(AdvanceOutcome::Unconfirmed {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::service::CaptureService;
    use crate::capture::tracker::SessionTracker;
    use crate::capture::trigger::TriggerRules;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A responder message that moves one page forward per `request_next`,
    /// but only once `stuck_for` requests have been swallowed.
    struct Pager {
        shown: AtomicU32,
        requests: AtomicU32,
        stuck_for: u32,
        total: u32,
    }

    impl Pager {
        fn new(stuck_for: u32) -> Arc<Self> {
            Arc::new(Self {
                shown: AtomicU32::new(1),
                requests: AtomicU32::new(0),
                stuck_for,
                total: 3,
            })
        }

        fn message(&self) -> Message {
            let n = self.shown.load(Ordering::SeqCst);
            Message::new("resp", "Mudae", "", Utc::now())
                .in_channel("c", None)
                .from_bot()
                .with_block(Some(&format!("{n} / {}", self.total)), Some("x"))
        }
    }

    #[async_trait]
    impl PageAdvancer for Pager {
        async fn request_next(&self, _message: &Message) -> Result<(), PagecapError> {
            let r = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
            if r > self.stuck_for {
                self.shown.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MessageSource for Pager {
        fn id(&self) -> &str {
            "pager"
        }
        async fn fetch_latest(&self, _channel: &str) -> Result<Option<Message>, PagecapError> {
            Ok(Some(self.message()))
        }
        async fn fetch_recent(
            &self,
            _channel: &str,
            _limit: u32,
        ) -> Result<Vec<Message>, PagecapError> {
            Ok(vec![self.message()])
        }
        async fn fetch_message(
            &self,
            _channel: &str,
            _id: &str,
        ) -> Result<Option<Message>, PagecapError> {
            Ok(Some(self.message()))
        }
    }

    async fn setup(pager: &Arc<Pager>, attempts: u32) -> (PageTurner, CaptureHandle, String) {
        let (writes, mut writes_rx) = mpsc::channel(64);
        tokio::spawn(async move { while writes_rx.recv().await.is_some() {} });
        let tracker = SessionTracker::new(TriggerRules::new("$", "Mudae"));
        let (handle, _) = CaptureService::new(tracker, writes).spawn();

        handle
            .observe(Message::new("u1", "alice", "$top", Utc::now()))
            .await
            .unwrap();
        handle.observe(pager.message()).await.unwrap();
        let document = handle.current().await.unwrap().unwrap().document_name;

        let config = AdvanceConfig {
            enabled: true,
            max_attempts: attempts,
            settle_ms: 1,
            ..AdvanceConfig::default()
        };
        let turner = PageTurner::new(pager.clone(), pager.clone(), handle.clone(), &config);
        (turner, handle, document)
    }

    #[tokio::test]
    async fn test_confirmed_advance_is_captured() {
        let pager = Pager::new(0);
        let (turner, handle, document) = setup(&pager, 3).await;
        let req = AdvanceRequest {
            message: pager.message(),
            document,
            next_page: 2,
        };

        let outcome = turner.advance(&req).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Confirmed { page: 2, attempts: 1 });
        assert_eq!(handle.current().await.unwrap().unwrap().pages, 2);
    }

    #[tokio::test]
    async fn test_retries_until_page_moves() {
        let pager = Pager::new(1);
        let (turner, handle, document) = setup(&pager, 3).await;
        let req = AdvanceRequest {
            message: pager.message(),
            document,
            next_page: 2,
        };

        let outcome = turner.advance(&req).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Confirmed { page: 2, attempts: 2 });
        assert_eq!(handle.current().await.unwrap().unwrap().expected_page, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let pager = Pager::new(10);
        let (turner, handle, document) = setup(&pager, 2).await;
        let req = AdvanceRequest {
            message: pager.message(),
            document,
            next_page: 2,
        };

        let outcome = turner.advance(&req).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Unconfirmed { attempts: 2 });
        assert_eq!(pager.requests.load(Ordering::SeqCst), 2);
        assert_eq!(handle.current().await.unwrap().unwrap().pages, 1);
    }

    #[tokio::test]
    async fn test_not_needed_after_new_trigger() {
        let pager = Pager::new(0);
        let (turner, handle, document) = setup(&pager, 3).await;
        handle
            .observe(Message::new("u2", "bob", "$mm", Utc::now()))
            .await
            .unwrap();
        let req = AdvanceRequest {
            message: pager.message(),
            document,
            next_page: 2,
        };

        assert_eq!(turner.advance(&req).await.unwrap(), AdvanceOutcome::NotNeeded);
        assert_eq!(pager.requests.load(Ordering::SeqCst), 0);
    }
}
