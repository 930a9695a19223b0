// src/capture/poller.rs — The interval loop feeding the capture service
//
// Each tick reads a short window of recent messages. Messages not seen yet
// are forwarded oldest first, so a trigger buried under quick chatter is still
// noticed and always lands before its responder's pages. The loop keeps going
// through source outages, backing off exponentially.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::capture::service::CaptureHandle;
use crate::infra::config::{BackoffConfig, WatchConfig};
use crate::infra::errors::PagecapError;
use crate::integrations::types::{Message, MessageSource};

/// Consecutive-failure tracking and delay calculation for one loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    interval: Duration,
    factor: f64,
    max_delay: Duration,
    threshold: u32,
    failures: u32,
    /// The outage has already been surfaced at error level.
    reported: bool,
}

impl Backoff {
    pub fn new(interval: Duration, config: &BackoffConfig) -> Self {
        Self {
            interval,
            factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay_ms).max(interval),
            threshold: config.failure_threshold.max(1),
            failures: 0,
            reported: false,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay before the next attempt once `failures` attempts in a row failed.
    pub fn delay_for(&self, failures: u32, hint: Option<Duration>) -> Duration {
        if failures == 0 {
            return self.interval;
        }
        // A server-provided wait wins, but never exceeds the cap.
        if let Some(hint) = hint {
            return (hint + Duration::from_millis(100)).min(self.max_delay);
        }
        let exp = (failures - 1).min(63) as i32;
        let ms = self.interval.as_millis() as f64 * self.factor.powi(exp);
        let capped = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Record a failed attempt and return how long to wait.
    pub fn on_failure(&mut self, loop_name: &str, error: &PagecapError) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.delay_for(
            self.failures,
            error.retry_after_ms().map(Duration::from_millis),
        );

        if self.failures >= self.threshold && !self.reported {
            self.reported = true;
            tracing::error!(
                failures = self.failures,
                "Message source unavailable ({}): {}. Still retrying every {}ms at most",
                loop_name,
                error,
                self.max_delay.as_millis()
            );
        } else if self.failures == 1 {
            tracing::warn!(
                delay_ms = delay.as_millis() as u64,
                "{} failed: {}",
                loop_name,
                error
            );
        } else {
            tracing::debug!(
                failures = self.failures,
                delay_ms = delay.as_millis() as u64,
                "{} failed again: {}",
                loop_name,
                error
            );
        }
        delay
    }

    /// Record a successful attempt and return the regular interval.
    pub fn on_success(&mut self, loop_name: &str) -> Duration {
        if self.failures > 0 {
            tracing::info!(
                failures = self.failures,
                "{} recovered after {} failed attempts",
                loop_name,
                self.failures
            );
        }
        self.failures = 0;
        self.reported = false;
        self.interval
    }
}

/// What a single tick concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Continue(Duration),
    /// The capture service is gone.
    Stop,
}

/// Sleep for `delay` unless shutdown is signalled first.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.recv() => false,
    }
}

/// Remembers the newest message already handed on, so each message in the
/// recent window is forwarded exactly once.
#[derive(Debug, Clone)]
pub struct ArrivalWatcher {
    window: u32,
    last_seen: Option<String>,
    /// The startup baseline has been taken.
    primed: bool,
}

impl ArrivalWatcher {
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            last_seen: None,
            primed: false,
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Messages after the last one seen. The first scan only records a
    /// baseline; history from before startup is not replayed.
    pub fn unseen(&mut self, messages: Vec<Message>) -> Vec<Message> {
        if !self.primed {
            self.primed = true;
            self.last_seen = messages.last().map(|m| m.id.clone());
            return Vec::new();
        }
        let fresh: Vec<Message> = match &self.last_seen {
            Some(last_id) => match messages.iter().position(|m| m.id == *last_id) {
                Some(pos) => messages.into_iter().skip(pos + 1).collect(),
                // Scrolled past the window (or deleted): everything is new
                None => messages,
            },
            None => messages,
        };
        if let Some(newest) = fresh.last() {
            self.last_seen = Some(newest.id.clone());
        }
        fresh
    }
}

/// The single loop that reads the channel. Every tick reads the recent
/// window once and feeds it to the capture service in channel order, so a
/// trigger is always applied before the responder pages that follow it.
pub struct Poller {
    source: Arc<dyn MessageSource>,
    handle: CaptureHandle,
    channel: String,
    arrivals: ArrivalWatcher,
    backoff: Backoff,
}

impl Poller {
    pub fn new(
        source: Arc<dyn MessageSource>,
        handle: CaptureHandle,
        channel: impl Into<String>,
        config: &WatchConfig,
    ) -> Self {
        Self {
            source,
            handle,
            channel: channel.into(),
            arrivals: ArrivalWatcher::new(config.arrival_window),
            backoff: Backoff::new(config.poll_interval(), &config.backoff),
        }
    }

    async fn tick(&mut self) -> Tick {
        let window = self.arrivals.window();
        match self.source.fetch_recent(&self.channel, window).await {
            Ok(messages) => {
                let delay = self.backoff.on_success("Poll");
                match self.apply(messages).await {
                    Ok(()) => Tick::Continue(delay),
                    Err(_) => Tick::Stop,
                }
            }
            Err(e) => Tick::Continue(self.backoff.on_failure("Poll", &e)),
        }
    }

    /// New messages go through in order, oldest first. The latest message
    /// is then read again when it was already seen, since the responder
    /// shows further pages by editing it in place.
    async fn apply(&mut self, messages: Vec<Message>) -> Result<(), PagecapError> {
        let latest = messages.last().cloned();
        let fresh = self.arrivals.unseen(messages);
        let latest_is_fresh = matches!(
            (fresh.last(), &latest),
            (Some(newest), Some(latest)) if newest.id == latest.id
        );

        for message in fresh {
            self.handle.observe(message).await?;
        }
        if let Some(latest) = latest.filter(|_| !latest_is_fresh) {
            self.handle.revisit(latest).await?;
        }
        Ok(())
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            channel = %self.channel,
            source = self.source.id(),
            "Polling every {}ms (last {} messages)",
            self.backoff.interval.as_millis(),
            self.arrivals.window()
        );
        loop {
            let delay = match self.tick().await {
                Tick::Continue(delay) => delay,
                Tick::Stop => break,
            };
            if !sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }
        tracing::debug!("Poller stopped");
    }
}
