// src/capture/mod.rs — Paginated response capture
//
// Pure decision logic (page, trigger, gatekeeper, session, tracker) plus the
// tasks that drive it (service, writer, poller, advance, pipeline).

pub mod advance;
pub mod gatekeeper;
pub mod page;
pub mod pipeline;
pub mod poller;
pub mod service;
pub mod session;
pub mod tracker;
pub mod trigger;
pub mod writer;

pub use page::{parse_position, PagePosition};
pub use pipeline::{CapturePipeline, PipelineParts};
pub use service::{CaptureHandle, SessionView};
pub use session::{Page, Session};
pub use tracker::{Observation, SessionTracker, Snapshot};
pub use trigger::TriggerRules;
