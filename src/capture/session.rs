// src/capture/session.rs — Capture session and page records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::page::PagePosition;
use crate::integrations::types::Message;

/// Stored in place of a missing page payload.
pub const MISSING_BODY: &str = "No description";

/// One captured page of a paginated response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    /// As reported by the responder; never checked against the captured count.
    pub total: u32,
    /// Raw footer the position was parsed from.
    pub footer: String,
    pub body: String,
    pub captured_at: DateTime<Utc>,
    pub source_channel: String,
    pub source_context: String,
}

impl Page {
    pub fn new(position: PagePosition, footer: &str, body: Option<&str>, msg: &Message) -> Self {
        let body = body
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(MISSING_BODY);
        Self {
            number: position.current,
            total: position.total,
            footer: footer.to_string(),
            body: body.to_string(),
            captured_at: msg.timestamp,
            source_channel: msg.channel.clone(),
            source_context: msg.guild.clone().unwrap_or_default(),
        }
    }
}

/// The live capture for one triggering command.
///
/// `pages` is always exactly pages `1..=len`, so the expected page is derived
/// from its length rather than stored separately.
#[derive(Debug, Clone)]
pub struct Session {
    command: String,
    started_at: DateTime<Utc>,
    document_name: String,
    trigger_id: String,
    pages: Vec<Page>,
    waiting: bool,
}

impl Session {
    pub fn new(
        command: String,
        started_at: DateTime<Utc>,
        document_name: String,
        trigger_id: String,
    ) -> Self {
        Self {
            command,
            started_at,
            document_name,
            trigger_id,
            pages: Vec::new(),
            waiting: false,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    /// Id of the message that started this session.
    pub fn trigger_id(&self) -> &str {
        &self.trigger_id
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn expected_page(&self) -> u32 {
        self.pages.len() as u32 + 1
    }

    /// Whether a "waiting for page N" notice is outstanding.
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Append the next page. Callers must have checked the number.
    pub(crate) fn accept(&mut self, page: Page) {
        debug_assert_eq!(page.number, self.expected_page());
        self.pages.push(page);
        self.waiting = false;
    }

    /// Raise the waiting flag; returns true if it was not already raised.
    pub(crate) fn start_waiting(&mut self) -> bool {
        !std::mem::replace(&mut self.waiting, true)
    }
}
