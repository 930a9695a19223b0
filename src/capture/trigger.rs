// src/capture/trigger.rs — Message classification and session triggers
//
// Every observed message is exactly one of: a page candidate from the responder,
// a trigger (prefix command from a human), a malformed trigger, or ordinary chatter.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::infra::config::WatchConfig;
use crate::integrations::types::Message;

/// Everything needed to start a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Normalized command, prefix included (e.g. `$top_k_100`).
    pub command: String,
    pub document_name: String,
    pub started_at: DateTime<Utc>,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// From the responder; may carry a page.
    PageCandidate,
    Trigger(Trigger),
    /// Prefix present but nothing usable after it.
    MalformedTrigger,
    Ordinary,
}

/// Who may trigger a session and who produces pages.
#[derive(Debug, Clone)]
pub struct TriggerRules {
    prefix: String,
    responder: String,
    ignore_bots: bool,
    ignored_authors: Vec<String>,
    self_id: Option<String>,
}

impl TriggerRules {
    pub fn new(prefix: impl Into<String>, responder: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            responder: responder.into(),
            ignore_bots: true,
            ignored_authors: Vec::new(),
            self_id: None,
        }
    }

    pub fn from_config(watch: &WatchConfig, self_id: Option<&str>) -> Self {
        Self {
            prefix: watch.trigger_prefix.clone(),
            responder: watch.responder.clone(),
            ignore_bots: watch.ignore_bots,
            ignored_authors: watch.ignored_authors.clone(),
            self_id: self_id.map(str::to_string),
        }
    }

    /// Builder: the account this process posts as.
    pub fn with_self_id(mut self, id: impl Into<String>) -> Self {
        self.self_id = Some(id.into());
        self
    }

    /// Builder: toggle the blanket bot-author exclusion.
    pub fn ignoring_bots(mut self, ignore: bool) -> Self {
        self.ignore_bots = ignore;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn responder(&self) -> &str {
        &self.responder
    }

    pub fn is_responder(&self, msg: &Message) -> bool {
        msg.author == self.responder || msg.author_id == self.responder
    }

    /// Accounts that must never start a session.
    fn is_excluded(&self, msg: &Message) -> bool {
        self.is_responder(msg)
            || (self.ignore_bots && msg.author_is_bot)
            || self.self_id.as_deref() == Some(msg.author_id.as_str())
            || self
                .ignored_authors
                .iter()
                .any(|a| *a == msg.author || *a == msg.author_id)
    }

    pub fn classify(&self, msg: &Message) -> Classification {
        if self.is_responder(msg) {
            return Classification::PageCandidate;
        }
        if self.is_excluded(msg) || !msg.text.starts_with(&self.prefix) {
            return Classification::Ordinary;
        }

        let command = normalize_command(&msg.text);
        match document_name(&command, &self.prefix, msg.timestamp) {
            Some(document_name) => Classification::Trigger(Trigger {
                command,
                document_name,
                started_at: msg.timestamp,
                message_id: msg.id.clone(),
            }),
            None => Classification::MalformedTrigger,
        }
    }
}

/// Trim and collapse internal whitespace runs to `_`.
pub fn normalize_command(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join("_")
}

/// `<slug>_<YYYYmmdd_HHMMSS>_<hash8>`, or `None` when the command is empty
/// once the prefix is stripped.
///
/// The hash covers the full normalized command, so two commands whose slugs
/// coincide (`$Top` and `$top`) still get distinct names within one second.
pub fn document_name(command: &str, prefix: &str, started_at: DateTime<Utc>) -> Option<String> {
    let bare = command.strip_prefix(prefix).unwrap_or(command);
    let slug = slug::slugify(bare);
    if slug.is_empty() {
        return None;
    }
    let digest = Sha256::digest(command.as_bytes());
    let hash = hex::encode(&digest[..4]);
    Some(format!(
        "{slug}_{}_{hash}",
        started_at.format("%Y%m%d_%H%M%S")
    ))
}
