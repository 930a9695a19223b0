// src/capture/tracker.rs — The session state machine
//
// Owns the single live session and applies triggers and page observations to it.
// Not thread-safe: exactly one owner (the capture service) drives it, and it
// must be fed messages in channel order.

use chrono::{DateTime, Utc};

use crate::capture::gatekeeper::{self, PageDecision};
use crate::capture::session::{Page, Session};
use crate::capture::trigger::{Classification, Trigger, TriggerRules};
use crate::integrations::types::Message;

/// Immutable copy of a session's pages, handed to the persistence writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub document_name: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub pages: Vec<Page>,
}

impl Snapshot {
    /// Total reported by the most recent page.
    pub fn last_total(&self) -> Option<u32> {
        self.pages.last().map(|p| p.total)
    }
}

/// A session that was replaced before the process stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superseded {
    pub document_name: String,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Ordinary chatter, or a page candidate with no session to attach to.
    Ignored,
    MalformedTrigger { text: String },
    /// The current session's own trigger, seen again.
    SameTrigger,
    /// A trigger older than the live session, seen again after the window
    /// was re-read from scratch.
    OlderTrigger,
    SessionStarted {
        trigger: Trigger,
        superseded: Option<Superseded>,
    },
    Pages {
        decisions: Vec<PageDecision>,
        /// Present when at least one page was accepted.
        snapshot: Option<Snapshot>,
    },
}

pub struct SessionTracker {
    rules: TriggerRules,
    session: Option<Session>,
}

impl SessionTracker {
    pub fn new(rules: TriggerRules) -> Self {
        Self {
            rules,
            session: None,
        }
    }

    pub fn rules(&self) -> &TriggerRules {
        &self.rules
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// A message seen for the first time: route to the trigger handling or
    /// the gatekeeper.
    pub fn observe(&mut self, msg: &Message) -> Observation {
        match self.rules.classify(msg) {
            Classification::PageCandidate => self.observe_page(msg),
            Classification::Trigger(trigger) => self.start(trigger),
            Classification::MalformedTrigger => Observation::MalformedTrigger {
                text: msg.text.clone(),
            },
            Classification::Ordinary => Observation::Ignored,
        }
    }

    /// A message seen before, read again because the responder may have
    /// edited it. Only its pages matter; a trigger counts once, when first seen.
    pub fn revisit(&mut self, msg: &Message) -> Observation {
        match self.rules.classify(msg) {
            Classification::PageCandidate => self.observe_page(msg),
            _ => Observation::Ignored,
        }
    }

    /// Replace whatever session is live. Unconditional, except that the
    /// current session's own trigger message does not restart it and an
    /// earlier trigger never displaces a later one.
    fn start(&mut self, trigger: Trigger) -> Observation {
        if let Some(live) = &self.session {
            if live.trigger_id() == trigger.message_id {
                return Observation::SameTrigger;
            }
            if trigger.started_at < live.started_at() {
                return Observation::OlderTrigger;
            }
        }

        let superseded = self.session.take().map(|old| Superseded {
            document_name: old.document_name().to_string(),
            pages: old.pages().len(),
        });

        self.session = Some(Session::new(
            trigger.command.clone(),
            trigger.started_at,
            trigger.document_name.clone(),
            trigger.message_id.clone(),
        ));

        Observation::SessionStarted {
            trigger,
            superseded,
        }
    }

    fn observe_page(&mut self, msg: &Message) -> Observation {
        let Some(session) = self.session.as_mut() else {
            return Observation::Ignored;
        };

        let decisions = gatekeeper::admit(session, msg);
        let snapshot = decisions
            .iter()
            .any(PageDecision::is_accepted)
            .then(|| Snapshot {
                document_name: session.document_name().to_string(),
                command: session.command().to_string(),
                started_at: session.started_at(),
                pages: session.pages().to_vec(),
            });

        Observation::Pages {
            decisions,
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 19, 5, 3, 31).unwrap()
    }

    fn tracker() -> SessionTracker {
        SessionTracker::new(TriggerRules::new("$", "Mudae"))
    }

    fn trigger(id: &str, text: &str) -> Message {
        Message::new(id, "alice", text, t0())
    }

    fn page(n: u32, total: u32) -> Message {
        Message::new(format!("r{n}"), "Mudae", "", t0())
            .from_bot()
            .with_block(Some(&format!("{n} / {total}")), Some(&format!("page {n}")))
    }

    fn numbers(t: &SessionTracker) -> Vec<u32> {
        t.session()
            .map(|s| s.pages().iter().map(|p| p.number).collect())
            .unwrap_or_default()
    }

    /// Longest prefix 1..k whose members all occur in `seen`.
    fn expected_prefix(seen: &[u32]) -> Vec<u32> {
        (1..).take_while(|n| seen.contains(n)).collect()
    }

    #[test]
    fn test_pages_without_session_are_ignored() {
        let mut t = tracker();
        assert_eq!(t.observe(&page(1, 3)), Observation::Ignored);
        assert!(t.session().is_none());
    }

    #[test]
    fn test_trigger_starts_session() {
        let mut t = tracker();
        match t.observe(&trigger("u1", "$top")) {
            Observation::SessionStarted {
                trigger,
                superseded,
            } => {
                assert_eq!(trigger.command, "$top");
                assert!(trigger.document_name.starts_with("top_20250219_050331_"));
                assert!(superseded.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(t.session().unwrap().expected_page(), 1);
    }

    #[test]
    fn test_same_trigger_seen_again_is_noop() {
        let mut t = tracker();
        t.observe(&trigger("u1", "$top"));
        t.observe(&page(1, 3));
        assert_eq!(t.observe(&trigger("u1", "$top")), Observation::SameTrigger);
        assert_eq!(numbers(&t), vec![1]);
    }

    #[test]
    fn test_reset_discards_progress() {
        let mut t = tracker();
        t.observe(&trigger("u1", "$top"));
        t.observe(&page(1, 3));
        t.observe(&page(2, 3));
        t.observe(&page(5, 9)); // leaves a waiting flag behind

        match t.observe(&trigger("u2", "$top")) {
            Observation::SessionStarted { superseded, .. } => {
                let old = superseded.unwrap();
                assert_eq!(old.pages, 2);
                assert!(old.document_name.starts_with("top_"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let s = t.session().unwrap();
        assert!(s.pages().is_empty());
        assert_eq!(s.expected_page(), 1);
        assert!(!s.is_waiting());
        assert_eq!(s.trigger_id(), "u2");
    }

    #[test]
    fn test_malformed_trigger_keeps_session() {
        let mut t = tracker();
        t.observe(&trigger("u1", "$top"));
        t.observe(&page(1, 2));
        assert!(matches!(
            t.observe(&trigger("u2", "$")),
            Observation::MalformedTrigger { .. }
        ));
        assert_eq!(numbers(&t), vec![1]);
        assert_eq!(t.session().unwrap().trigger_id(), "u1");
    }

    #[test]
    fn test_revisit_never_starts_a_session() {
        let mut t = tracker();
        assert_eq!(t.revisit(&trigger("u1", "$top")), Observation::Ignored);
        assert!(t.session().is_none());

        t.observe(&trigger("u2", "$mm"));
        assert_eq!(t.revisit(&trigger("u3", "$top")), Observation::Ignored);
        assert_eq!(t.session().unwrap().command(), "$mm");

        // Edited responder pages still go through the gatekeeper
        assert!(matches!(
            t.revisit(&page(1, 2)),
            Observation::Pages { snapshot: Some(_), .. }
        ));
        assert_eq!(numbers(&t), vec![1]);
    }

    #[test]
    fn test_scenario_duplicate_page_causes_no_extra_write() {
        let mut t = tracker();
        t.observe(&trigger("u1", "$top"));

        let mut writes = Vec::new();
        for n in [1, 2, 2, 3] {
            if let Observation::Pages {
                snapshot: Some(snap),
                ..
            } = t.observe(&page(n, 3))
            {
                writes.push(snap.pages.len());
            }
        }

        assert_eq!(writes, vec![1, 2, 3]);
        assert_eq!(numbers(&t), vec![1, 2, 3]);
    }

    #[test]
    fn test_scenario_overshoot_is_not_cached() {
        let mut t = tracker();
        t.observe(&trigger("u1", "$top"));

        match t.observe(&page(2, 3)) {
            Observation::Pages {
                decisions,
                snapshot,
            } => {
                assert_eq!(
                    decisions,
                    vec![PageDecision::Waiting {
                        expected: 1,
                        observed: 2,
                        notify: true
                    }]
                );
                assert!(snapshot.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }

        t.observe(&page(1, 3));
        assert_eq!(numbers(&t), vec![1]);
        assert_eq!(t.session().unwrap().expected_page(), 2);

        // Page 2 has to be seen again
        t.observe(&page(3, 3));
        assert_eq!(numbers(&t), vec![1]);
        t.observe(&page(2, 3));
        assert_eq!(numbers(&t), vec![1, 2]);
    }

    #[test]
    fn test_waiting_notice_suppressed_until_accept() {
        let mut t = tracker();
        t.observe(&trigger("u1", "$top"));
        t.observe(&page(1, 9));
        t.observe(&page(2, 9));
        assert_eq!(t.session().unwrap().expected_page(), 3);

        let mut notices = 0;
        for msg in [page(5, 9), page(5, 9), page(5, 9), page(3, 9)] {
            if let Observation::Pages { decisions, .. } = t.observe(&msg) {
                notices += decisions
                    .iter()
                    .filter(|d| matches!(d, PageDecision::Waiting { notify: true, .. }))
                    .count();
            }
        }
        assert_eq!(notices, 1);
        assert_eq!(numbers(&t), vec![1, 2, 3]);
    }

    #[test]
    fn test_idempotent_reobservation() {
        let mut t = tracker();
        t.observe(&trigger("u1", "$top"));
        for n in 1..=4 {
            t.observe(&page(n, 9));
        }
        let before = t.session().unwrap().pages().to_vec();
        let obs = t.observe(&page(3, 9));
        assert!(matches!(obs, Observation::Pages { snapshot: None, .. }));
        assert_eq!(t.session().unwrap().pages(), before.as_slice());
        assert_eq!(t.session().unwrap().expected_page(), 5);
    }

    #[test]
    fn test_prefix_property_over_fixed_sequences() {
        let sequences: &[&[u32]] = &[
            &[1, 2, 3],
            &[2, 1, 2, 3],
            &[3, 2, 1],
            &[1, 1, 1, 3, 2, 3, 4],
            &[5, 4, 3, 2, 1, 2, 3, 4, 5],
            &[1, 3, 5, 2, 4],
            &[],
        ];
        for seq in sequences {
            let mut t = tracker();
            t.observe(&trigger("u1", "$top"));
            let mut last_expected = 1;
            for &n in *seq {
                t.observe(&page(n, 9));
                let expected = t.session().unwrap().expected_page();
                assert!(expected == last_expected || expected == last_expected + 1);
                last_expected = expected;
            }
            let got = numbers(&t);
            // Accepted pages always form 1..=k
            assert_eq!(got, (1..=got.len() as u32).collect::<Vec<_>>());
            // and never exceed the prefix of what was observed
            assert!(got.len() <= expected_prefix(seq).len(), "{seq:?}");
        }
    }

    #[test]
    fn test_prefix_property_when_replayed_until_stable() {
        // Re-running the observed sequence enough times captures exactly the
        // longest fully-observed prefix, however the pages were interleaved.
        let sequences: &[&[u32]] = &[&[3, 2, 1], &[2, 4, 1, 3], &[1, 3, 4], &[2, 3]];
        for seq in sequences {
            let mut t = tracker();
            t.observe(&trigger("u1", "$top"));
            for _ in 0..seq.len() {
                for &n in *seq {
                    t.observe(&page(n, 9));
                }
            }
            assert_eq!(numbers(&t), expected_prefix(seq), "{seq:?}");
        }
    }

    #[test]
    fn test_snapshot_last_total() {
        let mut t = tracker();
        t.observe(&trigger("u1", "$top"));
        match t.observe(&page(1, 7)) {
            Observation::Pages {
                snapshot: Some(s), ..
            } => {
                assert_eq!(s.last_total(), Some(7));
                assert_eq!(s.command, "$top");
                assert_eq!(s.started_at, t0());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_older_trigger_does_not_displace_newer_session() {
        let mut t = tracker();
        let later = Message::new("u2", "alice", "$mm", t0() + chrono::Duration::seconds(5));
        t.observe(&later);
        t.observe(&page(1, 3));

        // The window is re-read from scratch and an earlier trigger shows up again
        assert_eq!(
            t.observe(&trigger("u1", "$top")),
            Observation::OlderTrigger
        );
        assert_eq!(t.session().unwrap().command(), "$mm");
        assert_eq!(numbers(&t), vec![1]);
    }
}
