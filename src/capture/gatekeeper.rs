// src/capture/gatekeeper.rs — Accept / wait / ignore decisions for observed pages
//
// Only the exact expected page advances a session. Overshoots wait (one notice
// per gap), undershoots are stale re-displays and are dropped. Together this
// keeps the captured pages a gap-free, duplicate-free prefix of the document.

use crate::capture::page::{parse_position, PagePosition};
use crate::capture::session::{Page, Session};
use crate::integrations::types::{Block, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDecision {
    /// No position marker in the block.
    NotAPage,
    Accepted { number: u32, total: u32 },
    /// The responder is past the page we need. `notify` is true only for the
    /// first observation of this gap.
    Waiting {
        expected: u32,
        observed: u32,
        notify: bool,
    },
    /// Already captured; ignored.
    Stale { expected: u32, observed: u32 },
}

impl PageDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PageDecision::Accepted { .. })
    }
}

/// Decide on a single block of `msg`, mutating `session` only on acceptance
/// or when a new waiting episode starts.
pub fn admit_block(session: &mut Session, block: &Block, msg: &Message) -> PageDecision {
    let Some(footer) = block.footer.as_deref() else {
        return PageDecision::NotAPage;
    };
    let Some(position) = parse_position(footer) else {
        return PageDecision::NotAPage;
    };
    decide(session, position, footer, block.body.as_deref(), msg)
}

fn decide(
    session: &mut Session,
    position: PagePosition,
    footer: &str,
    body: Option<&str>,
    msg: &Message,
) -> PageDecision {
    let expected = session.expected_page();
    let observed = position.current;

    if observed == expected {
        session.accept(Page::new(position, footer, body, msg));
        PageDecision::Accepted {
            number: observed,
            total: position.total,
        }
    } else if observed > expected {
        PageDecision::Waiting {
            expected,
            observed,
            notify: session.start_waiting(),
        }
    } else {
        PageDecision::Stale { expected, observed }
    }
}

/// Run every block of `msg` through the gate, in order.
pub fn admit(session: &mut Session, msg: &Message) -> Vec<PageDecision> {
    msg.blocks
        .iter()
        .map(|block| admit_block(session, block, msg))
        .collect()
}
