//! Sender-side bookkeeping of NAK driven retransmits.
//!
//! Each accepted NAK opens an action for its `(term_id, term_offset)`. While
//! the action lingers, repeated NAKs for the same range are ignored so a burst
//! of NAKs costs one retransmit. The number of open actions is bounded.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct RetransmitAction {
    term_id: i32,
    term_offset: i32,
    expires_ns: i64,
}

/// Tracks open retransmit actions.
#[derive(Debug)]
pub struct RetransmitHandler {
    actions: Vec<RetransmitAction>,
    linger_ns: i64,
    max_actions: usize,
}

impl RetransmitHandler {
    pub fn new(linger: Duration, max_actions: usize) -> Self {
        Self {
            actions: Vec::with_capacity(max_actions),
            linger_ns: linger.as_nanos() as i64,
            max_actions,
        }
    }

    /// Decide whether a NAK for `(term_id, term_offset)` should be served now.
    pub fn on_nak(&mut self, term_id: i32, term_offset: i32, now_ns: i64) -> bool {
        self.expire(now_ns);

        if self
            .actions
            .iter()
            .any(|a| a.term_id == term_id && a.term_offset == term_offset)
        {
            return false;
        }
        if self.actions.len() >= self.max_actions {
            return false;
        }

        self.actions.push(RetransmitAction {
            term_id,
            term_offset,
            expires_ns: now_ns + self.linger_ns,
        });
        true
    }

    /// Drop lingering actions whose time is up; returns how many.
    pub fn expire(&mut self, now_ns: i64) -> usize {
        let before = self.actions.len();
        self.actions.retain(|a| a.expires_ns > now_ns);
        before - self.actions.len()
    }

    /// Open actions.
    #[inline]
    pub fn active(&self) -> usize {
        self.actions.len()
    }
}
