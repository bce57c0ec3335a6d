//! Receiver-side gap tracking and NAK timing.
//!
//! The receiver reports the first gap after its rebuild position on every
//! duty cycle. A new gap waits `nak_delay` before the first NAK, then NAKs
//! are repeated every `nak_retry_interval`. Once `max_nak_retries` NAKs went
//! unanswered the gap is given up and the receiver fills it with padding.

use std::time::Duration;

/// A hole in the rebuilt log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub term_id: i32,
    pub term_offset: i32,
    pub length: i32,
}

/// What the receiver should do about the current gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossAction {
    /// Nothing due.
    Wait,
    /// Send a NAK for the gap.
    Nak(Gap),
    /// Give up: fill the gap with padding.
    Skip(Gap),
}

#[derive(Debug, Clone, Copy)]
struct ActiveGap {
    gap: Gap,
    deadline_ns: i64,
    naks_sent: u32,
}

/// Timer state for the gap currently being repaired.
#[derive(Debug)]
pub struct LossDetector {
    active: Option<ActiveGap>,
    nak_delay_ns: i64,
    retry_interval_ns: i64,
    max_nak_retries: u32,
}

impl LossDetector {
    pub fn new(nak_delay: Duration, retry_interval: Duration, max_nak_retries: u32) -> Self {
        Self {
            active: None,
            nak_delay_ns: nak_delay.as_nanos() as i64,
            retry_interval_ns: retry_interval.as_nanos() as i64,
            max_nak_retries,
        }
    }

    /// Feed the result of a gap scan.
    pub fn on_scan(&mut self, gap: Option<Gap>, now_ns: i64) -> LossAction {
        let Some(gap) = gap else {
            self.active = None;
            return LossAction::Wait;
        };

        let active = match &mut self.active {
            Some(active)
                if active.gap.term_id == gap.term_id && active.gap.term_offset == gap.term_offset =>
            {
                // The gap may shrink as retransmits arrive or grow with the hwm.
                active.gap.length = gap.length;
                active
            }
            slot => slot.insert(ActiveGap {
                gap,
                deadline_ns: now_ns + self.nak_delay_ns,
                naks_sent: 0,
            }),
        };

        if now_ns < active.deadline_ns {
            return LossAction::Wait;
        }

        if active.naks_sent >= self.max_nak_retries {
            let gap = active.gap;
            self.active = None;
            return LossAction::Skip(gap);
        }

        active.naks_sent += 1;
        active.deadline_ns = now_ns + self.retry_interval_ns;
        LossAction::Nak(active.gap)
    }

    /// Whether a gap is being tracked.
    #[inline]
    pub fn has_active_gap(&self) -> bool {
        self.active.is_some()
    }
}
