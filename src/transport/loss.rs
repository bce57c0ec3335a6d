//! Loss generators deciding which data frames the medium drops.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::protocol::DataHeader;

/// Decides whether a received data frame is dropped before processing.
pub trait LossGenerator: Send {
    /// `true` to drop the frame described by `header`.
    fn should_drop_frame(&mut self, header: &DataHeader) -> bool;
}

/// Never drops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoss;

impl LossGenerator for NoLoss {
    fn should_drop_frame(&mut self, _header: &DataHeader) -> bool {
        false
    }
}

/// Drops frames at random with a fixed rate, reproducibly from a seed.
#[derive(Debug)]
pub struct RandomLoss {
    rng: StdRng,
    rate: f64,
}

impl RandomLoss {
    /// `rate` is clamped to `[0, 1]`.
    pub fn new(rate: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            rate: rate.clamp(0.0, 1.0),
        }
    }
}

impl LossGenerator for RandomLoss {
    fn should_drop_frame(&mut self, header: &DataHeader) -> bool {
        !header.is_heartbeat() && self.rng.gen_bool(self.rate)
    }
}

/// Drops the first transmission of specific frames.
#[derive(Debug, Default)]
pub struct TargetedLoss {
    targets: HashSet<(i32, i32)>,
}

impl TargetedLoss {
    /// Drop the first frame seen at each `(term_id, term_offset)`.
    pub fn new(targets: impl IntoIterator<Item = (i32, i32)>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
        }
    }
}

impl LossGenerator for TargetedLoss {
    fn should_drop_frame(&mut self, header: &DataHeader) -> bool {
        !header.is_heartbeat() && self.targets.remove(&(header.term_id, header.term_offset))
    }
}

/// Drops every transmission of specific frames, retransmits included.
#[derive(Debug, Default)]
pub struct BlackholeLoss {
    targets: HashSet<(i32, i32)>,
}

impl BlackholeLoss {
    pub fn new(targets: impl IntoIterator<Item = (i32, i32)>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
        }
    }
}

impl LossGenerator for BlackholeLoss {
    fn should_drop_frame(&mut self, header: &DataHeader) -> bool {
        !header.is_heartbeat() && self.targets.contains(&(header.term_id, header.term_offset))
    }
}
