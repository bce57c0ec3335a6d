//! Nanosecond clocks for driving duty cycles.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source in nanoseconds.
pub trait NanoClock: Send + Sync {
    fn nano_time(&self) -> i64;
}

/// Wall-clock monotonic time since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemNanoClock {
    origin: Instant,
}

impl SystemNanoClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemNanoClock {
    fn default() -> Self {
        Self::new()
    }
}

impl NanoClock for SystemNanoClock {
    fn nano_time(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        self.now
            .fetch_add(duration.as_nanos() as i64, Ordering::AcqRel);
    }
}

impl NanoClock for ManualClock {
    fn nano_time(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
