//! Idle strategies for duty-cycle loops.
//!
//! Nothing in this crate blocks; callers drive `offer`, `poll` and
//! `do_work` in their own loops and pick how to wait when a cycle did no work.
//!
//! ```
//! use termwire::idle::{BackoffIdleStrategy, IdleStrategy};
//!
//! let mut idle = BackoffIdleStrategy::default();
//! for work_count in [0, 0, 3, 0] {
//!     idle.idle_work(work_count);
//! }
//! ```

use std::time::Duration;

/// How a loop waits between cycles.
pub trait IdleStrategy: Send {
    /// Idle after a cycle that did `work_count` units of work.
    fn idle_work(&mut self, work_count: usize) {
        if work_count > 0 {
            self.reset();
        } else {
            self.idle();
        }
    }

    /// Idle once.
    fn idle(&mut self);

    /// Forget any escalation state.
    fn reset(&mut self) {}
}

/// Spins with a CPU hint.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinIdleStrategy;

impl IdleStrategy for BusySpinIdleStrategy {
    fn idle(&mut self) {
        std::hint::spin_loop();
    }
}

/// Does nothing; for tests and externally paced loops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpIdleStrategy;

impl IdleStrategy for NoOpIdleStrategy {
    fn idle(&mut self) {}
}

/// Yields the thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldingIdleStrategy;

impl IdleStrategy for YieldingIdleStrategy {
    fn idle(&mut self) {
        std::thread::yield_now();
    }
}

/// Sleeps for a fixed period.
#[derive(Debug, Clone, Copy)]
pub struct SleepingIdleStrategy {
    period: Duration,
}

impl SleepingIdleStrategy {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl IdleStrategy for SleepingIdleStrategy {
    fn idle(&mut self) {
        std::thread::sleep(self.period);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackoffState {
    Spinning(u64),
    Yielding(u64),
    Parking(Duration),
}

/// Spins, then yields, then sleeps with exponentially growing periods.
#[derive(Debug, Clone)]
pub struct BackoffIdleStrategy {
    max_spins: u64,
    max_yields: u64,
    min_park: Duration,
    max_park: Duration,
    state: BackoffState,
}

impl BackoffIdleStrategy {
    pub fn new(max_spins: u64, max_yields: u64, min_park: Duration, max_park: Duration) -> Self {
        Self {
            max_spins,
            max_yields,
            min_park,
            max_park,
            state: BackoffState::Spinning(0),
        }
    }
}

impl Default for BackoffIdleStrategy {
    fn default() -> Self {
        Self::new(10, 5, Duration::from_micros(1), Duration::from_millis(1))
    }
}

impl IdleStrategy for BackoffIdleStrategy {
    fn idle(&mut self) {
        self.state = match self.state {
            BackoffState::Spinning(n) if n < self.max_spins => {
                std::hint::spin_loop();
                BackoffState::Spinning(n + 1)
            }
            BackoffState::Spinning(_) => BackoffState::Yielding(0),
            BackoffState::Yielding(n) if n < self.max_yields => {
                std::thread::yield_now();
                BackoffState::Yielding(n + 1)
            }
            BackoffState::Yielding(_) => BackoffState::Parking(self.min_park),
            BackoffState::Parking(period) => {
                std::thread::sleep(period);
                BackoffState::Parking((period * 2).min(self.max_park))
            }
        };
    }

    fn reset(&mut self) {
        self.state = BackoffState::Spinning(0);
    }
}
