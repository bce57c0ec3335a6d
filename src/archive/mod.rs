//! Archive module - work items the archive duty cycle drives.

mod delete_segments;

pub use delete_segments::DeleteSegmentsSession;

/// A unit of archive work, polled until done.
pub trait Session {
    /// Do a bounded amount of work; returns the amount done.
    fn do_work(&mut self) -> usize;

    /// Abandon without finishing.
    fn abort(&mut self);

    /// Release resources, finishing what must not be left behind.
    fn close(&mut self);

    fn is_done(&self) -> bool;

    fn session_id(&self) -> i64;
}
