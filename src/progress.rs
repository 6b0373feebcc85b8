// src/progress.rs
/// Lightweight progress reporting for long-running batch operations.
/// Frontends implement this to surface status to users.
pub trait Progress {
    /// Called at the start with the total number of records.
    fn begin(&mut self, _total: usize) {}

    /// Free-form status line for human eyes.
    fn log(&mut self, _msg: &str) {}

    /// Called when one record finishes, successfully or not.
    fn item_done(&mut self, _number: &str, _ok: bool) {}

    /// Called at the end, successful or not.
    fn finish(&mut self) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}
