use crate::error::Error;

/// Trait for reporting analysis progress.
///
/// The CLI implements it with indicatif spinners; tests and library callers
/// use [`SilentReporter`]. All methods have default no-op implementations and
/// may be called from several session threads at once.
pub trait ProgressReporter: Send + Sync {
    fn on_database_start(&self, _database: u64, _size_hint: Option<u64>) {}
    fn on_scan_progress(&self, _database: u64, _keys_seen: u64) {}
    fn on_database_complete(&self, _database: u64, _patterns: usize, _duration_secs: f64) {}
    fn on_database_failed(&self, _database: u64, _error: &Error) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
