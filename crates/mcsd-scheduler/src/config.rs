//! Tuning knobs for the periodic sync tick and the cleanup tick (§4.8).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on directories syncing at once (`N` in §4.8).
    pub max_concurrent_directory_updates: usize,
    pub tick_interval: Duration,
    pub cleanup_interval: Duration,
    /// A non-ignored directory whose `last_success_sync` is older than this
    /// gets `is_ignored = true`.
    pub ignore_after_success_timeout_seconds: i64,
    /// A non-ignored directory whose `failed_attempts` reaches this gets
    /// `is_ignored = true`, regardless of how recent its last success was.
    pub ignore_after_failed_attempts_threshold: i32,
    /// A soft-deleted directory older than this is hard-deleted.
    pub mark_deleted_after_grace_seconds: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_directory_updates: 4,
            tick_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
            ignore_after_success_timeout_seconds: 7 * 24 * 3600,
            ignore_after_failed_attempts_threshold: 10,
            mark_deleted_after_grace_seconds: 30 * 24 * 3600,
        }
    }
}
