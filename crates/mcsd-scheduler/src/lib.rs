//! Mass Sync Scheduler (C8): the periodic tick that runs a sync pass per
//! active directory under a bounded worker pool, and the cleanup tick that
//! retires stale or removed directories.

mod cleanup;
mod config;
mod runner;
mod tick;

pub use cleanup::CleanupTick;
pub use config::SchedulerConfig;
pub use runner::{ClientDirectorySyncRunner, DirectorySyncRunner};
pub use tick::MassSyncScheduler;
