//! Error types for the polling watcher.

use thiserror::Error;

use crate::fs::FsError;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Failed to schedule polling: {reason}")]
    SchedulerFailed { reason: String },

    #[error("Watcher is already running")]
    AlreadyRunning,

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}
