//! Filesystem model, directory operations and a polling change watcher.

pub mod config;
pub mod fs;
pub mod logging;
pub mod watcher;

pub use config::Settings;
pub use fs::{Dir, File, FsError, FsPath};
pub use watcher::{FileSystemEvent, PollingWatcher, WatchError};
