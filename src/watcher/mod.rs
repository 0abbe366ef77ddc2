//! Polling change watcher.
//!
//! Roots are observed by re-walking them every poll interval and diffing the
//! result against the previous snapshot. Events are handed to listeners on
//! a separate worker pool, so a slow listener never delays a poll.
//!
//! # Architecture
//!
//! ```text
//! PollingWatcher
//!   - Scheduler (ThreadScheduler | TokioScheduler)
//!   - Registry: FsPath -> WatchedRoot { Snapshot, DeliveryGate }
//!         |
//!    poll cycle: capture -> diff -> replace
//!         |
//! EventDispatcher
//!   - WorkerPool (one worker per listener, FIFO)
//!         |
//!    +---------+---------+
//!    |         |         |
//! Listener  Listener  Listener
//! ```

mod dispatcher;
mod error;
mod event;
mod pool;
mod scheduler;
mod service;
mod snapshot;

pub use dispatcher::{DeliveryGate, EventDispatcher, EventListener};
pub use error::WatchError;
pub use event::{ChangeKind, FileSystemEvent};
pub use pool::WorkerPool;
pub use scheduler::{ScheduledTask, Scheduler, Task, ThreadScheduler, TokioScheduler};
pub use service::{
    PollingWatcher, PollingWatcherBuilder, Service, ServiceStatus, Subscribable, Watchable,
};
pub use snapshot::Snapshot;
