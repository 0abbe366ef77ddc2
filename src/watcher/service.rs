//! Polling watcher: a registry of watched roots driven by a recurring task.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::config::{InitialEvents, WatcherConfig};
use crate::fs::{Dir, EntryKind, FileSystem, FsError, FsPath, LocalFs};

use super::dispatcher::{DeliveryGate, EventDispatcher, EventListener};
use super::error::WatchError;
use super::event::FileSystemEvent;
use super::pool::panic_message;
use super::scheduler::{ScheduledTask, Scheduler, Task, ThreadScheduler};
use super::snapshot::Snapshot;

/// Lifecycle state of a [`Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Stopped,
    Running,
}

/// Something that can observe directory trees.
pub trait Watchable {
    /// Start observing the directory at `path`.
    ///
    /// Its current contents become the baseline. Watching a root that is
    /// already watched keeps the existing baseline.
    fn watch(&self, path: &FsPath) -> Result<(), WatchError>;

    /// Stop observing `path`. Returns whether it was watched.
    ///
    /// No event for `path` reaches a listener after this returns. Called
    /// from a listener, it does not wait for deliveries on other workers.
    fn unwatch(&self, path: &FsPath) -> bool;
}

/// Something listeners can register with.
pub trait Subscribable {
    fn subscribe(&self, listener: Arc<dyn EventListener>) -> bool;
    fn unsubscribe(&self, listener: &Arc<dyn EventListener>) -> bool;
}

/// Something with a start/stop lifecycle.
pub trait Service {
    /// Begin periodic work. Fails with [`WatchError::AlreadyRunning`] when running.
    fn start(&self) -> Result<(), WatchError>;
    /// Cancel periodic work. A no-op when stopped.
    fn stop(&self);
    fn status(&self) -> ServiceStatus;
}

struct WatchedRoot {
    path: FsPath,
    /// Held for the whole poll of this root, so polls never interleave.
    snapshot: Mutex<Snapshot>,
    gate: Arc<DeliveryGate>,
}

struct WatcherCore {
    roots: Mutex<IndexMap<FsPath, Arc<WatchedRoot>>>,
    dispatcher: Arc<EventDispatcher>,
    fs: Arc<dyn FileSystem>,
    initial_events: InitialEvents,
}

impl WatcherCore {
    fn watch(&self, path: &FsPath) -> Result<(), WatchError> {
        if self.fs.stat(path.absolute())?.kind() != EntryKind::Dir {
            return Err(FsError::NotADirectory {
                path: path.absolute().to_path_buf(),
            }
            .into());
        }
        if self.roots.lock().contains_key(path) {
            crate::debug_event!("watcher", "already watching", "{path}");
            return Ok(());
        }

        let snapshot = Snapshot::capture(self.fs.as_ref(), path.absolute())?;
        let entries = snapshot.len();
        let initial = match self.initial_events {
            InitialEvents::Baseline => Vec::new(),
            InitialEvents::Synthesize => snapshot.creations(path),
        };

        let root = Arc::new(WatchedRoot {
            path: path.clone(),
            snapshot: Mutex::new(snapshot),
            gate: Arc::new(DeliveryGate::new()),
        });

        // Holding the snapshot keeps a concurrent poll from overtaking the
        // initial events.
        let _polling = root.snapshot.lock();
        {
            let mut roots = self.roots.lock();
            if roots.contains_key(path) {
                return Ok(());
            }
            roots.insert(path.clone(), Arc::clone(&root));
        }
        self.dispatcher.dispatch(initial, &root.gate);

        crate::log_event!("watcher", "watching", "{path} ({entries} entries)");
        Ok(())
    }

    fn unwatch(&self, path: &FsPath) -> bool {
        let removed = self.roots.lock().shift_remove(path);
        match removed {
            Some(root) => {
                root.gate.close();
                crate::log_event!("watcher", "unwatched", "{path}");
                true
            }
            None => false,
        }
    }

    fn roots(&self) -> Vec<FsPath> {
        self.roots.lock().keys().cloned().collect()
    }

    /// Poll every root once. Returns the number of events queued.
    fn poll_all(&self) -> usize {
        let roots: Vec<Arc<WatchedRoot>> = self.roots.lock().values().cloned().collect();

        let mut total = 0;
        for root in &roots {
            match panic::catch_unwind(AssertUnwindSafe(|| self.poll_root(root))) {
                Ok(count) => total += count,
                Err(panic) => tracing::error!(
                    "[watcher] poll of {} panicked: {}",
                    root.path,
                    panic_message(panic.as_ref())
                ),
            }
        }

        if total > 0 {
            crate::debug_event!(
                "watcher",
                "poll cycle",
                "{total} events from {} roots",
                roots.len()
            );
        }
        total
    }

    fn poll_root(&self, root: &Arc<WatchedRoot>) -> usize {
        let mut snapshot = root.snapshot.lock();
        if !root.gate.is_open() {
            return 0;
        }

        let events = match Snapshot::capture(self.fs.as_ref(), root.path.absolute()) {
            Ok(mut current) => {
                current.carry_over(&snapshot);
                let events = snapshot.diff(&current, &root.path);
                *snapshot = current;
                events
            }
            Err(FsError::NotFound { .. } | FsError::NotADirectory { .. }) => {
                let mut events = snapshot.deletions(&root.path);
                events.push(FileSystemEvent::DirDeleted(Dir::new(root.path.clone())));
                *snapshot = Snapshot::default();
                self.forget(root);
                crate::log_event!("watcher", "root vanished", "{}", root.path);
                events
            }
            Err(e) => {
                tracing::warn!("[watcher] failed to poll {}: {e}", root.path);
                return 0;
            }
        };

        let count = events.len();
        self.dispatcher.dispatch(events, &root.gate);
        count
    }

    /// Drop `root` from the registry unless it was already replaced.
    fn forget(&self, root: &Arc<WatchedRoot>) {
        let mut roots = self.roots.lock();
        if roots
            .get(&root.path)
            .is_some_and(|current| Arc::ptr_eq(current, root))
        {
            roots.shift_remove(&root.path);
        }
    }
}

/// Watcher that detects changes by periodically re-walking its roots.
///
/// ```no_run
/// use std::sync::Arc;
/// use treewatch::fs::FsPath;
/// use treewatch::watcher::{FileSystemEvent, PollingWatcher, Service, Subscribable, Watchable};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let watcher = PollingWatcher::builder().build()?;
/// watcher.subscribe(Arc::new(|event: &FileSystemEvent| println!("{event}")));
/// watcher.watch(&FsPath::of("/tmp/inbox")?)?;
/// watcher.start()?;
/// # Ok(())
/// # }
/// ```
pub struct PollingWatcher {
    core: Arc<WatcherCore>,
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    task: Mutex<Option<Box<dyn ScheduledTask>>>,
}

impl PollingWatcher {
    /// Create a builder for configuring the watcher.
    pub fn builder() -> PollingWatcherBuilder {
        PollingWatcherBuilder::new()
    }

    /// Run one poll cycle on the calling thread.
    ///
    /// Returns the number of events queued for delivery.
    pub fn poll_now(&self) -> usize {
        self.core.poll_all()
    }

    /// Currently watched roots, in registration order.
    pub fn watched_roots(&self) -> Vec<FsPath> {
        self.core.roots()
    }

    pub fn is_watching(&self, path: &FsPath) -> bool {
        self.core.roots.lock().contains_key(path)
    }

    pub fn poll_interval(&self) -> Duration {
        self.interval
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.core.dispatcher
    }
}

impl Watchable for PollingWatcher {
    fn watch(&self, path: &FsPath) -> Result<(), WatchError> {
        self.core.watch(path)
    }

    fn unwatch(&self, path: &FsPath) -> bool {
        self.core.unwatch(path)
    }
}

impl Subscribable for PollingWatcher {
    fn subscribe(&self, listener: Arc<dyn EventListener>) -> bool {
        self.core.dispatcher.subscribe(listener)
    }

    fn unsubscribe(&self, listener: &Arc<dyn EventListener>) -> bool {
        self.core.dispatcher.unsubscribe(listener)
    }
}

impl Service for PollingWatcher {
    fn start(&self) -> Result<(), WatchError> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(WatchError::AlreadyRunning);
        }

        let core: Weak<WatcherCore> = Arc::downgrade(&self.core);
        let tick: Task = Arc::new(move || {
            if let Some(core) = core.upgrade() {
                core.poll_all();
            }
        });
        *task = Some(self.scheduler.schedule_repeating(self.interval, tick)?);

        crate::log_event!("watcher", "started", "polling every {:?}", self.interval);
        Ok(())
    }

    fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.cancel();
            crate::log_event!("watcher", "stopped");
        }
    }

    fn status(&self) -> ServiceStatus {
        if self.task.lock().is_some() {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        }
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for [`PollingWatcher`].
pub struct PollingWatcherBuilder {
    config: WatcherConfig,
    scheduler: Option<Arc<dyn Scheduler>>,
    dispatcher: Option<Arc<EventDispatcher>>,
    fs: Option<Arc<dyn FileSystem>>,
}

impl PollingWatcherBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: WatcherConfig::default(),
            scheduler: None,
            dispatcher: None,
            fs: None,
        }
    }

    /// Take interval, initial events and worker count from `config`.
    pub fn config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn initial_events(mut self, initial_events: InitialEvents) -> Self {
        self.config.initial_events = initial_events;
        self
    }

    /// Set the scheduler driving poll cycles. Defaults to [`ThreadScheduler`].
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Share an existing dispatcher instead of creating one from the config.
    pub fn dispatcher(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Set the metadata provider. Defaults to [`LocalFs`].
    pub fn file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Some(Arc::new(fs));
        self
    }

    /// Build the PollingWatcher. It starts stopped.
    pub fn build(self) -> Result<PollingWatcher, WatchError> {
        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Arc::new(EventDispatcher::new(self.config.workers())?),
        };
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(ThreadScheduler::new()));
        let fs = self.fs.unwrap_or_else(|| Arc::new(LocalFs::new()));

        Ok(PollingWatcher {
            core: Arc::new(WatcherCore {
                roots: Mutex::new(IndexMap::new()),
                dispatcher,
                fs,
                initial_events: self.config.initial_events,
            }),
            scheduler,
            interval: self.config.poll_interval(),
            task: Mutex::new(None),
        })
    }
}

impl Default for PollingWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
