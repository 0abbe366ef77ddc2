//! Recurring task execution for the poll driver.
//!
//! Two implementations:
//! - [`ThreadScheduler`] runs the task on a dedicated named thread.
//! - [`TokioScheduler`] runs it from a tokio runtime, moving each tick onto
//!   the blocking pool since a poll cycle does synchronous filesystem I/O.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::error::WatchError;
use super::pool::panic_message;

/// Body of a recurring task.
pub type Task = Arc<dyn Fn() + Send + Sync>;

/// Handle to a scheduled recurring task. Dropping it cancels the task.
pub trait ScheduledTask: Send + Sync {
    /// Stop future runs. A run already in progress is not interrupted.
    fn cancel(&self);
    fn is_cancelled(&self) -> bool;
}

/// Runs a callable every `interval` until cancelled.
pub trait Scheduler: Send + Sync {
    /// Schedule `task`; the first run happens one `interval` from now.
    fn schedule_repeating(
        &self,
        interval: Duration,
        task: Task,
    ) -> Result<Box<dyn ScheduledTask>, WatchError>;
}

fn check_interval(interval: Duration) -> Result<(), WatchError> {
    if interval.is_zero() {
        return Err(WatchError::SchedulerFailed {
            reason: "interval must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn run_guarded(task: &Task) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| task())) {
        tracing::error!(
            "[scheduler] task panicked: {}",
            panic_message(panic.as_ref())
        );
    }
}

/// Scheduler backed by one OS thread per task.
#[derive(Debug, Clone)]
pub struct ThreadScheduler {
    thread_name: String,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::named("treewatch-poll")
    }

    pub fn named(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_repeating(
        &self,
        interval: Duration,
        task: Task,
    ) -> Result<Box<dyn ScheduledTask>, WatchError> {
        check_interval(interval)?;

        // Dropping the sender disconnects the channel and ends the loop.
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let ticker = tick(interval);

        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                loop {
                    let stop = select! {
                        recv(cancel_rx) -> _ => true,
                        recv(ticker) -> _ => {
                            run_guarded(&task);
                            false
                        }
                    };
                    if stop {
                        break;
                    }
                }
            })
            .map_err(|e| WatchError::SchedulerFailed {
                reason: format!("cannot spawn {}: {e}", self.thread_name),
            })?;

        crate::debug_event!(
            "scheduler",
            "thread started",
            "{} every {interval:?}",
            self.thread_name
        );
        Ok(Box::new(ThreadTask {
            cancel: Mutex::new(Some(cancel_tx)),
            handle: Mutex::new(Some(handle)),
            cancelled: AtomicBool::new(false),
        }))
    }
}

struct ThreadTask {
    cancel: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    cancelled: AtomicBool,
}

impl ScheduledTask for ThreadTask {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        drop(self.cancel.lock().take());

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        // Waits for a tick in progress; skipped when cancelled from the tick itself.
        if handle.thread().id() != thread::current().id() {
            let _ = handle.join();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for ThreadTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Scheduler backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> Result<Self, WatchError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| WatchError::SchedulerFailed {
                reason: e.to_string(),
            })
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(
        &self,
        interval: Duration,
        task: Task,
    ) -> Result<Box<dyn ScheduledTask>, WatchError> {
        check_interval(interval)?;

        let token = CancellationToken::new();
        let cancelled = token.clone();

        self.handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let task = Arc::clone(&task);
                        if let Err(e) = tokio::task::spawn_blocking(move || task()).await {
                            tracing::error!("[scheduler] task failed: {e}");
                        }
                    }
                }
            }
            crate::debug_event!("scheduler", "tokio task stopped");
        });

        crate::debug_event!("scheduler", "tokio task started", "every {interval:?}");
        Ok(Box::new(TokioTask { token }))
    }
}

struct TokioTask {
    token: CancellationToken,
}

impl ScheduledTask for TokioTask {
    fn cancel(&self) {
        self.token.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TokioTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
