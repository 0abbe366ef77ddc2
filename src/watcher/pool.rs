//! Fixed pool of named worker threads.
//!
//! Each worker drains its own channel, so jobs submitted with the same key
//! run one after another in submission order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};

use super::error::WatchError;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    name: String,
    senders: Vec<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) named `{name}-{index}`.
    pub fn new(name: &str, size: usize) -> Result<Self, WatchError> {
        let size = size.max(1);
        let mut senders = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);

        for index in 0..size {
            let (sender, receiver) = unbounded::<Job>();
            let worker_name = format!("{name}-{index}");
            let thread_name = worker_name.clone();
            let handle = thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    for job in receiver.iter() {
                        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
                            tracing::error!(
                                "[{worker_name}] job panicked: {}",
                                panic_message(panic.as_ref())
                            );
                        }
                    }
                })
                .map_err(|e| WatchError::InitFailed {
                    reason: format!("cannot spawn worker {name}-{index}: {e}"),
                })?;
            senders.push(sender);
            handles.push(handle);
        }

        crate::debug_event!("pool", "started", "{name} with {size} workers");
        Ok(Self {
            name: name.to_string(),
            senders,
            handles,
        })
    }

    pub fn size(&self) -> usize {
        self.senders.len()
    }

    /// Queue `job` on the worker selected by `key`.
    pub(crate) fn execute(&self, key: usize, job: Job) -> Result<(), WatchError> {
        let sender = &self.senders[key % self.senders.len()];
        sender.send(job).map_err(|_| WatchError::ChannelClosed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channels ends each worker loop once its queue drains.
        self.senders.clear();
        let current = thread::current().id();
        for handle in self.handles.drain(..) {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        crate::debug_event!("pool", "stopped", "{}", self.name);
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
