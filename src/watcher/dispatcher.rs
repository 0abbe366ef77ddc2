//! Asynchronous delivery of events to subscribed listeners.
//!
//! Delivery runs on a [`WorkerPool`], never on the poll driver. Each
//! listener is pinned to one worker so it sees events in submission order;
//! there is no ordering between different listeners.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::error::WatchError;
use super::event::FileSystemEvent;
use super::pool::{WorkerPool, panic_message};

/// Receiver of change events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &FileSystemEvent);
}

impl<F> EventListener for F
where
    F: Fn(&FileSystemEvent) + Send + Sync,
{
    fn on_event(&self, event: &FileSystemEvent) {
        self(event)
    }
}

thread_local! {
    /// Set while this thread is inside a listener call.
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

/// Liveness switch for one event source (a watched root).
///
/// Once [`close`](DeliveryGate::close) returns, no further event submitted
/// through this gate reaches a listener.
#[derive(Debug)]
pub struct DeliveryGate {
    open: AtomicBool,
    in_flight: RwLock<()>,
}

impl DeliveryGate {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            in_flight: RwLock::new(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the gate and wait for deliveries running on other threads.
    ///
    /// Called from inside any delivery, it only closes. A listener call that
    /// is already running may finish, but nothing later passes the gate.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        if !DELIVERING.with(Cell::get) {
            drop(self.in_flight.write());
        }
    }

    /// Run `deliver` while the gate is open. Returns `false` once closed.
    fn deliver(&self, deliver: impl FnOnce()) -> bool {
        let _in_flight = self.in_flight.read();
        if !self.is_open() {
            return false;
        }

        let previous = DELIVERING.with(|d| d.replace(true));
        let outcome = panic::catch_unwind(AssertUnwindSafe(deliver));
        DELIVERING.with(|d| d.set(previous));

        if let Err(panic) = outcome {
            tracing::error!(
                "[dispatcher] listener panicked: {}",
                panic_message(panic.as_ref())
            );
        }
        true
    }
}

impl Default for DeliveryGate {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    key: usize,
    listener: Arc<dyn EventListener>,
    active: Arc<AtomicBool>,
}

/// Fans events out to listeners on a worker pool.
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Subscriber>>,
    next_key: AtomicUsize,
    pool: WorkerPool,
}

impl EventDispatcher {
    /// Create a dispatcher backed by `workers` delivery threads.
    pub fn new(workers: usize) -> Result<Self, WatchError> {
        Ok(Self {
            subscribers: RwLock::new(Vec::new()),
            next_key: AtomicUsize::new(0),
            pool: WorkerPool::new("dispatch", workers)?,
        })
    }

    /// Add a listener. Returns `false` if this listener is already subscribed.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> bool {
        let mut subscribers = self.subscribers.write();
        if subscribers.iter().any(|s| same_listener(&s.listener, &listener)) {
            return false;
        }
        subscribers.push(Subscriber {
            key: self.next_key.fetch_add(1, Ordering::Relaxed),
            listener,
            active: Arc::new(AtomicBool::new(true)),
        });
        true
    }

    /// Remove a listener. Events already queued for it are dropped.
    pub fn unsubscribe(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut subscribers = self.subscribers.write();
        match subscribers
            .iter()
            .position(|s| same_listener(&s.listener, listener))
        {
            Some(index) => {
                let removed = subscribers.remove(index);
                removed.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Queue `events` for every current listener, in order.
    ///
    /// Returns immediately; delivery happens on the worker pool and stops
    /// as soon as `gate` closes.
    pub fn dispatch(&self, events: Vec<FileSystemEvent>, gate: &Arc<DeliveryGate>) {
        if events.is_empty() {
            return;
        }

        let events = Arc::new(events);
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            let events = Arc::clone(&events);
            let gate = Arc::clone(gate);
            let listener = Arc::clone(&subscriber.listener);
            let active = Arc::clone(&subscriber.active);

            let job = Box::new(move || {
                for event in events.iter() {
                    if !active.load(Ordering::Acquire) {
                        break;
                    }
                    if !gate.deliver(|| listener.on_event(event)) {
                        break;
                    }
                }
            });

            if let Err(e) = self.pool.execute(subscriber.key, job) {
                tracing::warn!("[dispatcher] failed to queue events: {e}");
            }
        }

        crate::debug_event!(
            "dispatcher",
            "queued",
            "{} events for {} listeners",
            events.len(),
            subscribers.len()
        );
    }
}

fn same_listener(a: &Arc<dyn EventListener>, b: &Arc<dyn EventListener>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
