//! The responder side of the long-poll contract.
//!
//! A [`CursorStore`] holds exactly one current value and the cursor it was
//! written at. [`CursorStore::read`] answers "give me the first value after
//! cursor C": immediately if the current cursor is already greater than C,
//! otherwise by registering a waiter and suspending until a write settles it.
//!
//! The already-satisfied check and waiter registration happen in the same
//! critical section as writes, so a write racing a read is never missed.
//! Each waiter owns a single-resolution channel and is removed from the
//! waiter map the moment it settles; dropping a pending read removes its
//! waiter as well.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use kachaka_types::{Cursor, Versioned};
use tokio::sync::oneshot;

use crate::clock::CursorClock;

/// A single value with change notification for long-poll readers.
#[derive(Debug)]
pub struct CursorStore<T> {
    inner: Mutex<StoreInner<T>>,
}

#[derive(Debug)]
struct StoreInner<T> {
    current: Versioned<T>,
    clock: CursorClock,
    waiters: HashMap<u64, Waiter<T>>,
    next_waiter: u64,
}

#[derive(Debug)]
struct Waiter<T> {
    threshold: Cursor,
    settle: oneshot::Sender<Versioned<T>>,
}

enum Registration<T> {
    Ready(Versioned<T>),
    Waiting(u64, oneshot::Receiver<Versioned<T>>),
}

impl<T> CursorStore<T> {
    fn lock(&self) -> MutexGuard<'_, StoreInner<T>> {
        // A panic while holding the lock cannot leave the value half-written:
        // every mutation replaces it wholesale.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current cursor.
    pub fn cursor(&self) -> Cursor {
        self.lock().current.cursor
    }

    /// Number of readers currently suspended on this store.
    pub fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }
}

impl<T: Clone> CursorStore<T> {
    /// Create a store holding `initial`, with wall-clock cursors.
    pub fn new(initial: T) -> Self {
        Self::with_clock(initial, CursorClock::default())
    }

    /// Create a store holding `initial`, stamping cursors from `clock`.
    ///
    /// The initial value gets the clock's first tick, which is always
    /// greater than the sentinel.
    pub fn with_clock(initial: T, mut clock: CursorClock) -> Self {
        let cursor = clock.tick();
        Self {
            inner: Mutex::new(StoreInner {
                current: Versioned::new(initial, cursor),
                clock,
                waiters: HashMap::new(),
                next_waiter: 0,
            }),
        }
    }

    /// Snapshot of the current value, without suspending.
    pub fn current(&self) -> Versioned<T> {
        self.lock().current.clone()
    }

    /// Replace the value and wake every reader whose threshold it exceeds.
    ///
    /// Returns the cursor assigned to the new value.
    pub fn write(&self, value: T) -> Cursor {
        self.lock().replace(value)
    }

    /// Modify the value in place, then notify as [`CursorStore::write`] does.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Cursor {
        let mut inner = self.lock();
        let mut value = inner.current.value.clone();
        f(&mut value);
        inner.replace(value)
    }

    /// Replace the value with `f(current)` when `f` returns `Some`.
    ///
    /// The check and the write happen in one critical section, so no other
    /// write can land between them. `f` runs under this store's lock: it may
    /// write other stores but must not touch this one. Returns the new
    /// cursor, or `None` if `f` declined and nothing changed.
    pub fn update_if(&self, f: impl FnOnce(&T) -> Option<T>) -> Option<Cursor> {
        let mut inner = self.lock();
        let value = f(&inner.current.value)?;
        Some(inner.replace(value))
    }

    /// Wait for the first value whose cursor is greater than `threshold`.
    ///
    /// Returns immediately when the current value already qualifies, which is
    /// always the case for the sentinel cursor. Otherwise suspends until a
    /// write produces a qualifying cursor. Intermediate writes are coalesced:
    /// the reader sees the value current at the moment it is settled.
    pub async fn read(&self, threshold: Cursor) -> Versioned<T> {
        loop {
            let (id, receiver) = match self.register(threshold) {
                Registration::Ready(value) => return value,
                Registration::Waiting(id, receiver) => (id, receiver),
            };

            let guard = WaiterGuard { store: self, id };
            let settled = receiver.await;
            drop(guard);

            // The sender lives in the waiter map, which only a write drains,
            // so a closed channel means the waiter was discarded without
            // settling. Register again rather than report a failure.
            if let Ok(value) = settled {
                return value;
            }
        }
    }

    fn register(&self, threshold: Cursor) -> Registration<T> {
        let mut inner = self.lock();
        if inner.current.is_newer_than(threshold) {
            return Registration::Ready(inner.current.clone());
        }

        let (settle, receiver) = oneshot::channel();
        let id = inner.next_waiter;
        inner.next_waiter = inner.next_waiter.wrapping_add(1);
        inner.waiters.insert(id, Waiter { threshold, settle });
        tracing::trace!(
            waiter = id,
            threshold = %threshold,
            current = %inner.current.cursor,
            "registered waiter"
        );
        Registration::Waiting(id, receiver)
    }
}

impl<T: Clone> StoreInner<T> {
    fn replace(&mut self, value: T) -> Cursor {
        let cursor = self.clock.tick();
        self.current = Versioned::new(value, cursor);

        let (ready, waiting): (HashMap<_, _>, HashMap<_, _>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|(_, waiter)| waiter.threshold < cursor);
        self.waiters = waiting;

        let settled = ready.len();
        for (_, waiter) in ready {
            // The reader may have been dropped between settlement and removal
            let _ = waiter.settle.send(self.current.clone());
        }

        tracing::trace!(
            cursor = %cursor,
            settled,
            still_waiting = self.waiters.len(),
            "store written"
        );
        cursor
    }
}

/// Unregisters a waiter when its read is abandoned.
struct WaiterGuard<'a, T> {
    store: &'a CursorStore<T>,
    id: u64,
}

impl<T> Drop for WaiterGuard<'_, T> {
    fn drop(&mut self) {
        if self.store.lock().waiters.remove(&self.id).is_some() {
            tracing::trace!(waiter = self.id, "abandoned waiter removed");
        }
    }
}
