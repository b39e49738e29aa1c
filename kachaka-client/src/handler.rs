//! Subscribers: one remote value, read on demand or followed by listeners.
//!
//! A [`ValueHandler`] wraps a [`Getter`] that honours the get-with-cursor
//! contract and offers three ways to consume it:
//!
//! - one-shot reads with [`ValueHandler::fetch_latest`] and
//!   [`ValueHandler::fetch_at`]
//! - callbacks registered with [`ValueHandler::add_listener`], all fed by a
//!   single background polling loop
//! - pull-based iteration with [`ValueHandler::iterate`]
//!
//! The polling loop runs only while at least one listener is registered.
//! Removing the last listener abandons the in-flight fetch; no further
//! remote calls are made until a listener is added again, at which point the
//! loop restarts from the sentinel cursor and delivers the current value
//! first.
//!
//! # Example
//!
//! ```ignore
//! let id = client.robot_pose().add_listener(
//!     |pose| println!("moved to ({}, {})", pose.x, pose.y),
//!     ListenOptions::default(),
//! );
//! // ...
//! client.robot_pose().remove_listener(id);
//! ```

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kachaka_core::{
    Bookmark, CursorStore, ListenerId, ListenerKind, ListenerSet, LoopControl, LoopState,
    Transition,
};
use kachaka_types::{Cursor, GetRequest, Versioned};
use tokio::sync::Notify;
use tracing::Instrument;

use crate::error::ClientError;
use crate::stream::ValueStream;

/// The read half of a remote value.
///
/// `get` must answer with the first value whose cursor is greater than
/// `request.cursor`, suspending until one exists.
#[async_trait]
pub trait Getter<T>: Send + Sync {
    /// Fetch the first value newer than `request.cursor`.
    async fn get(&self, request: GetRequest) -> Result<Versioned<T>, ClientError>;
}

/// The write half of a settable remote value.
#[async_trait]
pub trait Setter<V, W>: Send + Sync {
    /// Apply `request` and return the server's acknowledgement.
    async fn set(&self, request: V) -> Result<W, ClientError>;
}

/// An in-process store is itself a getter.
#[async_trait]
impl<T> Getter<T> for CursorStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, request: GetRequest) -> Result<Versioned<T>, ClientError> {
        Ok(self.read(request.cursor).await)
    }
}

/// Options for [`ValueHandler::add_listener`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenOptions {
    /// Remove the listener after its first invocation.
    pub once: bool,
}

impl ListenOptions {
    /// A listener that fires exactly once.
    pub fn once() -> Self {
        Self { once: true }
    }
}

type Pick<T, U> = dyn Fn(T) -> U + Send + Sync;
type Callback<U> = Arc<dyn Fn(U) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// A subscriber to one remote value.
///
/// `T` is the raw payload, `U` its projection handed to consumers, `V` and
/// `W` the request and acknowledgement types of the optional setter.
/// Cloning is cheap and clones share listeners and the polling loop.
pub struct ValueHandler<T, U, V = (), W = ()> {
    inner: Arc<HandlerInner<T, U, V, W>>,
}

impl<T, U, V, W> Clone for ValueHandler<T, U, V, W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, U, V, W> std::fmt::Debug for ValueHandler<T, U, V, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dispatch = self.inner.dispatch();
        f.debug_struct("ValueHandler")
            .field("label", &self.inner.label)
            .field("writable", &self.inner.setter.is_some())
            .field("state", &dispatch.listeners.state())
            .field("listeners", &dispatch.listeners.len())
            .finish()
    }
}

struct HandlerInner<T, U, V, W> {
    label: &'static str,
    getter: Arc<dyn Getter<T>>,
    pick: Arc<Pick<T, U>>,
    setter: Option<Arc<dyn Setter<V, W>>>,
    dispatch: Mutex<Dispatch<U>>,
    /// Wakes the loop when the set empties or is refilled from empty.
    changed: Notify,
}

struct Dispatch<U> {
    listeners: ListenerSet<Callback<U>>,
    errors: Vec<(ListenerId, ErrorCallback)>,
}

impl<T, U, V, W> HandlerInner<T, U, V, W> {
    fn dispatch(&self) -> MutexGuard<'_, Dispatch<U>> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn aborted(&self, reason: String) -> ClientError {
        ClientError::LoopAborted {
            resource: self.label,
            reason,
        }
    }

    /// Terminate the loop: drop every listener, then tell the error
    /// listeners why.
    fn fail(&self, error: ClientError) {
        let (dropped, error_listeners) = {
            let mut dispatch = self.dispatch();
            let dropped = dispatch.listeners.fail();
            let error_listeners: Vec<ErrorCallback> = dispatch
                .errors
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect();
            (dropped, error_listeners)
        };

        tracing::warn!(
            error = %error,
            dropped_listeners = dropped,
            "listener loop terminated"
        );
        for callback in error_listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(&error))) {
                tracing::warn!(
                    resource = self.label,
                    panic = %panic_message(&*panic),
                    "error listener panicked"
                );
            }
        }
    }
}

impl<T, U, V, W> HandlerInner<T, U, V, W>
where
    T: Send + 'static,
    U: Clone + Send + 'static,
    V: Send + 'static,
    W: Send + 'static,
{
    async fn fetch_at(&self, cursor: Cursor) -> Result<Versioned<T>, ClientError> {
        let versioned = self.getter.get(GetRequest::after(cursor)).await?;
        if !versioned.is_newer_than(cursor) {
            tracing::error!(
                resource = self.label,
                requested = %cursor,
                returned = %versioned.cursor,
                "responder returned a cursor that did not advance"
            );
            return Err(ClientError::ProtocolViolation(format!(
                "asked for {} after {}, got cursor {}",
                self.label, cursor, versioned.cursor
            )));
        }
        Ok(versioned)
    }

    /// The polling loop. Exactly one runs while the state is `Polling`.
    async fn run_listener_loop(self: Arc<Self>) {
        let mut guard = LoopGuard {
            inner: &*self,
            finished: false,
        };
        self.listen().await;
        guard.finished = true;
    }

    async fn listen(&self) {
        let mut bookmark = Bookmark::new();
        let mut generation = self.dispatch().listeners.generation();
        tracing::debug!("listener loop started");

        loop {
            // Armed before the re-check so a change made after it still
            // interrupts the fetch below.
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let control = self.dispatch().listeners.recheck(generation);
            match control {
                LoopControl::Stop => {
                    tracing::debug!("listener loop stopped: no listeners");
                    return;
                }
                LoopControl::Restart { generation: next } => {
                    tracing::debug!("listener set refilled, restarting from the sentinel");
                    generation = next;
                    bookmark.reset();
                }
                LoopControl::Continue => {}
            }

            let fetched = tokio::select! {
                result = self.fetch_at(bookmark.cursor()) => Some(result),
                _ = changed.as_mut() => None,
            };

            let versioned = match fetched {
                Some(Ok(versioned)) => versioned,
                Some(Err(e)) => return self.fail(e),
                // In-flight fetch abandoned; the re-check decides what next
                None => continue,
            };

            if let Err(e) = bookmark.advance(versioned.cursor) {
                return self.fail(e.into());
            }

            let snapshot = {
                let dispatch = self.dispatch();
                if dispatch.listeners.generation() != generation {
                    // Fetched for listeners that are gone
                    continue;
                }
                dispatch.listeners.snapshot()
            };

            let pick = &self.pick;
            let value = match catch_unwind(AssertUnwindSafe(|| pick(versioned.value))) {
                Ok(value) => value,
                Err(panic) => return self.fail(self.aborted(panic_message(&*panic))),
            };

            let mut delivered = Vec::with_capacity(snapshot.len());
            for (id, callback) in snapshot {
                let value = value.clone();
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(value))) {
                    return self.fail(self.aborted(panic_message(&*panic)));
                }
                delivered.push(id);
            }
            tracing::trace!(
                cursor = %bookmark.cursor(),
                listeners = delivered.len(),
                "value dispatched"
            );

            self.dispatch().listeners.finish_dispatch(&delivered);
        }
    }
}

/// Fails the loop if its task ends without returning: the future was
/// dropped mid-poll, either after a panic or by a shutting-down runtime.
struct LoopGuard<'a, T, U, V, W> {
    inner: &'a HandlerInner<T, U, V, W>,
    finished: bool,
}

impl<T, U, V, W> Drop for LoopGuard<'_, T, U, V, W> {
    fn drop(&mut self) {
        if !self.finished {
            let error = self.inner.aborted("listener loop task ended early".into());
            self.inner.fail(error);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<T, U, V, W> ValueHandler<T, U, V, W>
where
    T: Send + 'static,
    U: Clone + Send + 'static,
    V: Send + 'static,
    W: Send + 'static,
{
    /// A read-only subscriber.
    ///
    /// `label` names the value in logs.
    pub fn new<G, F>(label: &'static str, getter: Arc<G>, pick: F) -> Self
    where
        G: Getter<T> + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Self::build(label, getter, Arc::new(pick), None)
    }

    /// A subscriber whose value can also be written.
    pub fn writable<G, F, S>(label: &'static str, getter: Arc<G>, pick: F, setter: Arc<S>) -> Self
    where
        G: Getter<T> + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
        S: Setter<V, W> + 'static,
    {
        let setter: Arc<dyn Setter<V, W>> = setter;
        Self::build(label, getter, Arc::new(pick), Some(setter))
    }

    fn build(
        label: &'static str,
        getter: Arc<dyn Getter<T>>,
        pick: Arc<Pick<T, U>>,
        setter: Option<Arc<dyn Setter<V, W>>>,
    ) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                label,
                getter,
                pick,
                setter,
                dispatch: Mutex::new(Dispatch {
                    listeners: ListenerSet::new(),
                    errors: Vec::new(),
                }),
                changed: Notify::new(),
            }),
        }
    }

    /// The name used in logs.
    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    /// Whether [`ValueHandler::write`] is available.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Fetch the current value.
    ///
    /// Asks with the sentinel cursor, so the responder answers without
    /// waiting for a change.
    pub async fn fetch_latest(&self) -> Result<U, ClientError> {
        let versioned = self.inner.fetch_at(Cursor::zero()).await?;
        Ok(self.project(versioned.value))
    }

    /// Fetch the first raw value newer than `cursor`.
    ///
    /// Suspends until the remote value changes past `cursor`. Continue
    /// polling with the returned cursor. A response whose cursor does not
    /// exceed `cursor` is a [`ClientError::ProtocolViolation`].
    pub async fn fetch_at(&self, cursor: Cursor) -> Result<Versioned<T>, ClientError> {
        self.inner.fetch_at(cursor).await
    }

    /// Write the value through the setter.
    pub async fn write(&self, request: V) -> Result<W, ClientError> {
        let setter = self.inner.setter.as_ref().ok_or(ClientError::NotWritable)?;
        setter.set(request).await
    }

    /// Register a callback for every new value.
    ///
    /// The first listener on an idle subscriber starts the polling loop,
    /// which first delivers the current value. Must be called from within a
    /// Tokio runtime.
    pub fn add_listener<F>(&self, callback: F, options: ListenOptions) -> ListenerId
    where
        F: Fn(U) + Send + Sync + 'static,
    {
        let kind = if options.once {
            ListenerKind::Once
        } else {
            ListenerKind::Persistent
        };
        let callback: Callback<U> = Arc::new(callback);
        let (id, transition) = self.inner.dispatch().listeners.insert(callback, kind);

        match transition {
            Transition::StartPolling => {
                let span = tracing::debug_span!("listener_loop", resource = self.inner.label);
                tokio::spawn(Arc::clone(&self.inner).run_listener_loop().instrument(span));
            }
            Transition::Restart => self.inner.changed.notify_waiters(),
            Transition::AlreadyPolling => {}
        }
        id
    }

    /// Unregister a listener. Returns whether it was registered.
    ///
    /// Removing the last listener stops the polling loop.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut dispatch = self.inner.dispatch();
        let removed = dispatch.listeners.remove(id);
        if removed && dispatch.listeners.is_empty() {
            self.inner.changed.notify_waiters();
        }
        removed
    }

    /// Register a callback for a fatal polling-loop error.
    ///
    /// When the loop fails, every value listener is dropped and the loop goes
    /// idle before error listeners run. Error listeners stay registered.
    pub fn on_error<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        let mut dispatch = self.inner.dispatch();
        let id = dispatch.listeners.allocate_id();
        dispatch.errors.push((id, Arc::new(callback)));
        id
    }

    /// Unregister an error listener. Returns whether it was registered.
    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        let mut dispatch = self.inner.dispatch();
        let before = dispatch.errors.len();
        dispatch.errors.retain(|(existing, _)| *existing != id);
        dispatch.errors.len() != before
    }

    /// Whether the polling loop is running.
    pub fn is_polling(&self) -> bool {
        self.inner.dispatch().listeners.state() == LoopState::Polling
    }

    /// Number of registered value listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.dispatch().listeners.len()
    }

    /// A fresh pull-based sequence starting from the current value.
    ///
    /// Each call gets its own bookmark; sequences never affect each other or
    /// the listener loop.
    pub fn iterate(&self) -> ValueStream<T, U, V, W> {
        ValueStream::new(self.clone())
    }

    pub(crate) fn project(&self, value: T) -> U {
        (self.inner.pick)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use kachaka_core::CursorClock;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    // ===========================================
    // Test getters and setters
    // ===========================================

    struct CountingGetter {
        store: Arc<CursorStore<u32>>,
        calls: AtomicUsize,
    }

    impl CountingGetter {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Getter<u32> for CountingGetter {
        async fn get(&self, request: GetRequest) -> Result<Versioned<u32>, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.store.get(request).await
        }
    }

    struct BrokenGetter;

    #[async_trait]
    impl Getter<u32> for BrokenGetter {
        async fn get(&self, _request: GetRequest) -> Result<Versioned<u32>, ClientError> {
            Err(TransportError::ConnectionClosed.into())
        }
    }

    /// Always answers with the same cursor, whatever was asked.
    struct StuckGetter;

    #[async_trait]
    impl Getter<u32> for StuckGetter {
        async fn get(&self, _request: GetRequest) -> Result<Versioned<u32>, ClientError> {
            Ok(Versioned::new(7, Cursor::new(5)))
        }
    }

    struct PanickingGetter;

    #[async_trait]
    impl Getter<u32> for PanickingGetter {
        async fn get(&self, _request: GetRequest) -> Result<Versioned<u32>, ClientError> {
            panic!("getter exploded")
        }
    }

    struct StoreSetter(Arc<CursorStore<u32>>);

    #[async_trait]
    impl Setter<u32, Cursor> for StoreSetter {
        async fn set(&self, request: u32) -> Result<Cursor, ClientError> {
            Ok(self.0.write(request))
        }
    }

    struct Fixture {
        store: Arc<CursorStore<u32>>,
        getter: Arc<CountingGetter>,
        handler: ValueHandler<u32, u32>,
    }

    fn fixture(initial: u32) -> Fixture {
        let store = Arc::new(CursorStore::with_clock(initial, CursorClock::sequence()));
        let getter = Arc::new(CountingGetter {
            store: Arc::clone(&store),
            calls: AtomicUsize::new(0),
        });
        let handler: ValueHandler<u32, u32> = ValueHandler::new("test", getter.clone(), |v| v);
        Fixture {
            store,
            getter,
            handler,
        }
    }

    async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("channel closed")
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn channel_listener(
        handler: &ValueHandler<u32, u32>,
        options: ListenOptions,
    ) -> (ListenerId, mpsc::UnboundedReceiver<u32>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = handler.add_listener(
            move |v| {
                let _ = tx.send(v);
            },
            options,
        );
        (id, rx)
    }

    // ===========================================
    // One-shot reads
    // ===========================================

    #[tokio::test]
    async fn fetch_latest_applies_projection() {
        let store = Arc::new(CursorStore::new(21u32));
        let handler: ValueHandler<u32, String> =
            ValueHandler::new("test", store, |v| format!("v={}", v * 2));

        assert_eq!(handler.fetch_latest().await.unwrap(), "v=42");
    }

    #[tokio::test]
    async fn fetch_at_suspends_until_the_next_write() {
        let f = fixture(1);
        let first = f.handler.fetch_at(Cursor::zero()).await.unwrap();
        assert_eq!(first.value, 1);
        let c0 = first.cursor;

        let pending = {
            let handler = f.handler.clone();
            tokio::spawn(async move { handler.fetch_at(c0).await })
        };
        wait_until(|| f.store.pending_waiters() == 1).await;
        assert!(!pending.is_finished());

        let c1 = f.store.write(2);
        let second = timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second, Versioned::new(2, c1));
        assert!(c1 > c0);

        // And the next one waits again
        let next = timeout(Duration::from_millis(20), f.handler.fetch_at(c1)).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn stale_cursor_is_a_protocol_violation() {
        let handler: ValueHandler<u32, u32> =
            ValueHandler::new("stuck", Arc::new(StuckGetter), |v| v);

        assert!(handler.fetch_at(Cursor::new(4)).await.is_ok());
        let err = handler.fetch_at(Cursor::new(5)).await.unwrap_err();
        assert!(matches!(err, ClientError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn transport_errors_reach_the_caller() {
        let handler: ValueHandler<u32, u32> =
            ValueHandler::new("broken", Arc::new(BrokenGetter), |v| v);
        let err = handler.fetch_latest().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::ConnectionClosed)
        ));
    }

    // ===========================================
    // Writes
    // ===========================================

    #[tokio::test]
    async fn write_without_setter_is_not_writable() {
        let f = fixture(1);
        assert!(!f.handler.is_writable());
        let err = f.handler.write(()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotWritable));
    }

    #[tokio::test]
    async fn write_goes_through_the_setter() {
        let store = Arc::new(CursorStore::with_clock(1u32, CursorClock::sequence()));
        let handler: ValueHandler<u32, u32, u32, Cursor> = ValueHandler::writable(
            "flag",
            store.clone(),
            |v| v,
            Arc::new(StoreSetter(store.clone())),
        );

        let cursor = handler.write(9).await.unwrap();
        assert_eq!(cursor, store.cursor());
        assert_eq!(handler.fetch_latest().await.unwrap(), 9);
    }

    // ===========================================
    // Listener loop
    // ===========================================

    #[tokio::test]
    async fn first_listener_receives_current_value() {
        let f = fixture(1);
        assert!(!f.handler.is_polling());

        let (_, mut rx) = channel_listener(&f.handler, ListenOptions::default());
        assert!(f.handler.is_polling());
        assert_eq!(recv(&mut rx).await, 1);

        f.store.write(2);
        assert_eq!(recv(&mut rx).await, 2);
    }

    #[tokio::test]
    async fn listeners_share_one_loop_and_run_in_order() {
        let f = fixture(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = Arc::clone(&order);
        f.handler
            .add_listener(move |v| first.lock().unwrap().push(("first", v)), ListenOptions::default());
        let second = Arc::clone(&order);
        f.handler.add_listener(
            move |v| {
                second.lock().unwrap().push(("second", v));
                let _ = tx.send(());
            },
            ListenOptions::default(),
        );

        recv(&mut rx).await;
        wait_until(|| f.store.pending_waiters() == 1).await;
        f.store.write(2);
        recv(&mut rx).await;

        assert_eq!(
            *order.lock().unwrap(),
            vec![("first", 1), ("second", 1), ("first", 2), ("second", 2)]
        );
        // One fetch per delivery plus the one now parked, not one per listener
        wait_until(|| f.store.pending_waiters() == 1).await;
        assert_eq!(f.getter.calls(), 3);
    }

    #[tokio::test]
    async fn once_listener_fires_exactly_once() {
        let f = fixture(1);
        let (_, mut persistent) = channel_listener(&f.handler, ListenOptions::default());
        let (_, mut once) = channel_listener(&f.handler, ListenOptions::once());

        assert_eq!(recv(&mut persistent).await, 1);
        assert_eq!(recv(&mut once).await, 1);

        for v in 2..=4 {
            wait_until(|| f.store.pending_waiters() == 1).await;
            f.store.write(v);
            assert_eq!(recv(&mut persistent).await, v);
        }

        assert!(once.try_recv().is_err());
        assert_eq!(f.handler.listener_count(), 1);
    }

    #[tokio::test]
    async fn removing_last_listener_stops_remote_calls() {
        let f = fixture(1);
        let (id, mut rx) = channel_listener(&f.handler, ListenOptions::default());
        assert_eq!(recv(&mut rx).await, 1);
        wait_until(|| f.store.pending_waiters() == 1).await;

        assert!(f.handler.remove_listener(id));
        wait_until(|| !f.handler.is_polling()).await;

        // The parked fetch was abandoned
        assert_eq!(f.store.pending_waiters(), 0);

        let calls = f.getter.calls();
        f.store.write(2);
        f.store.write(3);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.getter.calls(), calls);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn re_adding_a_listener_restarts_from_the_current_value() {
        let f = fixture(1);
        let (id, mut rx) = channel_listener(&f.handler, ListenOptions::default());
        assert_eq!(recv(&mut rx).await, 1);
        f.handler.remove_listener(id);
        wait_until(|| !f.handler.is_polling()).await;

        f.store.write(5);

        let (_, mut rx) = channel_listener(&f.handler, ListenOptions::default());
        assert_eq!(recv(&mut rx).await, 5);
    }

    #[tokio::test]
    async fn refilling_an_emptied_set_redelivers_the_current_value() {
        let f = fixture(1);
        let (a, mut first) = channel_listener(&f.handler, ListenOptions::default());
        assert_eq!(recv(&mut first).await, 1);
        wait_until(|| f.store.pending_waiters() == 1).await;

        // No await in between: the loop has not seen the set empty
        assert!(f.handler.remove_listener(a));
        let (_, mut second) = channel_listener(&f.handler, ListenOptions::default());

        // Nothing was written; the value must come from a fresh sentinel fetch
        assert_eq!(recv(&mut second).await, 1);
        assert!(first.try_recv().is_err());

        // Still a single loop, parked once
        wait_until(|| f.store.pending_waiters() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.store.pending_waiters(), 1);
        f.store.write(2);
        assert_eq!(recv(&mut second).await, 2);
    }

    #[tokio::test]
    async fn callback_can_replace_itself_with_another_listener() {
        let f = fixture(1);
        let (tx, mut replacement) = mpsc::unbounded_channel();
        let own_id = Arc::new(Mutex::new(None::<ListenerId>));
        let fired = Arc::new(AtomicUsize::new(0));

        let id = {
            let handler = f.handler.clone();
            let own_id = Arc::clone(&own_id);
            let fired = Arc::clone(&fired);
            f.handler.add_listener(
                move |_| {
                    fired.fetch_add(1, Ordering::SeqCst);
                    if let Some(id) = own_id.lock().unwrap().take() {
                        assert!(handler.remove_listener(id));
                        let tx = tx.clone();
                        handler.add_listener(
                            move |v| {
                                let _ = tx.send(v);
                            },
                            ListenOptions::default(),
                        );
                    }
                },
                ListenOptions::default(),
            )
        };
        *own_id.lock().unwrap() = Some(id);

        // The replacement joined an emptied set, so it starts from the
        // current value rather than waiting for a change
        assert_eq!(recv(&mut replacement).await, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(f.handler.listener_count(), 1);

        wait_until(|| f.store.pending_waiters() == 1).await;
        f.store.write(2);
        assert_eq!(recv(&mut replacement).await, 2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn callback_removing_itself_leaves_no_stale_wakeup() {
        let f = fixture(1);
        let own_id = Arc::new(Mutex::new(None::<ListenerId>));
        let id = {
            let handler = f.handler.clone();
            let own_id = Arc::clone(&own_id);
            f.handler.add_listener(
                move |_| {
                    if let Some(id) = own_id.lock().unwrap().take() {
                        handler.remove_listener(id);
                    }
                },
                ListenOptions::default(),
            )
        };
        *own_id.lock().unwrap() = Some(id);
        wait_until(|| !f.handler.is_polling()).await;
        assert_eq!(f.getter.calls(), 1);

        // The next loop's first fetch is not thrown away
        let (_, mut rx) = channel_listener(&f.handler, ListenOptions::default());
        assert_eq!(recv(&mut rx).await, 1);
        wait_until(|| f.store.pending_waiters() == 1).await;
        assert_eq!(f.getter.calls(), 3);
    }

    #[tokio::test]
    async fn removing_unknown_listener_is_a_no_op() {
        let f = fixture(1);
        let (_, mut rx) = channel_listener(&f.handler, ListenOptions::default());
        let stranger = f.handler.on_error(|_| {});
        assert!(!f.handler.remove_listener(stranger));

        assert_eq!(recv(&mut rx).await, 1);
        assert!(f.handler.is_polling());
    }

    #[tokio::test]
    async fn loop_failure_notifies_error_listeners_and_goes_idle() {
        let handler: ValueHandler<u32, u32> =
            ValueHandler::new("broken", Arc::new(BrokenGetter), |v| v);
        let (tx, mut errors) = mpsc::unbounded_channel();
        handler.on_error(move |e| {
            let _ = tx.send(e.to_string());
        });

        handler.add_listener(|_| panic!("no value expected"), ListenOptions::default());

        let message = recv(&mut errors).await;
        assert!(message.contains("connection closed"));
        wait_until(|| !handler.is_polling()).await;
        assert_eq!(handler.listener_count(), 0);
    }

    #[tokio::test]
    async fn panicking_listener_fails_the_loop_instead_of_stalling_it() {
        let f = fixture(1);
        let (tx, mut errors) = mpsc::unbounded_channel();
        f.handler.on_error(move |e| {
            let _ = tx.send(e.to_string());
        });

        f.handler.add_listener(|_| panic!("boom"), ListenOptions::once());

        let message = recv(&mut errors).await;
        assert!(message.contains("boom"), "{}", message);
        assert!(!f.handler.is_polling());
        assert_eq!(f.handler.listener_count(), 0);

        // The handler is usable again
        let (_, mut rx) = channel_listener(&f.handler, ListenOptions::default());
        assert_eq!(recv(&mut rx).await, 1);
    }

    #[tokio::test]
    async fn panicking_getter_leaves_the_handler_idle() {
        let handler: ValueHandler<u32, u32> =
            ValueHandler::new("exploding", Arc::new(PanickingGetter), |v| v);
        let (tx, mut errors) = mpsc::unbounded_channel();
        handler.on_error(move |e| {
            let _ = tx.send(matches!(e, ClientError::LoopAborted { .. }));
        });

        handler.add_listener(|_| {}, ListenOptions::default());

        assert!(recv(&mut errors).await);
        wait_until(|| !handler.is_polling()).await;
        assert_eq!(handler.listener_count(), 0);
    }

    #[tokio::test]
    async fn protocol_violation_terminates_the_loop() {
        let handler: ValueHandler<u32, u32> =
            ValueHandler::new("stuck", Arc::new(StuckGetter), |v| v);
        let (tx, mut errors) = mpsc::unbounded_channel();
        let error_id = handler.on_error(move |e| {
            let _ = tx.send(matches!(e, ClientError::ProtocolViolation(_)));
        });
        let (_, mut values) = channel_listener(&handler, ListenOptions::default());

        // First answer is valid, the second repeats its cursor
        assert_eq!(recv(&mut values).await, 7);
        assert!(recv(&mut errors).await);
        assert!(!handler.is_polling());
        assert!(handler.remove_error_listener(error_id));
        assert!(!handler.remove_error_listener(error_id));
    }
}
