//! Pull-based consumption of a subscriber.

use futures_util::stream::{self, Stream};
use kachaka_core::Bookmark;
use kachaka_types::Cursor;

use crate::error::ClientError;
use crate::handler::ValueHandler;

/// An unbounded sequence of values from one subscriber.
///
/// Created by [`ValueHandler::iterate`]. The first pull returns the current
/// value; each later pull waits for the next change after the previous one.
/// Intermediate changes between pulls are coalesced. The sequence ends only
/// after yielding an error; otherwise stop by dropping it.
///
/// ```ignore
/// let mut poses = client.robot_pose().iterate();
/// while let Some(pose) = poses.next().await {
///     println!("{:?}", pose?);
/// }
/// ```
#[derive(Debug)]
pub struct ValueStream<T, U, V = (), W = ()> {
    handler: ValueHandler<T, U, V, W>,
    bookmark: Bookmark,
    finished: bool,
}

impl<T, U, V, W> ValueStream<T, U, V, W>
where
    T: Send + 'static,
    U: Clone + Send + 'static,
    V: Send + 'static,
    W: Send + 'static,
{
    pub(crate) fn new(handler: ValueHandler<T, U, V, W>) -> Self {
        Self {
            handler,
            bookmark: Bookmark::new(),
            finished: false,
        }
    }

    /// Cursor of the last value yielded, or the sentinel.
    pub fn cursor(&self) -> Cursor {
        self.bookmark.cursor()
    }

    /// Pull the next value.
    ///
    /// Returns `None` only after an error has been yielded. Dropping the
    /// returned future abandons the fetch without moving the bookmark.
    pub async fn next(&mut self) -> Option<Result<U, ClientError>> {
        if self.finished {
            return None;
        }
        match self.pull().await {
            Ok(value) => Some(Ok(value)),
            Err(e) => {
                tracing::debug!(resource = self.handler.label(), error = %e, "value stream ended");
                self.finished = true;
                Some(Err(e))
            }
        }
    }

    async fn pull(&mut self) -> Result<U, ClientError> {
        let versioned = self.handler.fetch_at(self.bookmark.cursor()).await?;
        self.bookmark.advance(versioned.cursor)?;
        Ok(self.handler.project(versioned.value))
    }

    /// Adapt into a [`Stream`] for use with stream combinators.
    pub fn into_stream(self) -> impl Stream<Item = Result<U, ClientError>> {
        stream::unfold(self, |mut values| async move {
            let item = values.next().await?;
            Some((item, values))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::handler::{Getter, ValueHandler};
    use crate::error::ClientError;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use kachaka_core::{CursorClock, CursorStore};
    use kachaka_types::{Cursor, GetRequest, Versioned};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn store_and_handler(initial: u32) -> (Arc<CursorStore<u32>>, ValueHandler<u32, u32>) {
        let store = Arc::new(CursorStore::with_clock(initial, CursorClock::sequence()));
        let handler = ValueHandler::new("test", store.clone(), |v| v * 10);
        (store, handler)
    }

    /// Fails every call after the first.
    struct FlakyGetter {
        served: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Getter<u32> for FlakyGetter {
        async fn get(&self, _request: GetRequest) -> Result<Versioned<u32>, ClientError> {
            if self.served.swap(true, std::sync::atomic::Ordering::SeqCst) {
                Err(ClientError::Remote("gone".into()))
            } else {
                Ok(Versioned::new(1, Cursor::new(1)))
            }
        }
    }

    #[tokio::test]
    async fn first_pull_is_the_current_value() {
        let (store, handler) = store_and_handler(1);
        store.write(2);

        let mut values = handler.iterate();
        assert!(values.cursor().is_zero());
        assert_eq!(values.next().await.unwrap().unwrap(), 20);
        assert_eq!(values.cursor(), store.cursor());
    }

    #[tokio::test]
    async fn pulls_wait_for_changes_and_coalesce() {
        let (store, handler) = store_and_handler(1);
        let mut values = handler.iterate();
        assert_eq!(values.next().await.unwrap().unwrap(), 10);

        let pending = timeout(Duration::from_millis(20), values.next()).await;
        assert!(pending.is_err(), "no change yet");

        store.write(2);
        store.write(3);
        assert_eq!(values.next().await.unwrap().unwrap(), 30);
    }

    #[tokio::test]
    async fn sequences_have_independent_bookmarks() {
        let (store, handler) = store_and_handler(1);
        let mut a = handler.iterate();
        let mut b = handler.iterate();

        assert_eq!(a.next().await.unwrap().unwrap(), 10);
        store.write(2);
        assert_eq!(a.next().await.unwrap().unwrap(), 20);

        // b has not pulled yet and starts from the current value
        assert_eq!(b.next().await.unwrap().unwrap(), 20);
        assert_eq!(a.cursor(), b.cursor());
    }

    #[tokio::test]
    async fn error_ends_the_sequence() {
        let handler: ValueHandler<u32, u32> = ValueHandler::new(
            "flaky",
            Arc::new(FlakyGetter {
                served: Default::default(),
            }),
            |v| v,
        );
        let mut values = handler.iterate();

        assert_eq!(values.next().await.unwrap().unwrap(), 1);
        assert!(matches!(
            values.next().await,
            Some(Err(ClientError::Remote(_)))
        ));
        assert!(values.next().await.is_none());
    }

    #[tokio::test]
    async fn into_stream_works_with_combinators() {
        let (store, handler) = store_and_handler(1);
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for v in 2..=3 {
                    while store.pending_waiters() == 0 {
                        tokio::task::yield_now().await;
                    }
                    store.write(v);
                }
            })
        };

        let collected: Vec<u32> = timeout(
            Duration::from_secs(1),
            handler
                .iterate()
                .into_stream()
                .map(|item| item.unwrap())
                .take(3)
                .collect(),
        )
        .await
        .unwrap();

        assert_eq!(collected, vec![10, 20, 30]);
        writer.await.unwrap();
    }
}
