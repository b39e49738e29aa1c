//! Mock transport for testing.
//!
//! Allows queueing responses and capturing sent requests for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use kachaka_types::{Request, Response};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock transport for testing.
///
/// Each `call()` records its request and pops the next queued response.
/// With an empty queue the call fails with
/// [`TransportError::ConnectionClosed`], or stays pending forever once
/// [`MockTransport::park_when_empty`] is set (a long-poll that never sees a
/// change).
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    sent_requests: Vec<Request>,
    response_queue: VecDeque<Response>,
    fail_next_call: Option<String>,
    park_when_empty: bool,
}

enum Outcome {
    Respond(Response),
    Fail(TransportError),
    Park,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a response to be returned by the next `call()`.
    pub fn queue_response(&self, response: Response) {
        self.lock().response_queue.push_back(response);
    }

    /// Get all requests that were sent.
    pub fn sent_requests(&self) -> Vec<Request> {
        self.lock().sent_requests.clone()
    }

    /// Get the last request that was sent.
    pub fn last_sent(&self) -> Option<Request> {
        self.lock().sent_requests.last().cloned()
    }

    /// Number of calls made so far, including failed and parked ones.
    pub fn call_count(&self) -> usize {
        self.lock().sent_requests.len()
    }

    /// Cause the next call to fail with the given error.
    pub fn fail_next_call(&self, error: &str) {
        self.lock().fail_next_call = Some(error.to_string());
    }

    /// Leave calls pending instead of failing when no response is queued.
    pub fn park_when_empty(&self) {
        self.lock().park_when_empty = true;
    }

    /// Clear all state (requests, queue, failure injection).
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, request: Request) -> Result<Response, TransportError> {
        let outcome = {
            let mut inner = self.lock();
            inner.sent_requests.push(request);

            if let Some(error) = inner.fail_next_call.take() {
                Outcome::Fail(TransportError::ConnectionFailed(error))
            } else if let Some(response) = inner.response_queue.pop_front() {
                Outcome::Respond(response)
            } else if inner.park_when_empty {
                Outcome::Park
            } else {
                Outcome::Fail(TransportError::ConnectionClosed)
            }
        };

        match outcome {
            Outcome::Respond(response) => Ok(response),
            Outcome::Fail(error) => Err(error),
            Outcome::Park => std::future::pending().await,
        }
    }
}
