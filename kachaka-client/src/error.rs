//! Client error types.

use crate::transport::TransportError;
use kachaka_core::CursorRegression;
use kachaka_types::Resource;
use thiserror::Error;

/// Errors surfaced by subscribers and the client facade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// `write` was called on a subscriber without a setter.
    #[error("resource is not writable")]
    NotWritable,

    /// The server broke the get-with-cursor contract.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server answered with a response of the wrong kind.
    #[error("unexpected response for {resource}: {detail}")]
    UnexpectedResponse {
        /// The resource that was asked for.
        resource: Resource,
        /// What came back instead.
        detail: String,
    },

    /// The server reported an error.
    #[error("server error: {0}")]
    Remote(String),

    /// The listener loop ended abnormally: a callback, projection or getter
    /// panicked, or the task was dropped by its runtime.
    #[error("{resource} listener loop aborted: {reason}")]
    LoopAborted {
        /// The subscriber's label.
        resource: &'static str,
        /// What happened.
        reason: String,
    },
}

impl From<CursorRegression> for ClientError {
    fn from(e: CursorRegression) -> Self {
        ClientError::ProtocolViolation(e.to_string())
    }
}
