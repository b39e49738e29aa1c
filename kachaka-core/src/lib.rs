//! # kachaka-core
//!
//! The cursor long-poll mechanism, independent of any transport.
//!
//! - [`CursorStore`] is the responder side: one current value plus its
//!   cursor, answering "next value after cursor C" immediately or once a
//!   write produces one.
//! - [`Bookmark`] is a consumer-local cursor that refuses to move backwards.
//! - [`ListenerSet`] is the fan-out state machine behind a subscriber's
//!   listener loop (`Idle` / `Polling`).
//! - [`CursorClock`] generates strictly increasing cursors.
//!
//! ## Design Philosophy
//!
//! Nothing in this crate performs I/O. The listener state machine is pure
//! and the store only needs single-resolution channels, so every module is
//! tested without a network or a mock server.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bookmark;
pub mod clock;
pub mod listeners;
pub mod store;

pub use bookmark::{Bookmark, CursorRegression};
pub use clock::{CursorClock, CursorSource};
pub use listeners::{ListenerId, ListenerKind, ListenerSet, LoopControl, LoopState, Transition};
pub use store::CursorStore;
