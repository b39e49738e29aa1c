//! # kachaka-types
//!
//! Wire format types for the Kachaka cursor long-poll API.
//!
//! Every piece of remote state is a single current value stamped with a
//! strictly increasing [`Cursor`]. This crate provides the types shared by
//! the client SDK and the mock server:
//! - [`Cursor`], [`GetRequest`], [`Versioned`] - the get-with-cursor contract
//! - [`Request`] / [`Response`] - the envelope carried by a transport
//! - [`Payload`] and the resource payload types (pose, map, shelves, ...)
//! - [`WireError`] - encoding errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cursor;
mod envelope;
mod error;
mod messages;

pub use cursor::{Cursor, GetRequest, Versioned};
pub use envelope::{Request, Resource, Response, SetRequest, DEFAULT_PORT, MAX_FRAME_SIZE};
pub use error::WireError;
pub use messages::{
    Command, CommandResult, CommandState, CommandStatus, History, LastCommandResult, Location,
    Odometry, Payload, PngMap, Pose, Shelf, StartCommandRequest, StartCommandResponse, Velocity,
};
