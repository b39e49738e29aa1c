//! # kachaka-mock
//!
//! Mock Kachaka API server for developing and testing clients without a
//! robot.
//!
//! Every resource lives in a [`CursorStore`](kachaka_core::CursorStore):
//! gets suspend until the value changes past the caller's cursor, sets write
//! through and wake every suspended reader, and started commands run for a
//! configurable time before the robot reports idle again.
//!
//! ## Architecture
//!
//! ```text
//! KachakaClient ── TcpTransport ──► serve ──► Session ──┐
//!                                                       ├──► MockServer::handle
//! KachakaClient ── LocalTransport ──────────────────────┘        │
//!                                                          CursorStore × 10
//! ```
//!
//! ## Protocol
//!
//! One request per TCP connection, framed as a 4-byte big-endian length
//! followed by a MessagePack body:
//! - `Get { resource, cursor }` → `Value` (suspends until newer than cursor)
//! - `Set(..)` → `Ack`
//! - `StartCommand(..)` → `CommandStarted`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commands;
pub mod config;
pub mod error;
pub mod local;
pub mod protocol;
pub mod seed;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError};
pub use error::MockError;
pub use local::LocalTransport;
pub use protocol::serve;
pub use seed::{Seed, SeedError};
pub use server::{MockServer, ServerMetrics};
