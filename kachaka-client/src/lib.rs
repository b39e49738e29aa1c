//! # kachaka-client
//!
//! Client library for the Kachaka robot API.
//!
//! Every robot value (pose, map, command state, ...) is exposed as a
//! [`ValueHandler`] backed by a get-with-cursor long-poll: ask for "the first
//! value after cursor C" and the server answers as soon as one exists.
//!
//! ## Features
//!
//! - **One-shot reads**: `fetch_latest` / `fetch_at`
//! - **Listeners**: many callbacks fed by one polling loop that runs only
//!   while someone listens
//! - **Iteration**: independent pull-based [`ValueStream`]s
//! - **Transport Abstraction**: pluggable transport layer (TCP, mock)
//!
//! ## Example
//!
//! ```ignore
//! use kachaka_client::{ClientConfig, KachakaClient, ListenOptions};
//!
//! let client = KachakaClient::from_config(&ClientConfig::new("192.168.1.10"));
//!
//! client.robot_pose().add_listener(
//!     |pose| println!("pose: {:?}", pose),
//!     ListenOptions::default(),
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod handler;
pub mod remote;
pub mod stream;
pub mod transport;

pub use client::{
    ClientConfig, CommandOptions, FlagHandler, Handler, KachakaClient, VelocityHandler,
};
pub use error::ClientError;
pub use handler::{Getter, ListenOptions, Setter, ValueHandler};
pub use remote::{RemoteResource, RemoteSetter};
pub use stream::ValueStream;
pub use transport::{
    read_frame, write_frame, MockTransport, TcpTransport, Transport, TransportError,
    DEFAULT_CONNECT_TIMEOUT,
};

// Listener identifiers come from the core state machine
pub use kachaka_core::ListenerId;
