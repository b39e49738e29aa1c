//! KachakaClient - the main interface to a Kachaka robot.
//!
//! The client owns one [`ValueHandler`] per robot resource, all sharing a
//! single [`Transport`]. Commands are started with
//! [`KachakaClient::start_command`], which can follow the command state until
//! the robot is idle again.
//!
//! ```text
//! Application → KachakaClient → ValueHandler → RemoteResource → Transport
//!                     │                                             │
//!                     └──────────── start_command ──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use kachaka_client::{ClientConfig, CommandOptions, KachakaClient};
//! use kachaka_types::Command;
//!
//! let client = KachakaClient::from_config(&ClientConfig::new("192.168.1.10"));
//! println!("serial: {}", client.serial_number().fetch_latest().await?);
//!
//! let result = client
//!     .start_command(Command::ReturnHome, CommandOptions::default())
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use kachaka_types::{
    Command, CommandResult, CommandState, CommandStatus, Cursor, History, LastCommandResult,
    Location, Odometry, Payload, PngMap, Pose, Request, Resource, Response, SetRequest, Shelf,
    StartCommandRequest, Velocity, DEFAULT_PORT,
};

use crate::error::ClientError;
use crate::handler::ValueHandler;
use crate::remote::{describe, RemoteResource, RemoteSetter};
use crate::transport::{TcpTransport, Transport, DEFAULT_CONNECT_TIMEOUT};

/// A read-only subscriber whose projection is the payload itself.
pub type Handler<T> = ValueHandler<T, T>;

/// A subscriber to a settable boolean flag.
pub type FlagHandler = ValueHandler<bool, bool, bool, CommandResult>;

/// Reads the base velocity out of odometry; writes drive the base.
pub type VelocityHandler = ValueHandler<Odometry, Velocity, Velocity, CommandResult>;

/// Configuration for a TCP connection to the robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Robot host name or IP address.
    pub host: String,
    /// API port.
    pub port: u16,
    /// Time allowed to establish each connection.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Configuration for `host` on the default port.
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options for [`KachakaClient::start_command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOptions {
    /// Follow the command state until the robot is idle, then return the
    /// last command result instead of the start acknowledgement.
    pub wait_for_completion: bool,
    /// Cancel queued commands first.
    pub cancel_all: bool,
    /// Text spoken when the command succeeds.
    pub tts_on_success: Option<String>,
    /// Title shown in the robot's history.
    pub title: Option<String>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            wait_for_completion: true,
            cancel_all: false,
            tts_on_success: None,
            title: None,
        }
    }
}

impl CommandOptions {
    /// Return as soon as the robot accepts the command.
    pub fn no_wait() -> Self {
        Self {
            wait_for_completion: false,
            ..Self::default()
        }
    }
}

/// Client for the Kachaka robot API.
pub struct KachakaClient<T: Transport> {
    transport: Arc<T>,
    serial_number: Handler<String>,
    version: Handler<String>,
    robot_pose: Handler<Pose>,
    png_map: Handler<PngMap>,
    command_state: Handler<CommandStatus>,
    last_command_result: Handler<LastCommandResult>,
    locations: Handler<Vec<Location>>,
    shelves: Handler<Vec<Shelf>>,
    auto_homing_enabled: FlagHandler,
    manual_control_enabled: FlagHandler,
    robot_velocity: VelocityHandler,
    history_list: Handler<Vec<History>>,
}

impl KachakaClient<TcpTransport> {
    /// A client talking TCP to the configured robot.
    ///
    /// No connection is opened until the first call.
    pub fn from_config(config: &ClientConfig) -> Self {
        let transport =
            TcpTransport::new(config.address()).with_connect_timeout(config.connect_timeout);
        Self::new(transport)
    }
}

impl<T: Transport + 'static> KachakaClient<T> {
    /// Create a client over `transport`.
    pub fn new(transport: T) -> Self {
        let transport = Arc::new(transport);
        let shared: Arc<dyn Transport> = transport.clone();

        Self {
            serial_number: identity(&shared, Resource::SerialNumber, |p| match p {
                Payload::SerialNumber(v) => Some(v),
                _ => None,
            }),
            version: identity(&shared, Resource::Version, |p| match p {
                Payload::Version(v) => Some(v),
                _ => None,
            }),
            robot_pose: identity(&shared, Resource::RobotPose, |p| match p {
                Payload::RobotPose(v) => Some(v),
                _ => None,
            }),
            png_map: identity(&shared, Resource::PngMap, |p| match p {
                Payload::PngMap(v) => Some(v),
                _ => None,
            }),
            command_state: identity(&shared, Resource::CommandState, |p| match p {
                Payload::CommandState(v) => Some(v),
                _ => None,
            }),
            last_command_result: identity(&shared, Resource::LastCommandResult, |p| match p {
                Payload::LastCommandResult(v) => Some(v),
                _ => None,
            }),
            locations: identity(&shared, Resource::Locations, |p| match p {
                Payload::Locations(v) => Some(v),
                _ => None,
            }),
            shelves: identity(&shared, Resource::Shelves, |p| match p {
                Payload::Shelves(v) => Some(v),
                _ => None,
            }),
            auto_homing_enabled: flag(
                &shared,
                Resource::AutoHomingEnabled,
                |p| match p {
                    Payload::AutoHomingEnabled(v) => Some(v),
                    _ => None,
                },
                SetRequest::AutoHomingEnabled,
            ),
            manual_control_enabled: flag(
                &shared,
                Resource::ManualControlEnabled,
                |p| match p {
                    Payload::ManualControlEnabled(v) => Some(v),
                    _ => None,
                },
                SetRequest::ManualControlEnabled,
            ),
            robot_velocity: ValueHandler::writable(
                "robot_velocity",
                Arc::new(RemoteResource::new(
                    Arc::clone(&shared),
                    Resource::Odometry,
                    |p| match p {
                        Payload::Odometry(v) => Some(v),
                        _ => None,
                    },
                )),
                |odometry: Odometry| odometry.velocity,
                Arc::new(RemoteSetter::new(
                    Arc::clone(&shared),
                    SetRequest::RobotVelocity,
                )),
            ),
            history_list: identity(&shared, Resource::HistoryList, |p| match p {
                Payload::HistoryList(v) => Some(v),
                _ => None,
            }),
            transport,
        }
    }

    /// Get a reference to the transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Robot serial number.
    pub fn serial_number(&self) -> &Handler<String> {
        &self.serial_number
    }

    /// Robot software version.
    pub fn version(&self) -> &Handler<String> {
        &self.version
    }

    /// Robot pose on the map.
    pub fn robot_pose(&self) -> &Handler<Pose> {
        &self.robot_pose
    }

    /// Occupancy map.
    pub fn png_map(&self) -> &Handler<PngMap> {
        &self.png_map
    }

    /// Command execution state.
    pub fn command_state(&self) -> &Handler<CommandStatus> {
        &self.command_state
    }

    /// Result of the last finished command.
    pub fn last_command_result(&self) -> &Handler<LastCommandResult> {
        &self.last_command_result
    }

    /// Registered locations.
    pub fn locations(&self) -> &Handler<Vec<Location>> {
        &self.locations
    }

    /// Registered shelves.
    pub fn shelves(&self) -> &Handler<Vec<Shelf>> {
        &self.shelves
    }

    /// Auto-homing flag.
    pub fn auto_homing_enabled(&self) -> &FlagHandler {
        &self.auto_homing_enabled
    }

    /// Manual-control flag.
    pub fn manual_control_enabled(&self) -> &FlagHandler {
        &self.manual_control_enabled
    }

    /// Base velocity, taken from odometry. Writing drives the base.
    pub fn robot_velocity(&self) -> &VelocityHandler {
        &self.robot_velocity
    }

    /// Finished commands, oldest first.
    pub fn history_list(&self) -> &Handler<Vec<History>> {
        &self.history_list
    }

    /// A subscriber with a custom projection of one resource.
    ///
    /// ```ignore
    /// let heading = client.subscribe(
    ///     Resource::RobotPose,
    ///     |p| match p { Payload::RobotPose(pose) => Some(pose), _ => None },
    ///     |pose| pose.theta,
    /// );
    /// ```
    pub fn subscribe<X, U, F>(
        &self,
        resource: Resource,
        extract: fn(Payload) -> Option<X>,
        pick: F,
    ) -> ValueHandler<X, U>
    where
        X: Send + 'static,
        U: Clone + Send + 'static,
        F: Fn(X) -> U + Send + Sync + 'static,
    {
        let shared: Arc<dyn Transport> = self.transport.clone();
        ValueHandler::new(
            resource.name(),
            Arc::new(RemoteResource::new(shared, resource, extract)),
            pick,
        )
    }

    /// Start a robot command.
    ///
    /// With `wait_for_completion`, follows the command state from the
    /// cursor observed before the command was sent until the robot reports
    /// `Pending` again, then returns the last command result. Otherwise, or
    /// when the robot rejects the command, returns the start acknowledgement.
    pub async fn start_command(
        &self,
        command: Command,
        options: CommandOptions,
    ) -> Result<CommandResult, ClientError> {
        let mut cursor = self.command_state.fetch_at(Cursor::zero()).await?.cursor;

        let request = StartCommandRequest {
            command,
            cancel_all: options.cancel_all,
            tts_on_success: options.tts_on_success,
            title: options.title,
        };
        let started = match self.transport.call(Request::StartCommand(request)).await? {
            Response::CommandStarted(started) => started,
            Response::Error { message } => return Err(ClientError::Remote(message)),
            other => {
                return Err(ClientError::UnexpectedResponse {
                    resource: Resource::CommandState,
                    detail: describe(&other).to_string(),
                })
            }
        };
        tracing::info!(
            command_id = %started.command_id,
            success = started.result.success,
            "command started"
        );

        if !started.result.success || !options.wait_for_completion {
            return Ok(started.result);
        }

        loop {
            let status = self.command_state.fetch_at(cursor).await?;
            if status.value.state == CommandState::Pending {
                break;
            }
            cursor = status.cursor;
        }

        let finished = self.last_command_result.fetch_latest().await?;
        tracing::info!(
            command_id = %started.command_id,
            success = finished.result.success,
            error_code = finished.result.error_code,
            "command finished"
        );
        Ok(finished.result)
    }
}

fn identity<U>(
    transport: &Arc<dyn Transport>,
    resource: Resource,
    extract: fn(Payload) -> Option<U>,
) -> Handler<U>
where
    U: Clone + Send + 'static,
{
    ValueHandler::new(
        resource.name(),
        Arc::new(RemoteResource::new(Arc::clone(transport), resource, extract)),
        |value| value,
    )
}

fn flag(
    transport: &Arc<dyn Transport>,
    resource: Resource,
    extract: fn(Payload) -> Option<bool>,
    request: fn(bool) -> SetRequest,
) -> FlagHandler {
    ValueHandler::writable(
        resource.name(),
        Arc::new(RemoteResource::new(Arc::clone(transport), resource, extract)),
        |value| value,
        Arc::new(RemoteSetter::new(Arc::clone(transport), request)),
    )
}
