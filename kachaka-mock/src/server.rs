//! The mock robot.
//!
//! [`MockServer`] holds one [`CursorStore`] per resource and answers
//! [`Request`]s against them. It is transport-agnostic: TCP sessions and
//! [`LocalTransport`](crate::LocalTransport) both funnel into
//! [`MockServer::handle`].

use crate::commands::{self, CommandStores};
use crate::config::Config;
use crate::error::MockError;
use crate::seed::Seed;
use kachaka_core::{CursorClock, CursorStore};
use kachaka_types::{
    CommandResult, CommandState, CommandStatus, Cursor, History, LastCommandResult, Location,
    Odometry, Payload, PngMap, Pose, Request, Resource, Response, SetRequest, Shelf,
    StartCommandRequest, StartCommandResponse, Versioned,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Operational counters.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Connections accepted.
    pub connections_total: AtomicU64,
    /// Requests handled, of any kind.
    pub requests_total: AtomicU64,
    /// Get requests handled.
    pub gets_total: AtomicU64,
    /// Set requests handled.
    pub sets_total: AtomicU64,
    /// Commands started.
    pub commands_total: AtomicU64,
    /// Gets whose peer disconnected before a value arrived.
    pub polls_abandoned: AtomicU64,
    /// Undecodable requests.
    pub errors_total: AtomicU64,
}

/// In-memory Kachaka API.
pub struct MockServer {
    serial_number: CursorStore<String>,
    version: CursorStore<String>,
    robot_pose: CursorStore<Pose>,
    png_map: CursorStore<PngMap>,
    commands: CommandStores,
    locations: CursorStore<Vec<Location>>,
    shelves: CursorStore<Vec<Shelf>>,
    auto_homing_enabled: CursorStore<bool>,
    manual_control_enabled: CursorStore<bool>,
    odometry: CursorStore<Odometry>,
    command_duration: Duration,
    next_command_id: AtomicU64,
    metrics: ServerMetrics,
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("command_duration", &self.command_duration)
            .field("pending_waiters", &self.pending_waiters())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl MockServer {
    /// Create a server from `config`, with map data from `seed`.
    pub fn new(config: &Config, seed: Seed) -> Self {
        let source = config.cursor.source;
        let clock = || CursorClock::new(source);

        Self {
            serial_number: CursorStore::with_clock(config.seed.serial_number.clone(), clock()),
            version: CursorStore::with_clock(config.seed.version.clone(), clock()),
            robot_pose: CursorStore::with_clock(seed.pose, clock()),
            png_map: CursorStore::with_clock(seed.png_map, clock()),
            commands: CommandStores {
                command_state: Arc::new(CursorStore::with_clock(
                    CommandStatus {
                        state: CommandState::Pending,
                        command: None,
                        command_id: None,
                    },
                    clock(),
                )),
                last_command_result: Arc::new(CursorStore::with_clock(
                    LastCommandResult::default(),
                    clock(),
                )),
                history_list: Arc::new(CursorStore::with_clock(Vec::new(), clock())),
            },
            locations: CursorStore::with_clock(seed.locations, clock()),
            shelves: CursorStore::with_clock(seed.shelves, clock()),
            auto_homing_enabled: CursorStore::with_clock(false, clock()),
            manual_control_enabled: CursorStore::with_clock(false, clock()),
            odometry: CursorStore::with_clock(
                Odometry {
                    pose: seed.pose,
                    ..Odometry::default()
                },
                clock(),
            ),
            command_duration: Duration::from_millis(config.commands.duration_ms),
            next_command_id: AtomicU64::new(0),
            metrics: ServerMetrics::default(),
        }
    }

    /// Create a server from `config`, loading seed files if a seed
    /// directory is configured.
    pub fn from_config(config: &Config) -> Result<Self, MockError> {
        let seed = match &config.seed.directory {
            Some(dir) => Seed::load(dir)?,
            None => Seed::default(),
        };
        Ok(Self::new(config, seed))
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Readers currently suspended across all resources.
    pub fn pending_waiters(&self) -> usize {
        self.serial_number.pending_waiters()
            + self.version.pending_waiters()
            + self.robot_pose.pending_waiters()
            + self.png_map.pending_waiters()
            + self.commands.command_state.pending_waiters()
            + self.commands.last_command_result.pending_waiters()
            + self.commands.history_list.pending_waiters()
            + self.locations.pending_waiters()
            + self.shelves.pending_waiters()
            + self.auto_homing_enabled.pending_waiters()
            + self.manual_control_enabled.pending_waiters()
            + self.odometry.pending_waiters()
    }

    /// Robot pose store, for driving the simulation.
    pub fn robot_pose(&self) -> &CursorStore<Pose> {
        &self.robot_pose
    }

    /// Occupancy map store.
    pub fn png_map(&self) -> &CursorStore<PngMap> {
        &self.png_map
    }

    /// Command state store.
    pub fn command_state(&self) -> &CursorStore<CommandStatus> {
        &self.commands.command_state
    }

    /// Last command result store.
    pub fn last_command_result(&self) -> &CursorStore<LastCommandResult> {
        &self.commands.last_command_result
    }

    /// History list store.
    pub fn history_list(&self) -> &CursorStore<Vec<History>> {
        &self.commands.history_list
    }

    /// Locations store.
    pub fn locations(&self) -> &CursorStore<Vec<Location>> {
        &self.locations
    }

    /// Shelves store.
    pub fn shelves(&self) -> &CursorStore<Vec<Shelf>> {
        &self.shelves
    }

    /// Auto-homing flag store.
    pub fn auto_homing_enabled(&self) -> &CursorStore<bool> {
        &self.auto_homing_enabled
    }

    /// Manual-control flag store.
    pub fn manual_control_enabled(&self) -> &CursorStore<bool> {
        &self.manual_control_enabled
    }

    /// Odometry store; velocity sets land here.
    pub fn odometry(&self) -> &CursorStore<Odometry> {
        &self.odometry
    }

    /// Answer one request.
    ///
    /// Gets suspend until the resource has a value newer than the request
    /// cursor. Dropping the future abandons the wait.
    pub async fn handle(&self, request: Request) -> Response {
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

        match request {
            Request::Get { resource, cursor } => {
                self.metrics.gets_total.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%resource, %cursor, "get");
                Response::Value(self.get(resource, cursor).await)
            }
            Request::Set(set) => {
                self.metrics.sets_total.fetch_add(1, Ordering::Relaxed);
                Response::Ack(self.set(set))
            }
            Request::StartCommand(start) => {
                self.metrics.commands_total.fetch_add(1, Ordering::Relaxed);
                Response::CommandStarted(self.start_command(start))
            }
        }
    }

    async fn get(&self, resource: Resource, cursor: Cursor) -> Versioned<Payload> {
        match resource {
            Resource::SerialNumber => self
                .serial_number
                .read(cursor)
                .await
                .map(Payload::SerialNumber),
            Resource::Version => self.version.read(cursor).await.map(Payload::Version),
            Resource::RobotPose => self.robot_pose.read(cursor).await.map(Payload::RobotPose),
            Resource::PngMap => self.png_map.read(cursor).await.map(Payload::PngMap),
            Resource::CommandState => self
                .commands
                .command_state
                .read(cursor)
                .await
                .map(Payload::CommandState),
            Resource::LastCommandResult => self
                .commands
                .last_command_result
                .read(cursor)
                .await
                .map(Payload::LastCommandResult),
            Resource::Locations => self.locations.read(cursor).await.map(Payload::Locations),
            Resource::Shelves => self.shelves.read(cursor).await.map(Payload::Shelves),
            Resource::AutoHomingEnabled => self
                .auto_homing_enabled
                .read(cursor)
                .await
                .map(Payload::AutoHomingEnabled),
            Resource::ManualControlEnabled => self
                .manual_control_enabled
                .read(cursor)
                .await
                .map(Payload::ManualControlEnabled),
            Resource::Odometry => self.odometry.read(cursor).await.map(Payload::Odometry),
            Resource::HistoryList => self
                .commands
                .history_list
                .read(cursor)
                .await
                .map(Payload::HistoryList),
        }
    }

    fn set(&self, request: SetRequest) -> CommandResult {
        let cursor = match request {
            SetRequest::AutoHomingEnabled(enabled) => self.auto_homing_enabled.write(enabled),
            SetRequest::ManualControlEnabled(enabled) => self.manual_control_enabled.write(enabled),
            SetRequest::RobotVelocity(velocity) => self
                .odometry
                .update(|odometry| odometry.velocity = velocity),
        };
        tracing::info!(resource = %request.resource(), %cursor, "value set");
        CommandResult::ok()
    }

    fn start_command(&self, request: StartCommandRequest) -> StartCommandResponse {
        let id = self.next_command_id.fetch_add(1, Ordering::Relaxed) + 1;
        let command_id = format!("cmd-{}", id);

        if let Err(code) = commands::validate(&request.command) {
            tracing::warn!(%command_id, error_code = code, command = ?request.command, "command rejected");
            let result = CommandResult::failed(code);
            self.commands.record(&command_id, &request, result);
            return StartCommandResponse { result, command_id };
        }

        tracing::info!(
            %command_id,
            command = ?request.command,
            cancel_all = request.cancel_all,
            "command started"
        );
        self.commands.command_state.write(CommandStatus {
            state: CommandState::Running,
            command: Some(request.command.clone()),
            command_id: Some(command_id.clone()),
        });
        commands::spawn_completion(
            self.commands.clone(),
            command_id.clone(),
            request,
            self.command_duration,
        );

        StartCommandResponse {
            result: CommandResult::ok(),
            command_id,
        }
    }
}
