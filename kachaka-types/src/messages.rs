//! Resource payloads and command types.
//!
//! JSON field names follow the vendor's camelCase dumps so that seed files
//! exported from a real robot load unchanged.

use serde::{Deserialize, Serialize};

use crate::Resource;

/// A 2D pose on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Pose {
    /// X coordinate in metres.
    pub x: f64,
    /// Y coordinate in metres.
    pub y: f64,
    /// Heading in radians.
    pub theta: f64,
}

/// The occupancy map rendered as PNG.
#[derive(Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PngMap {
    /// PNG-encoded image. Base64 in JSON, raw bytes on the wire.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Map name.
    #[serde(default)]
    pub name: String,
    /// Metres per pixel.
    pub resolution: f64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pose of the lower-left pixel.
    #[serde(default)]
    pub origin: Pose,
}

impl std::fmt::Debug for PngMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PngMap")
            .field("data", &format!("[{} bytes]", self.data.len()))
            .field("name", &self.name)
            .field("resolution", &self.resolution)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("origin", &self.origin)
            .finish()
    }
}

/// A named destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Location identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Where the location is.
    pub pose: Pose,
}

/// A shelf the robot can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shelf {
    /// Shelf identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Location the shelf returns to.
    #[serde(default)]
    pub home_location_id: String,
}

/// A robot command verb.
///
/// Carried opaquely between client and server; the SDK does not validate
/// identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Carry a shelf to a location.
    MoveShelf {
        /// Shelf to pick up.
        target_shelf_id: String,
        /// Where to put it.
        destination_location_id: String,
    },
    /// Return a shelf to its home location.
    ReturnShelf {
        /// Shelf to return.
        target_shelf_id: String,
    },
    /// Put down the shelf currently carried.
    UndockShelf,
    /// Drive to a location.
    MoveToLocation {
        /// Destination.
        target_location_id: String,
    },
    /// Return to the charger.
    ReturnHome,
    /// Pick up the shelf in front of the robot.
    DockShelf,
    /// Say something.
    Speak {
        /// Text to speak.
        text: String,
    },
    /// Drive to an explicit pose.
    MoveToPose {
        /// X coordinate in metres.
        x: f64,
        /// Y coordinate in metres.
        y: f64,
        /// Heading in radians.
        yaw: f64,
    },
}

/// Whether the robot is executing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CommandState {
    /// No state reported yet.
    #[default]
    Unspecified,
    /// Idle, ready for the next command.
    Pending,
    /// A command is in progress.
    Running,
}

/// Current command state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommandStatus {
    /// Execution state.
    pub state: CommandState,
    /// The command in progress, if any.
    #[serde(default)]
    pub command: Option<Command>,
    /// Identifier of the command in progress, if any.
    #[serde(default)]
    pub command_id: Option<String>,
}

/// Outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,
    /// Vendor error code, 0 on success.
    #[serde(default)]
    pub error_code: i32,
}

impl CommandResult {
    /// A successful result.
    pub fn ok() -> Self {
        Self {
            success: true,
            error_code: 0,
        }
    }

    /// A failed result with the given vendor error code.
    pub fn failed(error_code: i32) -> Self {
        Self {
            success: false,
            error_code,
        }
    }
}

/// Result of the most recently finished command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LastCommandResult {
    /// Outcome.
    pub result: CommandResult,
    /// The command that finished, if any has.
    #[serde(default)]
    pub command: Option<Command>,
}

/// Linear and angular speed of the base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Velocity {
    /// Forward speed in metres per second.
    pub linear: f64,
    /// Turn rate in radians per second.
    pub angular: f64,
}

/// Wheel odometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Odometry {
    /// Pose in the odometry frame.
    #[serde(default)]
    pub pose: Pose,
    /// Current speed.
    #[serde(default)]
    pub velocity: Velocity,
}

/// One finished command in the robot's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    /// Identifier of the command.
    pub id: String,
    /// What was executed.
    pub command: Command,
    /// Whether it succeeded.
    pub success: bool,
    /// Vendor error code, 0 on success.
    #[serde(default)]
    pub error_code: i32,
    /// Title given when the command was started.
    #[serde(default)]
    pub title: Option<String>,
}

/// Start a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCommandRequest {
    /// What to do.
    pub command: Command,
    /// Cancel queued commands first.
    #[serde(default)]
    pub cancel_all: bool,
    /// Text spoken when the command succeeds.
    #[serde(default)]
    pub tts_on_success: Option<String>,
    /// Title shown in the history list.
    #[serde(default)]
    pub title: Option<String>,
}

impl StartCommandRequest {
    /// A request with default options.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            cancel_all: false,
            tts_on_success: None,
            title: None,
        }
    }
}

/// Acknowledgement of a started command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCommandResponse {
    /// Whether the command was accepted.
    pub result: CommandResult,
    /// Identifier assigned to the command.
    pub command_id: String,
}

/// The value of one resource, as carried in a get response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Robot serial number.
    SerialNumber(String),
    /// Robot software version.
    Version(String),
    /// Robot pose.
    RobotPose(Pose),
    /// Occupancy map.
    PngMap(PngMap),
    /// Command state.
    CommandState(CommandStatus),
    /// Last command result.
    LastCommandResult(LastCommandResult),
    /// Registered locations.
    Locations(Vec<Location>),
    /// Registered shelves.
    Shelves(Vec<Shelf>),
    /// Auto-homing flag.
    AutoHomingEnabled(bool),
    /// Manual-control flag.
    ManualControlEnabled(bool),
    /// Wheel odometry.
    Odometry(Odometry),
    /// Finished commands, oldest first.
    HistoryList(Vec<History>),
}

impl Payload {
    /// The resource this payload belongs to.
    pub fn resource(&self) -> Resource {
        match self {
            Payload::SerialNumber(_) => Resource::SerialNumber,
            Payload::Version(_) => Resource::Version,
            Payload::RobotPose(_) => Resource::RobotPose,
            Payload::PngMap(_) => Resource::PngMap,
            Payload::CommandState(_) => Resource::CommandState,
            Payload::LastCommandResult(_) => Resource::LastCommandResult,
            Payload::Locations(_) => Resource::Locations,
            Payload::Shelves(_) => Resource::Shelves,
            Payload::AutoHomingEnabled(_) => Resource::AutoHomingEnabled,
            Payload::ManualControlEnabled(_) => Resource::ManualControlEnabled,
            Payload::Odometry(_) => Resource::Odometry,
            Payload::HistoryList(_) => Resource::HistoryList,
        }
    }
}

/// Bytes as base64 in human-readable formats, raw bytes otherwise.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(Base64Visitor)
        } else {
            deserializer.deserialize_byte_buf(BytesVisitor)
        }
    }

    struct Base64Visitor;

    impl Visitor<'_> for Base64Visitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a base64 string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            STANDARD.decode(v).map_err(E::custom)
        }
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a byte array")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element::<u8>()? {
                out.push(byte);
            }
            Ok(out)
        }
    }
}
