//! Envelope - the request/response pair carried by a transport.

use serde::{Deserialize, Serialize};

use crate::{
    CommandResult, Cursor, Payload, StartCommandRequest, StartCommandResponse, Velocity,
    Versioned, WireError,
};

/// Default port of the robot API.
pub const DEFAULT_PORT: u16 = 26400;

/// Maximum encoded frame size (PNG maps can be several megabytes).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Discriminator for the remote values a client can poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Resource {
    /// Robot serial number
    SerialNumber = 1,
    /// Robot software version
    Version = 2,
    /// Robot pose on the map
    RobotPose = 3,
    /// Occupancy map as PNG
    PngMap = 4,
    /// Command execution state
    CommandState = 5,
    /// Result of the last finished command
    LastCommandResult = 6,
    /// Registered locations
    Locations = 7,
    /// Registered shelves
    Shelves = 8,
    /// Auto-homing flag (settable)
    AutoHomingEnabled = 9,
    /// Manual-control flag (settable)
    ManualControlEnabled = 10,
    /// Wheel odometry; its velocity is settable
    Odometry = 11,
    /// Finished commands
    HistoryList = 12,
}

impl Resource {
    /// Every resource, in discriminator order.
    pub const ALL: [Resource; 12] = [
        Resource::SerialNumber,
        Resource::Version,
        Resource::RobotPose,
        Resource::PngMap,
        Resource::CommandState,
        Resource::LastCommandResult,
        Resource::Locations,
        Resource::Shelves,
        Resource::AutoHomingEnabled,
        Resource::ManualControlEnabled,
        Resource::Odometry,
        Resource::HistoryList,
    ];

    /// Stable lowercase name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::SerialNumber => "serial_number",
            Resource::Version => "version",
            Resource::RobotPose => "robot_pose",
            Resource::PngMap => "png_map",
            Resource::CommandState => "command_state",
            Resource::LastCommandResult => "last_command_result",
            Resource::Locations => "locations",
            Resource::Shelves => "shelves",
            Resource::AutoHomingEnabled => "auto_homing_enabled",
            Resource::ManualControlEnabled => "manual_control_enabled",
            Resource::Odometry => "odometry",
            Resource::HistoryList => "history_list",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Resource {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Resource::ALL
            .iter()
            .copied()
            .find(|r| *r as u8 == value)
            .ok_or(WireError::InvalidResource(value))
    }
}

/// A write to a settable resource.
///
/// Sets carry no cursor of their own; the change is observed through the
/// resource's get-with-cursor contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SetRequest {
    /// Enable or disable auto-homing.
    AutoHomingEnabled(bool),
    /// Enable or disable manual control.
    ManualControlEnabled(bool),
    /// Drive the base at this speed.
    RobotVelocity(Velocity),
}

impl SetRequest {
    /// The resource this request writes.
    pub fn resource(&self) -> Resource {
        match self {
            SetRequest::AutoHomingEnabled(_) => Resource::AutoHomingEnabled,
            SetRequest::ManualControlEnabled(_) => Resource::ManualControlEnabled,
            SetRequest::RobotVelocity(_) => Resource::Odometry,
        }
    }
}

/// A client-to-server request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Get the first value of `resource` newer than `cursor`.
    Get {
        /// Which value to read.
        resource: Resource,
        /// Answer only with a cursor greater than this one.
        cursor: Cursor,
    },
    /// Write a settable resource.
    Set(SetRequest),
    /// Start a robot command.
    StartCommand(StartCommandRequest),
}

impl Request {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

/// A server-to-client response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Answer to a get.
    Value(Versioned<Payload>),
    /// Answer to a set.
    Ack(CommandResult),
    /// Answer to a start command.
    CommandStarted(StartCommandResponse),
    /// The server could not handle the request.
    Error {
        /// What went wrong.
        message: String,
    },
}

impl Response {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Command, Pose};

    #[test]
    fn get_request_roundtrip() {
        let request = Request::Get {
            resource: Resource::RobotPose,
            cursor: Cursor::new(1_700_000_000_000),
        };

        let bytes = request.to_bytes().unwrap();
        assert_eq!(Request::from_bytes(&bytes).unwrap(), request);
    }

    #[test]
    fn value_response_keeps_cursor() {
        let response = Response::Value(Versioned::new(
            Payload::RobotPose(Pose {
                x: 1.0,
                y: -2.5,
                theta: 0.5,
            }),
            Cursor::new(42),
        ));

        let bytes = response.to_bytes().unwrap();
        match Response::from_bytes(&bytes).unwrap() {
            Response::Value(v) => {
                assert_eq!(v.cursor, Cursor::new(42));
                assert_eq!(v.value.resource(), Resource::RobotPose);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn start_command_roundtrip() {
        let request = Request::StartCommand(StartCommandRequest::new(Command::Speak {
            text: "hello".into(),
        }));

        let bytes = request.to_bytes().unwrap();
        assert_eq!(Request::from_bytes(&bytes).unwrap(), request);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            Response::from_bytes(&[0xc1, 0x00]),
            Err(WireError::Deserialization(_))
        ));
    }

    #[test]
    fn resource_discriminator_roundtrip() {
        for resource in Resource::ALL {
            assert_eq!(Resource::try_from(resource as u8).unwrap(), resource);
        }
    }

    #[test]
    fn invalid_resource_fails() {
        assert!(Resource::try_from(0).is_err());
        assert!(Resource::try_from(13).is_err());
        assert!(Resource::try_from(255).is_err());
    }

    #[test]
    fn set_request_targets_resource() {
        assert_eq!(
            SetRequest::AutoHomingEnabled(true).resource(),
            Resource::AutoHomingEnabled
        );
        assert_eq!(
            SetRequest::ManualControlEnabled(false).resource(),
            Resource::ManualControlEnabled
        );
        assert_eq!(
            SetRequest::RobotVelocity(Velocity::default()).resource(),
            Resource::Odometry
        );
    }
}
