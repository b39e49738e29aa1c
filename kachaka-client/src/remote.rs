//! Getters and setters that reach a Kachaka server through a [`Transport`].

use std::sync::Arc;

use async_trait::async_trait;
use kachaka_types::{
    CommandResult, GetRequest, Payload, Request, Resource, Response, SetRequest, Versioned,
};

use crate::error::ClientError;
use crate::handler::{Getter, Setter};
use crate::transport::Transport;

/// Reads one resource and unwraps its payload variant.
pub struct RemoteResource<T> {
    transport: Arc<dyn Transport>,
    resource: Resource,
    extract: fn(Payload) -> Option<T>,
}

impl<T> RemoteResource<T> {
    /// Read `resource`, keeping only payloads `extract` accepts.
    pub fn new(
        transport: Arc<dyn Transport>,
        resource: Resource,
        extract: fn(Payload) -> Option<T>,
    ) -> Self {
        Self {
            transport,
            resource,
            extract,
        }
    }

    /// The resource this getter reads.
    pub fn resource(&self) -> Resource {
        self.resource
    }
}

#[async_trait]
impl<T: Send + 'static> Getter<T> for RemoteResource<T> {
    async fn get(&self, request: GetRequest) -> Result<Versioned<T>, ClientError> {
        let response = self
            .transport
            .call(Request::Get {
                resource: self.resource,
                cursor: request.cursor,
            })
            .await?;

        match response {
            Response::Value(Versioned { value, cursor }) => {
                let returned = value.resource();
                match (self.extract)(value) {
                    Some(value) => Ok(Versioned::new(value, cursor)),
                    None => Err(ClientError::UnexpectedResponse {
                        resource: self.resource,
                        detail: format!("payload for {}", returned),
                    }),
                }
            }
            Response::Error { message } => Err(ClientError::Remote(message)),
            other => Err(ClientError::UnexpectedResponse {
                resource: self.resource,
                detail: describe(&other).to_string(),
            }),
        }
    }
}

/// Writes a settable resource; `request` wraps the value in its set variant.
pub struct RemoteSetter<V> {
    transport: Arc<dyn Transport>,
    request: fn(V) -> SetRequest,
}

impl<V> RemoteSetter<V> {
    /// Write the value built by `request`.
    pub fn new(transport: Arc<dyn Transport>, request: fn(V) -> SetRequest) -> Self {
        Self { transport, request }
    }
}

#[async_trait]
impl<V: Send + 'static> Setter<V, CommandResult> for RemoteSetter<V> {
    async fn set(&self, value: V) -> Result<CommandResult, ClientError> {
        let request = (self.request)(value);
        let resource = request.resource();
        match self.transport.call(Request::Set(request)).await? {
            Response::Ack(result) => {
                tracing::debug!(%resource, success = result.success, "value written");
                Ok(result)
            }
            Response::Error { message } => Err(ClientError::Remote(message)),
            other => Err(ClientError::UnexpectedResponse {
                resource,
                detail: describe(&other).to_string(),
            }),
        }
    }
}

pub(crate) fn describe(response: &Response) -> &'static str {
    match response {
        Response::Value(_) => "value",
        Response::Ack(_) => "ack",
        Response::CommandStarted(_) => "command started",
        Response::Error { .. } => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use kachaka_types::{Cursor, Pose, Velocity};

    fn pose_getter(transport: &MockTransport) -> RemoteResource<Pose> {
        RemoteResource::new(
            Arc::new(transport.clone()),
            Resource::RobotPose,
            |payload| match payload {
                Payload::RobotPose(pose) => Some(pose),
                _ => None,
            },
        )
    }

    #[tokio::test]
    async fn get_sends_resource_and_cursor() {
        let transport = MockTransport::new();
        let pose = Pose {
            x: 1.0,
            y: 2.0,
            theta: 0.5,
        };
        transport.queue_response(Response::Value(Versioned::new(
            Payload::RobotPose(pose),
            Cursor::new(8),
        )));

        let value = pose_getter(&transport)
            .get(GetRequest::after(Cursor::new(7)))
            .await
            .unwrap();

        assert_eq!(value, Versioned::new(pose, Cursor::new(8)));
        assert_eq!(
            transport.last_sent(),
            Some(Request::Get {
                resource: Resource::RobotPose,
                cursor: Cursor::new(7),
            })
        );
    }

    #[tokio::test]
    async fn wrong_payload_is_unexpected() {
        let transport = MockTransport::new();
        transport.queue_response(Response::Value(Versioned::new(
            Payload::Version("2.1.0".into()),
            Cursor::new(1),
        )));

        let err = pose_getter(&transport)
            .get(GetRequest::latest())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedResponse {
                resource: Resource::RobotPose,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn server_error_is_remote() {
        let transport = MockTransport::new();
        transport.queue_response(Response::Error {
            message: "unsupported".into(),
        });

        let err = pose_getter(&transport)
            .get(GetRequest::latest())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Remote(m) if m == "unsupported"));
    }

    #[tokio::test]
    async fn flag_write_returns_the_ack() {
        let transport = MockTransport::new();
        transport.queue_response(Response::Ack(CommandResult::failed(3)));

        let flag = RemoteSetter::new(Arc::new(transport.clone()), SetRequest::ManualControlEnabled);
        let result = flag.set(true).await.unwrap();

        assert_eq!(result, CommandResult::failed(3));
        assert_eq!(
            transport.last_sent(),
            Some(Request::Set(SetRequest::ManualControlEnabled(true)))
        );
    }

    #[tokio::test]
    async fn velocity_write_is_rejected_remotely() {
        let transport = MockTransport::new();
        transport.queue_response(Response::Error {
            message: "manual control disabled".into(),
        });

        let setter = RemoteSetter::new(Arc::new(transport.clone()), SetRequest::RobotVelocity);
        let velocity = Velocity {
            linear: 0.2,
            angular: 0.0,
        };
        let err = setter.set(velocity).await.unwrap_err();

        assert!(matches!(err, ClientError::Remote(m) if m == "manual control disabled"));
        assert_eq!(
            transport.last_sent(),
            Some(Request::Set(SetRequest::RobotVelocity(velocity)))
        );
    }
}
