use nxtlink_frame::FrameError;
use nxtlink_proto::ProtoError;
use nxtlink_transport::TransportError;

use crate::remote::FailureKind;

/// Integer codes returned across the service boundary.
pub mod status {
    pub const SUCCESS: i32 = 0;
    /// Any failure, including "no session" and "service unreachable".
    pub const FAILURE: i32 = 1;
    /// Version code reported when the service is not reachable.
    pub const UNKNOWN_VERSION: i32 = -1;

    pub const PEER_NOT_FOUND: i32 = 2;
    pub const LINK: i32 = 3;
    pub const TRUNCATED_FRAME: i32 = 4;
    pub const PROTOCOL: i32 = 5;
    pub const INVALID_ARGUMENT: i32 = 6;
}

/// What went wrong inside one command exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Reply(#[from] ProtoError),
}

impl ExchangeError {
    /// True when the link can no longer be trusted for further exchanges.
    ///
    /// Any I/O failure counts, whatever its kind: a tty node reports a hung-up
    /// peer as `EIO`, a failed write may have left part of a frame on the
    /// wire, and a timed-out reply would otherwise be read as the answer to
    /// the next request. Only a rejected payload or a complete but unwanted
    /// reply leaves the stream in step.
    pub fn is_link_fatal(&self) -> bool {
        match self {
            ExchangeError::Frame(FrameError::PayloadTooLarge { .. }) => false,
            ExchangeError::Frame(_) => true,
            ExchangeError::Reply(_) => false,
        }
    }
}

/// Errors from the session and connection service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No paired device carries the configured name.
    #[error("no paired device named {0:?}")]
    PeerNotFound(String),

    /// Enumerating or opening the link failed.
    #[error("link error: {0}")]
    Link(#[from] TransportError),

    /// The stream closed in the middle of a reply.
    #[error("{command}: truncated frame (expected {expected} bytes, received {received})")]
    TruncatedFrame {
        command: &'static str,
        expected: usize,
        received: usize,
    },

    /// A command exchange failed.
    #[error("{command} failed: {source}")]
    Protocol {
        command: &'static str,
        #[source]
        source: ExchangeError,
    },

    /// No session is open.
    #[error("not connected")]
    NotConnected,

    /// The connection service cannot be reached.
    #[error("connection service unavailable: {0}")]
    RemoteUnavailable(String),

    /// An argument is outside the range the brick accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ProtoError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service reported a failure on the far side of the boundary.
    #[error("{message}")]
    Remote {
        code: i32,
        kind: FailureKind,
        message: String,
    },
}

impl ServiceError {
    /// Attach the failing command to an exchange error.
    pub fn exchange(command: &'static str, err: ExchangeError) -> Self {
        match err {
            ExchangeError::Frame(FrameError::TruncatedFrame { expected, received }) => {
                ServiceError::TruncatedFrame {
                    command,
                    expected,
                    received,
                }
            }
            source => ServiceError::Protocol { command, source },
        }
    }

    /// Code returned for this error across the service boundary.
    pub fn code(&self) -> i32 {
        match self {
            ServiceError::NotConnected | ServiceError::RemoteUnavailable(_) => status::FAILURE,
            ServiceError::PeerNotFound(_) => status::PEER_NOT_FOUND,
            ServiceError::Link(_) => status::LINK,
            ServiceError::TruncatedFrame { .. } => status::TRUNCATED_FRAME,
            ServiceError::Protocol { .. } | ServiceError::Json(_) => status::PROTOCOL,
            ServiceError::InvalidArgument(_) => status::INVALID_ARGUMENT,
            ServiceError::Remote { code, .. } => *code,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ServiceError::NotConnected => FailureKind::NotConnected,
            ServiceError::RemoteUnavailable(_) => FailureKind::RemoteUnavailable,
            ServiceError::PeerNotFound(_) => FailureKind::PeerNotFound,
            ServiceError::Link(_) => FailureKind::Link,
            ServiceError::TruncatedFrame { .. } => FailureKind::TruncatedFrame,
            ServiceError::Protocol { .. } | ServiceError::Json(_) => FailureKind::Protocol,
            ServiceError::InvalidArgument(_) => FailureKind::InvalidArgument,
            ServiceError::Remote { kind, .. } => *kind,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_variants_share_the_failure_code() {
        assert_eq!(ServiceError::NotConnected.code(), status::FAILURE);
        assert_eq!(
            ServiceError::RemoteUnavailable("gone".into()).code(),
            status::FAILURE
        );
    }

    #[test]
    fn truncated_exchange_becomes_truncated_frame() {
        let err = ServiceError::exchange(
            "read_ultrasonic_sensor",
            ExchangeError::Frame(FrameError::TruncatedFrame {
                expected: 22,
                received: 5,
            }),
        );
        assert!(matches!(
            err,
            ServiceError::TruncatedFrame {
                command: "read_ultrasonic_sensor",
                expected: 22,
                received: 5
            }
        ));
        assert_eq!(err.kind(), FailureKind::TruncatedFrame);
    }

    #[test]
    fn timeout_is_link_fatal_but_bad_status_is_not() {
        let timeout = ExchangeError::Frame(FrameError::Io(std::io::Error::from(
            std::io::ErrorKind::TimedOut,
        )));
        assert!(timeout.is_link_fatal());

        let status = ExchangeError::Reply(ProtoError::Status {
            opcode: 0x10,
            status: 0xDD,
        });
        assert!(!status.is_link_fatal());
    }

    #[test]
    fn uncategorized_io_error_is_link_fatal() {
        // EIO: what a tty node returns once the remote end hangs up.
        let hangup = ExchangeError::Frame(FrameError::Io(std::io::Error::from_raw_os_error(5)));
        assert!(hangup.is_link_fatal());

        let closed = ExchangeError::Frame(FrameError::ConnectionClosed);
        assert!(closed.is_link_fatal());
    }

    #[test]
    fn oversized_payload_is_not_link_fatal() {
        let err = ExchangeError::Frame(FrameError::PayloadTooLarge {
            size: 70_000,
            max: 65_535,
        });
        assert!(!err.is_link_fatal());
    }
}
