//! Calls that cross the service boundary.
//!
//! The same [`RemoteCall`] / [`RemoteReply`] pair is used whether the
//! connection service lives in this process or behind a socket.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Well-known address the connection service is published under.
pub const SERVICE_ADDRESS: &str = "nxtlink.connection";

/// Anything that answers connection service calls.
pub trait RemoteService: Send + Sync {
    fn call(&self, call: RemoteCall) -> Result<RemoteReply>;
}

/// One request to the connection service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RemoteCall {
    Connect {
        client: String,
    },
    SetMotor {
        client: String,
        motor: i32,
        power: i32,
    },
    ConfigureUltrasonicSensor {
        client: String,
        port: i32,
    },
    ReadUltrasonicSensor {
        client: String,
        port: i32,
    },
    GetVersion {
        client: String,
    },
    Shutdown {
        client: String,
    },
}

impl RemoteCall {
    /// Identifier of the calling client.
    pub fn client(&self) -> &str {
        match self {
            RemoteCall::Connect { client }
            | RemoteCall::SetMotor { client, .. }
            | RemoteCall::ConfigureUltrasonicSensor { client, .. }
            | RemoteCall::ReadUltrasonicSensor { client, .. }
            | RemoteCall::GetVersion { client }
            | RemoteCall::Shutdown { client } => client,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            RemoteCall::Connect { .. } => "connect",
            RemoteCall::SetMotor { .. } => "set_motor",
            RemoteCall::ConfigureUltrasonicSensor { .. } => "configure_ultrasonic_sensor",
            RemoteCall::ReadUltrasonicSensor { .. } => "read_ultrasonic_sensor",
            RemoteCall::GetVersion { .. } => "get_version",
            RemoteCall::Shutdown { .. } => "shutdown",
        }
    }
}

/// Broad category of a failed call, preserved across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotConnected,
    RemoteUnavailable,
    PeerNotFound,
    Link,
    TruncatedFrame,
    Protocol,
    InvalidArgument,
}

impl FailureKind {
    /// Both mean "there is nobody to talk to right now".
    pub fn is_unavailable(self) -> bool {
        matches!(self, FailureKind::NotConnected | FailureKind::RemoteUnavailable)
    }
}

/// Answer to a [`RemoteCall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum RemoteReply {
    Done,
    Reading {
        value: u8,
    },
    Version {
        code: i32,
    },
    Failed {
        code: i32,
        kind: FailureKind,
        message: String,
    },
}

impl RemoteReply {
    pub fn failed(err: &ServiceError) -> Self {
        RemoteReply::Failed {
            code: err.code(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Turn a `Failed` reply back into an error.
    pub fn into_result(self) -> Result<RemoteReply> {
        match self {
            RemoteReply::Failed {
                code,
                kind,
                message,
            } => Err(ServiceError::Remote {
                code,
                kind,
                message,
            }),
            other => Ok(other),
        }
    }
}

/// Socket path the service at `address` listens on.
///
/// `$XDG_RUNTIME_DIR/nxtlink/<address>.sock` when a runtime dir is set,
/// otherwise a per-user directory under `/tmp`.
pub fn socket_path_for(address: &str) -> PathBuf {
    let file = format!("{address}.sock");
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join("nxtlink").join(file),
        _ => std::env::temp_dir()
            .join(format!("nxtlink-{}", current_uid()))
            .join(file),
    }
}

#[cfg(unix)]
fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}
