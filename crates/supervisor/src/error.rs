// Text Analysis Desktop - Errors
// Supervisor and IPC error types and their user-facing classification

use std::time::Duration;

use serde::Serialize;

use crate::process::BackendExit;

/// How a failure is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// Spawn error or readiness timeout. Fatal while no window exists yet.
    StartupFailure,
    /// Backend exited while the window is open. Reported, never fatal.
    RuntimeCrash,
    /// The OS refused a privileged operation requested over IPC.
    PermissionDenied,
    /// Anything that escaped the supervisor's own control flow.
    UnhandledShellFault,
}

/// Errors raised by the supervisor lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to launch backend `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend did not become ready at {url} within {timeout:?} ({attempts} attempts)")]
    ReadinessTimeout {
        url: String,
        timeout: Duration,
        attempts: u32,
    },

    #[error("readiness probe failed: {0}")]
    Probe(String),

    #[error("backend exited during startup ({0})")]
    ExitedDuringStartup(BackendExit),

    #[error("startup cancelled by shutdown")]
    Cancelled,

    #[error("failed to open main window: {0}")]
    Window(String),

    #[error("failed to terminate backend (pid {pid}): {source}")]
    Terminate {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

impl SupervisorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SupervisorError::Spawn { .. }
            | SupervisorError::ReadinessTimeout { .. }
            | SupervisorError::Probe(_)
            | SupervisorError::ExitedDuringStartup(_)
            | SupervisorError::Window(_) => ErrorClass::StartupFailure,
            SupervisorError::Cancelled
            | SupervisorError::Terminate { .. }
            | SupervisorError::InvalidTransition { .. } => ErrorClass::UnhandledShellFault,
        }
    }

    /// Whether the failure should be shown to the user as a blocking dialog.
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::StartupFailure)
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors returned to the hosted UI from the IPC boundary.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Host(String),
}

impl IpcError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IpcError::PermissionDenied(_) => ErrorClass::PermissionDenied,
            _ => ErrorClass::UnhandledShellFault,
        }
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        IpcError::InvalidPayload(err.to_string())
    }
}

impl Serialize for IpcError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
