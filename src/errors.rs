use crate::activity::TaskState;
use std::string::FromUtf8Error;

/// Fault code the workflow service returns once the task, or the workflow that owns it, no
/// longer exists.
pub const UNKNOWN_RESOURCE_FAULT: &str = "UnknownResourceFault";

/// Errors surfaced by [crate::Activity] operations
#[derive(thiserror::Error, Debug, displaydoc::Display)]
pub enum ActivityError {
    /// Cannot {operation} activity {activity_id} while it is {state}
    InvalidState {
        /// Id of the activity the operation was attempted on
        activity_id: String,
        /// The operation which was rejected. The caller must not retry it on the same activity.
        operation: &'static str,
        /// State the activity was in at the time
        state: TaskState,
    },
    /// Activity type {0} declares a heartbeat timeout too short to derive a heartbeat interval from
    InvalidHeartbeatTimeout(String),
    /// Activity {0} was canceled before its run completed
    Canceled(String),
    /// Activity {activity_id} can only be started from within a tokio runtime
    NoRuntime {
        /// Id of the activity which was not started
        activity_id: String,
        /// Why no runtime handle was available
        source: tokio::runtime::TryCurrentError,
    },
    /// Failed to report to the workflow service: {0}
    Task(#[from] TaskError),
}

/// Errors returned by an [crate::ActivityTaskGateway] when talking to the workflow service
#[derive(thiserror::Error, Debug, displaydoc::Display)]
pub enum TaskError {
    /// Workflow service fault {code}: {message}
    Fault {
        /// Service defined fault code, eg [UNKNOWN_RESOURCE_FAULT]
        code: String,
        /// Human readable description
        message: String,
    },
    /// Error calling the workflow service: {0}
    Transport(#[source] anyhow::Error),
}

impl TaskError {
    /// Build a fault carrying the unknown-resource code
    pub fn unknown_resource(message: impl Into<String>) -> Self {
        Self::Fault {
            code: UNKNOWN_RESOURCE_FAULT.to_string(),
            message: message.into(),
        }
    }

    /// True if the service reported that the task or its workflow is gone. Such a fault means
    /// there is nothing left to respond to.
    pub fn is_unknown_resource(&self) -> bool {
        matches!(self, Self::Fault { code, .. } if code == UNKNOWN_RESOURCE_FAULT)
    }
}

/// Errors produced when externalizing or retrieving claim-checked payloads
#[derive(thiserror::Error, Debug, displaydoc::Display)]
pub enum ClaimCheckError {
    /// {0}
    Backend(#[from] anyhow::Error),
    /// Claim check object {key} is not valid UTF-8: {source}
    InvalidUtf8 {
        /// Storage key of the offending object
        key: String,
        /// Underlying decode error
        source: FromUtf8Error,
    },
    /// Malformed claim check token: {0}
    MalformedCheck(#[from] serde_json::Error),
}
