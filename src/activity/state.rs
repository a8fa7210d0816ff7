use crate::{errors::ActivityError, task::ActivityFailure};
use serde_json::Value;
use tokio::sync::oneshot;

/// Lifecycle of an [super::Activity]. `Finished`, `Failed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum TaskState {
    Stopped,
    Started,
    Finished,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Canceled)
    }
}

/// Why an activity is being asked to stop. Hosts with reasons of their own use [Self::Other].
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
#[non_exhaustive]
pub enum StopReason {
    /// The host process is shutting down
    ProcessExit,
    /// The workflow service asked for cancellation in a heartbeat response
    HeartbeatCancel,
    /// The workflow service no longer knows about the task or its workflow
    UnknownResource,
    Other(String),
}

/// Observability side channel. Nothing here is required for correctness; the completion future
/// and `request_stop` results are the authoritative signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    /// A heartbeat is about to be sent
    Heartbeat,
    /// A heartbeat round trip finished, successfully or not
    HeartbeatComplete { cancel_requested: bool },
    /// The activity reached `Canceled`
    Canceled(StopReason),
}

/// What `run` produced, as delivered to whoever started the activity
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    /// The run succeeded. Holds the value reported to the service, which is a claim check token
    /// if the result was externalized.
    Completed(Value),
    Failed(ActivityFailure),
}

impl ActivityOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

pub(super) type CompletionResult = Result<ActivityOutcome, ActivityError>;

/// Status plus the guard ensuring only one completion source ever reports a disposition
#[derive(Debug)]
pub(super) struct Lifecycle {
    pub(super) status: TaskState,
    /// Set by whichever of run completion or cancellation gets there first
    pub(super) resolution_claimed: bool,
    /// Where the outcome of `run` goes. Taken by whoever claims the resolution.
    pub(super) completion: Option<oneshot::Sender<CompletionResult>>,
}

impl Lifecycle {
    pub(super) fn new() -> Self {
        Self {
            status: TaskState::Stopped,
            resolution_claimed: false,
            completion: None,
        }
    }

    /// True while heartbeats should keep flowing
    pub(super) fn is_live(&self) -> bool {
        self.status == TaskState::Started && !self.resolution_claimed
    }
}
