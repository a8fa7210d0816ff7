//! The dispatched unit of work an [crate::Activity] is bound to, and the seam through which its
//! heartbeats and dispositions reach the workflow service.

use crate::errors::TaskError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt::Debug, sync::Arc};

/// Opaque token the workflow service uses to identify one attempt of an activity task
#[derive(Hash, Eq, PartialEq, Clone, Debug, derive_more::From, derive_more::Display)]
pub struct TaskToken(pub String);

impl From<&str> for TaskToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The provider's description of the dispatched task
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Constructor)]
pub struct RawActivityTask {
    pub activity_id: String,
    pub task_token: TaskToken,
}

/// Input handed to the activity, as scheduled by the originating workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub env: Value,
    #[serde(default)]
    pub origin_workflow: String,
}

/// Service reply to a heartbeat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatResponse {
    pub cancel_requested: bool,
}

/// Error reported when an activity's business logic fails
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ActivityFailure {
    pub message: String,
    /// Whatever partial result the activity wanted to report alongside the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ActivityFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<anyhow::Error> for ActivityFailure {
    fn from(e: anyhow::Error) -> Self {
        Self::new(format!("{:#}", e))
    }
}

/// Calls the workflow service makes available to an executing activity. The long-poll loop that
/// produced the task is expected to hand over an implementation bound to the same connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ActivityTaskGateway: Send + Sync {
    /// Tell the service the task is still alive. The response says whether cancellation has been
    /// requested.
    async fn record_activity_heartbeat(
        &self,
        task_token: TaskToken,
    ) -> Result<HeartbeatResponse, TaskError>;

    /// Report successful completion with the activity's result
    async fn respond_activity_completed(
        &self,
        task_token: TaskToken,
        result: Value,
    ) -> Result<(), TaskError>;

    /// Report that the activity's business logic failed
    async fn respond_activity_failed(
        &self,
        task_token: TaskToken,
        failure: ActivityFailure,
    ) -> Result<(), TaskError>;

    /// Report that the activity honored a cancellation
    async fn respond_activity_canceled(&self, task_token: TaskToken) -> Result<(), TaskError>;
}

/// A single dispatched unit of work
#[derive(Clone)]
pub struct ActivityTask {
    pub raw_task: RawActivityTask,
    pub task_input: TaskInput,
    gateway: Arc<dyn ActivityTaskGateway>,
}

impl Debug for ActivityTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTask")
            .field("raw_task", &self.raw_task)
            .field("task_input", &self.task_input)
            .finish_non_exhaustive()
    }
}

impl ActivityTask {
    pub fn new(
        raw_task: RawActivityTask,
        task_input: TaskInput,
        gateway: Arc<dyn ActivityTaskGateway>,
    ) -> Self {
        Self {
            raw_task,
            task_input,
            gateway,
        }
    }

    /// Build a task from the raw JSON input the service delivered, which is expected to look like
    /// `{"input": .., "env": {..}, "originWorkflow": ".."}`.
    pub fn from_raw_input(
        raw_task: RawActivityTask,
        raw_input: &str,
        gateway: Arc<dyn ActivityTaskGateway>,
    ) -> Result<Self, serde_json::Error> {
        let task_input = serde_json::from_str(raw_input)?;
        Ok(Self::new(raw_task, task_input, gateway))
    }

    pub fn activity_id(&self) -> &str {
        &self.raw_task.activity_id
    }

    pub fn task_token(&self) -> &TaskToken {
        &self.raw_task.task_token
    }

    pub async fn send_heartbeat(&self) -> Result<HeartbeatResponse, TaskError> {
        self.gateway
            .record_activity_heartbeat(self.task_token().clone())
            .await
    }

    pub async fn respond_success(&self, result: Value) -> Result<(), TaskError> {
        self.gateway
            .respond_activity_completed(self.task_token().clone(), result)
            .await
    }

    pub async fn respond_failed(&self, failure: ActivityFailure) -> Result<(), TaskError> {
        self.gateway
            .respond_activity_failed(self.task_token().clone(), failure)
            .await
    }

    pub async fn respond_canceled(&self) -> Result<(), TaskError> {
        self.gateway
            .respond_activity_canceled(self.task_token().clone())
            .await
    }
}

/// Back-reference to the workflow that scheduled the activity. Activities hold it but never act
/// on it.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Constructor)]
pub struct Workflow {
    pub workflow_id: String,
    pub workflow_type: String,
}
