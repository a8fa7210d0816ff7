use super::{Activity, StopReason};
use crate::{
    claim_check::ClaimCheck,
    errors::ActivityError,
    task::{ActivityFailure, ActivityTask, Workflow},
};
use serde_json::Value;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Static description of a kind of activity
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Constructor)]
pub struct ActivityType {
    pub name: String,
    /// How long the service waits between heartbeats before it considers the task lost
    pub heartbeat_timeout: Duration,
}

impl ActivityType {
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Heartbeat every half timeout, so one slow round trip doesn't let the task expire. Zero for
    /// timeouts under 2ns, which [Activity::new] rejects.
    pub fn default_heartbeat_interval(&self) -> Duration {
        self.heartbeat_timeout / 2
    }
}

/// Business logic for one kind of activity
#[async_trait::async_trait]
pub trait ActivityFunction: Send + Sync + 'static {
    fn activity_type() -> ActivityType
    where
        Self: Sized;

    /// Execute the activity. The returned error is reported as the task's failure.
    ///
    /// Cancellation is cooperative: implementations which care should watch
    /// [ActContext::cancelled]. A result produced after cancellation has been decided is dropped.
    async fn run(&self, ctx: ActContext, input: Value, env: Value)
        -> Result<Value, ActivityFailure>;

    /// Halt in-flight work. `forceful` asks for an immediate rather than a graceful stop. Stopping
    /// cannot fail; returning means the activity is done with its work.
    async fn stop(&self, reason: StopReason, forceful: bool);
}

/// Handed to [ActivityFunction::run] for access to the activity's identity and cancellation
#[derive(Debug, Clone)]
pub struct ActContext {
    activity_id: String,
    activity_type: String,
    workflow: Arc<Workflow>,
    cancellation_token: CancellationToken,
}

impl ActContext {
    pub(crate) fn new(
        activity_id: String,
        activity_type: String,
        workflow: Arc<Workflow>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            activity_id,
            activity_type,
            workflow,
            cancellation_token,
        }
    }

    /// The `<activity type>-<activity id>` identity of the executing activity
    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Resolves once a stop has been initiated for this activity
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// Per-activity execution settings
#[derive(Clone, derive_builder::Builder)]
#[builder(default)]
pub struct ActivityOptions {
    /// Overrides the interval derived from the activity type's heartbeat timeout
    #[builder(setter(strip_option))]
    pub heartbeat_interval: Option<Duration>,
    /// Used to resolve claim-checked inputs and to externalize oversized results
    #[builder(setter(strip_option))]
    pub claim_check: Option<Arc<dyn ClaimCheck>>,
    /// Results whose serialized size exceeds this many bytes are externalized. Ignored without a
    /// `claim_check`.
    #[builder(setter(strip_option))]
    pub externalize_threshold: Option<usize>,
    /// Buffer size of the [super::ActivityEvent] channel
    pub event_capacity: usize,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: None,
            claim_check: None,
            externalize_threshold: None,
            event_capacity: 32,
        }
    }
}

impl Debug for ActivityOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityOptions")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("claim_check", &self.claim_check.is_some())
            .field("externalize_threshold", &self.externalize_threshold)
            .field("event_capacity", &self.event_capacity)
            .finish()
    }
}

/// Binds an [ActivityFunction] to its type and options, and creates an [Activity] for each task
/// dispatched to it.
pub struct ActivityDefinition<A> {
    activity_type: ActivityType,
    handler: Arc<A>,
    options: ActivityOptions,
}

impl<A: ActivityFunction> ActivityDefinition<A> {
    pub fn new(handler: A) -> Self {
        Self::with_options(handler, ActivityOptions::default())
    }

    pub fn with_options(handler: A, options: ActivityOptions) -> Self {
        Self {
            activity_type: A::activity_type(),
            handler: Arc::new(handler),
            options,
        }
    }

    pub fn activity_type(&self) -> &ActivityType {
        &self.activity_type
    }

    pub fn create(
        &self,
        workflow: Arc<Workflow>,
        task: ActivityTask,
    ) -> Result<Activity<A>, ActivityError> {
        Activity::new(
            workflow,
            self.activity_type.clone(),
            task,
            self.handler.clone(),
            self.options.clone(),
        )
    }
}
