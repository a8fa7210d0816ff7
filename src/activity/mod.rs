//! Execution of a single dispatched activity task: runs the business logic, keeps the task alive
//! with heartbeats, honors cooperative cancellation and reports exactly one disposition back to
//! the workflow service.

mod definition;
mod heartbeat;
mod state;

pub use definition::{
    ActContext, ActivityDefinition, ActivityFunction, ActivityOptions, ActivityOptionsBuilder,
    ActivityType,
};
pub use state::{ActivityEvent, ActivityOutcome, StopReason, TaskState};

use crate::{
    claim_check::{externalize_payload, resolve_payload},
    errors::ActivityError,
    task::{ActivityFailure, ActivityTask, Workflow},
};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use state::{CompletionResult, Lifecycle};
use std::{
    any::Any,
    fmt::Debug,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::{broadcast, oneshot},
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Binds one [ActivityTask] to the [ActivityFunction] which executes it.
///
/// Cloning is cheap and yields another handle to the same activity.
pub struct Activity<A> {
    inner: Arc<ActivityInner<A>>,
}

impl<A> Debug for Activity<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activity")
            .field("id", &self.inner.id)
            .field("task_status", &self.inner.lifecycle.lock().status)
            .finish_non_exhaustive()
    }
}

impl<A> Clone for Activity<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct ActivityInner<A> {
    id: String,
    activity_type: ActivityType,
    task: ActivityTask,
    workflow: Arc<Workflow>,
    handler: Arc<A>,
    heartbeat_interval: Duration,
    options: ActivityOptions,
    lifecycle: Mutex<Lifecycle>,
    events: broadcast::Sender<ActivityEvent>,
    /// Tripped on any resolution to tear down the heartbeat loop
    heartbeat_shutdown: CancellationToken,
    /// Tripped when a stop is initiated, observable by `run` through [ActContext]
    cancellation_token: CancellationToken,
}

impl<A: ActivityFunction> Activity<A> {
    pub fn new(
        workflow: Arc<Workflow>,
        activity_type: ActivityType,
        task: ActivityTask,
        handler: Arc<A>,
        options: ActivityOptions,
    ) -> Result<Self, ActivityError> {
        if activity_type.default_heartbeat_interval().is_zero() {
            return Err(ActivityError::InvalidHeartbeatTimeout(activity_type.name));
        }
        let heartbeat_interval = options
            .heartbeat_interval
            .filter(|i| !i.is_zero())
            .unwrap_or_else(|| activity_type.default_heartbeat_interval());
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Ok(Self {
            inner: Arc::new(ActivityInner {
                id: format!("{}-{}", activity_type.name, task.activity_id()),
                activity_type,
                task,
                workflow,
                handler,
                heartbeat_interval,
                options,
                lifecycle: Mutex::new(Lifecycle::new()),
                events,
                heartbeat_shutdown: CancellationToken::new(),
                cancellation_token: CancellationToken::new(),
            }),
        })
    }

    /// `<activity type name>-<activity id>`
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn task_status(&self) -> TaskState {
        self.inner.lifecycle.lock().status
    }

    pub fn activity_type(&self) -> &ActivityType {
        &self.inner.activity_type
    }

    pub fn task(&self) -> &ActivityTask {
        &self.inner.task
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.inner.workflow
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.inner.heartbeat_interval
    }

    /// Subscribe to heartbeat and cancellation events. Only events sent after subscribing are
    /// received.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.inner.events.subscribe()
    }

    /// Start executing the activity, at most once. Fails with [ActivityError::NoRuntime] outside of
    /// a tokio runtime.
    ///
    /// The activity is `Started` by the time this returns. The returned future resolves when `run`
    /// completes and its disposition has been reported, or with [ActivityError::Canceled] as soon
    /// as a cancellation wins instead.
    pub fn start(&self) -> Result<ActivityCompletion, ActivityError> {
        let runtime = Handle::try_current().map_err(|source| ActivityError::NoRuntime {
            activity_id: self.inner.id.clone(),
            source,
        })?;
        let (tx, rx) = oneshot::channel();
        {
            let mut lc = self.inner.lifecycle.lock();
            if lc.status != TaskState::Stopped || lc.resolution_claimed {
                return Err(self.inner.invalid_state("start", lc.status));
            }
            lc.status = TaskState::Started;
            lc.completion = Some(tx);
        }
        debug!(activity_id = %self.inner.id, "Activity started");
        runtime.spawn(heartbeat::heartbeat_loop(self.inner.clone()));
        runtime.spawn(self.inner.clone().execute());
        Ok(ActivityCompletion {
            activity_id: self.inner.id.clone(),
            rx,
        })
    }

    /// Ask the activity to stop, eg because the host is shutting down. Works whether or not the
    /// activity has been started, as long as it has not already been resolved. `forceful` is
    /// passed through to [ActivityFunction::stop].
    ///
    /// Resolves once the activity is `Canceled` and the cancellation has been reported.
    pub async fn request_stop(
        &self,
        reason: StopReason,
        forceful: bool,
    ) -> Result<(), ActivityError> {
        self.inner.cancel(reason, forceful, true).await
    }
}

impl<A: ActivityFunction> ActivityInner<A> {
    fn invalid_state(&self, operation: &'static str, state: TaskState) -> ActivityError {
        ActivityError::InvalidState {
            activity_id: self.id.clone(),
            operation,
            state,
        }
    }

    fn emit(&self, event: ActivityEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn execute(self: Arc<Self>) {
        let span = info_span!(
            "RunActivity",
            activity_id = %self.id,
            activity_type = %self.activity_type.name
        );
        let result = self.run_handler().instrument(span).await;
        self.on_run_complete(result).await;
    }

    async fn run_handler(&self) -> Result<Value, ActivityFailure> {
        let input = self.task.task_input.input.clone();
        let env = self.task.task_input.env.clone();
        let input = match &self.options.claim_check {
            Some(cc) => resolve_payload(cc.as_ref(), input).await.map_err(|e| {
                ActivityFailure::new(format!("Failed to retrieve claim-checked input: {}", e))
            })?,
            None => input,
        };
        let ctx = ActContext::new(
            self.id.clone(),
            self.activity_type.name.clone(),
            self.workflow.clone(),
            self.cancellation_token.clone(),
        );
        let result = match AssertUnwindSafe(self.handler.run(ctx, input, env))
            .catch_unwind()
            .await
        {
            Ok(r) => r?,
            Err(e) => {
                return Err(ActivityFailure::new(format!(
                    "Activity function panicked: {}",
                    panic_formatter(e)
                )))
            }
        };
        match (&self.options.claim_check, self.options.externalize_threshold) {
            (Some(cc), Some(threshold)) => externalize_payload(cc.as_ref(), result, threshold)
                .await
                .map_err(|e| ActivityFailure::new(format!("Failed to externalize result: {}", e))),
            _ => Ok(result),
        }
    }

    async fn on_run_complete(&self, result: Result<Value, ActivityFailure>) {
        let completion = {
            let mut lc = self.lifecycle.lock();
            if !lc.is_live() {
                debug!(activity_id = %self.id, status = %lc.status,
                       "Discarding run result of an already resolved activity");
                return;
            }
            lc.resolution_claimed = true;
            lc.status = if result.is_ok() {
                TaskState::Finished
            } else {
                TaskState::Failed
            };
            lc.completion.take()
        };
        self.heartbeat_shutdown.cancel();

        let reported = match result {
            Ok(value) => self
                .task
                .respond_success(value.clone())
                .await
                .map(|_| ActivityOutcome::Completed(value)),
            Err(failure) => {
                info!(activity_id = %self.id, error = %failure, "Activity failed");
                self.task
                    .respond_failed(failure.clone())
                    .await
                    .map(|_| ActivityOutcome::Failed(failure))
            }
        }
        .map_err(ActivityError::from);
        if let Err(e) = &reported {
            warn!(activity_id = %self.id, error = %e, "Failed to report activity disposition");
        }
        if let Some(tx) = completion {
            let _ = tx.send(reported);
        }
    }

    /// Converge point of every cancellation source. Claims the resolution up front, so a run
    /// completing while `stop` is in flight is discarded. Sends `respond_canceled` only if
    /// `respond` is set.
    async fn cancel(
        &self,
        reason: StopReason,
        forceful: bool,
        respond: bool,
    ) -> Result<(), ActivityError> {
        {
            let mut lc = self.lifecycle.lock();
            if lc.resolution_claimed || lc.status.is_terminal() {
                return Err(self.invalid_state("stop", lc.status));
            }
            lc.resolution_claimed = true;
            // Dropping the sender resolves the starter's completion with `Canceled`
            lc.completion.take();
        }
        self.heartbeat_shutdown.cancel();
        self.cancellation_token.cancel();
        debug!(activity_id = %self.id, reason = %reason, forceful, "Stopping activity");

        if let Err(e) = AssertUnwindSafe(self.handler.stop(reason.clone(), forceful))
            .catch_unwind()
            .await
        {
            warn!(activity_id = %self.id, panic = %panic_formatter(e),
                  "Activity stop panicked, treating it as stopped");
        }
        self.lifecycle.lock().status = TaskState::Canceled;

        let reported = if respond {
            self.task.respond_canceled().await.map_err(ActivityError::from)
        } else {
            Ok(())
        };
        self.emit(ActivityEvent::Canceled(reason));
        reported
    }
}

/// Resolves with the outcome of an activity's `run`, see [Activity::start]
#[derive(Debug)]
pub struct ActivityCompletion {
    activity_id: String,
    rx: oneshot::Receiver<CompletionResult>,
}

impl Future for ActivityCompletion {
    type Output = Result<ActivityOutcome, ActivityError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.rx.poll_unpin(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(ActivityError::Canceled(this.activity_id.clone())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

fn panic_formatter(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
