use crate::{
    activity::{
        ActContext, Activity, ActivityEvent, ActivityFunction, ActivityOptions, ActivityType,
        StopReason,
    },
    errors::TaskError,
    task::{
        ActivityFailure, ActivityTask, ActivityTaskGateway, HeartbeatResponse, RawActivityTask,
        TaskInput, TaskToken, Workflow,
    },
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::broadcast;

pub(crate) const SCRIPTED_ACTIVITY_NAME: &str = "foo";

pub(crate) fn test_workflow() -> Arc<Workflow> {
    Arc::new(Workflow::new("wf-1".to_string(), "fake".to_string()))
}

pub(crate) fn test_task_input() -> TaskInput {
    TaskInput {
        input: json!({"myTask": "input"}),
        env: json!({}),
        origin_workflow: "fake".to_string(),
    }
}

/// A task with the standard test input, backed by a fresh [RecordingGateway]
pub(crate) fn fake_task(activity_id: &str) -> (ActivityTask, Arc<RecordingGateway>) {
    fake_task_with_input(activity_id, test_task_input())
}

pub(crate) fn fake_task_with_input(
    activity_id: &str,
    input: TaskInput,
) -> (ActivityTask, Arc<RecordingGateway>) {
    let gw = Arc::new(RecordingGateway::default());
    (task_with_gateway(activity_id, input, gw.clone()), gw)
}

pub(crate) fn task_with_gateway(
    activity_id: &str,
    input: TaskInput,
    gateway: Arc<dyn ActivityTaskGateway>,
) -> ActivityTask {
    ActivityTask::new(
        RawActivityTask::new(
            activity_id.to_string(),
            TaskToken(format!("tt-{}", activity_id)),
        ),
        input,
        gateway,
    )
}

pub(crate) fn build_activity(
    handler: Arc<ScriptedActivity>,
    task: ActivityTask,
    options: ActivityOptions,
) -> Activity<ScriptedActivity> {
    Activity::new(
        test_workflow(),
        ScriptedActivity::activity_type(),
        task,
        handler,
        options,
    )
    .expect("test activity type is valid")
}

/// Wait until the activity reports it was canceled, returning the reason
pub(crate) async fn wait_for_cancel(events: &mut broadcast::Receiver<ActivityEvent>) -> StopReason {
    loop {
        match events.recv().await {
            Ok(ActivityEvent::Canceled(reason)) => return reason,
            Ok(_) => continue,
            Err(e) => panic!("event channel failed before cancellation: {:?}", e),
        }
    }
}

pub(crate) fn drain_events(events: &mut broadcast::Receiver<ActivityEvent>) -> Vec<ActivityEvent> {
    let mut out = vec![];
    while let Ok(ev) = events.try_recv() {
        out.push(ev);
    }
    out
}

/// Gateway which records every call, and answers heartbeats from a queue of canned responses
/// (falling back to "keep going" once the queue is empty)
#[derive(Default)]
pub(crate) struct RecordingGateway {
    heartbeat_responses: Mutex<VecDeque<Result<HeartbeatResponse, TaskError>>>,
    pub heartbeats: AtomicUsize,
    pub completed: Mutex<Vec<Value>>,
    pub failed: Mutex<Vec<ActivityFailure>>,
    pub canceled: AtomicUsize,
}

impl RecordingGateway {
    pub(crate) fn queue_heartbeat_response(&self, resp: Result<HeartbeatResponse, TaskError>) {
        self.heartbeat_responses.lock().push_back(resp);
    }

    pub(crate) fn heartbeat_count(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub(crate) fn canceled_count(&self) -> usize {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Total number of terminal dispositions reported
    pub(crate) fn disposition_count(&self) -> usize {
        self.completed.lock().len() + self.failed.lock().len() + self.canceled_count()
    }
}

#[async_trait::async_trait]
impl ActivityTaskGateway for RecordingGateway {
    async fn record_activity_heartbeat(
        &self,
        _task_token: TaskToken,
    ) -> Result<HeartbeatResponse, TaskError> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        self.heartbeat_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(HeartbeatResponse::default()))
    }

    async fn respond_activity_completed(
        &self,
        _task_token: TaskToken,
        result: Value,
    ) -> Result<(), TaskError> {
        self.completed.lock().push(result);
        Ok(())
    }

    async fn respond_activity_failed(
        &self,
        _task_token: TaskToken,
        failure: ActivityFailure,
    ) -> Result<(), TaskError> {
        self.failed.lock().push(failure);
        Ok(())
    }

    async fn respond_activity_canceled(&self, _task_token: TaskToken) -> Result<(), TaskError> {
        self.canceled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Activity whose run and stop behavior is scripted by the test
pub(crate) struct ScriptedActivity {
    pub run_delay: Duration,
    pub result: Result<Value, ActivityFailure>,
    pub stop_delay: Duration,
    /// Return early from `run` once cancellation is signalled
    pub honor_cancel: bool,
    pub panic_message: Option<&'static str>,
    /// Panic from `stop` after recording the call
    pub stop_panic_message: Option<&'static str>,
    pub inputs: Mutex<Vec<(Value, Value)>>,
    pub finished_runs: AtomicUsize,
    pub saw_cancel: AtomicBool,
    pub stops: Mutex<Vec<(StopReason, bool)>>,
}

impl Default for ScriptedActivity {
    fn default() -> Self {
        Self {
            run_delay: Duration::from_millis(1),
            result: Ok(json!({"status": "test"})),
            stop_delay: Duration::from_millis(5),
            honor_cancel: false,
            panic_message: None,
            stop_panic_message: None,
            inputs: Default::default(),
            finished_runs: Default::default(),
            saw_cancel: Default::default(),
            stops: Default::default(),
        }
    }
}

impl ScriptedActivity {
    pub(crate) fn succeeding_after(run_delay: Duration, result: Value) -> Self {
        Self {
            run_delay,
            result: Ok(result),
            ..Default::default()
        }
    }

    pub(crate) fn failing_after(run_delay: Duration, failure: ActivityFailure) -> Self {
        Self {
            run_delay,
            result: Err(failure),
            ..Default::default()
        }
    }

    pub(crate) fn stop_calls(&self) -> Vec<(StopReason, bool)> {
        self.stops.lock().clone()
    }

    pub(crate) fn finished_run_count(&self) -> usize {
        self.finished_runs.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ActivityFunction for ScriptedActivity {
    fn activity_type() -> ActivityType {
        ActivityType::new(
            SCRIPTED_ACTIVITY_NAME.to_string(),
            Duration::from_millis(20),
        )
    }

    async fn run(
        &self,
        ctx: ActContext,
        input: Value,
        env: Value,
    ) -> Result<Value, ActivityFailure> {
        self.inputs.lock().push((input, env));
        if let Some(msg) = self.panic_message {
            panic!("{}", msg);
        }
        if self.honor_cancel {
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    return Err(ActivityFailure::new("canceled"));
                }
                _ = tokio::time::sleep(self.run_delay) => {}
            }
        } else {
            tokio::time::sleep(self.run_delay).await;
        }
        self.finished_runs.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }

    async fn stop(&self, reason: StopReason, forceful: bool) {
        self.stops.lock().push((reason, forceful));
        tokio::time::sleep(self.stop_delay).await;
        if let Some(msg) = self.stop_panic_message {
            panic!("{}", msg);
        }
    }
}
