use super::{ActivityEvent, ActivityFunction, ActivityInner, StopReason};
use crate::{errors::ActivityError, task::HeartbeatResponse};
use std::sync::Arc;

/// Keeps the task alive while the activity is running. The first heartbeat goes out right away,
/// then one per heartbeat interval until the activity is resolved.
///
/// A cancel request in a heartbeat response, or the service reporting that the task no longer
/// exists, stops the activity from here.
pub(super) async fn heartbeat_loop<A: ActivityFunction>(activity: Arc<ActivityInner<A>>) {
    let shutdown = activity.heartbeat_shutdown.clone();
    loop {
        if !activity.lifecycle.lock().is_live() {
            break;
        }
        activity.emit(ActivityEvent::Heartbeat);
        let res = activity.task.send_heartbeat().await;
        activity.emit(ActivityEvent::HeartbeatComplete {
            cancel_requested: matches!(
                res,
                Ok(HeartbeatResponse {
                    cancel_requested: true
                })
            ),
        });

        let stop = match res {
            Ok(HeartbeatResponse {
                cancel_requested: true,
            }) => Some((StopReason::HeartbeatCancel, true)),
            Ok(_) => None,
            // Nothing left on the service side to report a cancellation to
            Err(e) if e.is_unknown_resource() => {
                info!(activity_id = %activity.id, error = %e,
                      "Activity task no longer known to the service, canceling");
                Some((StopReason::UnknownResource, false))
            }
            Err(e) => {
                warn!(activity_id = %activity.id, error = %e, "Error when recording heartbeat");
                None
            }
        };
        if let Some((reason, respond)) = stop {
            match activity.cancel(reason, false, respond).await {
                Ok(()) => {}
                Err(ActivityError::InvalidState { state, .. }) => {
                    debug!(activity_id = %activity.id, state = %state,
                           "Activity resolved before heartbeat cancellation could apply");
                }
                Err(e) => {
                    warn!(activity_id = %activity.id, error = %e, "Failed to report cancellation");
                }
            }
            break;
        }

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(activity.heartbeat_interval) => {}
        }
    }
    debug!(activity_id = %activity.id, "Heartbeat loop exiting");
}
