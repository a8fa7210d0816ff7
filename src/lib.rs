//! This crate executes activity tasks dispatched by a durable workflow service. It binds a task to
//! the business logic implementing it, keeps the task alive with heartbeats, honors cooperative
//! cancellation, and guarantees exactly one disposition is reported back to the service.
//!
//! Payloads too large for the service's protocol can travel out-of-band via a [ClaimCheck].

#[macro_use]
extern crate tracing;

pub mod activity;
pub mod claim_check;
mod errors;
mod task;
mod telemetry;

#[cfg(test)]
mod test_help;

pub use activity::{
    ActContext, Activity, ActivityCompletion, ActivityDefinition, ActivityEvent, ActivityFunction,
    ActivityOptions, ActivityOptionsBuilder, ActivityOutcome, ActivityType, StopReason,
    TaskState,
};
pub use claim_check::{
    externalize_payload, is_claim_check, resolve_payload, CheckFormat, ClaimCheck,
    ClaimCheckConfig, ClaimCheckConfigBuilder, FsObjectStore, InMemoryObjectStore, ObjectBody,
    ObjectStore, ObjectStoreClaimCheck,
};
pub use errors::{ActivityError, ClaimCheckError, TaskError, UNKNOWN_RESOURCE_FAULT};
pub use task::{
    ActivityFailure, ActivityTask, ActivityTaskGateway, HeartbeatResponse, RawActivityTask,
    TaskInput, TaskToken, Workflow,
};
pub use telemetry::{telemetry_init, TelemetryOptions, TelemetryOptionsBuilder};
