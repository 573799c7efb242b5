//! Task module - the observed task, its status and its steps.
//!
//! A task is owned by the remote service; this crate only observes it:
//! - `TaskId` validates the opaque identifier before any network call
//! - `TaskStatus` covers both wire statuses and locally derived terminal ones
//! - `StepId` fixes the canonical order that step events are emitted in

mod status;
mod step;
#[allow(clippy::module_inception)]
pub mod task;

pub use status::TaskStatus;
pub use step::{StepId, StepResult};
pub use task::{Task, TaskId, TaskRecord};
