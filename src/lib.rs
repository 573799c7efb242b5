//! # taskwatch
//!
//! Client-side progress reconciliation for remote long-running tasks.
//!
//! This library provides:
//! - A poll scheduler that watches one task until it reaches a terminal state
//! - Normalization of structurally unstable task snapshots
//! - A deduplicated, ordered event stream for progress displays
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │           TaskWatcher            │
//!        │ (timer, in-flight guard, stop)   │
//!        └────────────────┬─────────────────┘
//!                         │ TaskRecord
//!                         ▼
//!        ┌──────────────────────────────────┐
//!        │            Reconciler            │
//!        │ normalize → dedup → format       │
//!        └────────────────┬─────────────────┘
//!                         │ SessionView
//!                         ▼
//!                ┌─────────────────┐
//!                │  rendering layer│
//!                └─────────────────┘
//! ```
//!
//! ## Poll Flow
//! 1. Validate the task id (no network call for invalid ids)
//! 2. Fetch the whole task state on a fixed interval
//! 3. Discard unchanged snapshots inside the rate-limit window
//! 4. Emit new step events in canonical step order
//! 5. Emit exactly one terminal event and stop
//!
//! ## Modules
//! - `scheduler`: TaskWatcher and its spawned handle
//! - `engine`: per-session reconciliation state
//! - `normalize`: payload shape resolution
//! - `format`: step and terminal messages
//! - `client`: task-status and instruction services

pub mod client;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod event;
pub mod format;
pub mod normalize;
pub mod scheduler;
pub mod session;
pub mod task;
pub mod widget;

pub use client::{ApiError, ApiErrorKind, HttpTaskApi, TaskApi};
pub use config::{Config, WatchSettings};
pub use engine::{Reconciler, TickOutcome};
pub use event::{Event, EventKind};
pub use normalize::WorkflowSnapshot;
pub use scheduler::{TaskWatcher, WatchHandle};
pub use session::{SessionContext, SessionView, WatchPhase};
pub use task::{StepId, Task, TaskId, TaskStatus};
