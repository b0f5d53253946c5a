//! Shared domain types for conductor.
//!
//! Nothing in this crate performs I/O. It holds the workflow record, the
//! inbound [`ProgressUpdate`] message, and the pure [`reconcile::apply`]
//! merge that folds updates into workflow state.

pub mod reconcile;
pub mod update;
pub mod workflow;

pub use reconcile::{DEDUP_WINDOW, Rejected, apply};
pub use update::ProgressUpdate;
pub use workflow::{LogEntry, Workflow, WorkflowMode, WorkflowStatus, WorkflowSummary};
