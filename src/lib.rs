//! Client library for a multi-agent orchestration backend.
//!
//! A submission goes through [`controller::WorkflowController`], which asks the
//! backend for a workflow id, attaches a [`source::StatusSourceAdapter`] and
//! folds every update through the reconciler in `conductor-common`. Renderers
//! observe the resulting [`controller::WorkflowView`] snapshots.

pub mod backend;
pub mod config;
pub mod context;
pub mod controller;
pub mod errors;
pub mod history;
pub mod source;
pub mod ui;

pub use conductor_common::{ProgressUpdate, Workflow, WorkflowMode, WorkflowStatus, WorkflowSummary};
