//! Skein Blueprint
//!
//! This crate contains the serializable blueprint types for skein and the
//! dependency graph built from them. A blueprint is the JSON document a
//! client submits: a named workflow plus a list of task descriptors with
//! `depends_on` edges.
//!
//! Validation is split in two:
//! - [`TaskGraph::build`] rejects duplicate ids and dependencies on unknown
//!   tasks,
//! - [`TaskGraph::topological_sort`] rejects cycles.
//!
//! The engine consumes the graph for scheduling; the graph itself never
//! executes anything.

mod error;
mod graph;
mod task;
mod workflow;

pub use error::{BlueprintError, CycleError};
pub use graph::TaskGraph;
pub use task::{ExtractionSpec, TaskDef, TaskKind};
pub use workflow::BlueprintDef;
