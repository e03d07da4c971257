//! Tasks, jobs and their resolution into an ordered execution plan.

mod error;
pub use error::Error;

/// Resource categories, amounts and requests
mod resources;
pub use resources::{Resource, ResourceRequest, Resources};

/// A single command with its resources
mod task;
pub use task::Task;

/// Leaf, sequence and DAG jobs
mod job;
pub use job::{Dag, Job, JobKind};

/// Resolved, ordered task lists
mod plan;
pub use plan::{ExecutionPlan, PlanEntry};
