//! Scheduling domain: tasks, dependencies and the constraint graph
//!
//! Contains the propagation engine without any I/O concerns.

mod acyclic;
mod dependency;
mod enforcer;
mod graph;
mod id;
mod propagation;
mod task;

pub use dependency::{compute_implied_end, compute_implied_start, Boundary, Dependency, DependencyType};
pub use graph::{GraphError, TaskGraph};
pub use id::TaskId;
pub use propagation::{Propagation, PropagationLimits, DEFAULT_MAX_STEPS};
pub use task::{PropertyChange, Span, Subscription, Task, TaskError};
