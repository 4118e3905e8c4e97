//! gantt-graph - a reactive constraint engine for Gantt schedules
//!
//! A [`TaskGraph`] holds tasks, containers and the precedence dependencies
//! between them. Whenever a task's dates change, the graph pushes dependent
//! tasks later until every dependency holds, and shrink-wraps containers
//! around their children.
//!
//! ```
//! use chrono::NaiveDate;
//! use gantt_graph::{Dependency, DependencyType, Task, TaskGraph};
//!
//! let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
//! let design = Task::new("Design", day(1), day(5)).unwrap();
//! let build = Task::new("Build", day(2), day(4)).unwrap();
//!
//! let graph = TaskGraph::new();
//! graph.add_top_level_all([&design, &build]).unwrap();
//! graph
//!     .add_dependency(Dependency::new(design.clone(), build.clone(), DependencyType::EndStart))
//!     .unwrap();
//! assert_eq!(build.begin_date(), day(5));
//!
//! design.set_end_date(day(8));
//! assert_eq!(build.begin_date(), day(8));
//! ```

pub mod cli;
pub mod domain;
pub mod logging;
pub mod storage;

pub use domain::{
    Dependency, DependencyType, GraphError, Propagation, PropagationLimits, Span, Task, TaskError,
    TaskGraph, TaskId,
};
