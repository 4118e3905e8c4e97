//! # Storage Layer
//!
//! Configuration and plan files.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Plans | YAML, JSON or TOML (by extension) | any path given on the command line |
//! | Config | TOML | `--config`, `$GANTT_CONFIG` or the user config dir |
//!
//! ## Concurrency Safety
//!
//! - [`PlanStore`] uses file locking (`fs2`) for concurrent access
//! - All writes are atomic (temp file + rename)

mod config;
mod plan;

pub use config::{Config, ConfigError, LogConfig, OutputConfig, OutputFormat, PropagationConfig, CONFIG_ENV};
pub use plan::{Drift, LoadedPlan, Plan, PlanDependency, PlanError, PlanFormat, PlanStore, PlanTask, ScheduleRow};
