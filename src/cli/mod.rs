//! # Command-Line Interface
//!
//! User-facing commands over plan files.
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `settle` | Print the plan with every constraint enforced |
//! | `check` | List tasks whose declared dates break a constraint |
//! | `move` | Change one task and show the cascade |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Use `--verbose` (or `-v`) for debug logs on stderr, or `--log-level`:
//! ```bash
//! gantt --log-level trace move plan.yaml Design --begin 2024-04-01
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod plan_cmd;

pub use app::{run, Cli, Commands, LogLevel};
pub use output::{Output, OutputFormat};
