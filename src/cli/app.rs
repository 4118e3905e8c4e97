//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use super::output::{Output, OutputFormat};
use super::plan_cmd;
use crate::logging;
use crate::storage::{Config, CONFIG_ENV};

#[derive(Parser)]
#[command(name = "gantt")]
#[command(author, version, about = "Keep a Gantt plan consistent with its dependencies")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the config's output.format)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log level (overrides --verbose and GANTT_LOG)
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file to use instead of the user config
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Log levels accepted by `--log-level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the plan with every constraint enforced
    Settle {
        /// Plan file (YAML, JSON or TOML)
        plan: PathBuf,

        /// Write the settled dates back to the plan file
        #[arg(long)]
        write: bool,
    },

    /// List tasks whose declared dates break a constraint
    Check {
        /// Plan file (YAML, JSON or TOML)
        plan: PathBuf,
    },

    /// Change a task's dates and show what moved with it
    Move {
        /// Plan file (YAML, JSON or TOML)
        plan: PathBuf,

        /// Name of the task to change
        task: String,

        /// New begin date (the task keeps its length)
        #[arg(long)]
        begin: Option<NaiveDate>,

        /// New end date
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Write the resulting dates back to the plan file
        #[arg(long)]
        write: bool,
    },
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    logging::init_logging(cli.log_level, cli.verbose, config.log.level.as_deref())?;
    debug!(config = ?cli.config, max_steps = config.propagation.max_steps, "gantt starting");

    let format = cli
        .format
        .unwrap_or_else(|| OutputFormat::from(config.output.format));
    let output = Output::new(format);

    match cli.command {
        Commands::Settle { plan, write } => plan_cmd::settle(&output, &config, &plan, write)?,
        Commands::Check { plan } => plan_cmd::check(&output, &config, &plan)?,
        Commands::Move {
            plan,
            task,
            begin,
            end,
            write,
        } => plan_cmd::move_task(
            &output,
            &config,
            &plan,
            plan_cmd::MoveRequest { task, begin, end },
            write,
        )?,
    }

    debug!("command completed");
    Ok(())
}
