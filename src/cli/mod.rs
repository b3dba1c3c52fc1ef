use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::CallflowConfig;
use crate::engine::RunOptions;
use crate::model::graph::Direction;

pub mod output;
pub mod run;

#[derive(Parser, Debug)]
#[command(
    name = "callflow",
    version,
    about = "Static call-graph extraction for Python, JavaScript and TypeScript"
)]
pub struct Cli {
    /// Source files or directories to analyze
    #[arg(required = true, value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Continue past files that fail to parse
    #[arg(long)]
    pub skip_parse_errors: bool,

    /// Suppress informational progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Restrict output to the subgraph around NAME (repeatable)
    #[arg(short = 't', long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Traversal direction for --target: upstream, downstream or both
    #[arg(long, value_name = "DIR")]
    pub direction: Option<Direction>,

    /// Limit traversal depth of the subset filter
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Attribute module-level calls to a <module> node per file
    #[arg(long)]
    pub include_module_scope: bool,

    /// Show only registered tasks, with direct and possible calls between them
    #[arg(long)]
    pub tasks_only: bool,

    /// Output format
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// Explicit configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Exclude paths matching this glob during discovery (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Log level for progress output on stderr
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,

    /// Also list every unresolved call
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Merge flags over configuration values; flags win.
    pub fn run_options(&self, config: &CallflowConfig) -> RunOptions {
        RunOptions {
            skip_parse_errors: self.skip_parse_errors || config.skip_parse_errors,
            quiet: self.quiet || config.quiet,
            target_names: if self.targets.is_empty() {
                config.targets.clone()
            } else {
                self.targets.clone()
            },
            direction: self
                .direction
                .or(config.direction)
                .unwrap_or(Direction::Both),
            max_depth: self.max_depth.or(config.max_depth),
            include_module_scope: self.include_module_scope || config.include_module_scope,
            tasks_only: self.tasks_only || config.tasks_only,
        }
    }

    /// `--quiet` caps logging at warnings.
    pub fn effective_log_level(&self, quiet: bool) -> LogLevel {
        if quiet {
            self.log_level.max(LogLevel::Warn)
        } else {
            self.log_level
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Compact,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
