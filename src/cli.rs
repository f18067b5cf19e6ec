// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `ij`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ij",
    version,
    about = "Run build and CI plans in containers.",
    long_about = None,
    args_conflicts_with_subcommands = true
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub global: GlobalArgs,

    /// Arguments for the default `run` command.
    #[command(flatten)]
    pub run: RunArgs,
}

impl CliArgs {
    /// The command to execute; `run` when none is given.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(self.run.clone()))
    }
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Path to the config file (YAML or TOML).
    #[arg(long, short = 'c', global = true, value_name = "PATH", default_value = "ij.yaml")]
    pub config: PathBuf,

    /// Additional config merged on top of the main one. May repeat.
    #[arg(long = "override", global = true, value_name = "PATH")]
    pub overrides: Vec<PathBuf>,

    /// `KEY=VALUE` (or bare `KEY`, read from the environment). May repeat.
    #[arg(long, short = 'e', global = true, value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// File of `KEY=VALUE` lines. May repeat.
    #[arg(long, global = true, value_name = "PATH")]
    pub env_file: Vec<PathBuf>,

    /// Shorthand for `--log-level debug`.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Disable coloured log output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `IJ_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Plans or metaplans to run, in order (default: `default`).
    #[arg(value_name = "PLAN")]
    pub plans: Vec<String>,

    /// Run every stage sequentially, even those marked parallel.
    #[arg(long)]
    pub force_sequential: bool,

    /// Poll interval for detached container healthchecks, e.g. `2s`.
    #[arg(long, value_name = "DURATION")]
    pub healthcheck_interval: Option<String>,

    /// Keep the run workspace and scripts after the run.
    #[arg(long)]
    pub keep_workspace: bool,

    /// Log in to every configured registry before running.
    #[arg(long)]
    pub login: bool,

    /// SSH identity to make available to containers. May repeat.
    #[arg(long, value_name = "PATH")]
    pub ssh_identity: Vec<String>,

    /// Cancel the run after this long, e.g. `30m`.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run plans (the default).
    Run(RunArgs),
    /// Remove the whole `.ij` scratch directory.
    Clean,
    /// Log in to every configured registry.
    Login,
    /// Log out of every configured registry.
    Logout,
    /// Keep only the newest run directories under `.ij`.
    RotateLogs {
        #[arg(long, default_value_t = 5)]
        keep: usize,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
