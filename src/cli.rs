//! CLI argument parsing for lineage

use crate::tracer::ChildOutput;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};
use nix::unistd::Pid;

/// Output format for the process tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented tree of command lines (default)
    Tree,
    /// JSON format for machine parsing
    Json,
    /// One command line per line
    Plain,
}

#[derive(Parser, Debug)]
#[command(name = "lineage")]
#[command(version)]
#[command(
    about = "Trace a process and all of its descendants, then print who ran what and where",
    long_about = None
)]
pub struct Cli {
    /// Attach to a running process by PID (mutually exclusive with command)
    #[arg(
        short,
        long,
        value_name = "PID",
        value_parser = clap::value_parser!(i32).range(1..)
    )]
    pub attach: Option<i32>,

    /// Write output to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Exclude processes with an argument matching the regular expression PATTERN
    #[arg(short, long, value_name = "PATTERN")]
    pub exclude: Option<String>,

    /// Redirect the command's stdout and stderr to /dev/null
    #[arg(short, long)]
    pub silent: bool,

    /// Redirect the command's stdout to stderr
    #[arg(short, long)]
    pub redirect: bool,

    /// Exclude environments from output
    #[arg(short, long = "no-env")]
    pub no_env: bool,

    /// Output format
    #[arg(
        short,
        long,
        value_enum,
        ignore_case = true,
        default_value_t = OutputFormat::Tree
    )]
    pub format: OutputFormat,

    /// Log tracer events to stderr (filter with RUST_LOG)
    #[arg(long)]
    pub debug: bool,

    /// Command to trace
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// How the root tracee comes to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Attach(Pid),
    Spawn(Vec<String>),
}

impl Cli {
    /// Check that exactly one of `--attach` and a command was given.
    pub fn mode(&self) -> Result<Mode, clap::Error> {
        match (self.attach, self.command.is_empty()) {
            (Some(_), false) => Err(Self::command().error(
                ErrorKind::ArgumentConflict,
                "Cannot specify both --attach PID and a command",
            )),
            (Some(pid), true) => Ok(Mode::Attach(Pid::from_raw(pid))),
            (None, false) => Ok(Mode::Spawn(self.command.clone())),
            (None, true) => Err(Self::command().error(
                ErrorKind::MissingRequiredArgument,
                "Must specify either --attach PID or a command",
            )),
        }
    }

    /// Where the spawned command's output goes; `--silent` wins over `--redirect`.
    pub fn child_output(&self) -> ChildOutput {
        if self.silent {
            ChildOutput::Silent
        } else if self.redirect {
            ChildOutput::Redirect
        } else {
            ChildOutput::Inherit
        }
    }
}
