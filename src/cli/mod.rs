//! CLI argument definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::command::CommandKind;
use crate::config::CONFIG_ENV;

/// vMix timeline driver - plan and simulate mixer commands from timeline states.
///
/// Robot Mode: Use --robot or --format=json for machine-parseable output.
#[derive(Parser, Debug)]
#[command(name = "vmx", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (text for humans, json for agents/scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "VMX_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors are logged)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Driver config file (.toml, .yaml, .yml)
    #[arg(long, short = 'c', global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts and agents
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile one timeline state offline and print the commands (dry run)
    Plan(PlanArgs),

    /// Replay timeline states through the driver on a virtual clock
    Simulate(SimulateArgs),

    /// Validate a driver config file
    CheckConfig(CheckConfigArgs),

    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// === Argument Structs ===

#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Timeline state file (YAML or JSON)
    pub timeline: PathBuf,

    /// Mixer state to reconcile against (defaults to an empty mixer)
    #[arg(long, short = 'p')]
    pub previous: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Timeline files, applied in order; each holds one state or a list
    #[arg(required = true)]
    pub timelines: Vec<PathBuf>,

    /// Mixer state the simulated device reports on connect
    #[arg(long, short = 'i')]
    pub initial: Option<PathBuf>,

    /// Send the configured make-ready commands first
    #[arg(long)]
    pub make_ready: bool,

    /// Make the simulated device reject a command kind (repeatable)
    #[arg(long = "fail", value_name = "KIND", value_parser = parse_command_kind)]
    pub failing_kinds: Vec<CommandKind>,
}

#[derive(Parser, Debug)]
pub struct CheckConfigArgs {
    /// Config file to check (defaults to --config, then the default location)
    pub path: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

fn parse_command_kind(s: &str) -> Result<CommandKind, String> {
    serde_json::from_value(serde_json::Value::String(s.replace('-', "_")))
        .map_err(|_| format!("unknown command kind '{s}'"))
}
