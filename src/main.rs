//! vmx - plan and simulate vMix commands from timeline states.
//!
//! Provides both human-friendly and agent-friendly (robot mode) interfaces.
#![forbid(unsafe_code)]

use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use console::style;
use serde::Serialize;
use tracing::{debug, info};

use vmx::cli::{self, Cli, Commands};
use vmx::config::{self, DriverConfig};
use vmx::error::{Result, VmxError};
use vmx::logging::init_logging;
use vmx::output::{Output, OutputMode, PlanReport, ValidationResult, VersionInfo};
use vmx::reconcile::reconcile;
use vmx::simulate::{simulate_files, SimulationOptions};
use vmx::state::MixerState;
use vmx::timeline::TimelineState;

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> bool {
        option_env!("VERGEN_GIT_DIRTY") == Some("true")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.use_json(), cli.verbose, cli.quiet);

    let output = OutputMode::from_cli(&cli).into_output();
    debug!(command = ?cli.command, "Starting vmx");

    if let Err(e) = run(&cli, output.as_ref()) {
        output.error(&e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli, output: &dyn Output) -> Result<()> {
    match &cli.command {
        None => print_quick_start(cli),
        Some(Commands::Plan(args)) => cmd_plan(cli, output, args),
        Some(Commands::Simulate(args)) => cmd_simulate(cli, output, args),
        Some(Commands::CheckConfig(args)) => cmd_check_config(cli, output, args),
        Some(Commands::Version) => cmd_version(output),
        Some(Commands::Completions(args)) => cmd_completions(args),
    }
}

// === Quick Start ===

/// Prints quick-start help for both humans and agents.
fn print_quick_start(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        print_robot_quick_start()
    } else {
        print_human_quick_start();
        Ok(())
    }
}

#[derive(Serialize)]
struct RobotQuickStart {
    tool: &'static str,
    version: &'static str,
    description: &'static str,
    commands: RobotCommands,
    output_modes: OutputModes,
    config: &'static str,
}

#[derive(Serialize)]
struct RobotCommands {
    plan: &'static str,
    plan_against_state: &'static str,
    simulate: &'static str,
    check_config: &'static str,
}

#[derive(Serialize)]
struct OutputModes {
    human: &'static str,
    robot: &'static str,
    compact: &'static str,
}

fn print_robot_quick_start() -> Result<()> {
    let help = RobotQuickStart {
        tool: "vmx",
        version: build_info::VERSION,
        description: "vMix timeline driver: reconcile timeline states into mixer commands",
        commands: RobotCommands {
            plan: "vmx plan <TIMELINE> --robot",
            plan_against_state: "vmx plan <TIMELINE> --previous <STATE> --robot",
            simulate: "vmx simulate <TIMELINE>... --robot",
            check_config: "vmx check-config [PATH] --robot",
        },
        output_modes: OutputModes {
            human: "--format=text (default)",
            robot: "--robot or --format=json",
            compact: "--format=json-compact",
        },
        config: "--config <PATH> or VMX_CONFIG",
    };
    let json = serde_json::to_string_pretty(&help)
        .map_err(|e| VmxError::Other(format!("serialization failed: {e}")))?;
    println!("{json}");
    Ok(())
}

fn print_human_quick_start() {
    println!(
        "{} {} - vMix timeline driver\n",
        style("vmx").bold().cyan(),
        build_info::VERSION
    );

    println!("{}", style("QUICK START").bold().underlined());
    println!();
    println!("  {}  Commands for one state", style("vmx plan timeline.yaml").green());
    println!(
        "  {}  Against a known mixer state",
        style("vmx plan timeline.yaml -p state.json").green()
    );
    println!("  {}  Replay a show", style("vmx simulate show.yaml").green());
    println!("  {}  Validate config", style("vmx check-config").green());
    println!();

    println!("{}", style("ROBOT MODE").bold().underlined());
    println!();
    println!("  {}  JSON output", style("vmx --robot <command>").cyan());
    println!("  {}  Quick-start JSON", style("vmx --robot").cyan());
    println!();

    println!("Run {} for full help", style("vmx --help").yellow());
}

// === Commands ===

/// Config from `--config`/`VMX_CONFIG`, else the default location if it
/// exists, else built-in defaults.
fn resolve_config(cli: &Cli) -> Result<DriverConfig> {
    if let Some(path) = &cli.config {
        return config::load_config(path);
    }
    match config::default_config_path() {
        Some(path) if path.exists() => config::load_config(path),
        _ => {
            debug!("No config file, using defaults");
            Ok(DriverConfig::default())
        }
    }
}

fn cmd_plan(cli: &Cli, output: &dyn Output, args: &cli::PlanArgs) -> Result<()> {
    let config = resolve_config(cli)?;
    let timeline: TimelineState = config::load_document(&args.timeline)?;
    timeline.validate()?;
    let previous: MixerState = match &args.previous {
        Some(path) => config::load_document(path)?,
        None => MixerState::default(),
    };

    let mapped = timeline.mapped_to(&config.device_id, &config.mappings);
    let result = reconcile(&previous, &mapped);
    info!(commands = result.commands.len(), "Planned timeline state");

    output.plan(&PlanReport {
        time: mapped.time,
        previous: args.previous.as_deref().map(display_path),
        layers: mapped.layers.len(),
        commands: result.commands,
        state: result.state,
    });
    Ok(())
}

fn cmd_simulate(cli: &Cli, output: &dyn Output, args: &cli::SimulateArgs) -> Result<()> {
    let config = resolve_config(cli)?;
    let options = SimulationOptions {
        initial_state: None,
        make_ready: args.make_ready,
        failing_kinds: args.failing_kinds.clone(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(simulate_files(
        config,
        &args.timelines,
        args.initial.as_deref(),
        options,
    ))?;

    output.simulation(&report);
    Ok(())
}

fn cmd_check_config(cli: &Cli, output: &dyn Output, args: &cli::CheckConfigArgs) -> Result<()> {
    let path: PathBuf = args
        .path
        .clone()
        .or_else(|| cli.config.clone())
        .or_else(config::default_config_path)
        .ok_or_else(|| VmxError::ConfigNotFound {
            path: "<no config directory>".to_string(),
        })?;

    let result = ValidationResult::check(&path, config::load_config(&path));
    output.validation_result(&result);

    if result.is_valid() {
        Ok(())
    } else {
        Err(VmxError::ConfigInvalid(format!(
            "{} has {} errors",
            display_path(&path),
            result.summary.error_count
        )))
    }
}

#[allow(clippy::unnecessary_wraps)]
fn cmd_version(output: &dyn Output) -> Result<()> {
    output.version_info(&VersionInfo {
        version: build_info::VERSION,
        git_sha: build_info::git_sha(),
        git_dirty: build_info::git_dirty(),
        build_timestamp: build_info::build_timestamp(),
        rustc_version: build_info::rustc_semver(),
        target: build_info::target(),
    });
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn cmd_completions(args: &cli::CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "vmx", &mut io::stdout());
    Ok(())
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
