//! Thin CLI wrapper around the `cmk2bp` pipeline (§10.4). Reads a
//! `CMakeLists.txt`, builds a [`PipelineConfig`] from an optional TOML file
//! plus flag overrides, wires the real adapters, runs the pipeline, and
//! either prints a summary of the frozen model or renders diagnostics and
//! exits non-zero.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cmk2bp::adapters::{RealClockEnv, RealProcessRunner, RealWorkspaceIo};
use cmk2bp::config::{CompatProfile, ConfigOverrides, PipelineConfig};
use cmk2bp::pipeline::{run_pipeline, PipelineInputs};

/// Translates a CMake script into a validated, frozen build model.
#[derive(Debug, Parser)]
#[command(name = "cmk2bp", version, about)]
struct Cli {
    /// Path to the entry CMakeLists.txt.
    input: PathBuf,

    /// Optional TOML configuration file (see PipelineConfig).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Promote WARNING diagnostics to ERROR.
    #[arg(long)]
    strict: bool,

    /// STRICT / CMAKE_3_X / LENIENT.
    #[arg(long, value_name = "PROFILE")]
    compat_profile: Option<CompatProfile>,

    #[arg(long)]
    max_block_depth: Option<usize>,

    #[arg(long)]
    max_paren_depth: Option<usize>,

    /// Append unsupported-command telemetry to this file.
    #[arg(long)]
    unsupported_log: Option<PathBuf>,

    /// Treat `input`'s parent directory as both the source and binary dir.
    #[arg(long)]
    binary_dir: Option<PathBuf>,

    /// Print a summary of the frozen model on success.
    #[arg(long)]
    dump_model: bool,

    /// Increase log verbosity (-v, -vv). Otherwise controlled by RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn install_tracing(verbosity: u8) {
    use tracing_subscriber::EnvFilter;
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    let source = match std::fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to read {}: {e}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_or_default(path),
        None => PipelineConfig::default(),
    };
    config.apply_overrides(ConfigOverrides {
        strict_mode: cli.strict,
        compat_profile: cli.compat_profile,
        max_block_depth: cli.max_block_depth,
        max_paren_depth: cli.max_paren_depth,
        unsupported_commands_log: cli.unsupported_log,
    });

    let source_dir = cli.input.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let binary_dir = cli.binary_dir.unwrap_or_else(|| source_dir.clone());
    let entry_file = cli.input.file_name().map(PathBuf::from).unwrap_or_else(|| cli.input.clone());

    let workspace_io = RealWorkspaceIo;
    let process_runner = RealProcessRunner;
    let mut clock_env = RealClockEnv::default();

    let outcome = run_pipeline(
        &source,
        &config,
        PipelineInputs {
            workspace_io: &workspace_io,
            process_runner: &process_runner,
            clock_env: &mut clock_env,
            source_dir,
            binary_dir,
            entry_file,
        },
    );

    for diag in outcome.diagnostics.records() {
        eprintln!("{}", diag.format());
    }
    eprintln!("{}", outcome.diagnostics.emit_summary());

    match outcome.model {
        Some(model) if !outcome.diagnostics.has_errors() => {
            if cli.dump_model {
                println!("project: {}", model.project_name.as_deref().unwrap_or("<none>"));
                if !model.project_languages.is_empty() {
                    println!("languages: {}", model.project_languages.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "));
                }
                println!(
                    "platform: windows={} unix={} apple={} linux={}",
                    model.is_windows, model.is_unix, model.is_apple, model.is_linux
                );
                for target in &model.targets {
                    println!("target {} ({:?}): {} source(s)", target.name, target.ty, target.sources.len());
                }
                for test in &model.tests {
                    println!("test {}: {}", test.name, test.command);
                }
            }
            ExitCode::SUCCESS
        }
        _ => ExitCode::FAILURE,
    }
}
