use anyhow::Result;
use clap::Parser;
use mock4rs::cli::{Cli, Commands};
use mock4rs::commands::{self, TestConfig, TestOutcome};
use std::process::ExitCode;

// Exit code for failures of mock4rs itself, as opposed to failing tests.
const TOOL_ERROR: u8 = 2;

fn main() -> ExitCode {
    mock4rs::observability::install_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    match run(cli.command) {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(TOOL_ERROR)
        }
    }
}

fn run(command: Commands) -> Result<TestOutcome> {
    match command {
        Commands::Test {
            crate_dir,
            destination,
            keep,
            instrument_only,
            config,
            skip_unsupported,
            command,
        } => commands::run_tests(TestConfig {
            crate_dir,
            destination,
            config,
            keep,
            instrument_only,
            skip_unsupported,
            command,
        }),
        Commands::File {
            path,
            config,
            skip_unsupported,
        } => {
            let mut stdout = std::io::stdout().lock();
            commands::print_instrumented(&path, config.as_deref(), skip_unsupported, &mut stdout)?;
            Ok(TestOutcome::Passed)
        }
        Commands::Init { crate_dir, force } => {
            commands::init_config(&crate_dir, force)?;
            Ok(TestOutcome::Passed)
        }
    }
}

/// Logs go to stderr so `mock4rs file` output stays clean. `RUST_LOG`
/// overrides the level picked by `-v`.
fn init_tracing(verbosity: u8) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
