use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mock4rs")]
#[command(about = "Stub functions and trait methods by testing an instrumented copy of a crate", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Increase verbosity level (can be repeated: -v, -vv, -vvv)
    /// -v: staging summary
    /// -vv: every rewritten and skipped function
    /// -vvv: all trace output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stage an instrumented copy of a crate and run its tests there
    Test {
        /// Crate to test
        #[arg(default_value = ".")]
        crate_dir: PathBuf,

        /// Directory receiving the staged copy (default: <tmp>/mock4rs)
        #[arg(short = 'd', long = "destination", env = "MOCK4RS_DESTINATION")]
        destination: Option<PathBuf>,

        /// Don't delete the staged copy afterwards
        #[arg(short = 'k', long = "keep")]
        keep: bool,

        /// Only stage the instrumented copy, don't run the tests
        #[arg(short = 'i', long = "instrument-only", requires = "keep")]
        instrument_only: bool,

        /// Configuration file (default: <CRATE_DIR>/.mock4rs.toml)
        #[arg(long = "config")]
        config: Option<PathBuf>,

        /// Log and skip traits that cannot be mocked instead of failing
        #[arg(long = "skip-unsupported")]
        skip_unsupported: bool,

        /// Test command and its arguments (default: cargo test)
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Print the instrumented form of one source file
    File {
        /// Source file to instrument
        path: PathBuf,

        /// Configuration file supplying entry points and trait handling
        #[arg(long = "config")]
        config: Option<PathBuf>,

        /// Log and skip traits that cannot be mocked instead of failing
        #[arg(long = "skip-unsupported")]
        skip_unsupported: bool,
    },

    /// Initialize a .mock4rs.toml configuration file
    Init {
        /// Crate root receiving the file
        #[arg(default_value = ".")]
        crate_dir: PathBuf,

        /// Force overwrite existing config
        #[arg(short = 'f', long = "force")]
        force: bool,
    },
}
