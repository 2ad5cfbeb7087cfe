//! CLI command implementations.
//!
//! - **test**: stage an instrumented copy of a crate and run its tests
//! - **file**: print the instrumented form of one source file
//! - **init**: write a default `.mock4rs.toml`

pub mod file;
pub mod init;

pub use file::print_instrumented;
pub use init::init_config;
pub use test::{run_tests, TestConfig, TestOutcome};
