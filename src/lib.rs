//! Function and trait stubbing for Rust tests through source rewriting.
//!
//! `mock4rs test` copies a crate, prepends an interception guard to every
//! function and method, adds a `Mock<Trait>` type next to every trait, and
//! runs the tests against that copy. Inside the tests, [`runtime::when`]
//! and [`runtime::record`] describe which calls return canned values.
//!
//! Instrumented crates depend on `mock4rs` with `default-features = false`,
//! which compiles only [`runtime`].

pub mod runtime;

#[cfg(feature = "instrument")]
pub mod cli;
#[cfg(feature = "instrument")]
pub mod commands;
#[cfg(feature = "instrument")]
pub mod config;
#[cfg(feature = "instrument")]
pub mod errors;
#[cfg(feature = "instrument")]
pub mod instrument;
#[cfg(feature = "instrument")]
pub mod observability;
#[cfg(feature = "instrument")]
pub mod workspace;

#[cfg(feature = "instrument")]
pub use crate::config::Mock4rsConfig;
#[cfg(feature = "instrument")]
pub use crate::errors::{ErrorCode, Mock4rsError};
#[cfg(feature = "instrument")]
pub use crate::instrument::{
    borrowing_types_of, instrument_file, instrument_file_in_place, instrument_source,
    BorrowingTypes, InstrumentError, InstrumentOptions, Instrumented,
};
