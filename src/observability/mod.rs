//! Crash reports and run context.
//!
//! - **Panic Hook**: prints a structured crash report with context
//! - **Context Tracking**: thread-local run phase and current file
//! - **Progress Tracking**: atomic counters of files staged so far
//!
//! ```ignore
//! use mock4rs::observability::{set_current_file, set_phase, RunPhase};
//!
//! let _phase = set_phase(RunPhase::Instrumenting);
//! for file in &layout.instrumentable {
//!     let _file = set_current_file(file);
//!     // a panic here names the phase and the file
//! }
//! ```

pub mod context;
pub mod panic_hook;

pub use context::{
    get_current_context, get_progress, increment_processed, set_current_file, set_phase,
    set_phase_persistent, set_progress, ContextGuard, RunContext, RunPhase,
};
pub use panic_hook::install_panic_hook;
