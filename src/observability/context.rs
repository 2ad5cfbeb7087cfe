//! What mock4rs is doing right now, for the crash report.
//!
//! Records which stage of a run is active and which file is being handled,
//! so a panic inside the transformer or the staging code can say where it
//! happened. Progress across the whole crate is kept in atomic counters.
//!
//! Phase and file live in a `thread_local!` and are restored by the guard
//! that set them; the file counters are process-wide atomics.

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static FILES_PROCESSED: AtomicUsize = AtomicUsize::new(0);
static FILES_TOTAL: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CURRENT_CONTEXT: RefCell<RunContext> = const { RefCell::new(RunContext::new()) };
}

/// Snapshot of what mock4rs was doing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    pub phase: Option<RunPhase>,
    /// Source file currently being read, rewritten or copied
    pub current_file: Option<PathBuf>,
}

impl RunContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: None,
            current_file: None,
        }
    }
}

/// Stages of a `mock4rs test` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Loading `.mock4rs.toml`
    Configuration,
    /// Walking the crate and classifying files
    Discovery,
    /// Copying the crate into the destination directory
    Staging,
    /// Rewriting source files
    Instrumenting,
    /// Running the test command inside the staged crate
    Testing,
    /// Removing the staged crate
    Cleanup,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Discovery => write!(f, "discovery"),
            Self::Staging => write!(f, "staging"),
            Self::Instrumenting => write!(f, "instrumenting"),
            Self::Testing => write!(f, "testing"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Restores the previous context when dropped.
pub struct ContextGuard {
    previous: RunContext,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|ctx| {
            *ctx.borrow_mut() = self.previous.clone();
        });
    }
}

/// Enter `phase` until the returned guard drops.
///
/// ```ignore
/// let _phase = set_phase(RunPhase::Staging);
/// stage_crate(&layout, &config)?;
/// ```
#[must_use]
pub fn set_phase(phase: RunPhase) -> ContextGuard {
    CURRENT_CONTEXT.with(|ctx| {
        let previous = ctx.borrow().clone();
        ctx.borrow_mut().phase = Some(phase);
        ContextGuard { previous }
    })
}

/// Enter `phase` without a guard; it stays until the next transition.
pub fn set_phase_persistent(phase: RunPhase) {
    CURRENT_CONTEXT.with(|ctx| {
        ctx.borrow_mut().phase = Some(phase);
    });
}

/// Mark `path` as the file being handled until the returned guard drops.
#[must_use]
pub fn set_current_file(path: impl Into<PathBuf>) -> ContextGuard {
    CURRENT_CONTEXT.with(|ctx| {
        let previous = ctx.borrow().clone();
        ctx.borrow_mut().current_file = Some(path.into());
        ContextGuard { previous }
    })
}

pub fn set_progress(processed: usize, total: usize) {
    FILES_PROCESSED.store(processed, Ordering::Relaxed);
    FILES_TOTAL.store(total, Ordering::Relaxed);
}

pub fn increment_processed() {
    FILES_PROCESSED.fetch_add(1, Ordering::Relaxed);
}

#[must_use]
pub fn get_current_context() -> RunContext {
    CURRENT_CONTEXT.with(|ctx| ctx.borrow().clone())
}

/// Files processed and total, as shown in crash reports.
#[must_use]
pub fn get_progress() -> (usize, usize) {
    (
        FILES_PROCESSED.load(Ordering::Relaxed),
        FILES_TOTAL.load(Ordering::Relaxed),
    )
}

pub fn reset_progress() {
    set_progress(0, 0);
}

pub fn reset_context() {
    CURRENT_CONTEXT.with(|ctx| {
        *ctx.borrow_mut() = RunContext::new();
    });
}
