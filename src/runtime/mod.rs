//! Call-matching runtime linked into instrumented crates.
//!
//! Instrumented bodies start with a guard that hands the call to
//! [`intercept`]. Tests declare expectations inside [`record`]:
//!
//! ```rust,ignore
//! use mock4rs::runtime::{record, when};
//!
//! record(|| {
//!     when(|| greet("bob")).then_return(String::from("yo bob"));
//! });
//! assert_eq!(greet("bob"), "yo bob");
//! assert_eq!(greet("ann"), "hi ann");
//! ```
//!
//! Everything here operates on [`Registry::current`]. Tests running on
//! parallel threads isolate themselves with [`Registry::scoped`].

mod capture;
mod identity;
mod matcher;
mod recording;
mod registry;
mod returns;

pub use capture::{
    zero_value, Arg, CaptureByValue, CaptureOpaque, CapturedValue, Probe, Zero, ZeroAbsent,
    ZeroByDefault,
};
pub use identity::FunctionId;
pub use matcher::{any, eq, matcher_fn, IdentityMatcher, Matcher, StructuralMatcher, Wildcard};
pub use recording::ExpectationHandle;
pub use registry::{ExpectationId, Registry};
pub use returns::Returns;

/// Record expectations on the current registry.
///
/// Every instrumented call made by `thunk` on this thread becomes an
/// expectation. The registry is idle again when `record` returns, even if
/// `thunk` panicked.
///
/// # Panics
///
/// Panics when called from inside another `record` on the same thread.
pub fn record(thunk: impl FnOnce()) {
    recording::record_in(&Registry::current(), thunk);
}

/// Declare an expectation from the single instrumented call made by `call`.
///
/// # Panics
///
/// Panics outside [`record`], or when `call` makes no instrumented call.
pub fn when<R>(call: impl FnOnce() -> R) -> ExpectationHandle {
    recording::when_in(&Registry::current(), call)
}

/// Resolve a call against the current registry. Used by generated guards.
pub fn intercept(function: &FunctionId, args: Vec<Arg>) -> Option<Returns> {
    Registry::current().intercept(function, args)
}

/// Drop every expectation of the current registry.
pub fn reset() {
    Registry::current().reset();
}

impl Registry {
    /// [`record`] on this registry.
    pub fn record(&self, thunk: impl FnOnce()) {
        recording::record_in(self, thunk);
    }

    /// [`when`] on this registry.
    pub fn when<R>(self: &std::sync::Arc<Self>, call: impl FnOnce() -> R) -> ExpectationHandle {
        recording::when_in(self, call)
    }
}
