//! Recording sessions and the fluent expectation API.

use super::identity::FunctionId;
use super::matcher::Matcher;
use super::registry::{canned, ExpectationId, Registry};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Unwind payload of a recorded call whose result has no zero value.
///
/// Never escapes `when` or `record`.
struct RecordedCall {
    function: FunctionId,
}

/// Abort the body of a recorded call that cannot produce a return value.
pub(crate) fn unwind_recorded_call(function: FunctionId) -> ! {
    panic::resume_unwind(Box::new(RecordedCall { function }))
}

/// Run `thunk` as a recording session on `registry`.
pub(crate) fn record_in(registry: &Registry, thunk: impl FnOnce()) {
    let session = registry.begin_session();
    let outcome = panic::catch_unwind(AssertUnwindSafe(thunk));
    drop(session);

    if let Err(payload) = outcome {
        if let Some(call) = payload.downcast_ref::<RecordedCall>() {
            panic!(
                "recorded call to `{}` returns a type without a default value; wrap it in when(|| ...)",
                call.function
            );
        }
        panic::resume_unwind(payload);
    }
}

/// Run `call` on `registry` and hand back the expectation it recorded.
pub(crate) fn when_in<R>(registry: &Arc<Registry>, call: impl FnOnce() -> R) -> ExpectationHandle {
    registry.assert_recording("when()");
    registry.clear_last_created();

    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(_) => {}
        Err(payload) if payload.is::<RecordedCall>() => {}
        Err(payload) => panic::resume_unwind(payload),
    }

    let Some((function, id)) = registry.take_last_created() else {
        panic!("when(): the closure made no call to an instrumented function");
    };
    ExpectationHandle {
        registry: Arc::clone(registry),
        function,
        id,
    }
}

/// Handle on one expectation created inside [`when`](super::when).
///
/// Every method panics outside a recording session, and after `reset`
/// removed the expectation.
pub struct ExpectationHandle {
    registry: Arc<Registry>,
    function: FunctionId,
    id: ExpectationId,
}

impl ExpectationHandle {
    #[must_use]
    pub fn function(&self) -> FunctionId {
        self.function
    }

    /// Replace the leading argument matchers.
    ///
    /// Fewer matchers than recorded keep the remaining recorded ones.
    ///
    /// # Panics
    ///
    /// Panics when more matchers are supplied than the call had arguments.
    pub fn with_matchers(self, matchers: Vec<Box<dyn Matcher>>) -> Self {
        let function = self.function;
        self.registry
            .update_expectation(function, self.id, "with_matchers()", |expectation| {
                expectation.overlay_matchers(function, matchers);
            });
        self
    }

    /// Stub the return value.
    ///
    /// `value` is either the whole return type (a tuple for tuple-returning
    /// functions) or the value of the first result.
    pub fn then_return<T>(self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.then_return_with(move || value.clone())
    }

    /// Stub the return value with a factory run on every matched call.
    ///
    /// Suits return types that are not `Clone`.
    pub fn then_return_with<T, F>(self, factory: F) -> Self
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory = canned(factory);
        self.registry
            .update_expectation(self.function, self.id, "then_return()", |expectation| {
                expectation.set_returns(vec![Some(factory)]);
            });
        self
    }

    /// Stub result `position` of a tuple-returning function.
    pub fn then_return_at<T>(self, position: usize, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let factory = canned(move || value.clone());
        self.registry
            .update_expectation(self.function, self.id, "then_return_at()", |expectation| {
                expectation.set_return_at(position, factory);
            });
        self
    }
}

impl std::fmt::Debug for ExpectationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpectationHandle")
            .field("function", &self.function)
            .field("id", &self.id)
            .finish()
    }
}
