//! The call registry: expectations per function and the recording state.

use super::capture::Arg;
use super::identity::FunctionId;
use super::matcher::{matcher_for, Matcher};
use super::returns::{CannedValue, ReturnFactory, Returns};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, trace};

/// Process-wide default registry.
static DEFAULT_REGISTRY: Lazy<Arc<Registry>> = Lazy::new(|| Arc::new(Registry::new()));

thread_local! {
    static SCOPED_REGISTRY: RefCell<Option<Arc<Registry>>> = const { RefCell::new(None) };
}

/// Opaque id of one recorded expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExpectationId(u64);

pub(crate) struct Expectation {
    id: ExpectationId,
    arity: usize,
    matchers: Vec<Arc<dyn Matcher>>,
    returns: Vec<Option<ReturnFactory>>,
}

#[derive(Default)]
struct RegistryState {
    expectations: HashMap<FunctionId, Vec<Expectation>>,
    recording: Option<ThreadId>,
    last_created: Option<(FunctionId, ExpectationId)>,
    next_id: u64,
}

impl RegistryState {
    fn is_recording_on(&self, thread: ThreadId) -> bool {
        self.recording == Some(thread)
    }

    fn record_call(&mut self, function: FunctionId, args: Vec<Arg>) -> ExpectationId {
        let id = ExpectationId(self.next_id);
        self.next_id += 1;

        let arity = args.len();
        let matchers: Vec<Arc<dyn Matcher>> = args
            .into_iter()
            .map(|arg| Arc::from(matcher_for(arg)))
            .collect();

        self.expectations
            .entry(function)
            .or_default()
            .push(Expectation {
                id,
                arity,
                matchers,
                returns: Vec::new(),
            });
        self.last_created = Some((function, id));
        id
    }

    fn expectation_mut(
        &mut self,
        function: FunctionId,
        id: ExpectationId,
    ) -> Option<&mut Expectation> {
        self.expectations
            .get_mut(&function)?
            .iter_mut()
            .find(|expectation| expectation.id == id)
    }
}

/// Expectations recorded for instrumented functions, plus the recording flag.
///
/// Registry state sits behind a mutex and a recording session holds a
/// separate session lock for its whole duration, so at most one thread
/// records into a registry at a time. Calls made from other threads while a
/// session is open are replayed, never recorded. Matchers and return
/// factories run outside the state lock, so they may call instrumented code.
///
/// Generated code talks to [`Registry::current`]: the registry scoped on the
/// calling thread with [`Registry::scoped`], or the process-wide default.
pub struct Registry {
    state: Mutex<RegistryState>,
    session: Mutex<()>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            session: Mutex::new(()),
        }
    }

    /// The registry instrumented code on this thread talks to.
    #[must_use]
    pub fn current() -> Arc<Registry> {
        SCOPED_REGISTRY
            .with(|scoped| scoped.borrow().clone())
            .unwrap_or_else(|| Arc::clone(&DEFAULT_REGISTRY))
    }

    /// Run `f` with `registry` as this thread's current registry.
    pub fn scoped<R>(registry: &Arc<Registry>, f: impl FnOnce() -> R) -> R {
        let previous = SCOPED_REGISTRY.with(|scoped| scoped.replace(Some(Arc::clone(registry))));
        let _guard = ScopeGuard { previous };
        f()
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state.lock().recording.is_some()
    }

    #[must_use]
    pub fn expectation_count(&self, function: &FunctionId) -> usize {
        self.state
            .lock()
            .expectations
            .get(function)
            .map_or(0, Vec::len)
    }

    /// Drop every expectation and force the registry idle.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.expectations.clear();
        state.recording = None;
        state.last_created = None;
        debug!("registry reset");
    }

    /// Entry point of every instrumented body.
    ///
    /// While the calling thread records, the call becomes a new expectation
    /// and recording-mode [`Returns`] come back. Otherwise the expectations
    /// of `function` are scanned oldest first and the first whose matchers
    /// accept the leading arguments supplies the return values. `None` means
    /// no expectation matched and the real body must run.
    pub fn intercept(&self, function: &FunctionId, args: Vec<Arg>) -> Option<Returns> {
        let candidates: Vec<(Vec<Arc<dyn Matcher>>, Vec<Option<ReturnFactory>>)> = {
            let mut state = self.state.lock();
            if state.is_recording_on(thread::current().id()) {
                let id = state.record_call(*function, args);
                debug!(%function, ?id, "recorded expectation");
                return Some(Returns::recording(*function));
            }
            state
                .expectations
                .get(function)?
                .iter()
                .map(|expectation| (expectation.matchers.clone(), expectation.returns.clone()))
                .collect()
        };

        let (_, returns) = candidates
            .into_iter()
            .find(|(matchers, _)| prefix_matches(matchers, &args))
            .or_else(|| {
                trace!(%function, "no expectation matched, falling through");
                None
            })?;

        debug!(%function, "call matched an expectation");
        let values = returns
            .iter()
            .map(|slot| slot.as_ref().map(|factory| factory()))
            .collect();
        Some(Returns::replay(*function, values))
    }

    pub(crate) fn begin_session(&self) -> SessionGuard<'_> {
        let me = thread::current().id();
        if self.state.lock().is_recording_on(me) {
            panic!("nested recording session: record() is not reentrant");
        }
        let session = self.session.lock();
        let mut state = self.state.lock();
        state.recording = Some(me);
        state.last_created = None;
        debug!("recording session started");
        SessionGuard {
            registry: self,
            _session: session,
        }
    }

    pub(crate) fn assert_recording(&self, operation: &str) {
        if !self.state.lock().is_recording_on(thread::current().id()) {
            panic!("{operation} is only valid inside a record() session");
        }
    }

    pub(crate) fn clear_last_created(&self) {
        self.state.lock().last_created = None;
    }

    pub(crate) fn take_last_created(&self) -> Option<(FunctionId, ExpectationId)> {
        self.state.lock().last_created.take()
    }

    pub(crate) fn update_expectation(
        &self,
        function: FunctionId,
        id: ExpectationId,
        operation: &str,
        update: impl FnOnce(&mut Expectation),
    ) {
        self.assert_recording(operation);
        let mut state = self.state.lock();
        match state.expectation_mut(function, id) {
            Some(expectation) => update(expectation),
            None => panic!("{operation}: expectation for `{function}` no longer exists"),
        }
    }
}

impl Expectation {
    /// Overlay `matchers` onto the recorded ones.
    ///
    /// Supplying fewer matchers than recorded keeps the recorded tail;
    /// supplying as many or more replaces the list.
    pub(crate) fn overlay_matchers(&mut self, function: FunctionId, matchers: Vec<Box<dyn Matcher>>) {
        if matchers.len() > self.arity {
            panic!(
                "`{function}` takes {} argument(s) but {} matcher(s) were supplied",
                self.arity,
                matchers.len()
            );
        }
        let supplied: Vec<Arc<dyn Matcher>> = matchers.into_iter().map(Arc::from).collect();
        if self.matchers.len() > supplied.len() {
            let tail = self.matchers.split_off(supplied.len());
            self.matchers = supplied;
            self.matchers.extend(tail);
        } else {
            self.matchers = supplied;
        }
    }

    pub(crate) fn set_returns(&mut self, returns: Vec<Option<ReturnFactory>>) {
        self.returns = returns;
    }

    pub(crate) fn set_return_at(&mut self, position: usize, factory: ReturnFactory) {
        if self.returns.len() <= position {
            self.returns.resize_with(position + 1, || None);
        }
        self.returns[position] = Some(factory);
    }
}

/// Prefix match: every matcher accepts the argument at its position; trailing
/// arguments beyond the matcher list are unconstrained.
fn prefix_matches(matchers: &[Arc<dyn Matcher>], args: &[Arg]) -> bool {
    matchers.len() <= args.len()
        && matchers
            .iter()
            .zip(args)
            .all(|(matcher, arg)| matcher.matches(arg))
}

pub(crate) fn canned<T: 'static>(factory: impl Fn() -> T + Send + Sync + 'static) -> ReturnFactory {
    Arc::new(move || CannedValue::new(factory()))
}

/// Restores idle state when a recording session ends, even by panic.
pub(crate) struct SessionGuard<'a> {
    registry: &'a Registry,
    _session: parking_lot::MutexGuard<'a, ()>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        state.recording = None;
        state.last_created = None;
        debug!("recording session ended");
    }
}

struct ScopeGuard {
    previous: Option<Arc<Registry>>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SCOPED_REGISTRY.with(|scoped| *scoped.borrow_mut() = previous);
    }
}
