use super::identity::FunctionId;
use super::recording::unwind_recorded_call;
use std::any::{type_name, Any};
use std::sync::Arc;

/// One canned return value, produced fresh for every matched call.
pub(crate) struct CannedValue {
    value: Box<dyn Any>,
    type_name: &'static str,
}

impl CannedValue {
    pub(crate) fn new<T: 'static>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }
}

pub(crate) type ReturnFactory = Arc<dyn Fn() -> CannedValue + Send + Sync>;

enum Mode {
    Recording,
    Replay(Vec<Option<CannedValue>>),
}

/// Values handed back to an instrumented body that intercepted its call.
///
/// While recording every position is absent, so the guard falls back to the
/// zero value of each result type. On replay each position holds the canned
/// value attached to the matched expectation, if any.
pub struct Returns {
    function: FunctionId,
    mode: Mode,
}

impl Returns {
    pub(crate) fn recording(function: FunctionId) -> Self {
        Self {
            function,
            mode: Mode::Recording,
        }
    }

    pub(crate) fn replay(function: FunctionId, values: Vec<Option<CannedValue>>) -> Self {
        Self {
            function,
            mode: Mode::Replay(values),
        }
    }

    #[must_use]
    pub fn function(&self) -> FunctionId {
        self.function
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self.mode, Mode::Recording)
    }

    /// Take the single canned value when it has the whole return type `T`.
    ///
    /// Lets a tuple-returning function be stubbed with one tuple value
    /// instead of one value per position.
    pub fn take_whole<T: 'static>(&mut self) -> Option<T> {
        let Mode::Replay(values) = &mut self.mode else {
            return None;
        };
        match values.as_slice() {
            [Some(canned)] if canned.value.is::<T>() => {}
            _ => return None,
        }
        let canned = values[0].take()?;
        canned.value.downcast::<T>().ok().map(|value| *value)
    }

    /// Take the canned value for result `position`, downcast to `T`.
    ///
    /// # Panics
    ///
    /// Panics when the canned value has another type than the declared
    /// result type.
    pub fn take<T: 'static>(&mut self, position: usize) -> Option<T> {
        let Mode::Replay(values) = &mut self.mode else {
            return None;
        };
        let canned = values.get_mut(position)?.take()?;
        let actual = canned.type_name;
        match canned.value.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(_) => panic!(
                "return value #{position} stubbed for `{}` is a `{actual}`, but the function returns `{}`",
                self.function,
                type_name::<T>()
            ),
        }
    }

    /// Resolve the placeholder of result `position`.
    ///
    /// An absent placeholder means the result type has no zero value and no
    /// canned value was attached. While recording this unwinds back to
    /// `when`; on replay it is a stubbing error.
    pub fn result<T>(&self, placeholder: Option<T>, position: usize) -> T {
        match placeholder {
            Some(value) => value,
            None if self.is_recording() => unwind_recorded_call(self.function),
            None => panic!(
                "`{}` matched an expectation without a return value for result #{position}, and `{}` has no default",
                self.function,
                type_name::<T>()
            ),
        }
    }
}
