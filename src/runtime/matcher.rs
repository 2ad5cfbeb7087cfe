use super::capture::{Arg, CapturedValue};
use std::fmt;
use std::marker::PhantomData;

/// Predicate over one actual argument of an intercepted call.
pub trait Matcher: Send + Sync {
    fn matches(&self, arg: &Arg) -> bool;

    fn describe(&self) -> String {
        String::from("<custom matcher>")
    }
}

impl fmt::Debug for dyn Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Matches an argument pointing at the recorded address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityMatcher {
    addr: usize,
}

impl IdentityMatcher {
    #[must_use]
    pub fn new(addr: usize) -> Self {
        Self { addr }
    }
}

impl Matcher for IdentityMatcher {
    fn matches(&self, arg: &Arg) -> bool {
        arg.address() == Some(self.addr)
    }

    fn describe(&self) -> String {
        format!("same address as {:#x}", self.addr)
    }
}

/// Matches an argument structurally equal to the recorded value.
pub struct StructuralMatcher {
    expected: Box<dyn CapturedValue>,
}

impl StructuralMatcher {
    #[must_use]
    pub fn new(expected: Box<dyn CapturedValue>) -> Self {
        Self { expected }
    }
}

impl Matcher for StructuralMatcher {
    fn matches(&self, arg: &Arg) -> bool {
        match arg {
            Arg::Value(actual) => self.expected.eq_captured(&**actual),
            _ => false,
        }
    }

    fn describe(&self) -> String {
        format!("equal to a recorded {}", self.expected.value_type_name())
    }
}

/// Matches every argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wildcard;

impl Matcher for Wildcard {
    fn matches(&self, _arg: &Arg) -> bool {
        true
    }

    fn describe(&self) -> String {
        String::from("anything")
    }
}

struct FnMatcher<T, F> {
    predicate: F,
    _value: PhantomData<fn(&T)>,
}

impl<T, F> Matcher for FnMatcher<T, F>
where
    T: 'static,
    F: Fn(&T) -> bool + Send + Sync,
{
    fn matches(&self, arg: &Arg) -> bool {
        arg.downcast_ref::<T>().is_some_and(|value| (self.predicate)(value))
    }

    fn describe(&self) -> String {
        format!("custom predicate over {}", std::any::type_name::<T>())
    }
}

/// Matcher accepting any argument.
#[must_use]
pub fn any() -> Box<dyn Matcher> {
    Box::new(Wildcard)
}

/// Matcher accepting arguments equal to `value`.
///
/// `&str` arguments compare against a `String`, `&[T]` against a `Vec<T>`.
#[must_use]
pub fn eq<T>(value: T) -> Box<dyn Matcher>
where
    T: PartialEq + Send + Sync + 'static,
{
    Box::new(StructuralMatcher::new(Box::new(value)))
}

/// Matcher running `predicate` on arguments captured as `T`.
///
/// Arguments of another type, or captured by address, never match.
///
/// ```rust,ignore
/// when(|| lookup("")).with_matchers(vec![matcher_fn(|key: &String| key.starts_with("ba"))]);
/// ```
pub fn matcher_fn<T, F>(predicate: F) -> Box<dyn Matcher>
where
    T: 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Box::new(FnMatcher {
        predicate,
        _value: PhantomData,
    })
}

/// Built-in matcher for a captured argument: identity for addresses,
/// structural equality for values, wildcard for opaque arguments.
pub(crate) fn matcher_for(arg: Arg) -> Box<dyn Matcher> {
    match arg {
        Arg::Address { addr, .. } => Box::new(IdentityMatcher::new(addr)),
        Arg::Value(value) => Box::new(StructuralMatcher::new(value)),
        Arg::Opaque(type_name) => {
            tracing::warn!(
                type_name,
                "argument cannot be compared, recording it as a wildcard"
            );
            Box::new(Wildcard)
        }
    }
}
