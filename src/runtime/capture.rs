//! Type-erased argument snapshots and zero values for generated guards.
//!
//! The instrumenter knows parameter and result types only syntactically, so
//! the guards it emits lean on two method-resolution tricks (autoref
//! specialization): [`Probe`] captures an owned, comparable copy of an
//! argument when its type allows it and falls back to an opaque marker
//! otherwise, and [`Zero`] yields `Default::default()` when the result type
//! has a default and nothing otherwise.
//!
//! ```rust,ignore
//! use mock4rs::runtime::{CaptureByValue as _, CaptureOpaque as _, Probe};
//!
//! let arg = (&Probe(&name)).capture();
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;

/// Owned copy of an argument that can be compared with another capture.
pub trait CapturedValue: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn eq_captured(&self, other: &dyn CapturedValue) -> bool;

    fn value_type_name(&self) -> &'static str;
}

impl<T> CapturedValue for T
where
    T: PartialEq + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_captured(&self, other: &dyn CapturedValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn value_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// One actual argument of an intercepted call.
pub enum Arg {
    /// Reference-like argument, compared by address.
    Address {
        addr: usize,
        type_name: &'static str,
    },
    /// Owned copy compared structurally.
    Value(Box<dyn CapturedValue>),
    /// Argument that cannot be copied or compared; only its type is known.
    Opaque(&'static str),
}

impl Arg {
    /// Capture a reference by the address it points to.
    pub fn identity<T: ?Sized>(reference: &T) -> Self {
        Self::Address {
            addr: reference as *const T as *const () as usize,
            type_name: type_name::<T>(),
        }
    }

    /// Capture a raw pointer by its address.
    pub fn pointer<T: ?Sized>(ptr: *const T) -> Self {
        Self::Address {
            addr: ptr as *const () as usize,
            type_name: type_name::<*const T>(),
        }
    }

    pub fn value<T>(value: T) -> Self
    where
        T: PartialEq + Send + Sync + 'static,
    {
        Self::Value(Box::new(value))
    }

    pub fn opaque_of<T: ?Sized>(_value: &T) -> Self {
        Self::Opaque(type_name::<T>())
    }

    #[must_use]
    pub fn address(&self) -> Option<usize> {
        match self {
            Self::Address { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    /// Borrow the captured owned value as `T`.
    ///
    /// `&str` arguments are captured as `String` and `&[T]` as `Vec<T>`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Value(value) => value.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Address { type_name, .. } => type_name,
            Self::Value(value) => value.value_type_name(),
            Self::Opaque(type_name) => type_name,
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address { addr, type_name } => {
                write!(f, "Address({type_name} @ {addr:#x})")
            }
            Self::Value(value) => write!(f, "Value({})", value.value_type_name()),
            Self::Opaque(type_name) => write!(f, "Opaque({type_name})"),
        }
    }
}

/// Wrapper whose `capture` method picks the best snapshot for `T`.
pub struct Probe<'a, T: ?Sized>(pub &'a T);

pub trait CaptureByValue {
    fn capture(&self) -> Arg;
}

impl<T> CaptureByValue for Probe<'_, T>
where
    T: ?Sized + ToOwned,
    T::Owned: PartialEq + Send + Sync + 'static,
{
    fn capture(&self) -> Arg {
        Arg::value(self.0.to_owned())
    }
}

pub trait CaptureOpaque {
    fn capture(&self) -> Arg;
}

impl<T: ?Sized> CaptureOpaque for &Probe<'_, T> {
    fn capture(&self) -> Arg {
        Arg::opaque_of(self.0)
    }
}

/// Zero-value probe for a declared result type.
pub struct Zero<T>(PhantomData<fn() -> T>);

impl<T> Zero<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Zero<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub trait ZeroByDefault<T> {
    fn zero(&self) -> Option<T>;
}

impl<T: Default> ZeroByDefault<T> for Zero<T> {
    fn zero(&self) -> Option<T> {
        Some(T::default())
    }
}

pub trait ZeroAbsent<T> {
    fn zero(&self) -> Option<T>;
}

impl<T> ZeroAbsent<T> for &Zero<T> {
    fn zero(&self) -> Option<T> {
        None
    }
}

/// Unwrap the zero placeholder of a synthesized mock method.
///
/// Panics when the result type has no default value and the call was not
/// stubbed.
pub fn zero_value<T>(placeholder: Option<T>, function: &str) -> T {
    match placeholder {
        Some(value) => value,
        None => panic!(
            "unstubbed call to `{function}`: `{}` has no default value, stub it with when(..).then_return(..)",
            type_name::<T>()
        ),
    }
}
