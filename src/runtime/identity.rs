use std::fmt;

/// Stable key identifying one instrumented callable.
///
/// Generated code builds it from `module_path!()` at the definition site and
/// the qualified name the instrumenter assigned (`greet`, `Account::deposit`,
/// `<MockStore as Store>::get`). Two call sites of the same callable produce
/// equal ids; different callables never do, even with identical signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId {
    module: &'static str,
    name: &'static str,
}

impl FunctionId {
    #[must_use]
    pub const fn new(module: &'static str, name: &'static str) -> Self {
        Self { module, name }
    }

    #[must_use]
    pub const fn module(&self) -> &'static str {
        self.module
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}
