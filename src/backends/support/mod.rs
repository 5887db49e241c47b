//! Support resolver
//!
//! Maps builtin operators and connected standard-library keys to the inline
//! code a target uses for them. Each target module owns one exhaustive
//! operator table and one connected-key table; lookups are pure functions of
//! their inputs.
//!
//! An operator the target has no rendering for resolves to
//! [`Resolution::NotFound`]. The emitter turns that into a placeholder and a
//! diagnostic instead of failing the module.

mod cpp;
mod csharp;

use crate::backends::Target;
use crate::middle::ir::{BuiltinOperator, Type};

/// Something the generated file must import for a rendering to compile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Requirement {
    /// The target's runtime support library (namespace or header from the config)
    Core,
    /// A C# `using` directive
    Using(&'static str),
    /// A C++ `#include`; angle-bracketed names are system headers
    Include(&'static str),
}

/// Shape of the inline code for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportCode {
    /// `a op b`
    Infix(&'static str),
    /// `op a`
    Prefix(&'static str),
    /// `path(args...)`
    Call(&'static str),
    /// `args[0].name`
    Member(&'static str),
    /// `args[0].name(args[1..]...)`
    MethodCall(&'static str),
    /// Text with `{0}`, `{1}`... replaced by the rendered operands
    Template(&'static str),
}

/// A rendering plus the import it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendering {
    pub code: SupportCode,
    pub requires: Option<Requirement>,
}

impl Rendering {
    pub(crate) const fn bare(code: SupportCode) -> Self {
        Self {
            code,
            requires: None,
        }
    }

    pub(crate) const fn core(code: SupportCode) -> Self {
        Self {
            code,
            requires: Some(Requirement::Core),
        }
    }

    pub(crate) const fn with(
        code: SupportCode,
        requirement: Requirement,
    ) -> Self {
        Self {
            code,
            requires: Some(requirement),
        }
    }
}

/// Outcome of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(Rendering),
    NotFound,
}

impl Resolution {
    fn from_option(rendering: Option<Rendering>) -> Self {
        match rendering {
            Some(rendering) => Resolution::Found(rendering),
            None => Resolution::NotFound,
        }
    }

    pub fn found(self) -> Option<Rendering> {
        match self {
            Resolution::Found(rendering) => Some(rendering),
            Resolution::NotFound => None,
        }
    }
}

// Failure-channel keys the emitters look up alongside the coroutine keys.

/// Evaluate a call into a success-or-failure holder
pub const FAILURE_ATTEMPT: &str = "Failure::attempt";
/// Whether a holder carries a failure
pub const FAILURE_IS_FAILURE: &str = "Failure::isFailure";
/// The success value of a holder
pub const FAILURE_UNWRAP: &str = "Failure::unwrap";
/// Forward the failure in a holder to the caller
pub const FAILURE_PROPAGATE: &str = "Failure::propagate";
/// A fresh failure
pub const FAILURE_NEW: &str = "Failure::new";
/// Run a body, falling into the recover block on failure (barrier targets)
pub const FAILURE_RECOVER: &str = "Failure::recover";

/// Pick the operator variant the operand types call for
///
/// Integer equality with a nullable operand has to compare through the
/// generic form: `null == 1` must be false, not a null dereference.
pub fn specialize(
    op: BuiltinOperator,
    operand_types: &[Type],
) -> BuiltinOperator {
    let any_nullable = operand_types.iter().any(Type::is_nullable);
    match op {
        BuiltinOperator::EqIntInt if any_nullable => BuiltinOperator::EqGeneric,
        BuiltinOperator::NeIntInt if any_nullable => BuiltinOperator::NeGeneric,
        other => other,
    }
}

/// Resolve a builtin operator for `target`
pub fn resolve_operator(
    target: Target,
    op: BuiltinOperator,
    operand_types: &[Type],
) -> Resolution {
    let op = specialize(op, operand_types);
    Resolution::from_option(match target {
        Target::CSharp => csharp::operator(op),
        Target::Cpp => cpp::operator(op),
    })
}

/// Resolve a connected standard-library key for `target`
pub fn resolve_connected(
    target: Target,
    key: &str,
) -> Resolution {
    Resolution::from_option(match target {
        Target::CSharp => csharp::CONNECTED.get(key).copied(),
        Target::Cpp => cpp::CONNECTED.get(key).copied(),
    })
}

/// Connected keys known to `target`, in table order
pub fn connected_keys(target: Target) -> Vec<&'static str> {
    match target {
        Target::CSharp => csharp::CONNECTED.keys().copied().collect(),
        Target::Cpp => cpp::CONNECTED.keys().copied().collect(),
    }
}
