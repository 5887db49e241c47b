//! Target-independent lowering
//!
//! This module holds the IR consumed by the backends and the passes that
//! reshape it into something a C-family target can express: capture
//! containers, escape codes across try/recover boundaries, explicit failure
//! branches and case-indexed coroutine state machines.
//!
//! The passes are invoked lazily by the emitters, one function at a time, as
//! the single top-down walk reaches each construct.

pub mod capture;
pub mod coroutine;
pub mod escape;
pub mod failure;
pub mod ir;
pub mod names;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{ActivationArena, CapturePlan};
pub use coroutine::Resumable;
pub use escape::EscapePlan;
pub use ir::*;
pub use names::NameAllocator;
pub use session::{LowerOptions, Session};
