//! Dialect definitions.
//!
//! Dialects are collections of operations and types. This module contains
//! the dialects that take part in the calling conventions of Torch programs.

pub mod builtin;
pub mod func;
mod generic;
pub mod torch;

pub use generic::GenericOp;
