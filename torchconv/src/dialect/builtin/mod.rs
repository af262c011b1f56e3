//! Builtin dialect.
//!
//! Holds ops that are not tied to a specific dialect, such as the casts that
//! the conversion engine inserts while types are only partially converted.

mod op;

pub use op::UnrealizedConversionCastOp;
