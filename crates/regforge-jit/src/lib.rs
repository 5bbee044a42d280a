//! RegForge JIT - native code generation for compiled patterns.
//!
//! This crate lowers a pattern syntax tree into Cranelift IR and installs
//! the result in an in-process JIT module. Each compile gets its own
//! module and generation context; the returned [`CompiledPattern`] owns
//! the code memory and frees it when dropped.
//!
//! The emitted function takes a null-terminated byte string plus two
//! `i32` out-parameters and returns 1 with the match bounds filled in,
//! or 0 with both bounds set to -1.

mod codegen;
pub mod host;
pub mod runtime;

pub use host::{compile, CompileOptions, CompiledPattern, MatchSpan, OptLevel};
