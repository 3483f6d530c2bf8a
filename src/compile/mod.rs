//! Query compilation into native programs.

pub mod compiler;
pub mod scope;

pub use compiler::{explain, Anchor, CompiledQuery, Compiler};
pub use scope::Scope;
