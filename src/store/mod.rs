//! Store driver boundary and the in-memory reference store.

pub mod driver;
pub mod memory;

pub use driver::{exists, Connection, Store};
pub use memory::{MemoryConnection, MemoryStore};
