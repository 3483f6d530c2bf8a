//! Store driver boundary.
//!
//! A [`Store`] hands out connections; each top-level engine operation checks
//! one out and drops it on every exit path. A connection executes batches of
//! programs in a single round-trip and applies updates, optionally inside a
//! transaction.

use crate::error::Result;
use crate::model::value::{Iri, Value};
use crate::program::ir::{Binding, Select, Update};

/// Source of connections.
pub trait Store: Send + Sync {
    /// Connection type.
    type Conn: Connection;

    /// Checks out a connection; dropping it releases the connection.
    fn connect(&self) -> Result<Self::Conn>;
}

/// One request/response channel to the store.
pub trait Connection {
    /// Executes every program in one round-trip, returning rows per program
    /// in input order.
    fn execute(&mut self, programs: &[Select]) -> Result<Vec<Vec<Binding>>>;

    /// Applies an update, inside the open transaction if there is one.
    fn apply(&mut self, update: &Update) -> Result<()>;

    /// Tests for an edge. Unset positions match anything; with
    /// `any_direction` the edge may also point from `object` to `subject`.
    fn has_edge(
        &mut self,
        subject: &Iri,
        predicate: Option<&Iri>,
        object: Option<&Value>,
        any_direction: bool,
    ) -> Result<bool>;

    /// Opens a transaction.
    fn begin(&mut self) -> Result<()>;

    /// Publishes the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Discards the open transaction.
    fn rollback(&mut self) -> Result<()>;
}

/// Returns true when `resource` occurs in any edge, in either position.
pub fn exists<C: Connection + ?Sized>(conn: &mut C, resource: &Iri) -> Result<bool> {
    conn.has_edge(resource, None, None, true)
}
