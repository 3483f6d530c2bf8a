//! In-memory reference store.
//!
//! Executes programs with the evaluator in [`eval`] over a shared [`Graph`].
//! A transaction reads from a private copy taken on `begin` that also holds
//! its own writes, and logs every update. `commit` replays the log onto the
//! shared graph under the write lock, so transactions committed from other
//! connections in the meantime are kept. Counters expose round-trips and
//! open connections so callers can check batching and connection release.

pub mod eval;
pub mod graph;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::{Result, TrellisError};
use crate::model::value::{Iri, Value};
use crate::program::ir::{Binding, Select, Triple, Update};
use crate::store::driver::{Connection, Store};

pub use graph::Graph;

#[derive(Default)]
struct Shared {
    graph: RwLock<Graph>,
    round_trips: AtomicU64,
    open: AtomicUsize,
}

/// Shared in-memory graph; cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `triples`.
    pub fn with_triples(triples: impl IntoIterator<Item = Triple>) -> Self {
        let store = Self::new();
        {
            let mut graph = store.shared.graph.write();
            for triple in triples {
                graph.insert(triple);
            }
        }
        store
    }

    /// Copy of the current committed graph.
    pub fn snapshot(&self) -> Graph {
        self.shared.graph.read().clone()
    }

    /// Round-trips served so far.
    pub fn round_trips(&self) -> u64 {
        self.shared.round_trips.load(Ordering::Relaxed)
    }

    /// Resets the round-trip counter.
    pub fn reset_round_trips(&self) {
        self.shared.round_trips.store(0, Ordering::Relaxed);
    }

    /// Connections currently checked out.
    pub fn open_connections(&self) -> usize {
        self.shared.open.load(Ordering::Relaxed)
    }
}

impl Store for MemoryStore {
    type Conn = MemoryConnection;

    fn connect(&self) -> Result<MemoryConnection> {
        self.shared.open.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
            pending: None,
        })
    }
}

/// Open transaction: private view plus the updates to replay on commit.
struct Pending {
    view: Graph,
    log: Vec<Update>,
}

/// Connection to a [`MemoryStore`].
pub struct MemoryConnection {
    shared: Arc<Shared>,
    pending: Option<Pending>,
}

impl MemoryConnection {
    fn with_graph<T>(&self, f: impl FnOnce(&Graph) -> T) -> T {
        match &self.pending {
            Some(pending) => f(&pending.view),
            None => f(&self.shared.graph.read()),
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.shared.open.fetch_sub(1, Ordering::Relaxed);
    }
}

fn apply_update(graph: &mut Graph, update: &Update) {
    match update {
        Update::Insert(triples) => {
            for triple in triples {
                graph.insert(triple.clone());
            }
        }
        Update::DeleteDescription { resource, inverse } => {
            graph.remove_outgoing(resource);
            let object = Value::Iri(resource.clone());
            for predicate in inverse {
                graph.remove_incoming(&object, Some(predicate));
            }
        }
        Update::DeleteResource(resource) => {
            graph.remove_outgoing(resource);
            graph.remove_incoming(&Value::Iri(resource.clone()), None);
        }
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, programs: &[Select]) -> Result<Vec<Vec<Binding>>> {
        self.shared.round_trips.fetch_add(1, Ordering::Relaxed);
        Ok(self.with_graph(|graph| {
            programs
                .iter()
                .map(|program| {
                    trace!(program = %program, "memory.execute");
                    eval::select(graph, program)
                })
                .collect()
        }))
    }

    fn apply(&mut self, update: &Update) -> Result<()> {
        trace!(update = %update, "memory.apply");
        match &mut self.pending {
            Some(pending) => {
                apply_update(&mut pending.view, update);
                pending.log.push(update.clone());
            }
            None => apply_update(&mut self.shared.graph.write(), update),
        }
        Ok(())
    }

    fn has_edge(
        &mut self,
        subject: &Iri,
        predicate: Option<&Iri>,
        object: Option<&Value>,
        any_direction: bool,
    ) -> Result<bool> {
        self.shared.round_trips.fetch_add(1, Ordering::Relaxed);
        Ok(self.with_graph(|graph| graph.has_edge(subject, predicate, object, any_direction)))
    }

    fn begin(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(TrellisError::Transaction("transaction already open"));
        }
        self.pending = Some(Pending {
            view: self.shared.graph.read().clone(),
            log: Vec::new(),
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or(TrellisError::Transaction("no open transaction"))?;
        let mut graph = self.shared.graph.write();
        for update in &pending.log {
            apply_update(&mut graph, update);
        }
        trace!(updates = pending.log.len(), "memory.commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.pending
            .take()
            .map(|_| ())
            .ok_or(TrellisError::Transaction("no open transaction"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ir::existence;

    fn triple(s: &str, p: &str, o: Value) -> Triple {
        Triple {
            subject: Iri::new(s),
            predicate: Iri::new(p),
            object: o,
        }
    }

    #[test]
    fn transactions_isolate_until_commit() -> Result<()> {
        let store = MemoryStore::new();
        let mut writer = store.connect()?;
        let mut reader = store.connect()?;
        assert_eq!(store.open_connections(), 2);
        writer.begin()?;
        writer.apply(&Update::Insert(vec![triple("urn:a", "urn:p", Value::Int(1))]))?;
        assert!(writer.has_edge(&Iri::new("urn:a"), None, None, false)?);
        assert!(!reader.has_edge(&Iri::new("urn:a"), None, None, false)?);
        writer.commit()?;
        assert!(reader.has_edge(&Iri::new("urn:a"), None, None, false)?);
        drop(writer);
        drop(reader);
        assert_eq!(store.open_connections(), 0);
        Ok(())
    }

    #[test]
    fn interleaved_commits_keep_both_writes() -> Result<()> {
        let store = MemoryStore::new();
        let mut first = store.connect()?;
        let mut second = store.connect()?;
        first.begin()?;
        second.begin()?;
        first.apply(&Update::Insert(vec![triple("urn:a", "urn:p", Value::Int(1))]))?;
        second.apply(&Update::Insert(vec![triple("urn:b", "urn:p", Value::Int(2))]))?;
        assert!(!second.has_edge(&Iri::new("urn:a"), None, None, false)?);
        first.commit()?;
        second.commit()?;
        let graph = store.snapshot();
        assert_eq!(graph.len(), 2);
        assert!(graph.contains(&Iri::new("urn:a"), &Iri::new("urn:p"), &Value::Int(1)));
        assert!(graph.contains(&Iri::new("urn:b"), &Iri::new("urn:p"), &Value::Int(2)));
        Ok(())
    }

    #[test]
    fn rollback_discards_writes() -> Result<()> {
        let store = MemoryStore::new();
        let mut conn = store.connect()?;
        conn.begin()?;
        conn.apply(&Update::Insert(vec![triple("urn:a", "urn:p", Value::Int(1))]))?;
        conn.rollback()?;
        assert!(store.snapshot().is_empty());
        assert!(matches!(conn.commit(), Err(TrellisError::Transaction(_))));
        Ok(())
    }

    #[test]
    fn batches_count_as_one_round_trip() -> Result<()> {
        let store = MemoryStore::with_triples([
            triple("urn:a", "urn:p", Value::iri("urn:b")),
            triple("urn:c", "urn:p", Value::Int(2)),
        ]);
        let mut conn = store.connect()?;
        let a = Iri::new("urn:a");
        let b = Iri::new("urn:b");
        let missing = Iri::new("urn:z");
        let results = conn.execute(&[existence([&a, &missing]), existence([&b])])?;
        assert_eq!(store.round_trips(), 1);
        assert_eq!(results[0].len(), 1);
        assert_eq!(results[1].len(), 1);
        Ok(())
    }

    #[test]
    fn delete_resource_removes_both_directions() -> Result<()> {
        let store = MemoryStore::with_triples([
            triple("urn:a", "urn:p", Value::iri("urn:b")),
            triple("urn:b", "urn:q", Value::Int(1)),
            triple("urn:c", "urn:p", Value::Int(2)),
        ]);
        let mut conn = store.connect()?;
        conn.apply(&Update::DeleteResource(Iri::new("urn:b")))?;
        assert_eq!(store.snapshot().len(), 1);
        Ok(())
    }
}
