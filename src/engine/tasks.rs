//! Per-operation task queue.
//!
//! Lookups raised while walking frames are only registered here. The driving
//! loop drains everything pending into one batch of programs, executes it in
//! a single round-trip, and settles the waiters. Identical lookups share one
//! task within a round and are answered from the memo in later rounds.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::compile::CompiledQuery;
use crate::error::{Result, TrellisError};
use crate::model::frame::{Field, Frame, Probe};
use crate::model::shape::ShapeId;
use crate::model::value::{Iri, Value};
use crate::program::ir::{edge_lookup, edge_vars, existence, Binding, EdgeKey, Select, Var};

/// Index of a frame under construction.
pub(crate) type NodeId = usize;

/// Consumer of a task result.
#[derive(Clone, Debug)]
pub(crate) enum Waiter {
    /// Values of `field`; resources are expanded with the template when given.
    Values {
        node: NodeId,
        field: Field,
        expand: Option<(Frame, ShapeId)>,
    },
    /// Tabular rows become anonymous frames under `field`.
    Rows { node: NodeId, field: Field },
    /// Probe columns fill fields of the node itself.
    Probes { node: NodeId },
}

/// Result delivered to a waiter.
#[derive(Clone, Debug)]
pub(crate) enum Resolved {
    /// Ordered values.
    Values(Vec<Value>),
    /// Rows with their probe columns.
    Rows {
        rows: Vec<Binding>,
        columns: Vec<(Probe, Var)>,
    },
}

/// Identity of a select task: the program plus the aliases of its columns.
type SelectKey = (Select, Vec<(Probe, Var)>);

fn select_key(compiled: &CompiledQuery) -> SelectKey {
    (compiled.select.clone(), compiled.columns.clone())
}

struct SelectTask {
    compiled: CompiledQuery,
    waiters: Vec<Waiter>,
}

/// Programs of one round plus the bookkeeping to settle them.
pub(crate) struct Round {
    /// Programs to execute in one round-trip.
    pub programs: Vec<Select>,
    /// Number of tasks folded into the programs.
    pub tasks: usize,
    edges: Option<(usize, BTreeMap<EdgeKey, Vec<Waiter>>)>,
    selects: Vec<(usize, SelectTask)>,
    exists: Option<(usize, BTreeSet<Iri>)>,
}

/// Pending and completed tasks of one operation.
///
/// Select tasks are keyed by the program and its columns; pending ones keep
/// registration order.
#[derive(Default)]
pub(crate) struct TaskQueue {
    edges: BTreeMap<EdgeKey, Vec<Waiter>>,
    selects: Vec<SelectTask>,
    select_index: FxHashMap<SelectKey, usize>,
    exists: BTreeSet<Iri>,
    edge_memo: BTreeMap<EdgeKey, Vec<Value>>,
    select_memo: FxHashMap<SelectKey, Resolved>,
    ready: VecDeque<(Waiter, Resolved)>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers an edge lookup.
    pub(crate) fn edge(&mut self, key: EdgeKey, waiter: Waiter) {
        if let Some(values) = self.edge_memo.get(&key) {
            self.ready.push_back((waiter, Resolved::Values(values.clone())));
            return;
        }
        self.edges.entry(key).or_default().push(waiter);
    }

    /// Registers a compiled selection.
    pub(crate) fn select(&mut self, compiled: CompiledQuery, waiter: Waiter) {
        let key = select_key(&compiled);
        if let Some(resolved) = self.select_memo.get(&key) {
            self.ready.push_back((waiter, resolved.clone()));
            return;
        }
        if let Some(&at) = self.select_index.get(&key) {
            self.selects[at].waiters.push(waiter);
            return;
        }
        self.select_index.insert(key, self.selects.len());
        self.selects.push(SelectTask {
            compiled,
            waiters: vec![waiter],
        });
    }

    /// Registers an existence check.
    pub(crate) fn exists(&mut self, resource: Iri) {
        self.exists.insert(resource);
    }

    /// Next settled result, if any.
    pub(crate) fn pop_ready(&mut self) -> Option<(Waiter, Resolved)> {
        self.ready.pop_front()
    }

    /// True when nothing waits for a round-trip.
    pub(crate) fn is_idle(&self) -> bool {
        self.edges.is_empty() && self.selects.is_empty() && self.exists.is_empty()
    }

    /// Moves every pending task into one round.
    pub(crate) fn drain(&mut self) -> Round {
        let mut programs = Vec::new();
        let mut tasks = 0;

        let edges = if self.edges.is_empty() {
            None
        } else {
            let edges = std::mem::take(&mut self.edges);
            tasks += edges.len();
            programs.push(edge_lookup(edges.keys()));
            Some((programs.len() - 1, edges))
        };

        let exists = if self.exists.is_empty() {
            None
        } else {
            let exists = std::mem::take(&mut self.exists);
            tasks += exists.len();
            programs.push(existence(&exists));
            Some((programs.len() - 1, exists))
        };

        self.select_index.clear();
        let mut selects = Vec::new();
        for task in std::mem::take(&mut self.selects) {
            tasks += 1;
            programs.push(task.compiled.select.clone());
            selects.push((programs.len() - 1, task));
        }

        Round {
            programs,
            tasks,
            edges,
            selects,
            exists,
        }
    }

    /// Distributes the results of a round; returns the resources found to exist.
    pub(crate) fn settle(
        &mut self,
        round: Round,
        mut results: Vec<Vec<Binding>>,
    ) -> Result<BTreeSet<Iri>> {
        if results.len() != round.programs.len() {
            return Err(TrellisError::Driver(format!(
                "expected {} result sets, got {}",
                round.programs.len(),
                results.len()
            )));
        }
        let mut take = |at: usize| std::mem::take(&mut results[at]);

        if let Some((at, pending)) = round.edges {
            let mut found: BTreeMap<EdgeKey, Vec<Value>> = BTreeMap::new();
            for row in take(at) {
                if let Some((key, value)) = edge_row(row) {
                    found.entry(key).or_default().push(value);
                }
            }
            for (key, waiters) in pending {
                let mut values = found.remove(&key).unwrap_or_default();
                values.sort();
                values.dedup();
                trace!(subject = %key.subject, predicate = %key.predicate, values = values.len(), "engine.edge");
                for waiter in waiters {
                    self.ready.push_back((waiter, Resolved::Values(values.clone())));
                }
                self.edge_memo.insert(key, values);
            }
        }

        let mut existing = BTreeSet::new();
        if let Some((at, _)) = round.exists {
            for row in take(at) {
                if let Some(Value::Iri(iri)) = row.get(&edge_vars::SUBJECT) {
                    existing.insert(iri.clone());
                }
            }
        }

        for (at, task) in round.selects {
            let rows = take(at);
            trace!(
                fingerprint = task.compiled.fingerprint,
                rows = rows.len(),
                "engine.select"
            );
            let resolved = if task.compiled.is_tabular() {
                Resolved::Rows {
                    rows,
                    columns: task.compiled.columns.clone(),
                }
            } else {
                let member = task.compiled.member;
                Resolved::Values(rows.into_iter().filter_map(|mut row| row.remove(&member)).collect())
            };
            self.select_memo.insert(select_key(&task.compiled), resolved.clone());
            for waiter in task.waiters {
                self.ready.push_back((waiter, resolved.clone()));
            }
        }
        Ok(existing)
    }
}

fn edge_row(mut row: Binding) -> Option<(EdgeKey, Value)> {
    let subject = row.remove(&edge_vars::SUBJECT)?;
    let predicate = row.remove(&edge_vars::PREDICATE)?;
    let object = row.remove(&edge_vars::OBJECT)?;
    let inverse = matches!(row.get(&edge_vars::INVERSE), Some(Value::Bool(true)));
    match (subject, predicate) {
        (Value::Iri(subject), Value::Iri(predicate)) => Some((
            EdgeKey {
                subject,
                predicate,
                inverse,
            },
            object,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::expression::{Expression, Transform};

    fn key(subject: &str) -> EdgeKey {
        EdgeKey {
            subject: Iri::new(subject),
            predicate: Iri::new("urn:supervisor"),
            inverse: false,
        }
    }

    fn waiter(node: NodeId) -> Waiter {
        Waiter::Values {
            node,
            field: Field::Property("supervisor".into()),
            expand: None,
        }
    }

    #[test]
    fn identical_edges_share_one_task() -> Result<()> {
        let mut queue = TaskQueue::new();
        queue.edge(key("urn:e:1"), waiter(0));
        queue.edge(key("urn:e:1"), waiter(1));
        queue.edge(key("urn:e:2"), waiter(2));
        let round = queue.drain();
        assert_eq!(round.programs.len(), 1);
        assert_eq!(round.tasks, 2);
        assert!(queue.is_idle());

        let row = Binding::from([
            (edge_vars::SUBJECT, Value::iri("urn:e:1")),
            (edge_vars::PREDICATE, Value::iri("urn:supervisor")),
            (edge_vars::OBJECT, Value::iri("urn:e:9")),
            (edge_vars::INVERSE, Value::Bool(false)),
        ]);
        queue.settle(round, vec![vec![row]])?;
        let mut settled = 0;
        while let Some((_, resolved)) = queue.pop_ready() {
            if let Resolved::Values(values) = resolved {
                settled += values.len();
            }
        }
        assert_eq!(settled, 2);
        Ok(())
    }

    #[test]
    fn memoised_edges_skip_the_round() -> Result<()> {
        let mut queue = TaskQueue::new();
        queue.edge(key("urn:e:1"), waiter(0));
        let round = queue.drain();
        queue.settle(round, vec![Vec::new()])?;
        while queue.pop_ready().is_some() {}
        queue.edge(key("urn:e:1"), waiter(3));
        assert!(queue.is_idle());
        assert!(queue.pop_ready().is_some());
        Ok(())
    }

    fn compiled(columns: Vec<(Probe, Var)>) -> CompiledQuery {
        let select = Select::default();
        let fingerprint = select.fingerprint();
        CompiledQuery {
            select,
            member: Var(0),
            columns,
            fingerprint,
        }
    }

    #[test]
    fn selects_share_tasks_only_when_columns_match() -> Result<()> {
        let count = Expression::new([Transform::Count], Vec::<String>::new());
        let total = vec![(Probe::new("total", count.clone()), Var(1))];
        let size = vec![(Probe::new("size", count), Var(1))];
        let rows = |node| Waiter::Rows {
            node,
            field: Field::Property("staff".into()),
        };

        let mut queue = TaskQueue::new();
        queue.select(compiled(total.clone()), rows(0));
        queue.select(compiled(total.clone()), rows(1));
        queue.select(compiled(size), rows(2));
        let round = queue.drain();
        assert_eq!(round.tasks, 2);
        queue.settle(round, vec![Vec::new(), Vec::new()])?;
        while queue.pop_ready().is_some() {}

        queue.select(compiled(total), rows(3));
        assert!(queue.is_idle());
        Ok(())
    }

    #[test]
    fn mismatched_result_sets_are_driver_errors() {
        let mut queue = TaskQueue::new();
        queue.exists(Iri::new("urn:e:1"));
        let round = queue.drain();
        assert!(matches!(queue.settle(round, Vec::new()), Err(TrellisError::Driver(_))));
    }
}
