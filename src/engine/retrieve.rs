//! Batched retrieval.
//!
//! A model is walked breadth-first. Walking a frame only registers lookups;
//! the round loop sends all pending lookups in one round-trip, settles them,
//! and walks the resources they returned. The number of rounds is bounded by
//! the depth of the model, not by the number of resources.

use std::collections::BTreeMap;

use tracing::debug;

use crate::compile::{Anchor, Compiler};
use crate::error::{Result, TrellisError};
use crate::model::frame::{Field, Frame, Term};
use crate::model::query::Query;
use crate::model::shape::ShapeId;
use crate::model::value::{Iri, Value};
use crate::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::program::ir::EdgeKey;
use crate::store::driver::{Connection, Store};

use super::tasks::{NodeId, Resolved, TaskQueue, Waiter};
use super::Engine;

impl<S: Store> Engine<S> {
    /// Fetches `id` as a `shape` resource, projected by `model`.
    ///
    /// Returns `None` when a non-virtual resource has no edges at all.
    /// Fields of the model that found no values are absent from the result.
    pub fn retrieve(&self, id: &str, shape: ShapeId, model: &Frame) -> Result<Option<Frame>> {
        let id = self.resolve_id(shape, id)?;
        self.schema.ensure_unconditional(shape)?;
        let check = !self.schema.is_virtual(shape)?;

        let mut conn = self.store.connect()?;
        let mut run = Retrieval::new(self);
        let root = run.node(Some(id.clone()));
        if check {
            run.queue.exists(id.clone());
        }
        run.walk(root, &id, model, shape)?;

        let mut round = 0;
        loop {
            while let Some((waiter, resolved)) = run.queue.pop_ready() {
                run.complete(waiter, resolved)?;
            }
            if run.queue.is_idle() {
                break;
            }
            round += 1;
            if round > self.config.max_rounds {
                return Err(TrellisError::RoundLimit {
                    max: self.config.max_rounds,
                });
            }
            let batch = run.queue.drain();
            debug!(
                round,
                tasks = batch.tasks,
                programs = batch.programs.len(),
                "engine.round"
            );
            let start = profile_timer();
            let results = conn.execute(&batch.programs);
            record_profile_timer(
                ProfileKind::RoundTrip {
                    tasks: batch.tasks as u64,
                },
                start,
            );
            let existing = run.queue.settle(batch, results?)?;
            if round == 1 && check && !existing.contains(&id) {
                debug!(id = %id, "engine.missing");
                return Ok(None);
            }
        }
        Ok(Some(run.assemble(root)))
    }

    /// Runs `query` over the `label` collection of `container`.
    ///
    /// Plain queries yield member frames; tabular ones yield anonymous rows.
    /// A missing container yields no rows.
    pub fn list(&self, container: &str, shape: ShapeId, label: &str, query: Query) -> Result<Vec<Frame>> {
        let model = Frame::new().with_query(label, query);
        let Some(frame) = self.retrieve(container, shape, &model)? else {
            return Ok(Vec::new());
        };
        Ok(frame
            .values(label)
            .iter()
            .filter_map(|term| term.as_frame().cloned())
            .collect())
    }

    /// Renders the program [`Engine::list`] would send for the collection query.
    pub fn explain(&self, container: &str, shape: ShapeId, label: &str, query: &Query) -> Result<String> {
        let container = self.resolve_id(shape, container)?;
        let (anchor, member) = self.collection(&container, shape, label)?;
        Compiler::new(&self.schema, &self.config).explain(&anchor, member, query)
    }

    fn collection(&self, container: &Iri, shape: ShapeId, label: &str) -> Result<(Anchor, ShapeId)> {
        let (property, member) = self.schema.entry(shape, label)?;
        let membership = if self.schema.is_virtual(shape)? {
            None
        } else {
            Some(property)
        };
        let anchor = Anchor::Members {
            container: container.clone(),
            membership,
        };
        Ok((anchor, member))
    }
}

enum Slot {
    Value(Value),
    Node(NodeId),
}

#[derive(Default)]
struct Node {
    id: Option<Iri>,
    fields: BTreeMap<Field, Vec<Slot>>,
}

struct Retrieval<'e, S: Store> {
    engine: &'e Engine<S>,
    nodes: Vec<Node>,
    queue: TaskQueue,
}

impl<'e, S: Store> Retrieval<'e, S> {
    fn new(engine: &'e Engine<S>) -> Self {
        Self {
            engine,
            nodes: Vec::new(),
            queue: TaskQueue::new(),
        }
    }

    fn node(&mut self, id: Option<Iri>) -> NodeId {
        self.nodes.push(Node {
            id,
            fields: BTreeMap::new(),
        });
        self.nodes.len() - 1
    }

    /// Registers the lookups `model` needs for the resource `id`.
    fn walk(&mut self, node: NodeId, id: &Iri, model: &Frame, shape: ShapeId) -> Result<()> {
        let engine = self.engine;
        let compiler = Compiler::new(&engine.schema, &engine.config);
        let mut probes = Frame::new();

        for (field, terms) in model.fields() {
            let label = match field {
                Field::Probe(probe) => {
                    probes = probes.with_probe(probe.clone());
                    continue;
                }
                Field::Property(label) => label,
            };
            match terms.first() {
                Some(Term::Query(query)) => {
                    let (anchor, member) = engine.collection(id, shape, label)?;
                    let compiled = compiler.compile(&anchor, member, query)?;
                    let waiter = if compiled.is_tabular() {
                        Waiter::Rows {
                            node,
                            field: field.clone(),
                        }
                    } else {
                        Waiter::Values {
                            node,
                            field: field.clone(),
                            expand: Some((query.model().clone(), member)),
                        }
                    };
                    self.queue.select(compiled, waiter);
                }
                other => {
                    let (property, target) = engine.schema.entry(shape, label)?;
                    let expand = match other {
                        Some(Term::Frame(template)) => Some((template.clone(), target)),
                        _ => None,
                    };
                    let key = EdgeKey {
                        subject: id.clone(),
                        predicate: property.iri.clone(),
                        inverse: property.inverse,
                    };
                    self.queue.edge(
                        key,
                        Waiter::Values {
                            node,
                            field: field.clone(),
                            expand,
                        },
                    );
                }
            }
        }

        if !probes.is_empty() {
            let anchor = Anchor::Resource(id.clone());
            let compiled = compiler.compile(&anchor, shape, &Query::new(probes))?;
            self.queue.select(compiled, Waiter::Probes { node });
        }
        Ok(())
    }

    fn complete(&mut self, waiter: Waiter, resolved: Resolved) -> Result<()> {
        match (waiter, resolved) {
            (Waiter::Values { node, field, expand }, Resolved::Values(values)) => {
                let mut slots = Vec::with_capacity(values.len());
                for value in values {
                    match (&expand, value) {
                        (Some((template, shape)), Value::Iri(iri)) => {
                            let child = self.node(Some(iri.clone()));
                            self.walk(child, &iri, template, *shape)?;
                            slots.push(Slot::Node(child));
                        }
                        (_, value) => slots.push(Slot::Value(value)),
                    }
                }
                self.nodes[node].fields.insert(field, slots);
            }
            (Waiter::Rows { node, field }, Resolved::Rows { rows, columns }) => {
                let mut slots = Vec::with_capacity(rows.len());
                for row in &rows {
                    let child = self.node(None);
                    for (probe, var) in &columns {
                        if let Some(value) = row.get(var) {
                            self.nodes[child]
                                .fields
                                .insert(Field::Probe(probe.clone()), vec![Slot::Value(value.clone())]);
                        }
                    }
                    slots.push(Slot::Node(child));
                }
                self.nodes[node].fields.insert(field, slots);
            }
            (Waiter::Probes { node }, Resolved::Rows { rows, columns }) => {
                for (probe, var) in &columns {
                    let mut values: Vec<Value> = Vec::new();
                    for value in rows.iter().filter_map(|row| row.get(var)) {
                        if !values.contains(value) {
                            values.push(value.clone());
                        }
                    }
                    let slots = values.into_iter().map(Slot::Value).collect();
                    self.nodes[node].fields.insert(Field::Probe(probe.clone()), slots);
                }
            }
            _ => {
                return Err(TrellisError::Driver(
                    "result shape does not match the waiting field".into(),
                ))
            }
        }
        Ok(())
    }

    fn assemble(&mut self, node: NodeId) -> Frame {
        let source = std::mem::take(&mut self.nodes[node]);
        let mut frame = Frame::new();
        frame.set_id(source.id);
        for (field, slots) in source.fields {
            if slots.is_empty() {
                continue;
            }
            let terms = slots
                .into_iter()
                .map(|slot| match slot {
                    Slot::Value(value) => Term::Value(value),
                    Slot::Node(child) => Term::Frame(self.assemble(child)),
                })
                .collect();
            frame.insert(field, terms);
        }
        frame
    }
}
