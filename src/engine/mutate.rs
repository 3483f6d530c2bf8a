//! Transactional create, update, and delete.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::{Result, SchemaError, TrellisError};
use crate::model::frame::{Field, Frame, Term};
use crate::model::shape::ShapeId;
use crate::model::value::{Iri, Value, RDF_TYPE};
use crate::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::program::ir::{Triple, Update};
use crate::store::driver::{exists, Connection, Store};

use super::Engine;

/// Triples describing a frame tree, plus what they refer to.
#[derive(Default)]
struct Description {
    triples: Vec<Triple>,
    /// Every resource described, root included, with its shape.
    written: BTreeMap<Iri, ShapeId>,
    references: BTreeSet<Iri>,
}

impl<S: Store> Engine<S> {
    /// Writes `frame` as a new `shape` resource.
    ///
    /// Nested frames carrying fields are written as new resources too.
    /// Returns `false` without writing when any of them already exists.
    pub fn create(&self, id: &str, shape: ShapeId, frame: &Frame) -> Result<bool> {
        let id = self.resolve_id(shape, id)?;
        self.schema.ensure_unconditional(shape)?;
        let mut conn = self.store.connect()?;
        self.transact(&mut conn, &id, |engine, conn| {
            if exists(conn, &id)? {
                return Ok(false);
            }
            let description = engine.describe(conn, &id, shape, frame)?;
            for nested in description.written.keys().filter(|nested| *nested != &id) {
                if exists(conn, nested)? {
                    debug!(id = %id, nested = %nested, "mutate.conflict");
                    return Ok(false);
                }
            }
            conn.apply(&Update::Insert(description.triples))?;
            Ok(true)
        })
    }

    /// Replaces the description of an existing `shape` resource with `frame`.
    ///
    /// For the resource and every nested frame carrying fields, outgoing
    /// edges and incoming edges on the shape's inverse properties are removed
    /// first. Returns `false` when the resource does not exist.
    pub fn update(&self, id: &str, shape: ShapeId, frame: &Frame) -> Result<bool> {
        let id = self.resolve_id(shape, id)?;
        self.schema.ensure_unconditional(shape)?;
        let mut conn = self.store.connect()?;
        self.transact(&mut conn, &id, |engine, conn| {
            if !exists(conn, &id)? {
                return Ok(false);
            }
            let description = engine.describe(conn, &id, shape, frame)?;
            for (resource, described) in &description.written {
                conn.apply(&Update::DeleteDescription {
                    resource: resource.clone(),
                    inverse: engine.inverse_predicates(*described)?,
                })?;
            }
            conn.apply(&Update::Insert(description.triples))?;
            Ok(true)
        })
    }

    /// Removes every edge touching the `shape` resource `id`.
    ///
    /// Returns `false` when the resource does not exist.
    pub fn delete(&self, id: &str, shape: ShapeId) -> Result<bool> {
        let id = self.resolve_id(shape, id)?;
        self.schema.ensure_unconditional(shape)?;
        let mut conn = self.store.connect()?;
        self.transact(&mut conn, &id, |_, conn| {
            if !exists(conn, &id)? {
                return Ok(false);
            }
            conn.apply(&Update::DeleteResource(id.clone()))?;
            Ok(true)
        })
    }

    fn inverse_predicates(&self, shape: ShapeId) -> Result<Vec<Iri>> {
        Ok(self
            .schema
            .fields(shape)?
            .into_iter()
            .filter(|field| field.property.inverse)
            .map(|field| field.property.iri)
            .collect())
    }

    /// Runs `body` in a transaction; commits only when it reports a write.
    fn transact<F>(&self, conn: &mut S::Conn, id: &Iri, body: F) -> Result<bool>
    where
        F: FnOnce(&Self, &mut S::Conn) -> Result<bool>,
    {
        let start = profile_timer();
        conn.begin()?;
        debug!(id = %id, "mutate.begin");
        let outcome = body(self, conn).and_then(|written| {
            if written {
                conn.commit()?;
                debug!(id = %id, "mutate.commit");
            } else {
                conn.rollback()?;
                debug!(id = %id, "mutate.skip");
            }
            Ok(written)
        });
        if let Err(err) = &outcome {
            // commit may have consumed the transaction already
            if let Err(rollback) = conn.rollback() {
                warn!(id = %id, error = %err, rollback = %rollback, "mutate.rollback_failed");
            } else {
                debug!(id = %id, error = %err, "mutate.rollback");
            }
        }
        record_profile_timer(ProfileKind::Update, start);
        outcome
    }

    fn describe<C: Connection>(
        &self,
        conn: &mut C,
        id: &Iri,
        shape: ShapeId,
        frame: &Frame,
    ) -> Result<Description> {
        let mut description = Description::default();
        self.describe_into(&mut description, id, shape, frame)?;
        for reference in &description.references {
            if !description.written.contains_key(reference) && !exists(conn, reference)? {
                return Err(TrellisError::DanglingReference {
                    id: reference.to_string(),
                });
            }
        }
        Ok(description)
    }

    fn describe_into(
        &self,
        out: &mut Description,
        id: &Iri,
        shape: ShapeId,
        frame: &Frame,
    ) -> Result<()> {
        out.written.insert(id.clone(), shape);
        let rdf_type = Iri::new(RDF_TYPE);
        for class in self.schema.classes(shape)? {
            out.triples.push(Triple {
                subject: id.clone(),
                predicate: rdf_type.clone(),
                object: Value::Iri(class),
            });
        }

        for (field, terms) in frame.fields() {
            let Field::Property(label) = field else {
                continue;
            };
            let (property, target) = self.schema.entry(shape, label)?;
            for term in terms {
                let value = match term {
                    Term::Value(value) if value.is_null() => continue,
                    Term::Value(value) => value.clone(),
                    Term::Frame(nested) => {
                        let nested_id = nested.id().ok_or_else(|| SchemaError::MissingId {
                            label: label.clone(),
                        })?;
                        let nested_id = self.resolve_id(target, nested_id.as_str())?;
                        if !nested.is_empty() {
                            self.describe_into(out, &nested_id, target, nested)?;
                        } else if !self.schema.is_virtual(target)? {
                            out.references.insert(nested_id.clone());
                        }
                        Value::Iri(nested_id)
                    }
                    Term::Query(_) => continue,
                };
                let triple = if property.inverse {
                    let Value::Iri(source) = value else {
                        return Err(SchemaError::InverseLiteral {
                            label: label.clone(),
                        }
                        .into());
                    };
                    Triple {
                        subject: source,
                        predicate: property.iri.clone(),
                        object: Value::Iri(id.clone()),
                    }
                } else {
                    Triple {
                        subject: id.clone(),
                        predicate: property.iri.clone(),
                        object: value,
                    }
                };
                out.triples.push(triple);
            }
        }
        Ok(())
    }
}
