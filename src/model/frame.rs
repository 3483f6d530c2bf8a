//! Resource snapshots and projection templates.
//!
//! The same [`Frame`] type serves as a request template (a *model*) and as a
//! result. Inside a model, a field's terms say what to fetch: a nested frame
//! expands linked resources, a nested [`Query`] enumerates a collection, and
//! a scalar term fetches plain values.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::model::expression::Expression;
use crate::model::query::Query;
use crate::model::value::{Iri, Value};

/// Aliased expression projected as a named column.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Probe {
    alias: String,
    expression: Expression,
}

impl Probe {
    /// Binds `alias` to `expression`.
    pub fn new(alias: impl Into<String>, expression: Expression) -> Self {
        Self {
            alias: alias.into(),
            expression,
        }
    }

    /// Column name.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Projected expression.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

/// Key of a frame field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    /// Shape field, by label.
    Property(String),
    /// Computed column.
    Probe(Probe),
}

impl Field {
    /// Label or alias.
    pub fn name(&self) -> &str {
        match self {
            Field::Property(label) => label,
            Field::Probe(probe) => probe.alias(),
        }
    }
}

/// Field value: a scalar, a nested frame, or (in models) a nested query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// Scalar or resource reference.
    Value(Value),
    /// Nested resource.
    Frame(Frame),
    /// Nested collection request; only meaningful inside models.
    Query(Box<Query>),
}

impl Term {
    /// Returns the scalar, if any.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Term::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the nested frame, if any.
    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Term::Frame(frame) => Some(frame),
            _ => None,
        }
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Term::Value(value)
    }
}

impl From<Frame> for Term {
    fn from(frame: Frame) -> Self {
        Term::Frame(frame)
    }
}

impl From<Query> for Term {
    fn from(query: Query) -> Self {
        Term::Query(Box::new(query))
    }
}

/// Resource snapshot: optional id plus field values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Frame {
    id: Option<Iri>,
    fields: BTreeMap<Field, Vec<Term>>,
}

impl Frame {
    /// Creates an anonymous frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frame for a known resource.
    pub fn with_id(id: impl Into<Iri>) -> Self {
        Self {
            id: Some(id.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Resource id.
    pub fn id(&self) -> Option<&Iri> {
        self.id.as_ref()
    }

    /// Replaces the resource id.
    pub fn set_id(&mut self, id: Option<Iri>) {
        self.id = id;
    }

    /// Declares a property field without terms; in a model this fetches the
    /// raw values (literals or resource ids).
    pub fn field(mut self, label: &str) -> Self {
        self.entry(Field::Property(label.to_owned()));
        self
    }

    /// Appends scalar values to a property field.
    pub fn with<I, V>(mut self, label: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.entry(Field::Property(label.to_owned()))
            .extend(values.into_iter().map(|v| Term::Value(v.into())));
        self
    }

    /// Appends a nested frame to a property field.
    pub fn with_frame(mut self, label: &str, frame: Frame) -> Self {
        self.entry(Field::Property(label.to_owned()))
            .push(Term::Frame(frame));
        self
    }

    /// Appends a nested collection query to a property field.
    pub fn with_query(mut self, label: &str, query: Query) -> Self {
        self.entry(Field::Property(label.to_owned()))
            .push(Term::Query(Box::new(query)));
        self
    }

    /// Declares a probe column (values are filled in by retrieval).
    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.entry(Field::Probe(probe));
        self
    }

    /// Replaces the terms of a field.
    pub fn insert(&mut self, field: Field, terms: Vec<Term>) {
        self.fields.insert(field, terms);
    }

    fn entry(&mut self, field: Field) -> &mut Vec<Term> {
        self.fields.entry(field).or_default()
    }

    /// Iterates fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&Field, &[Term])> {
        self.fields.iter().map(|(field, terms)| (field, terms.as_slice()))
    }

    /// Terms of a field.
    pub fn get(&self, field: &Field) -> &[Term] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Terms of a property field, by label.
    pub fn values(&self, label: &str) -> &[Term] {
        self.get(&Field::Property(label.to_owned()))
    }

    /// Terms of a probe column, by alias.
    pub fn probe(&self, alias: &str) -> &[Term] {
        self.fields
            .iter()
            .find(|(field, _)| matches!(field, Field::Probe(p) if p.alias() == alias))
            .map(|(_, terms)| terms.as_slice())
            .unwrap_or(&[])
    }

    /// Scalar values of a property field, skipping nested terms.
    pub fn scalars(&self, label: &str) -> Vec<&Value> {
        self.values(label).iter().filter_map(Term::as_value).collect()
    }

    /// Returns true when the frame has probe columns.
    pub fn is_tabular(&self) -> bool {
        self.fields.keys().any(|field| matches!(field, Field::Probe(_)))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true when the frame has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(id) = &self.id {
            map.serialize_entry("@id", id.as_str())?;
        }
        for (field, terms) in &self.fields {
            map.serialize_entry(field.name(), &TermsRef(terms))?;
        }
        map.end()
    }
}

struct TermsRef<'a>(&'a [Term]);

impl Serialize for TermsRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for term in self.0 {
            match term {
                Term::Value(value) => seq.serialize_element(value)?,
                Term::Frame(frame) => seq.serialize_element(frame)?,
                Term::Query(_) => seq.serialize_element(&())?,
            }
        }
        seq.end()
    }
}
