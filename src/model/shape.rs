//! Shapes describe the fields and value constraints of a resource.
//!
//! Shapes live in a [`Schema`] arena and refer to each other through
//! [`ShapeId`] handles that are only dereferenced on demand. Self-referential
//! graphs (an employee whose supervisor is an employee) are therefore built
//! by declaring a name first and defining it later; nothing is materialised
//! eagerly and equality between references is plain id equality.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::SchemaError;
use crate::model::value::{Datatype, Iri, Value};

/// Handle to a shape stored in a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u32);

/// Edge traversed by a field: the property IRI plus its direction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Property {
    /// Field label used in frames and expression paths.
    pub label: String,
    /// Predicate identifier in the store.
    pub iri: Iri,
    /// True when the edge points from the value to the resource.
    pub inverse: bool,
}

impl Property {
    /// Creates a forward property.
    pub fn forward(label: impl Into<String>, iri: impl Into<Iri>) -> Self {
        Self {
            label: label.into(),
            iri: iri.into(),
            inverse: false,
        }
    }

    /// Creates an inverse property.
    pub fn inverse(label: impl Into<String>, iri: impl Into<Iri>) -> Self {
        Self {
            label: label.into(),
            iri: iri.into(),
            inverse: true,
        }
    }
}

/// Field declared by a shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldShape {
    /// Edge the field follows.
    pub property: Property,
    /// Shape of the field values, resolved lazily.
    pub shape: ShapeId,
}

/// Logical composition of shapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Composition {
    /// Values must satisfy every shape.
    And(Vec<ShapeId>),
    /// Values must satisfy at least one shape.
    Or(Vec<ShapeId>),
    /// `then` applies only when `guard` holds; must be redacted upstream.
    When {
        /// Shape acting as the condition.
        guard: ShapeId,
        /// Shape applied when the condition holds.
        then: ShapeId,
    },
}

/// Immutable schema node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shape {
    is_virtual: bool,
    base: Option<Iri>,
    datatype: Option<Datatype>,
    classes: BTreeSet<Iri>,
    min_count: Option<usize>,
    max_count: Option<usize>,
    min_inclusive: Option<Value>,
    max_inclusive: Option<Value>,
    min_exclusive: Option<Value>,
    max_exclusive: Option<Value>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<String>,
    in_values: Option<BTreeSet<Value>>,
    has_value: Option<Value>,
    fields: BTreeMap<String, FieldShape>,
    composition: Vec<Composition>,
}

impl Shape {
    /// Creates an unconstrained shape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shape constrained to a scalar datatype.
    pub fn of(datatype: Datatype) -> Self {
        Self::new().datatype(datatype)
    }

    /// Marks the shape as a container with no stored identity of its own.
    pub fn as_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Sets the base used to resolve relative identifiers.
    pub fn base(mut self, base: impl Into<Iri>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Sets the datatype constraint.
    pub fn datatype(mut self, datatype: Datatype) -> Self {
        self.datatype = Some(datatype);
        self
    }

    /// Adds a class constraint.
    pub fn class(mut self, class: impl Into<Iri>) -> Self {
        self.classes.insert(class.into());
        self
    }

    /// Sets the minimum cardinality.
    pub fn min_count(mut self, count: usize) -> Self {
        self.min_count = Some(count);
        self
    }

    /// Sets the maximum cardinality.
    pub fn max_count(mut self, count: usize) -> Self {
        self.max_count = Some(count);
        self
    }

    /// Sets the inclusive lower bound.
    pub fn min_inclusive(mut self, value: impl Into<Value>) -> Self {
        self.min_inclusive = Some(value.into());
        self
    }

    /// Sets the inclusive upper bound.
    pub fn max_inclusive(mut self, value: impl Into<Value>) -> Self {
        self.max_inclusive = Some(value.into());
        self
    }

    /// Sets the exclusive lower bound.
    pub fn min_exclusive(mut self, value: impl Into<Value>) -> Self {
        self.min_exclusive = Some(value.into());
        self
    }

    /// Sets the exclusive upper bound.
    pub fn max_exclusive(mut self, value: impl Into<Value>) -> Self {
        self.max_exclusive = Some(value.into());
        self
    }

    /// Sets the minimum lexical length.
    pub fn min_length(mut self, length: usize) -> Self {
        self.min_length = Some(length);
        self
    }

    /// Sets the maximum lexical length.
    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Sets the lexical pattern.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Restricts values to an enumerated set.
    pub fn in_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Requires a specific value to be present.
    pub fn has_value(mut self, value: impl Into<Value>) -> Self {
        self.has_value = Some(value.into());
        self
    }

    /// Declares a forward field.
    pub fn field(self, label: &str, iri: impl Into<Iri>, shape: ShapeId) -> Self {
        self.with_field(Property::forward(label, iri), shape)
    }

    /// Declares an inverse field.
    pub fn inverse_field(self, label: &str, iri: impl Into<Iri>, shape: ShapeId) -> Self {
        self.with_field(Property::inverse(label, iri), shape)
    }

    /// Declares a field from an explicit property.
    pub fn with_field(mut self, property: Property, shape: ShapeId) -> Self {
        self.fields
            .insert(property.label.clone(), FieldShape { property, shape });
        self
    }

    /// Adds a conjunction.
    pub fn and(mut self, shapes: impl IntoIterator<Item = ShapeId>) -> Self {
        self.composition
            .push(Composition::And(shapes.into_iter().collect()));
        self
    }

    /// Adds a disjunction.
    pub fn or(mut self, shapes: impl IntoIterator<Item = ShapeId>) -> Self {
        self.composition
            .push(Composition::Or(shapes.into_iter().collect()));
        self
    }

    /// Adds a conditional clause.
    pub fn when(mut self, guard: ShapeId, then: ShapeId) -> Self {
        self.composition.push(Composition::When { guard, then });
        self
    }

    /// Returns true for container shapes without a stored identity.
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Returns the base identifier, if any.
    pub fn base_iri(&self) -> Option<&Iri> {
        self.base.as_ref()
    }

    /// Returns the declared datatype, ignoring composition.
    pub fn declared_datatype(&self) -> Option<Datatype> {
        self.datatype
    }

    /// Returns the declared classes, ignoring composition.
    pub fn declared_classes(&self) -> &BTreeSet<Iri> {
        &self.classes
    }

    /// Minimum cardinality.
    pub fn min_count_value(&self) -> Option<usize> {
        self.min_count
    }

    /// Maximum cardinality.
    pub fn max_count_value(&self) -> Option<usize> {
        self.max_count
    }

    /// Range bounds as `(min_inclusive, max_inclusive, min_exclusive, max_exclusive)`.
    pub fn range(&self) -> (Option<&Value>, Option<&Value>, Option<&Value>, Option<&Value>) {
        (
            self.min_inclusive.as_ref(),
            self.max_inclusive.as_ref(),
            self.min_exclusive.as_ref(),
            self.max_exclusive.as_ref(),
        )
    }

    /// Length bounds as `(min_length, max_length)`.
    pub fn length(&self) -> (Option<usize>, Option<usize>) {
        (self.min_length, self.max_length)
    }

    /// Lexical pattern.
    pub fn pattern_value(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Enumerated values.
    pub fn in_set(&self) -> Option<&BTreeSet<Value>> {
        self.in_values.as_ref()
    }

    /// Required value.
    pub fn has_value_value(&self) -> Option<&Value> {
        self.has_value.as_ref()
    }

    /// Fields declared directly on this shape.
    pub fn fields(&self) -> impl Iterator<Item = &FieldShape> {
        self.fields.values()
    }

    /// Composition clauses.
    pub fn composition(&self) -> &[Composition] {
        &self.composition
    }

    /// Resolves `id` against the shape base, if one is set.
    pub fn resolve(&self, id: &str) -> Iri {
        match &self.base {
            Some(base) => base.resolve(id),
            None => Iri::new(id),
        }
    }

    /// Relativizes `id` against the shape base, if one is set.
    pub fn relativize(&self, id: &Iri) -> String {
        match &self.base {
            Some(base) => id.relativize(base),
            None => id.as_str().to_owned(),
        }
    }

    pub(crate) fn with_datatype(mut self, datatype: Option<Datatype>) -> Self {
        self.datatype = datatype;
        self
    }

    pub(crate) fn with_cardinality(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_count = min;
        self.max_count = max;
        self
    }

    pub(crate) fn scalar_projection(&self) -> Self {
        Self {
            datatype: self.datatype,
            classes: self.classes.clone(),
            min_count: self.min_count,
            max_count: self.max_count,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug)]
struct Slot {
    name: String,
    shape: Option<Shape>,
}

/// Arena of named and anonymous shapes.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    slots: Vec<Slot>,
    names: HashMap<String, ShapeId>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a named shape so it can be referenced before it is defined.
    ///
    /// Declaring an existing name returns the existing handle.
    pub fn declare(&mut self, name: &str) -> ShapeId {
        if let Some(id) = self.names.get(name) {
            return *id;
        }
        let id = ShapeId(self.slots.len() as u32);
        self.slots.push(Slot {
            name: name.to_owned(),
            shape: None,
        });
        self.names.insert(name.to_owned(), id);
        id
    }

    /// Defines (or redefines) the shape behind a handle.
    pub fn define(&mut self, id: ShapeId, shape: Shape) -> ShapeId {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            slot.shape = Some(shape);
        }
        id
    }

    /// Declares and defines a named shape in one step.
    pub fn insert(&mut self, name: &str, shape: Shape) -> ShapeId {
        let id = self.declare(name);
        self.define(id, shape)
    }

    /// Registers an anonymous shape.
    pub fn add(&mut self, shape: Shape) -> ShapeId {
        let id = ShapeId(self.slots.len() as u32);
        self.slots.push(Slot {
            name: format!("_:{}", id.0),
            shape: Some(shape),
        });
        id
    }

    /// Finds a named shape.
    pub fn lookup(&self, name: &str) -> Option<ShapeId> {
        self.names.get(name).copied()
    }

    /// Returns the display name of a shape.
    pub fn name(&self, id: ShapeId) -> &str {
        self.slots
            .get(id.0 as usize)
            .map(|slot| slot.name.as_str())
            .unwrap_or("?")
    }

    /// Dereferences a handle.
    pub fn get(&self, id: ShapeId) -> Result<&Shape, SchemaError> {
        self.slots
            .get(id.0 as usize)
            .and_then(|slot| slot.shape.as_ref())
            .ok_or_else(|| SchemaError::UndefinedShape {
                name: self.name(id).to_owned(),
            })
    }

    /// Resolves a field label to its property and value shape, searching
    /// composed shapes in declaration order.
    pub fn entry(&self, id: ShapeId, label: &str) -> Result<(Property, ShapeId), SchemaError> {
        let mut visited = BTreeSet::new();
        match self.find_field(id, label, &mut visited)? {
            Some(field) => Ok((field.property.clone(), field.shape)),
            None => Err(SchemaError::UnknownProperty {
                label: label.to_owned(),
                shape: self.name(id).to_owned(),
            }),
        }
    }

    fn find_field<'s>(
        &'s self,
        id: ShapeId,
        label: &str,
        visited: &mut BTreeSet<ShapeId>,
    ) -> Result<Option<&'s FieldShape>, SchemaError> {
        if !visited.insert(id) {
            return Ok(None);
        }
        let shape = self.get(id)?;
        if let Some(field) = shape.fields.get(label) {
            return Ok(Some(field));
        }
        for clause in &shape.composition {
            match clause {
                Composition::And(ids) | Composition::Or(ids) => {
                    for nested in ids {
                        if let Some(field) = self.find_field(*nested, label, visited)? {
                            return Ok(Some(field));
                        }
                    }
                }
                Composition::When { .. } => {
                    return Err(SchemaError::UnsupportedShape {
                        shape: self.name(id).to_owned(),
                    })
                }
            }
        }
        Ok(None)
    }

    /// Collects every field reachable through composition, first declaration wins.
    pub fn fields(&self, id: ShapeId) -> Result<Vec<FieldShape>, SchemaError> {
        let mut out: BTreeMap<String, FieldShape> = BTreeMap::new();
        let mut visited = BTreeSet::new();
        self.collect_fields(id, &mut out, &mut visited)?;
        Ok(out.into_values().collect())
    }

    fn collect_fields(
        &self,
        id: ShapeId,
        out: &mut BTreeMap<String, FieldShape>,
        visited: &mut BTreeSet<ShapeId>,
    ) -> Result<(), SchemaError> {
        if !visited.insert(id) {
            return Ok(());
        }
        let shape = self.get(id)?;
        for field in shape.fields.values() {
            out.entry(field.property.label.clone())
                .or_insert_with(|| field.clone());
        }
        for clause in &shape.composition {
            match clause {
                Composition::And(ids) | Composition::Or(ids) => {
                    for nested in ids {
                        self.collect_fields(*nested, out, visited)?;
                    }
                }
                Composition::When { .. } => {
                    return Err(SchemaError::UnsupportedShape {
                        shape: self.name(id).to_owned(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Fails when a conditional clause is reachable through composition.
    pub fn ensure_unconditional(&self, id: ShapeId) -> Result<(), SchemaError> {
        let mut visited = BTreeSet::new();
        self.walk_composition(id, &mut visited)
    }

    fn walk_composition(
        &self,
        id: ShapeId,
        visited: &mut BTreeSet<ShapeId>,
    ) -> Result<(), SchemaError> {
        if !visited.insert(id) {
            return Ok(());
        }
        for clause in &self.get(id)?.composition {
            match clause {
                Composition::And(ids) | Composition::Or(ids) => {
                    for nested in ids {
                        self.walk_composition(*nested, visited)?;
                    }
                }
                Composition::When { .. } => {
                    return Err(SchemaError::UnsupportedShape {
                        shape: self.name(id).to_owned(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Effective datatype: declared, or the first found through composition.
    pub fn datatype(&self, id: ShapeId) -> Result<Option<Datatype>, SchemaError> {
        let mut visited = BTreeSet::new();
        self.find_datatype(id, &mut visited)
    }

    fn find_datatype(
        &self,
        id: ShapeId,
        visited: &mut BTreeSet<ShapeId>,
    ) -> Result<Option<Datatype>, SchemaError> {
        if !visited.insert(id) {
            return Ok(None);
        }
        let shape = self.get(id)?;
        if shape.datatype.is_some() {
            return Ok(shape.datatype);
        }
        for clause in &shape.composition {
            if let Composition::And(ids) | Composition::Or(ids) = clause {
                for nested in ids {
                    if let Some(datatype) = self.find_datatype(*nested, visited)? {
                        return Ok(Some(datatype));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Effective classes: union of declared classes across conjuncts.
    pub fn classes(&self, id: ShapeId) -> Result<BTreeSet<Iri>, SchemaError> {
        let mut out = BTreeSet::new();
        let mut visited = BTreeSet::new();
        self.collect_classes(id, &mut out, &mut visited)?;
        Ok(out)
    }

    fn collect_classes(
        &self,
        id: ShapeId,
        out: &mut BTreeSet<Iri>,
        visited: &mut BTreeSet<ShapeId>,
    ) -> Result<(), SchemaError> {
        if !visited.insert(id) {
            return Ok(());
        }
        let shape = self.get(id)?;
        out.extend(shape.classes.iter().cloned());
        for clause in &shape.composition {
            if let Composition::And(ids) = clause {
                for nested in ids {
                    self.collect_classes(*nested, out, visited)?;
                }
            }
        }
        Ok(())
    }

    /// Returns true when the shape is a virtual container.
    pub fn is_virtual(&self, id: ShapeId) -> Result<bool, SchemaError> {
        Ok(self.get(id)?.is_virtual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employees() -> (Schema, ShapeId) {
        let mut schema = Schema::new();
        let employee = schema.declare("Employee");
        let integer = schema.add(Shape::of(Datatype::Integer));
        schema.define(
            employee,
            Shape::new()
                .class("urn:Employee")
                .field("seniority", "urn:seniority", integer)
                .field("supervisor", "urn:supervisor", employee)
                .inverse_field("reports", "urn:supervisor", employee),
        );
        (schema, employee)
    }

    #[test]
    fn entry_follows_self_references() {
        let (schema, employee) = employees();
        let (prop, target) = schema.entry(employee, "supervisor").expect("field");
        assert_eq!(prop.iri.as_str(), "urn:supervisor");
        assert_eq!(target, employee);
        let (prop, _) = schema.entry(target, "reports").expect("inverse field");
        assert!(prop.inverse);
    }

    #[test]
    fn unknown_labels_fail() {
        let (schema, employee) = employees();
        let err = schema.entry(employee, "salary").unwrap_err();
        assert_eq!(err.code(), "UnknownProperty");
    }

    #[test]
    fn undefined_declarations_fail_on_use() {
        let mut schema = Schema::new();
        let pending = schema.declare("Pending");
        assert_eq!(
            schema.get(pending).unwrap_err(),
            SchemaError::UndefinedShape {
                name: "Pending".into()
            }
        );
    }

    #[test]
    fn composition_resolves_and_terminates_on_cycles() {
        let mut schema = Schema::new();
        let named = schema.declare("Named");
        let text = schema.add(Shape::of(Datatype::String));
        let looping = schema.declare("Loop");
        schema.define(looping, Shape::new().and([looping, named]));
        schema.define(named, Shape::new().field("name", "urn:name", text).and([looping]));
        assert!(schema.entry(looping, "name").is_ok());
        assert!(schema.entry(looping, "missing").is_err());
        assert_eq!(schema.fields(looping).expect("fields").len(), 1);
    }

    #[test]
    fn conditional_shapes_are_rejected() {
        let mut schema = Schema::new();
        let guard = schema.add(Shape::new());
        let then = schema.add(Shape::new());
        let conditional = schema.insert("Conditional", Shape::new().when(guard, then));
        assert_eq!(
            schema.ensure_unconditional(conditional).unwrap_err().code(),
            "UnsupportedShape"
        );
        assert_eq!(
            schema.entry(conditional, "x").unwrap_err().code(),
            "UnsupportedShape"
        );
    }

    #[test]
    fn datatype_and_classes_flow_through_conjunctions() {
        let mut schema = Schema::new();
        let typed = schema.add(Shape::of(Datatype::Decimal).class("urn:Measure"));
        let combined = schema.add(Shape::new().class("urn:Thing").and([typed]));
        assert_eq!(schema.datatype(combined).expect("datatype"), Some(Datatype::Decimal));
        assert_eq!(schema.classes(combined).expect("classes").len(), 2);
    }

    #[test]
    fn ids_resolve_and_relativize_against_the_base() {
        let based = Shape::new().base("https://example.org/people/");
        let id = based.resolve("1702");
        assert_eq!(id.as_str(), "https://example.org/people/1702");
        assert_eq!(based.relativize(&id), "1702");
        assert_eq!(Shape::new().relativize(&id), id.as_str());
    }
}
