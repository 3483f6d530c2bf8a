//! Property paths with transform pipelines.
//!
//! A pipe is written outermost-first: `[MAX, ABS]` over `x` means
//! `MAX(ABS(x))`. At most one transform in a pipe may be an aggregate.

use std::cmp::Ordering;
use std::fmt;

use smallvec::SmallVec;
use time::OffsetDateTime;

use crate::error::SchemaError;
use crate::model::frame::{Frame, Term};
use crate::model::shape::{Property, Schema, Shape, ShapeId};
use crate::model::value::{Datatype, Value};

/// Named scalar or aggregate function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transform {
    /// Number of values.
    Count,
    /// Sum of numeric values.
    Sum,
    /// Mean of numeric values.
    Avg,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Absolute value.
    Abs,
    /// Nearest integer, half away from zero.
    Round,
    /// Smallest integer not less than the value.
    Ceil,
    /// Largest integer not greater than the value.
    Floor,
    /// Calendar year of a timestamp.
    Year,
    /// Character length of the lexical form.
    Length,
}

impl Transform {
    /// Returns true for multiset-reducing transforms.
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Transform::Count | Transform::Sum | Transform::Avg | Transform::Min | Transform::Max
        )
    }

    /// Function name in native programs.
    pub fn name(self) -> &'static str {
        match self {
            Transform::Count => "COUNT",
            Transform::Sum => "SUM",
            Transform::Avg => "AVG",
            Transform::Min => "MIN",
            Transform::Max => "MAX",
            Transform::Abs => "ABS",
            Transform::Round => "ROUND",
            Transform::Ceil => "CEIL",
            Transform::Floor => "FLOOR",
            Transform::Year => "YEAR",
            Transform::Length => "STRLEN",
        }
    }

    /// Result datatype given the input datatype.
    pub fn datatype(self, input: Option<Datatype>) -> Option<Datatype> {
        match self {
            Transform::Count | Transform::Year | Transform::Length => Some(Datatype::Integer),
            Transform::Avg => Some(Datatype::Decimal),
            Transform::Sum | Transform::Abs | Transform::Round | Transform::Ceil | Transform::Floor => {
                match input {
                    Some(Datatype::Integer) => Some(Datatype::Integer),
                    _ => Some(Datatype::Decimal),
                }
            }
            Transform::Min | Transform::Max => input,
        }
    }

    fn shape(self, input: Shape) -> Shape {
        let datatype = self.datatype(input.declared_datatype());
        let shape = input.with_datatype(datatype);
        match self {
            Transform::Count => shape.with_cardinality(Some(1), Some(1)),
            Transform::Sum | Transform::Avg | Transform::Min | Transform::Max => {
                shape.with_cardinality(None, Some(1))
            }
            _ => shape,
        }
    }

    /// Applies a scalar transform; `None` when the value has the wrong type.
    pub fn apply(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Transform::Abs, Value::Int(v)) => v.checked_abs().map(Value::Int),
            (Transform::Abs, Value::Decimal(v)) => Some(Value::Decimal(v.abs())),
            (Transform::Round | Transform::Ceil | Transform::Floor, Value::Int(v)) => {
                Some(Value::Int(*v))
            }
            (Transform::Round, Value::Decimal(v)) => Some(Value::Decimal(v.round())),
            (Transform::Ceil, Value::Decimal(v)) => Some(Value::Decimal(v.ceil())),
            (Transform::Floor, Value::Decimal(v)) => Some(Value::Decimal(v.floor())),
            (Transform::Year, Value::DateTime(nanos)) => OffsetDateTime::from_unix_timestamp_nanos(*nanos)
                .ok()
                .map(|ts| Value::Int(i64::from(ts.year()))),
            (Transform::Length, Value::String(text)) => {
                Some(Value::Int(text.chars().count() as i64))
            }
            (Transform::Length, Value::Iri(iri)) => {
                Some(Value::Int(iri.as_str().chars().count() as i64))
            }
            _ => None,
        }
    }

    /// Reduces a multiset of bound values.
    pub fn reduce(self, values: &[Value]) -> Option<Value> {
        match self {
            Transform::Count => Some(Value::Int(values.len() as i64)),
            Transform::Sum => sum(values),
            Transform::Avg => {
                if values.is_empty() {
                    return Some(Value::Decimal(0.0));
                }
                let total = values.iter().map(Value::as_f64).sum::<Option<f64>>()?;
                Some(Value::Decimal(total / values.len() as f64))
            }
            Transform::Min => extreme(values, Ordering::Less),
            Transform::Max => extreme(values, Ordering::Greater),
            _ => None,
        }
    }
}

fn sum(values: &[Value]) -> Option<Value> {
    let mut int_total: Option<i64> = Some(0);
    let mut dec_total = 0.0;
    for value in values {
        match value {
            Value::Int(v) => {
                int_total = int_total.and_then(|total| total.checked_add(*v));
                dec_total += *v as f64;
            }
            Value::Decimal(v) => {
                int_total = None;
                dec_total += v;
            }
            _ => return None,
        }
    }
    Some(match int_total {
        Some(total) => Value::Int(total),
        None => Value::Decimal(dec_total),
    })
}

fn extreme(values: &[Value], wanted: Ordering) -> Option<Value> {
    values
        .iter()
        .fold(None::<&Value>, |best, value| match best {
            None => Some(value),
            Some(best) => {
                let ord = value.compare(best).unwrap_or_else(|| value.cmp(best));
                if ord == wanted {
                    Some(value)
                } else {
                    Some(best)
                }
            }
        })
        .cloned()
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Property path plus an ordered transform pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Expression {
    path: SmallVec<[String; 2]>,
    pipe: SmallVec<[Transform; 2]>,
}

impl Expression {
    /// The root value itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// Plain path without transforms.
    pub fn path<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: labels.into_iter().map(Into::into).collect(),
            pipe: SmallVec::new(),
        }
    }

    /// Builds an expression from an outermost-first pipe and a path.
    pub fn new<P, I, S>(pipe: P, labels: I) -> Self
    where
        P: IntoIterator<Item = Transform>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: labels.into_iter().map(Into::into).collect(),
            pipe: pipe.into_iter().collect(),
        }
    }

    /// Wraps the expression in an outer transform.
    pub fn transform(mut self, transform: Transform) -> Self {
        self.pipe.insert(0, transform);
        self
    }

    /// Path labels, root first.
    pub fn labels(&self) -> &[String] {
        &self.path
    }

    /// Transform pipe, outermost first.
    pub fn pipe(&self) -> &[Transform] {
        &self.pipe
    }

    /// True when the pipe contains a multiset-reducing transform.
    pub fn aggregate(&self) -> bool {
        self.pipe.iter().any(|t| t.is_aggregate())
    }

    /// True when the pipe is non-empty.
    pub fn computed(&self) -> bool {
        !self.pipe.is_empty()
    }

    /// Splits the pipe around its aggregate: `(outer, aggregate, inner)`.
    pub fn split(&self) -> (&[Transform], Option<Transform>, &[Transform]) {
        match self.pipe.iter().position(|t| t.is_aggregate()) {
            Some(at) => (&self.pipe[..at], Some(self.pipe[at]), &self.pipe[at + 1..]),
            None => (&[], None, &self.pipe[..]),
        }
    }

    /// Rejects pipes with more than one aggregate.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.pipe.iter().filter(|t| t.is_aggregate()).count() > 1 {
            return Err(SchemaError::MalformedExpression {
                expression: self.to_string(),
                reason: "at most one aggregate per pipe",
            });
        }
        Ok(())
    }

    /// Resolves every hop of the path against `shape`.
    pub fn walk(
        &self,
        schema: &Schema,
        shape: ShapeId,
    ) -> Result<Vec<(Property, ShapeId)>, SchemaError> {
        let mut hops = Vec::with_capacity(self.path.len());
        let mut current = shape;
        for (at, label) in self.path.iter().enumerate() {
            if at > 0 {
                if let Some(datatype) = schema.datatype(current)? {
                    if datatype != Datatype::Resource {
                        return Err(SchemaError::NotTraversable {
                            path: self.to_string(),
                        });
                    }
                }
            }
            let (property, next) = schema.entry(current, label).map_err(|err| match err {
                SchemaError::UnknownProperty { .. } => SchemaError::UnknownPath {
                    path: self.to_string(),
                    segment: label.clone(),
                },
                other => other,
            })?;
            hops.push((property, next));
            current = next;
        }
        Ok(hops)
    }

    /// Shape of the values produced by the expression over `shape`.
    pub fn apply(&self, schema: &Schema, shape: ShapeId) -> Result<Shape, SchemaError> {
        self.validate()?;
        let target = self.walk(schema, shape)?.last().map_or(shape, |(_, id)| *id);
        let mut result = schema
            .get(target)?
            .scalar_projection()
            .with_datatype(schema.datatype(target)?);
        for transform in self.pipe.iter().rev() {
            result = transform.shape(result);
        }
        Ok(result)
    }

    /// Evaluates the expression over a materialised frame.
    ///
    /// Nested frames contribute their id when they are the final hop.
    pub fn evaluate(&self, frame: &Frame) -> Vec<Value> {
        let mut frames = vec![frame];
        let mut values: Vec<Value> = Vec::new();
        for (at, label) in self.path.iter().enumerate() {
            let last = at + 1 == self.path.len();
            let mut next = Vec::new();
            for current in frames {
                for term in current.values(label) {
                    match term {
                        Term::Frame(child) if !last => next.push(child),
                        Term::Frame(child) => {
                            if let Some(id) = child.id() {
                                values.push(Value::Iri(id.clone()));
                            }
                        }
                        Term::Value(value) if last => values.push(value.clone()),
                        _ => {}
                    }
                }
            }
            frames = next;
        }
        if self.path.is_empty() {
            values.extend(frame.id().cloned().map(Value::Iri));
        }

        let (outer, aggregate, inner) = self.split();
        let map = |values: Vec<Value>, pipe: &[Transform]| -> Vec<Value> {
            values
                .into_iter()
                .filter_map(|value| {
                    pipe.iter()
                        .rev()
                        .try_fold(value, |value, transform| transform.apply(&value))
                })
                .collect()
        };
        let values = map(values, inner);
        match aggregate {
            Some(aggregate) => aggregate
                .reduce(&values)
                .map(|value| map(vec![value], outer))
                .unwrap_or_default(),
            None => values,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for transform in &self.pipe {
            write!(f, "{}:", transform.name().to_lowercase())?;
        }
        f.write_str(&self.path.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::value::Iri;

    fn schema() -> (Schema, ShapeId) {
        let mut schema = Schema::new();
        let employee = schema.declare("Employee");
        let integer = schema.add(Shape::of(Datatype::Integer));
        let stamp = schema.add(Shape::of(Datatype::DateTime));
        schema.define(
            employee,
            Shape::new()
                .field("seniority", "urn:seniority", integer)
                .field("hired", "urn:hired", stamp)
                .field("supervisor", "urn:supervisor", employee),
        );
        (schema, employee)
    }

    #[test]
    fn average_of_integers_is_decimal() {
        let (schema, employee) = schema();
        let expr = Expression::new([Transform::Avg], ["seniority"]);
        let shape = expr.apply(&schema, employee).expect("apply");
        assert_eq!(shape.declared_datatype(), Some(Datatype::Decimal));
        assert_eq!(shape.max_count_value(), Some(1));
    }

    #[test]
    fn datatypes_propagate_through_hops_and_pipes() {
        let (schema, employee) = schema();
        let year = Expression::new([Transform::Max, Transform::Year], ["supervisor", "hired"]);
        assert!(year.aggregate());
        assert_eq!(
            year.apply(&schema, employee).expect("apply").declared_datatype(),
            Some(Datatype::Integer)
        );
        let count = Expression::new([Transform::Count], Vec::<String>::new());
        let shape = count.apply(&schema, employee).expect("apply");
        assert_eq!(shape.min_count_value(), Some(1));
    }

    #[test]
    fn path_errors_name_the_segment() {
        let (schema, employee) = schema();
        let err = Expression::path(["supervisor", "rank"])
            .apply(&schema, employee)
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownPath {
                path: "supervisor.rank".into(),
                segment: "rank".into()
            }
        );
        let err = Expression::path(["seniority", "x"]).apply(&schema, employee).unwrap_err();
        assert_eq!(err.code(), "NotTraversable");
    }

    #[test]
    fn double_aggregates_are_malformed() {
        let (schema, employee) = schema();
        let expr = Expression::new([Transform::Max, Transform::Count], ["seniority"]);
        assert_eq!(
            expr.apply(&schema, employee).unwrap_err().code(),
            "MalformedExpression"
        );
        assert_eq!(expr.to_string(), "max:count:seniority");
    }

    #[test]
    fn evaluates_against_frames() {
        let frame = Frame::with_id(Iri::new("urn:e:1"))
            .with("seniority", [Value::Int(-4)])
            .with_frame(
                "supervisor",
                Frame::with_id(Iri::new("urn:e:2")).with("seniority", [Value::Int(6)]),
            );
        let abs = Expression::path(["seniority"]).transform(Transform::Abs);
        assert_eq!(abs.evaluate(&frame), vec![Value::Int(4)]);
        let nested = Expression::path(["supervisor", "seniority"]);
        assert_eq!(nested.evaluate(&frame), vec![Value::Int(6)]);
        let count = Expression::new([Transform::Count], ["supervisor"]);
        assert_eq!(count.evaluate(&frame), vec![Value::Int(1)]);
        assert_eq!(
            Expression::root().evaluate(&frame),
            vec![Value::iri("urn:e:1")]
        );
    }

    #[test]
    fn reducers_handle_mixed_numbers() {
        let values = [Value::Int(1), Value::Decimal(2.5)];
        assert_eq!(Transform::Sum.reduce(&values), Some(Value::Decimal(3.5)));
        assert_eq!(Transform::Max.reduce(&values), Some(Value::Decimal(2.5)));
        assert_eq!(Transform::Min.reduce(&[]), None);
        assert_eq!(Transform::Count.reduce(&[]), Some(Value::Int(0)));
    }
}
