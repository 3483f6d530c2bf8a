//! Schema and request model: shapes, constraints, expressions, frames and queries.

pub mod builder;
pub mod constraint;
pub mod expression;
pub mod frame;
pub mod query;
pub mod shape;
pub mod value;

pub use constraint::{Constraint, Options};
pub use expression::{Expression, Transform};
pub use frame::{Field, Frame, Probe, Term};
pub use query::{Criterion, Query};
pub use shape::{Composition, FieldShape, Property, Schema, Shape, ShapeId};
pub use value::{Datatype, Iri, Value};
