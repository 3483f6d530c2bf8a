//! Trellis: schema-driven access to graph data.
//!
//! Shapes describe resources; frames carry resource data and double as
//! retrieval models; queries filter, focus, order, and page collections.
//! The [`compile`] module lowers queries to [`program`] selects, the
//! [`engine`] batches them into few round-trips against a [`store`], and
//! writes go through transactional create, update, and delete.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod profile;
pub mod program;
pub mod store;

pub use compile::{explain, Anchor, CompiledQuery, Compiler};
pub use config::Config;
pub use engine::Engine;
pub use error::{Result, SchemaError, TrellisError};
pub use model::{
    Constraint, Criterion, Datatype, Expression, Field, Frame, Iri, Probe, Query, Schema, Shape,
    ShapeId, Term, Transform, Value,
};
pub use store::{Connection, MemoryStore, Store};
