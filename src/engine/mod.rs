//! Retrieval and mutation over a [`Store`].
//!
//! Every public operation checks out one connection, runs to completion on
//! it, and releases it on every exit path.

mod mutate;
mod retrieve;
mod tasks;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::model::shape::{Schema, ShapeId};
use crate::model::value::Iri;
use crate::store::driver::Store;

/// Schema-driven access to a store.
pub struct Engine<S: Store> {
    store: S,
    schema: Arc<Schema>,
    config: Config,
}

impl<S: Store> Engine<S> {
    /// Creates an engine with the default configuration.
    pub fn new(store: S, schema: impl Into<Arc<Schema>>) -> Self {
        Self::with_config(store, schema, Config::default())
    }

    /// Creates an engine with an explicit configuration.
    pub fn with_config(store: S, schema: impl Into<Arc<Schema>>, config: Config) -> Self {
        Self {
            store,
            schema: schema.into(),
            config,
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Shape registry.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves `id` against the shape base, falling back to the configured one.
    pub fn resolve_id(&self, shape: ShapeId, id: &str) -> Result<Iri> {
        let declared = self.schema.get(shape)?;
        if declared.base_iri().is_some() {
            return Ok(declared.resolve(id));
        }
        Ok(match self.config.base_iri() {
            Some(base) => base.resolve(id),
            None => Iri::new(id),
        })
    }

    /// Inverse of [`Engine::resolve_id`]: the id relative to the applicable base.
    pub fn local_id(&self, shape: ShapeId, id: &Iri) -> Result<String> {
        let declared = self.schema.get(shape)?;
        if declared.base_iri().is_some() {
            return Ok(declared.relativize(id));
        }
        Ok(match self.config.base_iri() {
            Some(base) => id.relativize(&base),
            None => id.as_str().to_owned(),
        })
    }
}

impl<S: Store + Clone> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            schema: Arc::clone(&self.schema),
            config: self.config.clone(),
        }
    }
}
