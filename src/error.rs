//! Error types shared by the compiler, the engines, and store drivers.

#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrellisError>;

/// Top-level error returned by every fallible operation.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// Caller supplied a query, path, or frame that contradicts the schema.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    /// Store execution or transport failure.
    #[error("driver error: {0}")]
    Driver(String),
    /// Transaction protocol misuse (commit without begin, nested begin).
    #[error("transaction error: {0}")]
    Transaction(&'static str),
    /// A write linked a non-virtual resource that has no description.
    #[error("dangling reference to <{id}>")]
    DanglingReference {
        /// Identifier of the missing resource.
        id: String,
    },
    /// Retrieval kept raising tasks past the configured round limit.
    #[error("retrieval exceeded {max} rounds")]
    RoundLimit {
        /// Configured limit.
        max: usize,
    },
    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TrellisError {
    /// Builds a [`TrellisError::Driver`] from any displayable cause.
    pub fn driver(cause: impl fmt::Display) -> Self {
        TrellisError::Driver(cause.to_string())
    }

    /// Returns true when the error was caused by caller input rather than the store.
    pub fn is_schema(&self) -> bool {
        matches!(self, TrellisError::Schema(_))
    }
}

/// Structured user-input errors raised while resolving shapes and compiling queries.
///
/// These are never retried: they indicate a caller bug and bubble up unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Shape does not declare the requested field.
    #[error("unknown property '{label}' on shape '{shape}'")]
    UnknownProperty { label: String, shape: String },
    /// A segment of an expression path could not be resolved.
    #[error("unknown path segment '{segment}' in '{path}'")]
    UnknownPath { path: String, segment: String },
    /// Path walks through a scalar-valued field.
    #[error("path '{path}' traverses a non-traversable field")]
    NotTraversable { path: String },
    /// Conditional shapes must be redacted before compilation.
    #[error("conditional shape '{shape}' is not supported here")]
    UnsupportedShape { shape: String },
    /// Shape was declared but never defined.
    #[error("shape '{name}' is declared but not defined")]
    UndefinedShape { name: String },
    /// Expression pipe is structurally invalid.
    #[error("malformed expression '{expression}': {reason}")]
    MalformedExpression {
        expression: String,
        reason: &'static str,
    },
    /// Model mixes probe columns with property fields.
    #[error("tabular projection cannot mix probes and property fields")]
    MixedProjection,
    /// Probe columns cannot carry nested templates.
    #[error("probe '{alias}' cannot project a nested collection")]
    NestedTabular { alias: String },
    /// Nested frame to be written has fields but no identifier.
    #[error("nested frame under '{label}' has no id")]
    MissingId { label: String },
    /// Inverse field values must be resources.
    #[error("inverse field '{label}' requires resource values")]
    InverseLiteral { label: String },
}

impl SchemaError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::UnknownProperty { .. } => "UnknownProperty",
            SchemaError::UnknownPath { .. } => "UnknownPath",
            SchemaError::NotTraversable { .. } => "NotTraversable",
            SchemaError::UnsupportedShape { .. } => "UnsupportedShape",
            SchemaError::UndefinedShape { .. } => "UndefinedShape",
            SchemaError::MalformedExpression { .. } => "MalformedExpression",
            SchemaError::MixedProjection => "MixedProjection",
            SchemaError::NestedTabular { .. } => "NestedTabular",
            SchemaError::MissingId { .. } => "MissingId",
            SchemaError::InverseLiteral { .. } => "InverseLiteral",
        }
    }
}

/// Formats a schema error prefixed with its code.
pub struct SchemaErrorWithCode<'a>(pub &'a SchemaError);

impl fmt::Display for SchemaErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_errors_carry_codes() {
        let err = SchemaError::UnknownPath {
            path: "supervisor.rank".into(),
            segment: "rank".into(),
        };
        assert_eq!(
            SchemaErrorWithCode(&err).to_string(),
            "[UnknownPath] unknown path segment 'rank' in 'supervisor.rank'"
        );
        let wrapped: TrellisError = err.into();
        assert!(wrapped.is_schema());
    }

    #[test]
    fn driver_errors_are_not_schema_errors() {
        let err = TrellisError::driver("connection reset");
        assert!(!err.is_schema());
        assert_eq!(err.to_string(), "driver error: connection reset");
    }
}
