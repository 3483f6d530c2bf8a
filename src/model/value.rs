//! Canonical scalar value representation shared by frames, constraints,
//! compiled programs, and store drivers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Predicate linking a resource to its classes.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Absolute or base-relative resource identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(Arc<str>);

impl Iri {
    /// Wraps an identifier without validation.
    pub fn new(value: impl AsRef<str>) -> Self {
        Iri(Arc::from(value.as_ref()))
    }

    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the identifier carries a scheme.
    pub fn is_absolute(&self) -> bool {
        has_scheme(&self.0)
    }

    /// Resolves `reference` against `self` used as a base.
    ///
    /// Only the forms produced by resource paths are handled: absolute
    /// identifiers, root-relative paths, and same-directory names.
    pub fn resolve(&self, reference: &str) -> Iri {
        if has_scheme(reference) {
            return Iri::new(reference);
        }
        let base = self.as_str();
        if let Some(rest) = reference.strip_prefix('/') {
            let authority_end = base
                .find("://")
                .and_then(|at| base[at + 3..].find('/').map(|slash| at + 3 + slash))
                .unwrap_or(base.len());
            return Iri::new(format!("{}/{}", &base[..authority_end], rest));
        }
        match base.rfind('/') {
            Some(slash) => Iri::new(format!("{}{}", &base[..=slash], reference)),
            None => Iri::new(format!("{base}/{reference}")),
        }
    }

    /// Strips `base` from the identifier when it is a prefix.
    pub fn relativize(&self, base: &Iri) -> String {
        match self.as_str().strip_prefix(base.as_str()) {
            Some(rest) if !rest.is_empty() => rest.to_owned(),
            _ => self.as_str().to_owned(),
        }
    }
}

fn has_scheme(value: &str) -> bool {
    match value.find(':') {
        Some(colon) => {
            colon > 0
                && value[..colon]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Iri::new(value)
    }
}

impl From<String> for Iri {
    fn from(value: String) -> Self {
        Iri(Arc::from(value))
    }
}

/// Scalar datatype carried by shapes and inferred through expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Datatype {
    /// Boolean literal.
    Boolean,
    /// Signed integer literal.
    Integer,
    /// Decimal literal.
    Decimal,
    /// Plain string literal.
    String,
    /// Timestamp literal.
    DateTime,
    /// Resource reference.
    Resource,
}

/// Typed value tagged with explicit type information so the wire format
/// remains unambiguous.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Unbound sentinel; inside `any` sets it matches missing values.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit decimal literal.
    Decimal(f64),
    /// UTF-8 string literal.
    String(String),
    /// Nanoseconds since Unix epoch in UTC.
    DateTime(i128),
    /// Resource reference.
    Iri(Iri),
}

impl Value {
    /// Parses an RFC 3339 timestamp into a [`Value::DateTime`].
    pub fn datetime(text: &str) -> Option<Value> {
        OffsetDateTime::parse(text, &Rfc3339)
            .ok()
            .map(|ts| Value::DateTime(ts.unix_timestamp_nanos()))
    }

    /// Builds a resource reference.
    pub fn iri(value: impl AsRef<str>) -> Value {
        Value::Iri(Iri::new(value))
    }

    /// Returns the datatype of the value, `None` for the null sentinel.
    pub fn datatype(&self) -> Option<Datatype> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(Datatype::Boolean),
            Value::Int(_) => Some(Datatype::Integer),
            Value::Decimal(_) => Some(Datatype::Decimal),
            Value::String(_) => Some(Datatype::String),
            Value::DateTime(_) => Some(Datatype::DateTime),
            Value::Iri(_) => Some(Datatype::Resource),
        }
    }

    /// Returns the resource identifier when the value is a reference.
    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Value::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// Returns the numeric value widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true for the null sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Compares two values by their natural order, promoting integers to
    /// decimals. Values of unrelated datatypes are incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Iri(a), Value::Iri(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Lexical form used by keyword matching.
    pub fn lexical(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Decimal(v) => v.to_string(),
            Value::String(v) => v.clone(),
            Value::DateTime(nanos) => format_datetime(*nanos),
            Value::Iri(iri) => iri.as_str().to_owned(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Decimal(_) => 3,
            Value::String(_) => 4,
            Value::DateTime(_) => 5,
            Value::Iri(_) => 6,
        }
    }
}

fn format_datetime(nanos: i128) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|ts| ts.format(&Rfc3339).ok())
        .unwrap_or_else(|| nanos.to_string())
}

// Total order used for set membership and deterministic sorting: datatype
// rank first, then the natural order within the datatype.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Iri(a), Value::Iri(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Decimal(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
            Value::Iri(v) => v.hash(state),
        }
    }
}

/// Renders the value as a native-program literal.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("UNDEF"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "\"{v}\"^^<http://www.w3.org/2001/XMLSchema#decimal>"),
            Value::String(v) => write!(f, "\"{}\"", escape_literal(v)),
            Value::DateTime(nanos) => write!(
                f,
                "\"{}\"^^<http://www.w3.org/2001/XMLSchema#dateTime>",
                format_datetime(*nanos)
            ),
            Value::Iri(iri) => write!(f, "<{iri}>"),
        }
    }
}

/// Escapes a string for inclusion inside a quoted literal.
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Decimal(value)
    }
}

impl From<Iri> for Value {
    fn from(value: Iri) -> Self {
        Value::Iri(value)
    }
}
