//! Conjunctive scalar filters and their merge algebra.
//!
//! Two `any` flavours coexist and are deliberately kept apart:
//!
//! * accumulating options on one clause ([`Constraint::any`] called twice)
//!   unions the option sets, since the caller is listing alternatives;
//! * merging two clauses ([`Constraint::and`]) intersects what each clause
//!   admits, so the result is associative, commutative, and idempotent.
//!
//! Keyword sets (`like`) are conjunctive in both cases: every keyword must
//! match, so merging unions the keyword sets.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::model::value::Value;

/// Option set admitted by an `any` clause.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Options {
    /// Existential: the value must be bound, any value will do.
    Bound,
    /// Enumerated: the value must be one of these; [`Value::Null`] admits unbound.
    /// An empty set admits nothing.
    Values(BTreeSet<Value>),
}

impl Options {
    fn intersect(&self, other: &Options) -> Options {
        match (self, other) {
            (Options::Bound, Options::Bound) => Options::Bound,
            (Options::Bound, Options::Values(values)) | (Options::Values(values), Options::Bound) => {
                Options::Values(values.iter().filter(|v| !v.is_null()).cloned().collect())
            }
            (Options::Values(a), Options::Values(b)) => {
                Options::Values(a.intersection(b).cloned().collect())
            }
        }
    }
}

/// Conjunctive scalar filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constraint {
    lt: Option<Value>,
    gt: Option<Value>,
    lte: Option<Value>,
    gte: Option<Value>,
    like: BTreeSet<String>,
    any: Option<Options>,
}

impl Constraint {
    /// Creates an unconstrained filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict upper bound.
    pub fn lt(value: impl Into<Value>) -> Self {
        Self::new().with_lt(value)
    }

    /// Strict lower bound.
    pub fn gt(value: impl Into<Value>) -> Self {
        Self::new().with_gt(value)
    }

    /// Inclusive upper bound.
    pub fn lte(value: impl Into<Value>) -> Self {
        Self::new().with_lte(value)
    }

    /// Inclusive lower bound.
    pub fn gte(value: impl Into<Value>) -> Self {
        Self::new().with_gte(value)
    }

    /// Keyword match; whitespace separates keywords.
    pub fn like(keywords: &str) -> Self {
        Self::new().with_like(keywords)
    }

    /// Enumerated options; an empty list means "is bound".
    pub fn any<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new().with_any(values)
    }

    /// Narrows the strict upper bound.
    pub fn with_lt(mut self, value: impl Into<Value>) -> Self {
        self.lt = narrow(&self.lt, &Some(value.into()), Ordering::Less).0;
        self
    }

    /// Narrows the strict lower bound.
    pub fn with_gt(mut self, value: impl Into<Value>) -> Self {
        self.gt = narrow(&self.gt, &Some(value.into()), Ordering::Greater).0;
        self
    }

    /// Narrows the inclusive upper bound.
    pub fn with_lte(mut self, value: impl Into<Value>) -> Self {
        self.lte = narrow(&self.lte, &Some(value.into()), Ordering::Less).0;
        self
    }

    /// Narrows the inclusive lower bound.
    pub fn with_gte(mut self, value: impl Into<Value>) -> Self {
        self.gte = narrow(&self.gte, &Some(value.into()), Ordering::Greater).0;
        self
    }

    /// Adds keywords.
    pub fn with_like(mut self, keywords: &str) -> Self {
        self.like.extend(split_keywords(keywords));
        self
    }

    /// Accumulates options on this clause (union).
    pub fn with_any<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: BTreeSet<Value> = values.into_iter().map(Into::into).collect();
        self.any = Some(match (self.any.take(), values.is_empty()) {
            (None, true) => Options::Bound,
            (None, false) => Options::Values(values),
            (Some(Options::Bound), true) => Options::Bound,
            (Some(Options::Bound), false) => Options::Values(values),
            (Some(Options::Values(existing)), true) => Options::Values(existing),
            (Some(Options::Values(mut existing)), false) => {
                existing.extend(values);
                Options::Values(existing)
            }
        });
        self
    }

    /// Merges two clauses: bounds narrow, keywords accumulate, options intersect.
    ///
    /// Bounds of incomparable datatypes on the same side cannot both hold, so
    /// such a merge admits nothing.
    pub fn and(&self, other: &Constraint) -> Constraint {
        let (lt, lt_conflict) = narrow(&self.lt, &other.lt, Ordering::Less);
        let (gt, gt_conflict) = narrow(&self.gt, &other.gt, Ordering::Greater);
        let (lte, lte_conflict) = narrow(&self.lte, &other.lte, Ordering::Less);
        let (gte, gte_conflict) = narrow(&self.gte, &other.gte, Ordering::Greater);
        let any = if lt_conflict || gt_conflict || lte_conflict || gte_conflict {
            Some(Options::Values(BTreeSet::new()))
        } else {
            match (&self.any, &other.any) {
                (None, None) => None,
                (Some(options), None) | (None, Some(options)) => Some(options.clone()),
                (Some(a), Some(b)) => Some(a.intersect(b)),
            }
        };
        Constraint {
            lt,
            gt,
            lte,
            gte,
            like: self.like.union(&other.like).cloned().collect(),
            any,
        }
    }

    /// Returns true when no clause is set.
    pub fn is_empty(&self) -> bool {
        self == &Constraint::default()
    }

    /// Strict upper bound.
    pub fn lt_value(&self) -> Option<&Value> {
        self.lt.as_ref()
    }

    /// Strict lower bound.
    pub fn gt_value(&self) -> Option<&Value> {
        self.gt.as_ref()
    }

    /// Inclusive upper bound.
    pub fn lte_value(&self) -> Option<&Value> {
        self.lte.as_ref()
    }

    /// Inclusive lower bound.
    pub fn gte_value(&self) -> Option<&Value> {
        self.gte.as_ref()
    }

    /// Keywords, all of which must match.
    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.like
    }

    /// Option set, `None` when unconstrained.
    pub fn options(&self) -> Option<&Options> {
        self.any.as_ref()
    }

    /// Evaluates the constraint against the values bound to one expression.
    ///
    /// An empty slice stands for "unbound".
    pub fn test(&self, values: &[Value]) -> bool {
        let bound: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
        let within = |value: &Value| {
            let check = |limit: &Option<Value>, accept: &[Ordering]| match limit {
                Some(limit) => value
                    .compare(limit)
                    .map(|ord| accept.contains(&ord))
                    .unwrap_or(false),
                None => true,
            };
            check(&self.lt, &[Ordering::Less])
                && check(&self.gt, &[Ordering::Greater])
                && check(&self.lte, &[Ordering::Less, Ordering::Equal])
                && check(&self.gte, &[Ordering::Greater, Ordering::Equal])
                && self
                    .like
                    .iter()
                    .all(|keyword| matches_keyword(&value.lexical(), keyword))
        };
        let ranged = self.lt.is_some()
            || self.gt.is_some()
            || self.lte.is_some()
            || self.gte.is_some()
            || !self.like.is_empty();
        if ranged && !bound.iter().any(|value| within(value)) {
            return false;
        }
        match &self.any {
            None => true,
            Some(Options::Bound) => !bound.is_empty(),
            Some(Options::Values(options)) => {
                (bound.is_empty() && options.contains(&Value::Null))
                    || bound.iter().any(|value| options.contains(*value))
            }
        }
    }
}

/// Case-insensitive keyword containment shared with store evaluators.
pub fn matches_keyword(text: &str, keyword: &str) -> bool {
    text.to_lowercase().contains(&keyword.to_lowercase())
}

fn split_keywords(keywords: &str) -> impl Iterator<Item = String> + '_ {
    keywords
        .split_whitespace()
        .map(|keyword| keyword.to_lowercase())
}

// Keeps the tighter limit and reports whether the two were incomparable.
// `prefer` is `Less` for upper bounds and `Greater` for lower bounds.
fn narrow(a: &Option<Value>, b: &Option<Value>, prefer: Ordering) -> (Option<Value>, bool) {
    match (a, b) {
        (None, other) | (other, None) => (other.clone(), false),
        (Some(a), Some(b)) => {
            let ord = bound_order(a, b);
            let kept = if ord == prefer || ord == Ordering::Equal { a } else { b };
            (Some(kept.clone()), a.compare(b).is_none())
        }
    }
}

// Total order over bounds: datatype family, then natural order, then the
// value order for ties such as `2` and `2.0`. Keeps the merge associative
// when incomparable bounds meet.
fn bound_order(a: &Value, b: &Value) -> Ordering {
    family(a)
        .cmp(&family(b))
        .then_with(|| a.compare(b).unwrap_or(Ordering::Equal))
        .then_with(|| a.cmp(b))
}

fn family(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Decimal(_) => 2,
        Value::String(_) => 3,
        Value::DateTime(_) => 4,
        Value::Iri(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_narrow() {
        assert_eq!(Constraint::lt(10).and(&Constraint::lt(100)), Constraint::lt(10));
        assert_eq!(Constraint::gte(3).and(&Constraint::gte(7)), Constraint::gte(7));
        assert_eq!(
            Constraint::lt(Value::Decimal(2.5)).and(&Constraint::lt(3)),
            Constraint::lt(Value::Decimal(2.5))
        );
    }

    #[test]
    fn incomparable_bounds_admit_nothing() {
        let merged = Constraint::lt("b").and(&Constraint::lt(5));
        assert_eq!(merged, Constraint::lt(5).and(&Constraint::lt("b")));
        assert_eq!(merged.options(), Some(&Options::Values(BTreeSet::new())));
        assert!(!merged.test(&[Value::Int(4)]));
        assert!(!merged.test(&[Value::from("a")]));
        assert!(Constraint::lt(5).test(&[Value::Int(4)]));
    }

    #[test]
    fn keywords_accumulate() {
        let merged = Constraint::like("Ada").and(&Constraint::like("lovelace"));
        assert_eq!(merged.keywords().len(), 2);
        assert!(merged.test(&[Value::from("Ada Lovelace")]));
        assert!(!merged.test(&[Value::from("Ada Byron")]));
    }

    #[test]
    fn option_flavours_differ() {
        let accumulated = Constraint::any([1]).with_any([2]);
        assert_eq!(
            accumulated.options(),
            Some(&Options::Values([Value::Int(1), Value::Int(2)].into()))
        );
        let merged = Constraint::any([1, 2]).and(&Constraint::any([2, 3]));
        assert_eq!(merged.options(), Some(&Options::Values([Value::Int(2)].into())));
        let disjoint = Constraint::any([1]).and(&Constraint::any([2]));
        assert!(!disjoint.test(&[Value::Int(1)]));
        assert!(!disjoint.test(&[Value::Int(2)]));
    }

    #[test]
    fn existential_and_null_sentinel() {
        let bound = Constraint::any(Vec::<Value>::new());
        assert_eq!(bound.options(), Some(&Options::Bound));
        assert!(bound.test(&[Value::Int(1)]));
        assert!(!bound.test(&[]));

        let nullable = Constraint::any([Value::Null, Value::Int(4)]);
        assert!(nullable.test(&[]));
        assert!(nullable.test(&[Value::Int(4)]));
        assert!(!nullable.test(&[Value::Int(5)]));

        let merged = nullable.and(&bound);
        assert!(!merged.test(&[]));
        assert!(merged.test(&[Value::Int(4)]));
    }

    #[test]
    fn ranges_reject_unbound_values() {
        assert!(!Constraint::gte(3).test(&[]));
        assert!(Constraint::gte(3).test(&[Value::Int(3)]));
        assert!(!Constraint::gte(3).test(&[Value::from("three")]));
    }
}
