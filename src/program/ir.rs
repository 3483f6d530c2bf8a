//! Native program tree shared by the compiler and store drivers.
//!
//! The tree covers exactly the primitives the engine relies on: selection
//! with projection, optional patterns, unions, bindings, filters, grouping,
//! having, ordering, slicing, and data updates. [`crate::program::render`]
//! turns it into query text; stores may also evaluate it directly.

use std::collections::BTreeMap;

use crate::model::expression::Transform;
use crate::model::value::{Iri, Value};

/// Synthetic variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub u32);

/// One result row: bound variables only.
pub type Binding = BTreeMap<Var, Value>;

/// Pattern position: a variable or a constant term.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    /// Variable.
    Var(Var),
    /// Constant.
    Const(Value),
}

impl Node {
    /// Constant resource node.
    pub fn iri(iri: &Iri) -> Self {
        Node::Const(Value::Iri(iri.clone()))
    }
}

impl From<Var> for Node {
    fn from(var: Var) -> Self {
        Node::Var(var)
    }
}

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        }
    }
}

/// Value expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Variable reference.
    Var(Var),
    /// Literal.
    Const(Value),
    /// True when the variable is bound.
    Bound(Var),
    /// Binary comparison.
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    /// Conjunction; empty is true.
    And(Vec<Expr>),
    /// Disjunction; empty is false.
    Or(Vec<Expr>),
    /// Negation.
    Not(Box<Expr>),
    /// Membership in a literal list.
    In(Box<Expr>, Vec<Value>),
    /// Case-insensitive keyword containment over the lexical form.
    Contains(Box<Expr>, String),
    /// Scalar function call.
    Call(Transform, Box<Expr>),
    /// Aggregate over the group; `distinct` drops duplicate inputs first.
    Aggregate {
        /// Reducer.
        function: Transform,
        /// Drop duplicate inputs.
        distinct: bool,
        /// Per-row argument.
        arg: Box<Expr>,
    },
}

impl Expr {
    /// Comparison shorthand.
    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare(op, Box::new(left), Box::new(right))
    }

    /// Returns true when the expression contains an aggregate.
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Var(_) | Expr::Const(_) | Expr::Bound(_) => false,
            Expr::Compare(_, a, b) => a.has_aggregate() || b.has_aggregate(),
            Expr::And(items) | Expr::Or(items) => items.iter().any(Expr::has_aggregate),
            Expr::Not(inner)
            | Expr::In(inner, _)
            | Expr::Contains(inner, _)
            | Expr::Call(_, inner) => inner.has_aggregate(),
        }
    }
}

/// Graph pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Edge match.
    Edge {
        /// Subject position.
        subject: Node,
        /// Predicate position.
        predicate: Node,
        /// Object position.
        object: Node,
    },
    /// Left join: keeps the solution when the group does not match.
    Optional(Vec<Pattern>),
    /// Alternatives, concatenated.
    Union(Vec<Vec<Pattern>>),
    /// Extends each solution with a computed variable.
    Bind(Expr, Var),
    /// Drops solutions for which the expression is not true.
    Filter(Expr),
    /// Inline data joined with the solutions; `Value::Null` leaves a column unbound.
    Values(Vec<Var>, Vec<Vec<Value>>),
    /// Nested selection joined on its projected variables.
    Subselect(Box<Select>),
}

impl Pattern {
    /// Edge shorthand.
    pub fn edge(subject: impl Into<Node>, predicate: impl Into<Node>, object: impl Into<Node>) -> Self {
        Pattern::Edge {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

/// Projected column: a plain variable or `(expr AS var)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Projection {
    /// Output variable.
    pub var: Var,
    /// Expression computing it, if not a plain variable.
    pub expr: Option<Expr>,
}

impl Projection {
    /// Plain variable column.
    pub fn var(var: Var) -> Self {
        Self { var, expr: None }
    }

    /// Computed column.
    pub fn expr(expr: Expr, var: Var) -> Self {
        Self {
            var,
            expr: Some(expr),
        }
    }
}

/// Sort key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderKey {
    /// Key expression.
    pub expr: Expr,
    /// Largest first.
    pub descending: bool,
}

/// Selection program.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Select {
    /// Drop duplicate rows.
    pub distinct: bool,
    /// Output columns.
    pub projection: Vec<Projection>,
    /// Where clause.
    pub patterns: Vec<Pattern>,
    /// Group keys.
    pub group_by: Vec<Var>,
    /// Group filters.
    pub having: Vec<Expr>,
    /// Sort keys in priority order.
    pub order_by: Vec<OrderKey>,
    /// Rows skipped.
    pub offset: usize,
    /// Row cap.
    pub limit: Option<usize>,
}

impl Select {
    /// Returns true when rows are reduced into groups.
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
            || self
                .projection
                .iter()
                .filter_map(|p| p.expr.as_ref())
                .chain(self.having.iter())
                .chain(self.order_by.iter().map(|k| &k.expr))
                .any(Expr::has_aggregate)
    }
}

/// Ground edge written or removed by an update.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    /// Subject resource.
    pub subject: Iri,
    /// Predicate.
    pub predicate: Iri,
    /// Object value.
    pub object: Value,
}

/// Data update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    /// Adds edges.
    Insert(Vec<Triple>),
    /// Removes the outgoing edges of `resource` plus incoming edges on `inverse` predicates.
    DeleteDescription {
        /// Described resource.
        resource: Iri,
        /// Predicates whose incoming edges belong to the description.
        inverse: Vec<Iri>,
    },
    /// Removes every edge where the resource is subject or object.
    DeleteResource(Iri),
}

/// Fixed variables of edge-lookup programs.
pub mod edge_vars {
    use super::Var;

    /// Looked-up resource.
    pub const SUBJECT: Var = Var(0);
    /// Predicate.
    pub const PREDICATE: Var = Var(1);
    /// Value at the other end.
    pub const OBJECT: Var = Var(2);
    /// True for incoming edges.
    pub const INVERSE: Var = Var(3);
}

/// Lookup key of an edge task.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    /// Resource whose values are fetched.
    pub subject: Iri,
    /// Predicate.
    pub predicate: Iri,
    /// Follow incoming edges instead of outgoing ones.
    pub inverse: bool,
}

/// Builds one program fetching the values of every key.
///
/// Rows bind [`edge_vars`]; forward and inverse keys are looked up in two
/// union branches.
pub fn edge_lookup<'k>(keys: impl IntoIterator<Item = &'k EdgeKey>) -> Select {
    use edge_vars::*;
    let (inverse, forward): (Vec<&EdgeKey>, Vec<&EdgeKey>) =
        keys.into_iter().partition(|key| key.inverse);
    let rows = |keys: &[&EdgeKey]| -> Vec<Vec<Value>> {
        keys.iter()
            .map(|key| vec![Value::Iri(key.subject.clone()), Value::Iri(key.predicate.clone())])
            .collect()
    };
    let mut branches = Vec::new();
    if !forward.is_empty() {
        branches.push(vec![
            Pattern::Values(vec![SUBJECT, PREDICATE], rows(&forward)),
            Pattern::edge(SUBJECT, PREDICATE, OBJECT),
            Pattern::Bind(Expr::Const(Value::Bool(false)), INVERSE),
        ]);
    }
    if !inverse.is_empty() {
        branches.push(vec![
            Pattern::Values(vec![SUBJECT, PREDICATE], rows(&inverse)),
            Pattern::edge(OBJECT, PREDICATE, SUBJECT),
            Pattern::Bind(Expr::Const(Value::Bool(true)), INVERSE),
        ]);
    }
    Select {
        projection: [SUBJECT, PREDICATE, OBJECT, INVERSE]
            .into_iter()
            .map(Projection::var)
            .collect(),
        patterns: vec![Pattern::Union(branches)],
        ..Select::default()
    }
}

/// Builds one program returning which of `resources` occur in any edge.
///
/// Rows bind [`edge_vars::SUBJECT`].
pub fn existence<'r>(resources: impl IntoIterator<Item = &'r Iri>) -> Select {
    use edge_vars::*;
    let rows = resources
        .into_iter()
        .map(|iri| vec![Value::Iri(iri.clone())])
        .collect();
    Select {
        distinct: true,
        projection: vec![Projection::var(SUBJECT)],
        patterns: vec![
            Pattern::Values(vec![SUBJECT], rows),
            Pattern::Union(vec![
                vec![Pattern::edge(SUBJECT, PREDICATE, OBJECT)],
                vec![Pattern::edge(OBJECT, PREDICATE, SUBJECT)],
            ]),
        ],
        ..Select::default()
    }
}
