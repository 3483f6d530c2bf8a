//! Query compiler: turns `(anchor, shape, query)` into one [`Select`].
//!
//! Layout of the produced program:
//!
//! 1. member binding (membership edge, class edges, or a generic subject scan);
//! 2. one nested `OPTIONAL` per distinct path prefix;
//! 3. `BIND` for every non-aggregate computed expression;
//! 4. `FILTER` for non-aggregate constraints;
//! 5. grouping, `HAVING` for aggregate constraints;
//! 6. ordering: focus discriminators, declared order, deterministic tiebreak;
//! 7. offset and limit (zero selects the configured page size).

use tracing::debug;

use crate::config::Config;
use crate::error::{Result, SchemaError};
use crate::model::constraint::{Constraint, Options};
use crate::model::expression::{Expression, Transform};
use crate::model::frame::{Field, Probe};
use crate::model::query::{Criterion, Query};
use crate::model::shape::{Property, Schema, ShapeId};
use crate::model::value::{Iri, Value, RDF_TYPE};
use crate::profile::{profile_timer, record_profile_timer, ProfileKind};
use crate::program::ir::{
    CompareOp, Expr, Node, OrderKey, Pattern, Projection, Select, Var,
};

use super::scope::Scope;

/// Where the members of a compiled query come from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// Resources linked from `container`; without a membership property the
    /// member shape alone (its classes) enumerates them.
    Members {
        /// Container resource.
        container: Iri,
        /// Membership edge, `None` for virtual containers.
        membership: Option<Property>,
    },
    /// A single known resource, used for probe columns on resource frames.
    Resource(Iri),
}

/// Output of [`Compiler::compile`].
#[derive(Clone, Debug)]
pub struct CompiledQuery {
    /// Program to execute.
    pub select: Select,
    /// Variable bound to member ids in plain queries.
    pub member: Var,
    /// Probe columns and the variables carrying them, for tabular queries.
    pub columns: Vec<(Probe, Var)>,
    /// Identity of the program text.
    pub fingerprint: u64,
}

impl CompiledQuery {
    /// True when rows carry probe columns instead of member ids.
    pub fn is_tabular(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Stateless compiler over a schema.
#[derive(Clone, Copy, Debug)]
pub struct Compiler<'a> {
    schema: &'a Schema,
    config: &'a Config,
}

struct PathEdge {
    parent: Var,
    var: Var,
    pattern: Pattern,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler.
    pub fn new(schema: &'a Schema, config: &'a Config) -> Self {
        Self { schema, config }
    }

    /// Compiles `query` over members of `shape` reached through `anchor`.
    pub fn compile(&self, anchor: &Anchor, shape: ShapeId, query: &Query) -> Result<CompiledQuery> {
        let start = profile_timer();
        let compiled = self.build(anchor, shape, query);
        record_profile_timer(ProfileKind::Compile, start);
        let compiled = compiled?;
        debug!(
            shape = self.schema.name(shape),
            tabular = compiled.is_tabular(),
            grouped = compiled.select.is_grouped(),
            fingerprint = compiled.fingerprint,
            "compile.select"
        );
        Ok(compiled)
    }

    /// Renders the program `compile` would produce.
    pub fn explain(&self, anchor: &Anchor, shape: ShapeId, query: &Query) -> Result<String> {
        Ok(self.compile(anchor, shape, query)?.select.to_string())
    }

    fn build(
        &self,
        anchor: &Anchor,
        shape: ShapeId,
        query: &Query,
    ) -> std::result::Result<CompiledQuery, SchemaError> {
        self.schema.ensure_unconditional(shape)?;
        let probes = self.check_model(shape, query)?;
        let tabular = !probes.is_empty();

        let mut scope = Scope::new();
        let member = scope.fresh();
        let mut patterns = self.anchor_patterns(anchor, shape, member, &mut scope)?;

        let expressions = query.expressions();
        let mut edges: Vec<PathEdge> = Vec::new();
        for expression in &expressions {
            expression.validate()?;
            let hops = expression.walk(self.schema, shape)?;
            let mut parent = member;
            for (depth, (property, _)) in hops.iter().enumerate() {
                let (var, fresh) = scope.path(&expression.labels()[..=depth]);
                if fresh {
                    edges.push(PathEdge {
                        parent,
                        var,
                        pattern: edge(Node::Var(parent), property, Node::Var(var)),
                    });
                }
                parent = var;
            }
        }
        patterns.extend(nest(&edges, member));

        for expression in &expressions {
            if expression.computed() && !expression.aggregate() {
                let (var, fresh) = scope.computed(expression);
                if fresh {
                    let base = base_term(&mut scope, member, expression);
                    patterns.push(Pattern::Bind(pipe(base, expression.pipe()), var));
                }
            }
        }

        let mut filters = Vec::new();
        let mut having = Vec::new();
        for (expression, constraint) in query.filter() {
            let target = term(&mut scope, member, expression);
            let clauses = constraint_exprs(&target, constraint);
            if expression.aggregate() {
                having.extend(clauses);
            } else {
                filters.extend(clauses);
            }
        }
        if !filters.is_empty() {
            patterns.push(Pattern::Filter(conjunction(filters)));
        }

        let clause_aggregate = query
            .filter()
            .keys()
            .chain(query.focus().iter().map(|(e, _)| e))
            .chain(query.order().iter().map(|(e, _)| e))
            .any(Expression::aggregate);
        let grouped = clause_aggregate || probes.iter().any(|p| p.expression().aggregate());

        let mut projection = Vec::new();
        let mut group_by = Vec::new();
        let mut columns = Vec::new();
        let mut tiebreak = Vec::new();
        if tabular {
            for probe in probes {
                let value = term(&mut scope, member, probe.expression());
                if grouped && !probe.expression().aggregate() {
                    if let Expr::Var(var) = &value {
                        if !group_by.contains(var) {
                            group_by.push(*var);
                        }
                    }
                }
                let var = scope.fresh();
                projection.push(Projection::expr(value.clone(), var));
                columns.push((probe, var));
                tiebreak.push(value);
            }
        } else {
            if grouped {
                group_by.push(member);
            }
            projection.push(Projection::var(member));
            tiebreak.push(Expr::Var(member));
        }

        let mut order_by: Vec<OrderKey> = Vec::new();
        let push_key = |order_by: &mut Vec<OrderKey>, expr: Expr, descending: bool| {
            if !order_by.iter().any(|key| key.expr == expr) {
                order_by.push(OrderKey { expr, descending });
            }
        };
        for (expression, values) in query.focus() {
            let target = term(&mut scope, member, expression);
            let key = focus_expr(&target, values);
            let key = group_safe(key, expression, &target, grouped, &group_by, Transform::Max);
            push_key(&mut order_by, key, true);
        }
        for (expression, criterion) in query.order() {
            let target = term(&mut scope, member, expression);
            let descending = *criterion == Criterion::Decreasing;
            let reducer = if descending { Transform::Max } else { Transform::Min };
            let key = group_safe(target.clone(), expression, &target, grouped, &group_by, reducer);
            push_key(&mut order_by, key, descending);
        }
        for key in tiebreak {
            push_key(&mut order_by, key, false);
        }

        let limit = match anchor {
            Anchor::Resource(_) => None,
            Anchor::Members { .. } => Some(self.config.page(query.limit())),
        };
        let select = Select {
            distinct: !tabular && !grouped,
            projection,
            patterns,
            group_by,
            having,
            order_by,
            offset: query.offset(),
            limit,
        };
        let fingerprint = select.fingerprint();
        Ok(CompiledQuery {
            select,
            member,
            columns,
            fingerprint,
        })
    }

    fn check_model(&self, shape: ShapeId, query: &Query) -> std::result::Result<Vec<Probe>, SchemaError> {
        let mut probes = Vec::new();
        let mut properties = false;
        for (field, terms) in query.model().fields() {
            match field {
                Field::Probe(probe) => {
                    if !terms.is_empty() {
                        return Err(SchemaError::NestedTabular {
                            alias: probe.alias().to_owned(),
                        });
                    }
                    probes.push(probe.clone());
                }
                Field::Property(label) => {
                    self.schema.entry(shape, label)?;
                    properties = true;
                }
            }
        }
        if properties && !probes.is_empty() {
            return Err(SchemaError::MixedProjection);
        }
        Ok(probes)
    }

    fn anchor_patterns(
        &self,
        anchor: &Anchor,
        shape: ShapeId,
        member: Var,
        scope: &mut Scope,
    ) -> std::result::Result<Vec<Pattern>, SchemaError> {
        let (container, membership) = match anchor {
            Anchor::Resource(iri) => {
                return Ok(vec![Pattern::Values(
                    vec![member],
                    vec![vec![Value::Iri(iri.clone())]],
                )])
            }
            Anchor::Members {
                container,
                membership,
            } => (container, membership),
        };
        let mut patterns = Vec::new();
        if let Some(property) = membership {
            patterns.push(edge(Node::iri(container), property, Node::Var(member)));
        }
        let rdf_type = Iri::new(RDF_TYPE);
        for class in self.schema.classes(shape)? {
            patterns.push(Pattern::edge(member, Node::iri(&rdf_type), Node::iri(&class)));
        }
        if patterns.is_empty() {
            let predicate = scope.fresh();
            let object = scope.fresh();
            patterns.push(Pattern::Subselect(Box::new(Select {
                distinct: true,
                projection: vec![Projection::var(member)],
                patterns: vec![Pattern::edge(member, predicate, object)],
                ..Select::default()
            })));
        }
        Ok(patterns)
    }
}

/// Compiles and renders in one call.
pub fn explain(
    schema: &Schema,
    config: &Config,
    anchor: &Anchor,
    shape: ShapeId,
    query: &Query,
) -> Result<String> {
    Compiler::new(schema, config).explain(anchor, shape, query)
}

fn edge(from: Node, property: &Property, to: Node) -> Pattern {
    let predicate = Node::iri(&property.iri);
    if property.inverse {
        Pattern::edge(to, predicate, from)
    } else {
        Pattern::edge(from, predicate, to)
    }
}

fn nest(edges: &[PathEdge], parent: Var) -> Vec<Pattern> {
    edges
        .iter()
        .filter(|edge| edge.parent == parent)
        .map(|edge| {
            let mut group = vec![edge.pattern.clone()];
            group.extend(nest(edges, edge.var));
            Pattern::Optional(group)
        })
        .collect()
}

fn pipe(base: Expr, transforms: &[Transform]) -> Expr {
    transforms
        .iter()
        .rev()
        .fold(base, |inner, transform| Expr::Call(*transform, Box::new(inner)))
}

fn base_term(scope: &mut Scope, member: Var, expression: &Expression) -> Expr {
    if expression.labels().is_empty() {
        Expr::Var(member)
    } else {
        Expr::Var(scope.path(expression.labels()).0)
    }
}

fn term(scope: &mut Scope, member: Var, expression: &Expression) -> Expr {
    if !expression.computed() {
        return base_term(scope, member, expression);
    }
    match expression.split() {
        (outer, Some(function), inner) => {
            let arg = pipe(base_term(scope, member, expression), inner);
            let aggregate = Expr::Aggregate {
                function,
                distinct: function == Transform::Count,
                arg: Box::new(arg),
            };
            pipe(aggregate, outer)
        }
        (_, None, _) => Expr::Var(scope.computed(expression).0),
    }
}

fn conjunction(mut clauses: Vec<Expr>) -> Expr {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        Expr::And(clauses)
    }
}

// BOUND only accepts variables; for other terms self-equality fails exactly
// when the term is unbound.
fn defined(target: &Expr) -> Expr {
    match target {
        Expr::Var(var) => Expr::Bound(*var),
        other => Expr::compare(CompareOp::Eq, other.clone(), other.clone()),
    }
}

fn options_expr(target: &Expr, options: &Options) -> Expr {
    match options {
        Options::Bound => defined(target),
        Options::Values(values) => {
            let admitted: Vec<Value> = values.iter().filter(|v| !v.is_null()).cloned().collect();
            let nullable = values.contains(&Value::Null);
            let unbound = Expr::Not(Box::new(defined(target)));
            match (admitted.is_empty(), nullable) {
                (true, false) => Expr::Const(Value::Bool(false)),
                (true, true) => unbound,
                (false, false) => Expr::In(Box::new(target.clone()), admitted),
                (false, true) => Expr::Or(vec![unbound, Expr::In(Box::new(target.clone()), admitted)]),
            }
        }
    }
}

fn focus_expr(target: &Expr, values: &std::collections::BTreeSet<Value>) -> Expr {
    if values.contains(&Value::Null) {
        return options_expr(target, &Options::Values(values.clone()));
    }
    Expr::And(vec![
        defined(target),
        Expr::In(Box::new(target.clone()), values.iter().cloned().collect()),
    ])
}

/// Translates a constraint into conjunctive boolean clauses over `target`.
pub(crate) fn constraint_exprs(target: &Expr, constraint: &Constraint) -> Vec<Expr> {
    let mut clauses = Vec::new();
    let bounds = [
        (constraint.lt_value(), CompareOp::Lt),
        (constraint.gt_value(), CompareOp::Gt),
        (constraint.lte_value(), CompareOp::Le),
        (constraint.gte_value(), CompareOp::Ge),
    ];
    for (limit, op) in bounds {
        if let Some(limit) = limit {
            clauses.push(Expr::compare(op, target.clone(), Expr::Const(limit.clone())));
        }
    }
    for keyword in constraint.keywords() {
        clauses.push(Expr::Contains(Box::new(target.clone()), keyword.clone()));
    }
    if let Some(options) = constraint.options() {
        clauses.push(options_expr(target, options));
    }
    clauses
}

// In grouped programs a sort key must be constant per group: plain terms that
// are not group keys are reduced with `reducer`.
fn group_safe(
    key: Expr,
    expression: &Expression,
    target: &Expr,
    grouped: bool,
    group_by: &[Var],
    reducer: Transform,
) -> Expr {
    let is_key = matches!(target, Expr::Var(var) if group_by.contains(var));
    if !grouped || expression.aggregate() || is_key {
        return key;
    }
    Expr::Aggregate {
        function: reducer,
        distinct: false,
        arg: Box::new(key),
    }
}
