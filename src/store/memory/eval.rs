//! Direct evaluation of [`Select`] programs over a [`Graph`].
//!
//! Follows SPARQL solution semantics for the subset the compiler emits.
//! Expression errors (unbound variables, type mismatches) evaluate to `None`,
//! which filters treat as false and sorting places before every value.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::constraint::matches_keyword;
use crate::model::value::Value;
use crate::program::ir::{Binding, CompareOp, Expr, Node, Pattern, Select, Var};

use super::graph::Graph;

/// Evaluates a selection.
pub fn select(graph: &Graph, program: &Select) -> Vec<Binding> {
    let solutions = group(graph, &program.patterns, vec![Binding::new()]);

    let contexts: Vec<Context<'_>> = if program.is_grouped() {
        partition(&program.group_by, &solutions)
            .into_iter()
            .map(|(key, rows)| Context::Group { key, rows })
            .filter(|ctx| program.having.iter().all(|expr| truthy(eval(expr, ctx))))
            .collect()
    } else {
        solutions.iter().map(Context::Row).collect()
    };

    let mut rows: Vec<(Vec<Option<Value>>, Binding)> = contexts
        .iter()
        .map(|ctx| {
            let keys = program.order_by.iter().map(|key| eval(&key.expr, ctx)).collect();
            (keys, project(program, ctx))
        })
        .collect();
    rows.sort_by(|(a, _), (b, _)| {
        for ((left, right), key) in a.iter().zip(b).zip(&program.order_by) {
            let ord = compare_keys(left.as_ref(), right.as_ref());
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    let mut seen = BTreeSet::new();
    rows.into_iter()
        .map(|(_, row)| row)
        .filter(|row| !program.distinct || seen.insert(row.clone()))
        .skip(program.offset)
        .take(program.limit.unwrap_or(usize::MAX))
        .collect()
}

enum Context<'a> {
    Row(&'a Binding),
    Group { key: Binding, rows: Vec<&'a Binding> },
}

impl Context<'_> {
    fn lookup(&self, var: Var) -> Option<&Value> {
        match self {
            Context::Row(row) => row.get(&var),
            Context::Group { key, rows } => key
                .get(&var)
                .or_else(|| rows.first().and_then(|row| row.get(&var))),
        }
    }
}

fn partition<'a>(group_by: &[Var], solutions: &'a [Binding]) -> Vec<(Binding, Vec<&'a Binding>)> {
    if group_by.is_empty() {
        return vec![(Binding::new(), solutions.iter().collect())];
    }
    let mut groups: BTreeMap<Binding, Vec<&'a Binding>> = BTreeMap::new();
    for solution in solutions {
        let key = group_by
            .iter()
            .filter_map(|var| solution.get(var).map(|value| (*var, value.clone())))
            .collect();
        groups.entry(key).or_default().push(solution);
    }
    groups.into_iter().collect()
}

fn project(program: &Select, ctx: &Context<'_>) -> Binding {
    if program.projection.is_empty() {
        return match ctx {
            Context::Row(row) => (*row).clone(),
            Context::Group { key, .. } => key.clone(),
        };
    }
    program
        .projection
        .iter()
        .filter_map(|column| {
            let value = match &column.expr {
                Some(expr) => eval(expr, ctx),
                None => ctx.lookup(column.var).cloned(),
            };
            value.map(|value| (column.var, value))
        })
        .collect()
}

fn compare_keys(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.compare(b).unwrap_or_else(|| a.cmp(b)),
    }
}

fn group(graph: &Graph, patterns: &[Pattern], mut solutions: Vec<Binding>) -> Vec<Binding> {
    for pattern in patterns {
        solutions = match pattern {
            Pattern::Edge {
                subject,
                predicate,
                object,
            } => solutions
                .iter()
                .flat_map(|row| match_edge(graph, row, subject, predicate, object))
                .collect(),
            Pattern::Optional(inner) => solutions
                .into_iter()
                .flat_map(|row| {
                    let extended = group(graph, inner, vec![row.clone()]);
                    if extended.is_empty() {
                        vec![row]
                    } else {
                        extended
                    }
                })
                .collect(),
            Pattern::Union(branches) => solutions
                .iter()
                .flat_map(|row| {
                    branches
                        .iter()
                        .flat_map(|branch| group(graph, branch, vec![row.clone()]))
                        .collect::<Vec<_>>()
                })
                .collect(),
            Pattern::Bind(expr, var) => solutions
                .into_iter()
                .map(|mut row| {
                    if let Some(value) = eval(expr, &Context::Row(&row)) {
                        row.insert(*var, value);
                    }
                    row
                })
                .collect(),
            Pattern::Filter(expr) => solutions
                .into_iter()
                .filter(|row| truthy(eval(expr, &Context::Row(row))))
                .collect(),
            Pattern::Values(vars, data) => {
                let table: Vec<Binding> = data
                    .iter()
                    .map(|values| {
                        vars.iter()
                            .zip(values)
                            .filter(|(_, value)| !value.is_null())
                            .map(|(var, value)| (*var, value.clone()))
                            .collect()
                    })
                    .collect();
                join(&solutions, &table)
            }
            Pattern::Subselect(nested) => join(&solutions, &select(graph, nested)),
        };
    }
    solutions
}

fn join(left: &[Binding], right: &[Binding]) -> Vec<Binding> {
    let mut out = Vec::new();
    for a in left {
        for b in right {
            let compatible = b
                .iter()
                .all(|(var, value)| a.get(var).map_or(true, |existing| existing == value));
            if compatible {
                let mut merged = a.clone();
                merged.extend(b.iter().map(|(var, value)| (*var, value.clone())));
                out.push(merged);
            }
        }
    }
    out
}

fn resolve<'r>(row: &'r Binding, node: &'r Node) -> Option<&'r Value> {
    match node {
        Node::Var(var) => row.get(var),
        Node::Const(value) => Some(value),
    }
}

fn match_edge(
    graph: &Graph,
    row: &Binding,
    subject: &Node,
    predicate: &Node,
    object: &Node,
) -> Vec<Binding> {
    let s = resolve(row, subject);
    let p = resolve(row, predicate);
    let o = resolve(row, object);
    // Only resources can occupy subject and predicate positions.
    let s_iri = match s {
        Some(Value::Iri(iri)) => Some(iri),
        Some(_) => return Vec::new(),
        None => None,
    };
    let p_iri = match p {
        Some(Value::Iri(iri)) => Some(iri),
        Some(_) => return Vec::new(),
        None => None,
    };
    graph
        .matches(s_iri, p_iri, o)
        .into_iter()
        .filter_map(|triple| {
            let mut extended = row.clone();
            let positions = [
                (subject, Value::Iri(triple.subject)),
                (predicate, Value::Iri(triple.predicate)),
                (object, triple.object),
            ];
            for (node, value) in positions {
                if let Node::Var(var) = node {
                    match extended.get(var) {
                        Some(existing) if *existing != value => return None,
                        Some(_) => {}
                        None => {
                            extended.insert(*var, value);
                        }
                    }
                }
            }
            Some(extended)
        })
        .collect()
}

fn truthy(value: Option<Value>) -> bool {
    effective_boolean(value.as_ref()) == Some(true)
}

fn effective_boolean(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Int(v) => Some(*v != 0),
        Value::Decimal(v) => Some(*v != 0.0 && !v.is_nan()),
        Value::String(s) => Some(!s.is_empty()),
        _ => None,
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    match a.compare(b) {
        Some(ord) => ord == Ordering::Equal,
        None => a == b,
    }
}

fn eval(expr: &Expr, ctx: &Context<'_>) -> Option<Value> {
    match expr {
        Expr::Var(var) => ctx.lookup(*var).cloned(),
        Expr::Const(Value::Null) => None,
        Expr::Const(value) => Some(value.clone()),
        Expr::Bound(var) => Some(Value::Bool(ctx.lookup(*var).is_some())),
        Expr::Compare(op, a, b) => {
            let (a, b) = (eval(a, ctx)?, eval(b, ctx)?);
            let result = match op {
                CompareOp::Eq => equal(&a, &b),
                _ => {
                    let ord = a.compare(&b)?;
                    match op {
                        CompareOp::Lt => ord == Ordering::Less,
                        CompareOp::Gt => ord == Ordering::Greater,
                        CompareOp::Le => ord != Ordering::Greater,
                        CompareOp::Ge => ord != Ordering::Less,
                        CompareOp::Eq => ord == Ordering::Equal,
                    }
                }
            };
            Some(Value::Bool(result))
        }
        Expr::And(items) => {
            let mut failed = false;
            for item in items {
                match effective_boolean(eval(item, ctx).as_ref()) {
                    Some(false) => return Some(Value::Bool(false)),
                    Some(true) => {}
                    None => failed = true,
                }
            }
            (!failed).then_some(Value::Bool(true))
        }
        Expr::Or(items) => {
            let mut failed = false;
            for item in items {
                match effective_boolean(eval(item, ctx).as_ref()) {
                    Some(true) => return Some(Value::Bool(true)),
                    Some(false) => {}
                    None => failed = true,
                }
            }
            (!failed).then_some(Value::Bool(false))
        }
        Expr::Not(inner) => {
            effective_boolean(eval(inner, ctx).as_ref()).map(|b| Value::Bool(!b))
        }
        Expr::In(inner, values) => {
            let value = eval(inner, ctx)?;
            Some(Value::Bool(values.iter().any(|option| equal(&value, option))))
        }
        Expr::Contains(inner, keyword) => {
            let value = eval(inner, ctx)?;
            Some(Value::Bool(matches_keyword(&value.lexical(), keyword)))
        }
        Expr::Call(function, inner) => function.apply(&eval(inner, ctx)?),
        Expr::Aggregate {
            function,
            distinct,
            arg,
        } => {
            let Context::Group { rows, .. } = ctx else {
                return None;
            };
            let mut values: Vec<Value> = rows
                .iter()
                .filter_map(|row| eval(arg, &Context::Row(row)))
                .collect();
            if *distinct {
                let unique: BTreeSet<Value> = values.into_iter().collect();
                values = unique.into_iter().collect();
            }
            function.reduce(&values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::expression::Transform;
    use crate::model::value::Iri;
    use crate::program::ir::{OrderKey, Projection, Triple};

    fn graph() -> Graph {
        let mut graph = Graph::new();
        for (id, seniority) in [("urn:e:1", 5), ("urn:e:2", 1), ("urn:e:3", 3)] {
            graph.insert(Triple {
                subject: Iri::new(id),
                predicate: Iri::new("urn:seniority"),
                object: Value::Int(seniority),
            });
        }
        graph.insert(Triple {
            subject: Iri::new("urn:e:2"),
            predicate: Iri::new("urn:supervisor"),
            object: Value::iri("urn:e:1"),
        });
        graph
    }

    #[test]
    fn optional_keeps_unmatched_rows() {
        let (m, s, b) = (Var(0), Var(1), Var(2));
        let program = Select {
            projection: vec![Projection::var(m), Projection::var(b)],
            patterns: vec![
                Pattern::edge(m, Node::iri(&Iri::new("urn:seniority")), s),
                Pattern::Optional(vec![Pattern::edge(
                    m,
                    Node::iri(&Iri::new("urn:supervisor")),
                    b,
                )]),
            ],
            order_by: vec![OrderKey {
                expr: Expr::Var(m),
                descending: false,
            }],
            ..Select::default()
        };
        let rows = select(&graph(), &program);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].get(&b), Some(&Value::iri("urn:e:1")));
        assert!(rows[0].get(&b).is_none());
    }

    #[test]
    fn aggregates_without_groups_form_one_row() {
        let (m, s, total) = (Var(0), Var(1), Var(2));
        let program = Select {
            projection: vec![Projection::expr(
                Expr::Aggregate {
                    function: Transform::Sum,
                    distinct: false,
                    arg: Box::new(Expr::Var(s)),
                },
                total,
            )],
            patterns: vec![Pattern::edge(m, Node::iri(&Iri::new("urn:seniority")), s)],
            ..Select::default()
        };
        let rows = select(&graph(), &program);
        assert_eq!(rows, vec![Binding::from([(total, Value::Int(9))])]);

        let empty = Select {
            patterns: vec![Pattern::edge(m, Node::iri(&Iri::new("urn:missing")), s)],
            ..program
        };
        let count = select(&Graph::new(), &Select {
            projection: vec![Projection::expr(
                Expr::Aggregate {
                    function: Transform::Count,
                    distinct: true,
                    arg: Box::new(Expr::Var(m)),
                },
                total,
            )],
            ..empty
        });
        assert_eq!(count, vec![Binding::from([(total, Value::Int(0))])]);
    }

    #[test]
    fn unbound_comparisons_filter_out() {
        let (m, b) = (Var(0), Var(1));
        let program = Select {
            projection: vec![Projection::var(m)],
            patterns: vec![
                Pattern::edge(m, Node::iri(&Iri::new("urn:seniority")), Var(2)),
                Pattern::Optional(vec![Pattern::edge(
                    m,
                    Node::iri(&Iri::new("urn:supervisor")),
                    b,
                )]),
                Pattern::Filter(Expr::Or(vec![
                    Expr::Not(Box::new(Expr::Bound(b))),
                    Expr::compare(CompareOp::Eq, Expr::Var(b), Expr::Const(Value::iri("urn:x"))),
                ])),
            ],
            order_by: vec![OrderKey {
                expr: Expr::Var(m),
                descending: true,
            }],
            limit: Some(1),
            ..Select::default()
        };
        let rows = select(&graph(), &program);
        assert_eq!(rows, vec![Binding::from([(m, Value::iri("urn:e:3"))])]);
    }
}
