//! Text rendering of native programs.
//!
//! Output follows SPARQL 1.1 surface syntax. Rendering is deterministic, so
//! the rendered text doubles as the identity of a program.

use std::fmt::{self, Display as _, Write as _};

use xxhash_rust::xxh64::Xxh64;

use crate::model::expression::Transform;
use crate::model::value::{escape_literal, Value};
use crate::program::ir::{Expr, Node, OrderKey, Pattern, Projection, Select, Update, Var};

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?v{}", self.0)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Var(var) => var.fmt(f),
            Node::Const(value) => value.fmt(f),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(var) => var.fmt(f),
            Expr::Const(value) => value.fmt(f),
            Expr::Bound(var) => write!(f, "BOUND({var})"),
            Expr::Compare(op, a, b) => write!(f, "({a} {} {b})", op.symbol()),
            Expr::And(items) => join(f, items, " && ", "true"),
            Expr::Or(items) => join(f, items, " || ", "false"),
            Expr::Not(inner) => write!(f, "!{inner}"),
            Expr::In(inner, values) => {
                write!(f, "({inner} IN (")?;
                for (at, value) in values.iter().enumerate() {
                    if at > 0 {
                        f.write_str(", ")?;
                    }
                    value.fmt(f)?;
                }
                f.write_str("))")
            }
            Expr::Contains(inner, keyword) => write!(
                f,
                "CONTAINS(LCASE(STR({inner})), \"{}\")",
                escape_literal(&keyword.to_lowercase())
            ),
            Expr::Call(Transform::Length, inner) => write!(f, "STRLEN(STR({inner}))"),
            Expr::Call(function, inner) => write!(f, "{}({inner})", function.name()),
            Expr::Aggregate {
                function,
                distinct,
                arg,
            } => {
                let distinct = if *distinct { "DISTINCT " } else { "" };
                write!(f, "{}({distinct}{arg})", function.name())
            }
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str, empty: &str) -> fmt::Result {
    match items {
        [] => f.write_str(empty),
        [single] => single.fmt(f),
        _ => {
            f.write_char('(')?;
            for (at, item) in items.iter().enumerate() {
                if at > 0 {
                    f.write_str(sep)?;
                }
                item.fmt(f)?;
            }
            f.write_char(')')
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_group(out: &mut String, patterns: &[Pattern], depth: usize) -> fmt::Result {
    for pattern in patterns {
        write_pattern(out, pattern, depth)?;
    }
    Ok(())
}

fn write_pattern(out: &mut String, pattern: &Pattern, depth: usize) -> fmt::Result {
    indent(out, depth);
    match pattern {
        Pattern::Edge {
            subject,
            predicate,
            object,
        } => writeln!(out, "{subject} {predicate} {object} ."),
        Pattern::Optional(inner) => {
            out.push_str("OPTIONAL {\n");
            write_group(out, inner, depth + 1)?;
            indent(out, depth);
            out.push_str("}\n");
            Ok(())
        }
        Pattern::Union(branches) => {
            for (at, branch) in branches.iter().enumerate() {
                if at > 0 {
                    out.push_str(" UNION ");
                }
                out.push_str("{\n");
                write_group(out, branch, depth + 1)?;
                indent(out, depth);
                out.push('}');
            }
            out.push('\n');
            Ok(())
        }
        Pattern::Bind(expr, var) => writeln!(out, "BIND({expr} AS {var})"),
        Pattern::Filter(expr) => writeln!(out, "FILTER({expr})"),
        Pattern::Values(vars, rows) => {
            out.push_str("VALUES (");
            for (at, var) in vars.iter().enumerate() {
                if at > 0 {
                    out.push(' ');
                }
                write!(out, "{var}")?;
            }
            out.push_str(") {");
            for row in rows {
                out.push_str(" (");
                for (at, value) in row.iter().enumerate() {
                    if at > 0 {
                        out.push(' ');
                    }
                    write!(out, "{value}")?;
                }
                out.push(')');
            }
            out.push_str(" }\n");
            Ok(())
        }
        Pattern::Subselect(select) => {
            out.push_str("{\n");
            write_select(out, select, depth + 1)?;
            indent(out, depth);
            out.push_str("}\n");
            Ok(())
        }
    }
}

fn write_projection(out: &mut String, projection: &Projection) -> fmt::Result {
    match &projection.expr {
        None => write!(out, " {}", projection.var),
        Some(expr) => write!(out, " ({expr} AS {})", projection.var),
    }
}

fn write_order(out: &mut String, key: &OrderKey) -> fmt::Result {
    let direction = if key.descending { "DESC" } else { "ASC" };
    write!(out, " {direction}({})", key.expr)
}

fn write_select(out: &mut String, select: &Select, depth: usize) -> fmt::Result {
    indent(out, depth);
    out.push_str("SELECT");
    if select.distinct {
        out.push_str(" DISTINCT");
    }
    if select.projection.is_empty() {
        out.push_str(" *");
    }
    for projection in &select.projection {
        write_projection(out, projection)?;
    }
    out.push_str(" WHERE {\n");
    write_group(out, &select.patterns, depth + 1)?;
    indent(out, depth);
    out.push_str("}\n");
    if !select.group_by.is_empty() {
        indent(out, depth);
        out.push_str("GROUP BY");
        for var in &select.group_by {
            write!(out, " {var}")?;
        }
        out.push('\n');
    }
    if !select.having.is_empty() {
        indent(out, depth);
        out.push_str("HAVING");
        for expr in &select.having {
            write!(out, " ({expr})")?;
        }
        out.push('\n');
    }
    if !select.order_by.is_empty() {
        indent(out, depth);
        out.push_str("ORDER BY");
        for key in &select.order_by {
            write_order(out, key)?;
        }
        out.push('\n');
    }
    if select.offset > 0 {
        indent(out, depth);
        writeln!(out, "OFFSET {}", select.offset)?;
    }
    if let Some(limit) = select.limit {
        indent(out, depth);
        writeln!(out, "LIMIT {limit}")?;
    }
    Ok(())
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_select(&mut out, self, 0)?;
        f.write_str(out.trim_end())
    }
}

impl Select {
    /// Stable identity of the program: xxh64 of its rendered text.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hasher.update(self.to_string().as_bytes());
        hasher.digest()
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Insert(triples) => {
                f.write_str("INSERT DATA {")?;
                for triple in triples {
                    write!(
                        f,
                        " {} {} {} .",
                        Value::Iri(triple.subject.clone()),
                        Value::Iri(triple.predicate.clone()),
                        triple.object
                    )?;
                }
                f.write_str(" }")
            }
            Update::DeleteDescription { resource, inverse } => {
                write!(f, "DELETE WHERE {{ <{resource}> ?p ?o . }}")?;
                for predicate in inverse {
                    write!(f, " ;\nDELETE WHERE {{ ?s <{predicate}> <{resource}> . }}")?;
                }
                Ok(())
            }
            Update::DeleteResource(resource) => write!(
                f,
                "DELETE WHERE {{ <{resource}> ?p ?o . }} ;\nDELETE WHERE {{ ?s ?p <{resource}> . }}"
            ),
        }
    }
}
