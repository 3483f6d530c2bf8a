//! Collection requests.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::constraint::Constraint;
use crate::model::expression::Expression;
use crate::model::frame::{Field, Frame};
use crate::model::value::Value;

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Criterion {
    /// Smallest first.
    Increasing,
    /// Largest first.
    Decreasing,
}

/// Projection template plus filter, focus, order and slice.
///
/// Focus and order clauses keep declaration order, which is their priority.
/// A `limit` of zero asks for the configured page size.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Query {
    model: Frame,
    filter: BTreeMap<Expression, Constraint>,
    focus: Vec<(Expression, BTreeSet<Value>)>,
    order: Vec<(Expression, Criterion)>,
    offset: usize,
    limit: usize,
}

impl Query {
    /// Creates a query projecting `model`.
    pub fn new(model: Frame) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    /// Adds a filter; clauses on the same expression merge with [`Constraint::and`].
    pub fn with_filter(mut self, expression: Expression, constraint: Constraint) -> Self {
        let merged = match self.filter.remove(&expression) {
            Some(existing) => existing.and(&constraint),
            None => constraint,
        };
        self.filter.insert(expression, merged);
        self
    }

    /// Pins rows whose expression takes one of `values` to the front.
    pub fn with_focus<I, V>(mut self, expression: Expression, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into);
        match self.focus.iter_mut().find(|(e, _)| *e == expression) {
            Some((_, existing)) => existing.extend(values),
            None => self.focus.push((expression, values.collect())),
        }
        self
    }

    /// Appends an order clause; redeclaring an expression keeps its priority.
    pub fn with_order(mut self, expression: Expression, criterion: Criterion) -> Self {
        match self.order.iter_mut().find(|(e, _)| *e == expression) {
            Some((_, existing)) => *existing = criterion,
            None => self.order.push((expression, criterion)),
        }
        self
    }

    /// Skips `offset` rows.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Caps the page; zero selects the default page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Projection template.
    pub fn model(&self) -> &Frame {
        &self.model
    }

    /// Filter clauses.
    pub fn filter(&self) -> &BTreeMap<Expression, Constraint> {
        &self.filter
    }

    /// Focus clauses in priority order.
    pub fn focus(&self) -> &[(Expression, BTreeSet<Value>)] {
        &self.focus
    }

    /// Order clauses in priority order.
    pub fn order(&self) -> &[(Expression, Criterion)] {
        &self.order
    }

    /// Rows skipped.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Requested page size, zero for the default.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// True when the model projects probe columns.
    pub fn is_tabular(&self) -> bool {
        self.model.is_tabular()
    }

    /// Every expression the query mentions: probes, filters, focus, order.
    pub fn expressions(&self) -> Vec<&Expression> {
        let probes = self.model.fields().filter_map(|(field, _)| match field {
            Field::Probe(probe) => Some(probe.expression()),
            Field::Property(_) => None,
        });
        probes
            .chain(self.filter.keys())
            .chain(self.focus.iter().map(|(e, _)| e))
            .chain(self.order.iter().map(|(e, _)| e))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::expression::Transform;
    use crate::model::frame::Probe;

    #[test]
    fn filters_on_one_expression_merge() {
        let seniority = Expression::path(["seniority"]);
        let query = Query::default()
            .with_filter(seniority.clone(), Constraint::gte(3))
            .with_filter(seniority.clone(), Constraint::gte(5));
        assert_eq!(query.filter().get(&seniority), Some(&Constraint::gte(5)));
    }

    #[test]
    fn order_keeps_first_declaration_position() {
        let a = Expression::path(["a"]);
        let b = Expression::path(["b"]);
        let query = Query::default()
            .with_order(a.clone(), Criterion::Increasing)
            .with_order(b.clone(), Criterion::Increasing)
            .with_order(a.clone(), Criterion::Decreasing);
        assert_eq!(
            query.order(),
            &[(a, Criterion::Decreasing), (b, Criterion::Increasing)]
        );
    }

    #[test]
    fn collects_every_expression() {
        let count = Expression::new([Transform::Count], Vec::<String>::new());
        let query = Query::new(Frame::new().with_probe(Probe::new("value", count.clone())))
            .with_focus(Expression::path(["name"]), ["Ada"])
            .with_filter(Expression::path(["seniority"]), Constraint::gt(1));
        assert!(query.is_tabular());
        assert_eq!(query.expressions().len(), 3);
        assert_eq!(query.expressions()[0], &count);
    }
}
