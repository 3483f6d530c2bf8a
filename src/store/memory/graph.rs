//! Indexed edge set.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::value::{Iri, Value};
use crate::program::ir::Triple;

/// Set of edges indexed by subject and by object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Graph {
    forward: BTreeMap<Iri, BTreeMap<Iri, BTreeSet<Value>>>,
    backward: BTreeMap<Value, BTreeMap<Iri, BTreeSet<Iri>>>,
    len: usize,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the graph has no edges.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adds an edge; returns false when it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        let Triple {
            subject,
            predicate,
            object,
        } = triple;
        let added = self
            .forward
            .entry(subject.clone())
            .or_default()
            .entry(predicate.clone())
            .or_default()
            .insert(object.clone());
        if added {
            self.backward
                .entry(object)
                .or_default()
                .entry(predicate)
                .or_default()
                .insert(subject);
            self.len += 1;
        }
        added
    }

    /// Removes an edge; returns false when it was absent.
    pub fn remove(&mut self, subject: &Iri, predicate: &Iri, object: &Value) -> bool {
        let removed = remove_nested(&mut self.forward, subject, predicate, object);
        if removed {
            remove_nested(&mut self.backward, object, predicate, subject);
            self.len -= 1;
        }
        removed
    }

    /// Returns true when the edge is present.
    pub fn contains(&self, subject: &Iri, predicate: &Iri, object: &Value) -> bool {
        self.forward
            .get(subject)
            .and_then(|by_predicate| by_predicate.get(predicate))
            .is_some_and(|objects| objects.contains(object))
    }

    /// Edges matching the given positions; `None` matches anything.
    pub fn matches(
        &self,
        subject: Option<&Iri>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
    ) -> Vec<Triple> {
        let mut out = Vec::new();
        match (subject, object) {
            (Some(subject), _) => {
                if let Some(by_predicate) = self.forward.get(subject) {
                    collect_forward(&mut out, subject, by_predicate, predicate, object);
                }
            }
            (None, Some(object)) => {
                if let Some(by_predicate) = self.backward.get(object) {
                    for (p, subjects) in by_predicate {
                        if predicate.is_some_and(|wanted| wanted != p) {
                            continue;
                        }
                        out.extend(subjects.iter().map(|s| Triple {
                            subject: s.clone(),
                            predicate: p.clone(),
                            object: object.clone(),
                        }));
                    }
                }
            }
            (None, None) => {
                for (subject, by_predicate) in &self.forward {
                    collect_forward(&mut out, subject, by_predicate, predicate, None);
                }
            }
        }
        out
    }

    /// Tests for an edge, optionally in either direction.
    pub fn has_edge(
        &self,
        subject: &Iri,
        predicate: Option<&Iri>,
        object: Option<&Value>,
        any_direction: bool,
    ) -> bool {
        if !self.matches(Some(subject), predicate, object).is_empty() {
            return true;
        }
        if !any_direction {
            return false;
        }
        let target = Value::Iri(subject.clone());
        match object {
            Some(Value::Iri(other)) => !self.matches(Some(other), predicate, Some(&target)).is_empty(),
            Some(_) => false,
            None => !self.matches(None, predicate, Some(&target)).is_empty(),
        }
    }

    /// Removes every edge leaving `subject`.
    pub fn remove_outgoing(&mut self, subject: &Iri) -> usize {
        let edges = self.matches(Some(subject), None, None);
        self.remove_all(&edges)
    }

    /// Removes every edge entering `object`, optionally on one predicate only.
    pub fn remove_incoming(&mut self, object: &Value, predicate: Option<&Iri>) -> usize {
        let edges = self.matches(None, predicate, Some(object));
        self.remove_all(&edges)
    }

    fn remove_all(&mut self, edges: &[Triple]) -> usize {
        edges
            .iter()
            .filter(|t| self.remove(&t.subject, &t.predicate, &t.object))
            .count()
    }

    /// Iterates every edge in subject order.
    pub fn iter(&self) -> impl Iterator<Item = Triple> + '_ {
        self.forward.iter().flat_map(|(subject, by_predicate)| {
            by_predicate.iter().flat_map(move |(predicate, objects)| {
                objects.iter().map(move |object| Triple {
                    subject: subject.clone(),
                    predicate: predicate.clone(),
                    object: object.clone(),
                })
            })
        })
    }
}

fn collect_forward(
    out: &mut Vec<Triple>,
    subject: &Iri,
    by_predicate: &BTreeMap<Iri, BTreeSet<Value>>,
    predicate: Option<&Iri>,
    object: Option<&Value>,
) {
    for (p, objects) in by_predicate {
        if predicate.is_some_and(|wanted| wanted != p) {
            continue;
        }
        for o in objects {
            if object.is_some_and(|wanted| wanted != o) {
                continue;
            }
            out.push(Triple {
                subject: subject.clone(),
                predicate: p.clone(),
                object: o.clone(),
            });
        }
    }
}

fn remove_nested<K: Ord, V: Ord>(
    map: &mut BTreeMap<K, BTreeMap<Iri, BTreeSet<V>>>,
    key: &K,
    predicate: &Iri,
    value: &V,
) -> bool {
    let Some(by_predicate) = map.get_mut(key) else {
        return false;
    };
    let Some(values) = by_predicate.get_mut(predicate) else {
        return false;
    };
    let removed = values.remove(value);
    if values.is_empty() {
        by_predicate.remove(predicate);
    }
    if by_predicate.is_empty() {
        map.remove(key);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, p: &str, o: Value) -> Triple {
        Triple {
            subject: Iri::new(s),
            predicate: Iri::new(p),
            object: o,
        }
    }

    #[test]
    fn indexes_both_directions() {
        let mut graph = Graph::new();
        assert!(graph.insert(triple("urn:a", "urn:knows", Value::iri("urn:b"))));
        assert!(!graph.insert(triple("urn:a", "urn:knows", Value::iri("urn:b"))));
        graph.insert(triple("urn:a", "urn:age", Value::Int(3)));
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.matches(None, None, Some(&Value::iri("urn:b"))).len(), 1);
        assert!(graph.has_edge(&Iri::new("urn:b"), None, None, true));
        assert!(!graph.has_edge(&Iri::new("urn:b"), None, None, false));
    }

    #[test]
    fn removals_clean_indexes() {
        let mut graph = Graph::new();
        graph.insert(triple("urn:a", "urn:knows", Value::iri("urn:b")));
        graph.insert(triple("urn:c", "urn:knows", Value::iri("urn:b")));
        assert_eq!(graph.remove_incoming(&Value::iri("urn:b"), None), 2);
        assert!(graph.is_empty());
        assert_eq!(graph, Graph::new());
    }
}
