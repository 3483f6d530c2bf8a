//! Variable allocation for one compiled program.

use rustc_hash::FxHashMap;

use crate::model::expression::Expression;
use crate::program::ir::Var;

/// Per-compile variable allocator.
///
/// Paths and computed expressions are deduplicated by structural identity,
/// so a path used by a filter and an order clause shares one variable.
#[derive(Debug, Default)]
pub struct Scope {
    next: u32,
    paths: FxHashMap<Vec<String>, Var>,
    computed: FxHashMap<Expression, Var>,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh variable.
    pub fn fresh(&mut self) -> Var {
        let var = Var(self.next);
        self.next += 1;
        var
    }

    /// Variable bound to the end of `path`, and whether it was just allocated.
    pub fn path(&mut self, path: &[String]) -> (Var, bool) {
        if let Some(var) = self.paths.get(path) {
            return (*var, false);
        }
        let var = self.fresh();
        self.paths.insert(path.to_vec(), var);
        (var, true)
    }

    /// Variable bound to a non-aggregate computed expression.
    pub fn computed(&mut self, expression: &Expression) -> (Var, bool) {
        if let Some(var) = self.computed.get(expression) {
            return (*var, false);
        }
        let var = self.fresh();
        self.computed.insert(expression.clone(), var);
        (var, true)
    }

    /// Number of variables allocated so far.
    pub fn len(&self) -> usize {
        self.next as usize
    }

    /// Returns true when nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_variables() {
        let mut scope = Scope::new();
        let member = scope.fresh();
        let path = vec!["supervisor".to_owned()];
        let (first, fresh) = scope.path(&path);
        assert!(fresh);
        let (again, fresh) = scope.path(&path);
        assert!(!fresh);
        assert_eq!(first, again);
        assert_ne!(first, member);
        assert_eq!(scope.len(), 2);
    }
}
