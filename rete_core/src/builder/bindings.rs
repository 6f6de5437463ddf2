//! Variable binding stacks used while compiling a condition list.

use std::collections::HashMap;

use working_memory::{Field, SymbolRef};

use crate::beta::VarLoc;

/// Where each variable is bound, as a stack per variable so that
/// negations can bind locally and restore on exit.
#[derive(Debug, Default)]
pub struct VarBindings {
    stacks: HashMap<SymbolRef, Vec<(usize, Field)>>,
    log: Vec<SymbolRef>,
}

/// A point to roll bindings back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingMark(usize);

impl VarBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) -> BindingMark {
        BindingMark(self.log.len())
    }

    /// Bind `var` at `(depth, field)` unless it is already bound.
    pub fn bind_if_unbound(&mut self, var: &SymbolRef, depth: usize, field: Field) -> bool {
        if self.lookup(var).is_some() {
            return false;
        }
        self.stacks.entry(var.clone()).or_default().push((depth, field));
        self.log.push(var.clone());
        true
    }

    /// Innermost binding of `var`.
    pub fn lookup(&self, var: &SymbolRef) -> Option<(usize, Field)> {
        self.stacks.get(var).and_then(|stack| stack.last().copied())
    }

    /// Location of `var` relative to a condition at `current_depth`.
    pub fn location(&self, var: &SymbolRef, current_depth: usize) -> Option<VarLoc> {
        self.lookup(var)
            .map(|(depth, field)| VarLoc::new(current_depth - depth, field))
    }

    /// Undo every binding made since `mark`.
    pub fn pop_to(&mut self, mark: BindingMark) {
        while self.log.len() > mark.0 {
            if let Some(var) = self.log.pop() {
                if let Some(stack) = self.stacks.get_mut(&var) {
                    stack.pop();
                    if stack.is_empty() {
                        self.stacks.remove(&var);
                    }
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use working_memory::SymbolTable;

    #[test]
    fn test_bind_and_pop() {
        let mut table = SymbolTable::new();
        let x = table.variable("<x>");
        let y = table.variable("<y>");
        let mut bindings = VarBindings::new();

        assert!(bindings.bind_if_unbound(&x, 1, Field::Id));
        assert!(!bindings.bind_if_unbound(&x, 2, Field::Value));
        let mark = bindings.mark();
        assert!(bindings.bind_if_unbound(&y, 2, Field::Value));

        assert_eq!(bindings.location(&x, 3), Some(VarLoc::new(2, Field::Id)));
        bindings.pop_to(mark);
        assert_eq!(bindings.lookup(&y), None);
        assert_eq!(bindings.lookup(&x), Some((1, Field::Id)));

        bindings.pop_to(BindingMark(0));
        assert!(bindings.is_empty());
    }
}
