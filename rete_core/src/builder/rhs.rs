//! Compiled right-hand sides.
//!
//! Variables bound on the left-hand side are replaced by the position of
//! the WME field that binds them, so two productions whose actions differ
//! only in variable names compile to equal actions.

use working_memory::{Action, Field, PreferenceType, RhsValue, SymbolRef};

use super::bindings::VarBindings;

#[derive(Debug, Clone)]
pub enum ReteRhsValue {
    Constant(SymbolRef),
    /// Field of the WME matched by top-level condition `depth` (1-based).
    Bound { depth: usize, field: Field },
    /// A variable the left-hand side never binds, by first appearance.
    Unbound(usize),
    FunctionCall { name: SymbolRef, args: Vec<ReteRhsValue> },
}

impl ReteRhsValue {
    /// Function calls are never considered equal.
    pub fn same_as(&self, other: &ReteRhsValue) -> bool {
        match (self, other) {
            (ReteRhsValue::Constant(a), ReteRhsValue::Constant(b)) => a == b,
            (
                ReteRhsValue::Bound { depth: d1, field: f1 },
                ReteRhsValue::Bound { depth: d2, field: f2 },
            ) => d1 == d2 && f1 == f2,
            (ReteRhsValue::Unbound(a), ReteRhsValue::Unbound(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ReteAction {
    Make {
        id: ReteRhsValue,
        attr: ReteRhsValue,
        value: ReteRhsValue,
        preference: PreferenceType,
        referent: Option<ReteRhsValue>,
    },
    FunctionCall { name: SymbolRef, args: Vec<ReteRhsValue> },
}

impl ReteAction {
    pub fn same_as(&self, other: &ReteAction) -> bool {
        match (self, other) {
            (
                ReteAction::Make {
                    id: i1,
                    attr: a1,
                    value: v1,
                    preference: p1,
                    referent: r1,
                },
                ReteAction::Make {
                    id: i2,
                    attr: a2,
                    value: v2,
                    preference: p2,
                    referent: r2,
                },
            ) => {
                let referents_match = match (r1, r2) {
                    (None, None) => true,
                    (Some(a), Some(b)) => a.same_as(b),
                    _ => false,
                };
                p1 == p2 && i1.same_as(i2) && a1.same_as(a2) && v1.same_as(v2) && referents_match
            }
            _ => false,
        }
    }
}

/// Whether two compiled right-hand sides are pointwise equal.
pub fn same_rhs(a: &[ReteAction], b: &[ReteAction]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
}

/// Compiles actions against the top-level bindings.
pub struct RhsCompiler<'a> {
    bindings: &'a VarBindings,
    /// Unbound variables, indexed by `ReteRhsValue::Unbound`.
    pub unbound: Vec<SymbolRef>,
}

impl<'a> RhsCompiler<'a> {
    pub fn new(bindings: &'a VarBindings) -> Self {
        Self {
            bindings,
            unbound: Vec::new(),
        }
    }

    pub fn compile_value(&mut self, value: &RhsValue) -> ReteRhsValue {
        match value {
            RhsValue::Symbol(sym) if sym.is_variable() => match self.bindings.lookup(sym) {
                Some((depth, field)) => ReteRhsValue::Bound { depth, field },
                None => {
                    let index = match self.unbound.iter().position(|u| u == sym) {
                        Some(index) => index,
                        None => {
                            self.unbound.push(sym.clone());
                            self.unbound.len() - 1
                        }
                    };
                    ReteRhsValue::Unbound(index)
                }
            },
            RhsValue::Symbol(sym) => ReteRhsValue::Constant(sym.clone()),
            RhsValue::FunctionCall { name, args } => ReteRhsValue::FunctionCall {
                name: name.clone(),
                args: args.iter().map(|a| self.compile_value(a)).collect(),
            },
        }
    }

    pub fn compile(&mut self, action: &Action) -> ReteAction {
        match action {
            Action::Make {
                id,
                attr,
                value,
                preference,
                referent,
            } => ReteAction::Make {
                id: self.compile_value(id),
                attr: self.compile_value(attr),
                value: self.compile_value(value),
                preference: *preference,
                referent: referent.as_ref().map(|r| self.compile_value(r)),
            },
            Action::FunctionCall { name, args } => ReteAction::FunctionCall {
                name: name.clone(),
                args: args.iter().map(|a| self.compile_value(a)).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use working_memory::SymbolTable;

    #[test]
    fn test_compile_uses_binding_positions() {
        let mut table = SymbolTable::new();
        let (s, x, new) = (table.variable("<s>"), table.variable("<x>"), table.variable("<n>"));
        let mut bindings = VarBindings::new();
        bindings.bind_if_unbound(&s, 1, Field::Id);
        bindings.bind_if_unbound(&x, 1, Field::Value);

        let mut compiler = RhsCompiler::new(&bindings);
        let action = compiler.compile(&Action::make(s, table.str_constant("copy"), new.clone()));
        match &action {
            ReteAction::Make { id, value, .. } => {
                assert!(id.same_as(&ReteRhsValue::Bound {
                    depth: 1,
                    field: Field::Id
                }));
                assert!(value.same_as(&ReteRhsValue::Unbound(0)));
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(compiler.unbound, vec![new]);
        assert!(action.same_as(&action.clone()));
    }

    #[test]
    fn test_function_calls_never_equal() {
        let mut table = SymbolTable::new();
        let call = ReteAction::FunctionCall {
            name: table.str_constant("write"),
            args: Vec::new(),
        };
        assert!(!call.same_as(&call.clone()));
        assert!(!same_rhs(&[call.clone()], &[call]));
        assert!(same_rhs(&[], &[]));
    }
}
