//! Extra per-node tests, evaluated after the hashed equality test.

use serde::{Deserialize, Serialize};
use working_memory::{Field, Relation, SymbolRef, Wme};

/// Where a bound variable lives relative to the condition being tested.
///
/// `levels_up == 0` is the WME being joined; `1` is the WME of the previous
/// condition, and so on up the token chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarLoc {
    pub levels_up: usize,
    pub field: Field,
}

impl VarLoc {
    pub fn new(levels_up: usize, field: Field) -> Self {
        Self { levels_up, field }
    }
}

/// A test that a join or negative node applies to each candidate pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ReteTest {
    /// `field <relation> constant`
    ConstantRelational {
        field: Field,
        relation: Relation,
        referent: SymbolRef,
    },
    /// `field <relation> <bound variable>`
    VariableRelational {
        field: Field,
        relation: Relation,
        location: VarLoc,
    },
    /// `field` is one of the options.
    Disjunction { field: Field, options: Vec<SymbolRef> },
    /// The WME's id is currently a goal.
    IdIsGoal,
    /// The WME's id is currently an impasse.
    IdIsImpasse,
}

impl ReteTest {
    pub fn field(&self) -> Field {
        match self {
            ReteTest::ConstantRelational { field, .. }
            | ReteTest::VariableRelational { field, .. }
            | ReteTest::Disjunction { field, .. } => *field,
            ReteTest::IdIsGoal | ReteTest::IdIsImpasse => Field::Id,
        }
    }

    /// Evaluate against a WME. `bound` resolves variable locations.
    pub fn passes(&self, wme: &Wme, bound: impl Fn(VarLoc) -> Option<SymbolRef>) -> bool {
        match self {
            ReteTest::ConstantRelational {
                field,
                relation,
                referent,
            } => relation.holds(wme.field(*field), referent),
            ReteTest::VariableRelational {
                field,
                relation,
                location,
            } => match bound(*location) {
                Some(referent) => relation.holds(wme.field(*field), &referent),
                None => false,
            },
            ReteTest::Disjunction { field, options } => options.contains(wme.field(*field)),
            ReteTest::IdIsGoal => wme.id.is_goal(),
            ReteTest::IdIsImpasse => wme.id.is_impasse(),
        }
    }

    /// Every symbol this test holds a handle to.
    pub fn symbols(&self) -> Vec<&SymbolRef> {
        match self {
            ReteTest::ConstantRelational { referent, .. } => vec![referent],
            ReteTest::Disjunction { options, .. } => options.iter().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use working_memory::SymbolTable;

    fn wme(table: &mut SymbolTable, value: i64) -> Wme {
        Wme::new(
            1,
            table.identifier('S', 1),
            table.str_constant("count"),
            table.int_constant(value),
        )
    }

    #[test]
    fn test_constant_relational() {
        let mut table = SymbolTable::new();
        let w = wme(&mut table, 5);
        let test = ReteTest::ConstantRelational {
            field: Field::Value,
            relation: Relation::Greater,
            referent: table.int_constant(3),
        };
        assert!(test.passes(&w, |_| None));
    }

    #[test]
    fn test_variable_relational_uses_binding() {
        let mut table = SymbolTable::new();
        let w = wme(&mut table, 5);
        let seven = table.int_constant(7);
        let test = ReteTest::VariableRelational {
            field: Field::Value,
            relation: Relation::Less,
            location: VarLoc::new(1, Field::Value),
        };

        assert!(test.passes(&w, |_| Some(seven.clone())));
        assert!(!test.passes(&w, |_| None));
    }

    #[test]
    fn test_disjunction_and_goal() {
        let mut table = SymbolTable::new();
        let w = wme(&mut table, 5);
        let test = ReteTest::Disjunction {
            field: Field::Value,
            options: vec![table.int_constant(4), table.int_constant(5)],
        };
        assert!(test.passes(&w, |_| None));

        assert!(!ReteTest::IdIsGoal.passes(&w, |_| None));
        w.id.set_goal_level(Some(1));
        assert!(ReteTest::IdIsGoal.passes(&w, |_| None));
        w.id.set_goal_level(None);
    }
}
