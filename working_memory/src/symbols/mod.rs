//! Symbol definitions for working memory.

mod table;

pub use table::*;

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Depth of a goal in the goal stack (1 is the top goal).
pub type GoalLevel = u32;

/// The value carried by an interned symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SymbolValue {
    /// A production variable such as `<x>`.
    Variable(String),
    /// A working memory identifier such as `S1`.
    Identifier { letter: char, number: u64 },
    /// A string constant.
    Str(String),
    /// An integer constant.
    Int(i64),
    /// A floating point constant.
    Float(f64),
}

impl SymbolValue {
    /// Name of the kind of value, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SymbolValue::Variable(_) => "variable",
            SymbolValue::Identifier { .. } => "identifier",
            SymbolValue::Str(_) => "string",
            SymbolValue::Int(_) => "integer",
            SymbolValue::Float(_) => "float",
        }
    }
}

impl PartialEq for SymbolValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SymbolValue::Variable(a), SymbolValue::Variable(b)) => a == b,
            (
                SymbolValue::Identifier { letter: l1, number: n1 },
                SymbolValue::Identifier { letter: l2, number: n2 },
            ) => l1 == l2 && n1 == n2,
            (SymbolValue::Str(a), SymbolValue::Str(b)) => a == b,
            (SymbolValue::Int(a), SymbolValue::Int(b)) => a == b,
            (SymbolValue::Float(a), SymbolValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for SymbolValue {}

impl Hash for SymbolValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            SymbolValue::Variable(s) | SymbolValue::Str(s) => s.hash(state),
            SymbolValue::Identifier { letter, number } => {
                letter.hash(state);
                number.hash(state);
            }
            SymbolValue::Int(i) => i.hash(state),
            SymbolValue::Float(f) => f.to_bits().hash(state),
        }
    }
}

impl std::fmt::Display for SymbolValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolValue::Variable(name) => write!(f, "{}", name),
            SymbolValue::Identifier { letter, number } => write!(f, "{}{}", letter, number),
            SymbolValue::Str(s) => write!(f, "{}", s),
            SymbolValue::Int(i) => write!(f, "{}", i),
            SymbolValue::Float(x) => write!(f, "{}", x),
        }
    }
}

/// An interned symbol.
///
/// Identifiers additionally carry goal and impasse marks, set by the
/// decision cycle and read by goal/impasse tests in the matcher.
#[derive(Debug)]
pub struct Symbol {
    hash_id: u32,
    value: SymbolValue,
    goal_level: Cell<Option<GoalLevel>>,
    impasse: Cell<bool>,
}

impl Symbol {
    /// Stable hash code, unique among live symbols of one table.
    pub fn hash_id(&self) -> u32 {
        self.hash_id
    }

    pub fn value(&self) -> &SymbolValue {
        &self.value
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.value, SymbolValue::Variable(_))
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.value, SymbolValue::Identifier { .. })
    }

    /// Constants are everything that is neither a variable nor an identifier.
    pub fn is_constant(&self) -> bool {
        !self.is_variable() && !self.is_identifier()
    }

    /// Goal level if this identifier is currently a goal.
    pub fn goal_level(&self) -> Option<GoalLevel> {
        self.goal_level.get()
    }

    pub fn set_goal_level(&self, level: Option<GoalLevel>) {
        self.goal_level.set(level);
    }

    pub fn is_goal(&self) -> bool {
        self.goal_level.get().is_some()
    }

    pub fn is_impasse(&self) -> bool {
        self.impasse.get()
    }

    pub fn set_impasse(&self, impasse: bool) {
        self.impasse.set(impasse);
    }

    /// Numeric comparison across integers and floats.
    ///
    /// Returns `None` when either side is not a number.
    pub fn compare_numeric(&self, other: &Symbol) -> Option<Ordering> {
        match (&self.value, &other.value) {
            (SymbolValue::Int(a), SymbolValue::Int(b)) => Some(a.cmp(b)),
            (SymbolValue::Int(a), SymbolValue::Float(b)) => (*a as f64).partial_cmp(b),
            (SymbolValue::Float(a), SymbolValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (SymbolValue::Float(a), SymbolValue::Float(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// True if both symbols are of the same kind (`<=>` test).
    pub fn same_type(&self, other: &Symbol) -> bool {
        std::mem::discriminant(&self.value) == std::mem::discriminant(&other.value)
    }
}

/// Shared handle to an interned symbol.
///
/// Equality is identity: two handles are equal iff they point at the same
/// interned symbol. Dropping the last handle releases the symbol.
#[derive(Debug, Clone)]
pub struct SymbolRef(Rc<Symbol>);

impl SymbolRef {
    /// Number of live handles to this symbol.
    pub fn reference_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl std::ops::Deref for SymbolRef {
    type Target = Symbol;

    fn deref(&self) -> &Symbol {
        &self.0
    }
}

impl PartialEq for SymbolRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SymbolRef {}

impl Hash for SymbolRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_id.hash(state);
    }
}

impl std::fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_identity() {
        let mut table = SymbolTable::new();
        let a = table.str_constant("red");
        let b = table.str_constant("red");
        let c = table.str_constant("blue");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.hash_id(), b.hash_id());
    }

    #[test]
    fn test_symbol_kinds() {
        let mut table = SymbolTable::new();
        assert!(table.variable("<x>").is_variable());
        assert!(table.new_identifier('S').is_identifier());
        assert!(table.int_constant(3).is_constant());
    }

    #[test]
    fn test_numeric_comparison() {
        let mut table = SymbolTable::new();
        let two = table.int_constant(2);
        let two_and_half = table.float_constant(2.5);
        let word = table.str_constant("two");

        assert_eq!(two.compare_numeric(&two_and_half), Some(Ordering::Less));
        assert_eq!(two_and_half.compare_numeric(&two), Some(Ordering::Greater));
        assert_eq!(two.compare_numeric(&word), None);
        assert!(!two.same_type(&two_and_half));
    }

    #[test]
    fn test_goal_marks() {
        let mut table = SymbolTable::new();
        let s1 = table.new_identifier('S');
        assert!(!s1.is_goal());

        s1.set_goal_level(Some(1));
        assert!(s1.is_goal());
        assert_eq!(s1.goal_level(), Some(1));
    }
}
