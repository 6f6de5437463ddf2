//! Condition lists as produced by the production compiler.

use serde::{Deserialize, Serialize};

use crate::memory::Field;
use crate::symbols::SymbolRef;

/// Relation used by relational tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    /// `<=>`: both sides are the same kind of symbol.
    SameType,
}

impl Relation {
    /// Whether `left <relation> right` holds.
    ///
    /// Ordering relations only hold between numbers.
    pub fn holds(self, left: &SymbolRef, right: &SymbolRef) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Relation::Equal => left == right,
            Relation::NotEqual => left != right,
            Relation::SameType => left.same_type(right),
            Relation::Less => left.compare_numeric(right) == Some(Less),
            Relation::Greater => left.compare_numeric(right) == Some(Greater),
            Relation::LessOrEqual => matches!(left.compare_numeric(right), Some(Less | Equal)),
            Relation::GreaterOrEqual => {
                matches!(left.compare_numeric(right), Some(Greater | Equal))
            }
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Relation::Equal => "=",
            Relation::NotEqual => "<>",
            Relation::Less => "<",
            Relation::Greater => ">",
            Relation::LessOrEqual => "<=",
            Relation::GreaterOrEqual => ">=",
            Relation::SameType => "<=>",
        }
    }
}

/// A test on one field of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    /// No test at all.
    Blank,
    /// Equality with a constant, or a variable binding/reference.
    Equality(SymbolRef),
    /// Relational test against a constant or a bound variable.
    Relational { relation: Relation, referent: SymbolRef },
    /// `<< a b c >>`: equal to one of the constants.
    Disjunction(Vec<SymbolRef>),
    /// `{ t1 t2 ... }`: all of the tests.
    Conjunction(Vec<Test>),
    /// The identifier is a goal.
    Goal,
    /// The identifier is an impasse.
    Impasse,
}

impl Test {
    /// Collect every variable mentioned in this test.
    pub fn variables(&self, out: &mut Vec<SymbolRef>) {
        match self {
            Test::Equality(sym) | Test::Relational { referent: sym, .. } => {
                if sym.is_variable() && !out.contains(sym) {
                    out.push(sym.clone());
                }
            }
            Test::Conjunction(tests) => tests.iter().for_each(|t| t.variables(out)),
            _ => {}
        }
    }

    /// Flatten nested conjunctions into a list of simple tests.
    pub fn simple_tests(&self) -> Vec<&Test> {
        match self {
            Test::Conjunction(tests) => tests.iter().flat_map(|t| t.simple_tests()).collect(),
            Test::Blank => Vec::new(),
            other => vec![other],
        }
    }
}

impl From<SymbolRef> for Test {
    fn from(sym: SymbolRef) -> Self {
        Test::Equality(sym)
    }
}

impl std::fmt::Display for Test {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Test::Blank => write!(f, "<blank>"),
            Test::Equality(sym) => write!(f, "{}", sym),
            Test::Relational { relation, referent } => {
                write!(f, "{} {}", relation.symbol(), referent)
            }
            Test::Disjunction(options) => {
                write!(f, "<<")?;
                for option in options {
                    write!(f, " {}", option)?;
                }
                write!(f, " >>")
            }
            Test::Conjunction(tests) => {
                write!(f, "{{")?;
                for test in tests {
                    write!(f, " {}", test)?;
                }
                write!(f, " }}")
            }
            Test::Goal => write!(f, "state"),
            Test::Impasse => write!(f, "impasse"),
        }
    }
}

/// The three field tests of a positive or negative condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreeFieldTests {
    pub id: Test,
    pub attr: Test,
    pub value: Test,
    /// Whether the condition matches acceptable-preference WMEs.
    pub acceptable: bool,
}

impl ThreeFieldTests {
    pub fn new(id: impl Into<Test>, attr: impl Into<Test>, value: impl Into<Test>) -> Self {
        Self {
            id: id.into(),
            attr: attr.into(),
            value: value.into(),
            acceptable: false,
        }
    }

    pub fn with_acceptable(mut self, acceptable: bool) -> Self {
        self.acceptable = acceptable;
        self
    }

    pub fn field(&self, field: Field) -> &Test {
        match field {
            Field::Id => &self.id,
            Field::Attr => &self.attr,
            Field::Value => &self.value,
        }
    }
}

/// One condition of a production's left-hand side.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Positive(ThreeFieldTests),
    Negative(ThreeFieldTests),
    /// Negated conjunction: none of these conditions hold together.
    ConjunctiveNegation(Vec<Condition>),
}

impl Condition {
    /// Positive condition from three tests.
    pub fn positive(id: impl Into<Test>, attr: impl Into<Test>, value: impl Into<Test>) -> Self {
        Condition::Positive(ThreeFieldTests::new(id, attr, value))
    }

    /// Negative condition from three tests.
    pub fn negative(id: impl Into<Test>, attr: impl Into<Test>, value: impl Into<Test>) -> Self {
        Condition::Negative(ThreeFieldTests::new(id, attr, value))
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Condition::Positive(_))
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let write_tests = |f: &mut std::fmt::Formatter<'_>, t: &ThreeFieldTests| {
            write!(f, "({} ^{} {}", t.id, t.attr, t.value)?;
            if t.acceptable {
                write!(f, " +")?;
            }
            write!(f, ")")
        };
        match self {
            Condition::Positive(t) => write_tests(f, t),
            Condition::Negative(t) => {
                write!(f, "-")?;
                write_tests(f, t)
            }
            Condition::ConjunctiveNegation(conds) => {
                write!(f, "-{{")?;
                for cond in conds {
                    write!(f, " {}", cond)?;
                }
                write!(f, " }}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolTable;

    #[test]
    fn test_relations() {
        let mut table = SymbolTable::new();
        let one = table.int_constant(1);
        let two = table.float_constant(2.0);
        let word = table.str_constant("two");

        assert!(Relation::Less.holds(&one, &two));
        assert!(Relation::GreaterOrEqual.holds(&two, &one));
        assert!(!Relation::Less.holds(&one, &word));
        assert!(Relation::NotEqual.holds(&one, &word));
        assert!(!Relation::SameType.holds(&one, &two));
    }

    #[test]
    fn test_variables_collected_once() {
        let mut table = SymbolTable::new();
        let x = table.variable("<x>");
        let test = Test::Conjunction(vec![
            Test::Equality(x.clone()),
            Test::Relational {
                relation: Relation::NotEqual,
                referent: x.clone(),
            },
        ]);

        let mut vars = Vec::new();
        test.variables(&mut vars);
        assert_eq!(vars, vec![x]);
        assert_eq!(test.simple_tests().len(), 2);
    }

    #[test]
    fn test_condition_display() {
        let mut table = SymbolTable::new();
        let cond = Condition::negative(
            table.variable("<s>"),
            table.str_constant("foo"),
            table.int_constant(1),
        );
        assert_eq!(cond.to_string(), "-(<s> ^foo 1)");
    }
}
