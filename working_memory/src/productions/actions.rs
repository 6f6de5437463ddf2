//! Right-hand-side actions.

use serde::{Deserialize, Serialize};

use crate::symbols::SymbolRef;

/// Preference types a make action can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferenceType {
    Acceptable,
    Reject,
    Require,
    Prohibit,
    Best,
    Worst,
    Better,
    Worse,
    Indifferent,
    NumericIndifferent,
}

impl PreferenceType {
    /// Whether this preference type takes a referent value.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            PreferenceType::Better
                | PreferenceType::Worse
                | PreferenceType::Indifferent
                | PreferenceType::NumericIndifferent
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            PreferenceType::Acceptable => "+",
            PreferenceType::Reject => "-",
            PreferenceType::Require => "!",
            PreferenceType::Prohibit => "~",
            PreferenceType::Best => ">",
            PreferenceType::Worst => "<",
            PreferenceType::Better => ">",
            PreferenceType::Worse => "<",
            PreferenceType::Indifferent => "=",
            PreferenceType::NumericIndifferent => "=",
        }
    }
}

/// A value on the right-hand side.
#[derive(Debug, Clone, PartialEq)]
pub enum RhsValue {
    /// A constant or a variable.
    Symbol(SymbolRef),
    /// A call to a right-hand-side function.
    FunctionCall { name: SymbolRef, args: Vec<RhsValue> },
}

impl RhsValue {
    pub fn variables(&self, out: &mut Vec<SymbolRef>) {
        match self {
            RhsValue::Symbol(sym) => {
                if sym.is_variable() && !out.contains(sym) {
                    out.push(sym.clone());
                }
            }
            RhsValue::FunctionCall { args, .. } => args.iter().for_each(|a| a.variables(out)),
        }
    }
}

impl From<SymbolRef> for RhsValue {
    fn from(sym: SymbolRef) -> Self {
        RhsValue::Symbol(sym)
    }
}

impl std::fmt::Display for RhsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RhsValue::Symbol(sym) => write!(f, "{}", sym),
            RhsValue::FunctionCall { name, args } => {
                write!(f, "({}", name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A right-hand-side action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Create a preference `(id ^attr value <pref> [referent])`.
    Make {
        id: RhsValue,
        attr: RhsValue,
        value: RhsValue,
        preference: PreferenceType,
        referent: Option<RhsValue>,
    },
    /// A stand-alone function call.
    FunctionCall { name: SymbolRef, args: Vec<RhsValue> },
}

impl Action {
    /// Acceptable-preference make action.
    pub fn make(id: impl Into<RhsValue>, attr: impl Into<RhsValue>, value: impl Into<RhsValue>) -> Self {
        Action::Make {
            id: id.into(),
            attr: attr.into(),
            value: value.into(),
            preference: PreferenceType::Acceptable,
            referent: None,
        }
    }

    pub fn variables(&self) -> Vec<SymbolRef> {
        let mut out = Vec::new();
        match self {
            Action::Make {
                id,
                attr,
                value,
                referent,
                ..
            } => {
                id.variables(&mut out);
                attr.variables(&mut out);
                value.variables(&mut out);
                if let Some(r) = referent {
                    r.variables(&mut out);
                }
            }
            Action::FunctionCall { args, .. } => args.iter().for_each(|a| a.variables(&mut out)),
        }
        out
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Make {
                id,
                attr,
                value,
                preference,
                referent,
            } => {
                write!(f, "({} ^{} {} {}", id, attr, value, preference.symbol())?;
                if let Some(r) = referent {
                    write!(f, " {}", r)?;
                }
                write!(f, ")")
            }
            Action::FunctionCall { name, args } => {
                write!(f, "({}", name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolTable;

    #[test]
    fn test_action_variables() {
        let mut table = SymbolTable::new();
        let s = table.variable("<s>");
        let x = table.variable("<x>");
        let action = Action::make(
            s.clone(),
            table.str_constant("sum"),
            RhsValue::FunctionCall {
                name: table.str_constant("+"),
                args: vec![x.clone().into(), s.clone().into()],
            },
        );

        assert_eq!(action.variables(), vec![s, x]);
        assert_eq!(action.to_string(), "(<s> ^sum (+ <x> <s>) +)");
    }

    #[test]
    fn test_binary_preferences() {
        assert!(PreferenceType::Better.is_binary());
        assert!(!PreferenceType::Reject.is_binary());
    }
}
