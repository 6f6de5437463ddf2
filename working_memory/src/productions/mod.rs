//! Compiled productions: the output of the production compiler.

mod actions;
mod conditions;

pub use actions::*;
pub use conditions::*;

use serde::{Deserialize, Serialize};

/// Where a production came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductionKind {
    /// Written by a user.
    User,
    /// Loaded as part of the default rules.
    Default,
    /// Learned by chunking.
    Chunk,
    /// Learned, but only supports its instantiation.
    Justification,
    /// Template for reinforcement-learning rules.
    Template,
}

/// A production ready to be added to the matcher.
#[derive(Debug, Clone)]
pub struct Production {
    pub name: String,
    pub kind: ProductionKind,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub documentation: Option<String>,
}

impl Production {
    /// Create a new user production with no conditions or actions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProductionKind::User,
            conditions: Vec::new(),
            actions: Vec::new(),
            documentation: None,
        }
    }

    pub fn with_kind(mut self, kind: ProductionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(doc.into());
        self
    }
}

impl std::fmt::Display for Production {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "sp {{{}", self.name)?;
        for cond in &self.conditions {
            writeln!(f, "   {}", cond)?;
        }
        writeln!(f, "-->")?;
        for action in &self.actions {
            writeln!(f, "   {}", action)?;
        }
        write!(f, "}}")
    }
}
