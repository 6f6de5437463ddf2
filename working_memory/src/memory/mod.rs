//! Working memory elements and the working memory that owns them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;
use uuid::Uuid;

use crate::symbols::SymbolRef;

/// Unique identifier for an agent (one matcher instance per agent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new random agent ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing WME timestamp; unique per WME.
pub type Timetag = u64;

/// One of the three fields of a WME or condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Id,
    Attr,
    Value,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Id, Field::Attr, Field::Value];

    pub fn index(self) -> usize {
        match self {
            Field::Id => 0,
            Field::Attr => 1,
            Field::Value => 2,
        }
    }
}

/// A working memory element: `(id ^attr value [+])`.
#[derive(Debug)]
pub struct Wme {
    pub timetag: Timetag,
    pub id: SymbolRef,
    pub attr: SymbolRef,
    pub value: SymbolRef,
    /// Whether this is an acceptable-preference WME.
    pub acceptable: bool,
}

impl Wme {
    pub fn new(timetag: Timetag, id: SymbolRef, attr: SymbolRef, value: SymbolRef) -> Self {
        Self {
            timetag,
            id,
            attr,
            value,
            acceptable: false,
        }
    }

    pub fn with_acceptable(mut self, acceptable: bool) -> Self {
        self.acceptable = acceptable;
        self
    }

    pub fn field(&self, field: Field) -> &SymbolRef {
        match field {
            Field::Id => &self.id,
            Field::Attr => &self.attr,
            Field::Value => &self.value,
        }
    }
}

impl std::fmt::Display for Wme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}: {} ^{} {}", self.timetag, self.id, self.attr, self.value)?;
        if self.acceptable {
            write!(f, " +")?;
        }
        write!(f, ")")
    }
}

/// Errors raised when manipulating working memory.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("WME identifier field must be an identifier, got {0}")]
    NonIdentifierId(String),

    #[error("WME fields may not contain variables, got {0}")]
    VariableInWme(String),
}

/// The set of WMEs currently in working memory.
///
/// Hands out timetags and keeps the owning reference to every WME it
/// created; other holders (the matcher, instantiations) clone the `Rc`.
#[derive(Debug, Default)]
pub struct WorkingMemory {
    next_timetag: Timetag,
    wmes: HashMap<Timetag, Rc<Wme>>,
}

impl WorkingMemory {
    /// Create a new empty working memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a WME and add it to working memory.
    pub fn add(
        &mut self,
        id: SymbolRef,
        attr: SymbolRef,
        value: SymbolRef,
        acceptable: bool,
    ) -> Result<Rc<Wme>, MemoryError> {
        if !id.is_identifier() {
            return Err(MemoryError::NonIdentifierId(id.to_string()));
        }
        for sym in [&id, &attr, &value] {
            if sym.is_variable() {
                return Err(MemoryError::VariableInWme(sym.to_string()));
            }
        }

        self.next_timetag += 1;
        let wme = Rc::new(Wme::new(self.next_timetag, id, attr, value).with_acceptable(acceptable));
        self.wmes.insert(wme.timetag, Rc::clone(&wme));
        Ok(wme)
    }

    /// Remove a WME from working memory.
    pub fn remove(&mut self, timetag: Timetag) -> Option<Rc<Wme>> {
        self.wmes.remove(&timetag)
    }

    pub fn get(&self, timetag: Timetag) -> Option<&Rc<Wme>> {
        self.wmes.get(&timetag)
    }

    /// All WMEs, in timetag order.
    pub fn all(&self) -> Vec<&Rc<Wme>> {
        let mut wmes: Vec<_> = self.wmes.values().collect();
        wmes.sort_by_key(|w| w.timetag);
        wmes
    }

    pub fn len(&self) -> usize {
        self.wmes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wmes.is_empty()
    }
}
