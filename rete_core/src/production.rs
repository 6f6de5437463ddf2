//! Productions as the matcher sees them.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

use working_memory::{GoalLevel, ProductionKind, SymbolRef, Wme};

use crate::arena::arena_id;
use crate::beta::NodeId;
use crate::builder::ReteAction;
use crate::match_set::{InstantiationId, MscId};

arena_id!(
    /// Handle to a production in the network.
    ProductionId
);

/// Variable names per field, kept so a production can be printed with the
/// names its author used.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNames {
    Simple([Vec<SymbolRef>; 3]),
    Conjunctive(Vec<ConditionNames>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarNames {
    pub conditions: Vec<ConditionNames>,
    /// Names of right-hand-side variables the conditions never bind.
    pub unbound: Vec<SymbolRef>,
}

/// A production compiled into the network.
#[derive(Debug)]
pub struct ReteProduction {
    pub name: String,
    pub kind: ProductionKind,
    pub documentation: Option<String>,
    /// The production node.
    pub node: NodeId,
    /// Number of top-level conditions.
    pub depth: usize,
    pub actions: Vec<ReteAction>,
    pub var_names: Option<VarNames>,
    pub(crate) tentative_assertions: IndexSet<MscId>,
    pub(crate) tentative_retractions: IndexSet<MscId>,
    pub(crate) instantiations: IndexSet<InstantiationId>,
    pub(crate) excised: bool,
}

impl ReteProduction {
    pub(crate) fn new(name: String, kind: ProductionKind, node: NodeId, depth: usize) -> Self {
        Self {
            name,
            kind,
            documentation: None,
            node,
            depth,
            actions: Vec::new(),
            var_names: None,
            tentative_assertions: IndexSet::new(),
            tentative_retractions: IndexSet::new(),
            instantiations: IndexSet::new(),
            excised: false,
        }
    }

    /// In-flight instantiations (drained assertions not yet retracted).
    pub fn instantiations(&self) -> impl Iterator<Item = InstantiationId> + '_ {
        self.instantiations.iter().copied()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.tentative_assertions.is_empty() || !self.tentative_retractions.is_empty()
    }
}

/// The instantiation a newly learned production was built from; it must
/// not fire again on the same evidence.
#[derive(Debug, Clone)]
pub struct RefractedInstantiation {
    /// One entry per top-level condition; `None` for negated ones.
    pub wmes: Vec<Option<Rc<Wme>>>,
    pub goal: Option<GoalLevel>,
}

/// Outcome of adding a production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddResult {
    /// An identical production exists; nothing was added.
    Duplicate { existing: ProductionId },
    NoRefraction(ProductionId),
    /// The refracted instantiation matches and is now in flight.
    RefractionMatched {
        production: ProductionId,
        instantiation: InstantiationId,
    },
    RefractionDidNotMatch(ProductionId),
}

impl AddResult {
    /// The production that was added, if any.
    pub fn production(&self) -> Option<ProductionId> {
        match self {
            AddResult::Duplicate { .. } => None,
            AddResult::NoRefraction(p) | AddResult::RefractionDidNotMatch(p) => Some(*p),
            AddResult::RefractionMatched { production, .. } => Some(*production),
        }
    }
}
