//! Beta network nodes.
//!
//! Every node has a parent (except the dummy top node), an ordered list of
//! children, and the set of tokens it currently holds. Join nodes never
//! hold tokens; their parent memory does.

mod linking;
mod rete_test;

pub use rete_test::*;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::alpha::AlphaId;
use crate::arena::arena_id;
use crate::production::ProductionId;
use crate::tokens::TokenId;

arena_id!(
    /// Handle to a beta node.
    NodeId
);

/// The alpha-side half of a join, merged-join or negative node.
#[derive(Debug, Clone)]
pub struct PosNeg {
    pub alpha: AlphaId,
    /// Variable whose value must equal the WME's id; drives hashing.
    pub hash_loc: Option<VarLoc>,
    pub tests: Vec<ReteTest>,
    /// Whether the node is on its alpha memory's successor list.
    pub right_linked: bool,
    pub nearest_ancestor_with_same_am: Option<NodeId>,
}

impl PosNeg {
    pub fn new(alpha: AlphaId, hash_loc: Option<VarLoc>, tests: Vec<ReteTest>) -> Self {
        Self {
            alpha,
            hash_loc,
            tests,
            right_linked: false,
            nearest_ancestor_with_same_am: None,
        }
    }

    /// Structural identity used for node sharing.
    pub fn same_shape(&self, alpha: AlphaId, hash_loc: Option<VarLoc>, tests: &[ReteTest]) -> bool {
        self.alpha == alpha && self.hash_loc == hash_loc && self.tests == tests
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    DummyTop,
    Memory {
        hash_loc: Option<VarLoc>,
        /// Join children that are not left-unlinked, in activation order.
        linked_children: Vec<NodeId>,
    },
    Join {
        spec: PosNeg,
        left_linked: bool,
    },
    /// A memory node merged with its only join child.
    MergedJoin {
        spec: PosNeg,
        left_unlinked: bool,
    },
    Negative {
        spec: PosNeg,
    },
    ConjunctiveNegation {
        partner: NodeId,
    },
    ConjunctiveNegationPartner {
        owner_node: NodeId,
        conjunct_levels: usize,
    },
    Production {
        production: ProductionId,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::DummyTop => "dummy-top",
            NodeKind::Memory { .. } => "memory",
            NodeKind::Join { .. } => "join",
            NodeKind::MergedJoin { .. } => "merged-join",
            NodeKind::Negative { .. } => "negative",
            NodeKind::ConjunctiveNegation { .. } => "cn",
            NodeKind::ConjunctiveNegationPartner { .. } => "cn-partner",
            NodeKind::Production { .. } => "production",
        }
    }

    pub fn posneg(&self) -> Option<&PosNeg> {
        match self {
            NodeKind::Join { spec, .. }
            | NodeKind::MergedJoin { spec, .. }
            | NodeKind::Negative { spec } => Some(spec),
            _ => None,
        }
    }

    pub fn posneg_mut(&mut self) -> Option<&mut PosNeg> {
        match self {
            NodeKind::Join { spec, .. }
            | NodeKind::MergedJoin { spec, .. }
            | NodeKind::Negative { spec } => Some(spec),
            _ => None,
        }
    }

    /// Hash location of the tokens this node stores, if they are indexed.
    pub fn token_hash_loc(&self) -> Option<VarLoc> {
        match self {
            NodeKind::Memory { hash_loc, .. } => *hash_loc,
            NodeKind::MergedJoin { spec, .. } | NodeKind::Negative { spec } => spec.hash_loc,
            _ => None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        let hashed = self.token_hash_loc().is_some()
            || matches!(self, NodeKind::Join { spec, .. } if spec.hash_loc.is_some());
        match (self, hashed) {
            (NodeKind::DummyTop, _) => NodeType::DummyTop,
            (NodeKind::Memory { .. }, false) => NodeType::UnhashedMemory,
            (NodeKind::Memory { .. }, true) => NodeType::HashedMemory,
            (NodeKind::Join { .. }, false) => NodeType::UnhashedJoin,
            (NodeKind::Join { .. }, true) => NodeType::HashedJoin,
            (NodeKind::MergedJoin { .. }, false) => NodeType::UnhashedMergedJoin,
            (NodeKind::MergedJoin { .. }, true) => NodeType::HashedMergedJoin,
            (NodeKind::Negative { .. }, false) => NodeType::UnhashedNegative,
            (NodeKind::Negative { .. }, true) => NodeType::HashedNegative,
            (NodeKind::ConjunctiveNegation { .. }, _) => NodeType::ConjunctiveNegation,
            (NodeKind::ConjunctiveNegationPartner { .. }, _) => {
                NodeType::ConjunctiveNegationPartner
            }
            (NodeKind::Production { .. }, _) => NodeType::Production,
        }
    }
}

/// Flat node classification used by statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    DummyTop,
    UnhashedMemory,
    HashedMemory,
    UnhashedJoin,
    HashedJoin,
    UnhashedMergedJoin,
    HashedMergedJoin,
    UnhashedNegative,
    HashedNegative,
    ConjunctiveNegation,
    ConjunctiveNegationPartner,
    Production,
}

impl NodeType {
    pub const ALL: [NodeType; 12] = [
        NodeType::DummyTop,
        NodeType::UnhashedMemory,
        NodeType::HashedMemory,
        NodeType::UnhashedJoin,
        NodeType::HashedJoin,
        NodeType::UnhashedMergedJoin,
        NodeType::HashedMergedJoin,
        NodeType::UnhashedNegative,
        NodeType::HashedNegative,
        NodeType::ConjunctiveNegation,
        NodeType::ConjunctiveNegationPartner,
        NodeType::Production,
    ];

    /// How the node would be represented without merging.
    pub fn unmerged(self) -> Vec<NodeType> {
        match self {
            NodeType::UnhashedMergedJoin => vec![NodeType::UnhashedMemory, NodeType::UnhashedJoin],
            NodeType::HashedMergedJoin => vec![NodeType::HashedMemory, NodeType::HashedJoin],
            other => vec![other],
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeType::DummyTop => "dummy top",
            NodeType::UnhashedMemory => "unhashed memory",
            NodeType::HashedMemory => "memory",
            NodeType::UnhashedJoin => "unhashed positive",
            NodeType::HashedJoin => "positive",
            NodeType::UnhashedMergedJoin => "unhashed mem-pos",
            NodeType::HashedMergedJoin => "mem-pos",
            NodeType::UnhashedNegative => "unhashed negative",
            NodeType::HashedNegative => "negative",
            NodeType::ConjunctiveNegation => "cn",
            NodeType::ConjunctiveNegationPartner => "cn partner",
            NodeType::Production => "production",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct BetaNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub tokens: IndexSet<TokenId>,
    pub kind: NodeKind,
}

impl BetaNode {
    pub fn new(parent: Option<NodeId>, kind: NodeKind) -> Self {
        Self {
            parent,
            children: Vec::new(),
            tokens: IndexSet::new(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use working_memory::Field;

    #[test]
    fn test_node_type_hashing() {
        let spec = PosNeg::new(AlphaId(0), Some(VarLoc::new(1, Field::Value)), Vec::new());
        let join = NodeKind::Join {
            spec: spec.clone(),
            left_linked: true,
        };
        assert_eq!(join.node_type(), NodeType::HashedJoin);
        assert_eq!(join.token_hash_loc(), None);

        let merged = NodeKind::MergedJoin {
            spec: PosNeg::new(AlphaId(0), None, Vec::new()),
            left_unlinked: false,
        };
        assert_eq!(merged.node_type(), NodeType::UnhashedMergedJoin);
        assert_eq!(
            merged.node_type().unmerged(),
            vec![NodeType::UnhashedMemory, NodeType::UnhashedJoin]
        );
    }

    #[test]
    fn test_same_shape() {
        let loc = Some(VarLoc::new(1, Field::Value));
        let spec = PosNeg::new(AlphaId(3), loc, Vec::new());
        assert!(spec.same_shape(AlphaId(3), loc, &[]));
        assert!(!spec.same_shape(AlphaId(4), loc, &[]));
        assert!(!spec.same_shape(AlphaId(3), None, &[]));
    }
}
