//! Left and right unlinking.
//!
//! A join is left-unlinked (dropped from its parent memory's activation
//! list) while its alpha memory is empty, and right-unlinked (dropped from
//! its alpha memory's successor list) while its parent memory is empty.
//! It is never both.

use tracing::trace;

use super::{NodeId, NodeKind};
use crate::alpha::AlphaId;
use crate::error::{ReteError, Result};
use crate::network::Rete;

impl Rete {
    pub(crate) fn is_right_linked(&self, node: NodeId) -> bool {
        self.nodes
            .get(node)
            .and_then(|n| n.kind.posneg())
            .map_or(false, |spec| spec.right_linked)
    }

    /// Take a join off its parent memory's activation list.
    pub(crate) fn unlink_from_left(&mut self, node: NodeId) -> Result<()> {
        let parent = self.parent_of(node)?;
        match &mut self.nodes[node].kind {
            NodeKind::Join { left_linked, .. } => *left_linked = false,
            other => {
                return Err(ReteError::UnexpectedNodeKind {
                    found: other.name(),
                    context: "unlink from left",
                })
            }
        }
        if let NodeKind::Memory { linked_children, .. } = &mut self.nodes[parent].kind {
            linked_children.retain(|&child| child != node);
        }
        trace!(node = %node, "left-unlinked");
        Ok(())
    }

    pub(crate) fn relink_to_left(&mut self, node: NodeId) -> Result<()> {
        let parent = self.parent_of(node)?;
        match &mut self.nodes[node].kind {
            NodeKind::Join { left_linked, .. } => *left_linked = true,
            other => {
                return Err(ReteError::UnexpectedNodeKind {
                    found: other.name(),
                    context: "relink to left",
                })
            }
        }
        match &mut self.nodes[parent].kind {
            NodeKind::Memory { linked_children, .. } => linked_children.push(node),
            other => {
                return Err(ReteError::UnexpectedNodeKind {
                    found: other.name(),
                    context: "join parent",
                })
            }
        }
        trace!(node = %node, "relinked to left");
        Ok(())
    }

    /// Take a node off its alpha memory's successor list.
    pub(crate) fn unlink_from_right(&mut self, node: NodeId) -> Result<()> {
        let spec = self.nodes[node]
            .kind
            .posneg_mut()
            .ok_or_else(|| ReteError::structural(format!("node {} has no alpha memory", node)))?;
        if !spec.right_linked {
            return Ok(());
        }
        spec.right_linked = false;
        let am = spec.alpha;
        self.alpha.memories[am].successors.retain(|&n| n != node);
        trace!(node = %node, "right-unlinked");
        Ok(())
    }

    /// Put a node back on its alpha memory's successor list, ahead of its
    /// nearest right-linked ancestor that uses the same memory.
    pub(crate) fn relink_to_right(&mut self, node: NodeId) -> Result<()> {
        let (am, mut ancestor) = match self.nodes[node].kind.posneg() {
            Some(spec) if spec.right_linked => return Ok(()),
            Some(spec) => (spec.alpha, spec.nearest_ancestor_with_same_am),
            None => return Err(ReteError::structural(format!("node {} has no alpha memory", node))),
        };
        while let Some(a) = ancestor {
            if self.is_right_linked(a) {
                break;
            }
            ancestor = self.nodes[a]
                .kind
                .posneg()
                .and_then(|spec| spec.nearest_ancestor_with_same_am);
        }

        let successors = &mut self.alpha.memories[am].successors;
        match ancestor.and_then(|a| successors.iter().position(|&n| n == a)) {
            Some(index) => successors.insert(index, node),
            None => successors.push(node),
        }
        if let Some(spec) = self.nodes[node].kind.posneg_mut() {
            spec.right_linked = true;
        }
        trace!(node = %node, "relinked to right");
        Ok(())
    }

    /// Closest node above `parent` (inclusive) whose alpha memory is `am`.
    /// A CN node's ancestry continues through its subnetwork.
    pub(crate) fn nearest_ancestor_with_same_am(&self, parent: NodeId, am: AlphaId) -> Option<NodeId> {
        let mut current = Some(parent);
        while let Some(node) = current {
            let beta = self.nodes.get(node)?;
            if let Some(spec) = beta.kind.posneg() {
                if spec.alpha == am {
                    return Some(node);
                }
            }
            current = match &beta.kind {
                NodeKind::DummyTop => None,
                NodeKind::ConjunctiveNegation { partner } => {
                    self.nodes.get(*partner).and_then(|p| p.parent)
                }
                _ => beta.parent,
            };
        }
        None
    }

    pub(crate) fn parent_of(&self, node: NodeId) -> Result<NodeId> {
        self.nodes
            .get(node)
            .and_then(|n| n.parent)
            .ok_or_else(|| ReteError::structural(format!("node {} has no parent", node)))
    }
}
