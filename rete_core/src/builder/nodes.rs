//! Node creation and sharing.
//!
//! A new positive condition reuses, in order: a join under a memory child
//! with the same hash location, that memory with a new join, a merged
//! memory-join of the same shape, or a merged memory-join split to make
//! room. Otherwise a fresh merged memory-join is created. A memory left
//! with a single join child after a deletion is merged back.

use tracing::debug;

use working_memory::SymbolRef;

use crate::alpha::AlphaId;
use crate::beta::{BetaNode, NodeId, NodeKind, PosNeg, ReteTest, VarLoc};
use crate::error::{ReteError, Result};
use crate::network::Rete;

/// One condition's share of the alpha and beta networks.
#[derive(Debug, Clone)]
pub(crate) struct CompiledCondition {
    /// Alpha constants for id, attr and value.
    pub constants: [Option<SymbolRef>; 3],
    pub acceptable: bool,
    pub hash_loc: Option<VarLoc>,
    pub tests: Vec<ReteTest>,
}

impl Rete {
    pub(crate) fn alpha_for(&mut self, condition: &CompiledCondition) -> AlphaId {
        let [id, attr, value] = condition.constants.clone();
        self.find_or_make_alpha(id, attr, value, condition.acceptable)
    }

    fn new_node(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let node = self.nodes.insert(BetaNode::new(Some(parent), kind));
        self.nodes[parent].children.push(node);
        node
    }

    fn new_spec(&self, parent: NodeId, alpha: AlphaId, hash_loc: Option<VarLoc>, tests: Vec<ReteTest>) -> PosNeg {
        let mut spec = PosNeg::new(alpha, hash_loc, tests);
        spec.nearest_ancestor_with_same_am = self.nearest_ancestor_with_same_am(parent, alpha);
        spec
    }

    /// Memory child of `parent` with the given hash location.
    pub(crate) fn memory_child(&self, parent: NodeId, hash_loc: Option<VarLoc>) -> Option<NodeId> {
        self.nodes[parent].children.iter().copied().find(|&child| {
            matches!(&self.nodes[child].kind, NodeKind::Memory { hash_loc: h, .. } if *h == hash_loc)
        })
    }

    pub(crate) fn shared_join(
        &self,
        memory: NodeId,
        alpha: AlphaId,
        hash_loc: Option<VarLoc>,
        tests: &[ReteTest],
    ) -> Option<NodeId> {
        self.nodes[memory].children.iter().copied().find(|&child| {
            matches!(&self.nodes[child].kind,
                NodeKind::Join { spec, .. } if spec.same_shape(alpha, hash_loc, tests))
        })
    }

    pub(crate) fn shared_merged_join(
        &self,
        parent: NodeId,
        alpha: AlphaId,
        hash_loc: Option<VarLoc>,
        tests: &[ReteTest],
    ) -> Option<NodeId> {
        self.nodes[parent].children.iter().copied().find(|&child| {
            matches!(&self.nodes[child].kind,
                NodeKind::MergedJoin { spec, .. } if spec.same_shape(alpha, hash_loc, tests))
        })
    }

    /// A merged memory-join under `parent` that a new join could share a
    /// memory with once split.
    pub(crate) fn splittable_merged_join(&self, parent: NodeId, hash_loc: Option<VarLoc>) -> Option<NodeId> {
        self.nodes[parent].children.iter().copied().find(|&child| {
            matches!(&self.nodes[child].kind,
                NodeKind::MergedJoin { spec, .. } if spec.hash_loc == hash_loc)
        })
    }

    pub(crate) fn shared_negative(
        &self,
        parent: NodeId,
        alpha: AlphaId,
        hash_loc: Option<VarLoc>,
        tests: &[ReteTest],
    ) -> Option<NodeId> {
        self.nodes[parent].children.iter().copied().find(|&child| {
            matches!(&self.nodes[child].kind,
                NodeKind::Negative { spec } if spec.same_shape(alpha, hash_loc, tests))
        })
    }

    /// CN under `parent` whose partner hangs from `bottom`.
    pub(crate) fn shared_cn(&self, parent: NodeId, bottom: NodeId) -> Option<NodeId> {
        self.nodes[parent].children.iter().copied().find(|&child| match &self.nodes[child].kind {
            NodeKind::ConjunctiveNegation { partner } => {
                self.nodes.get(*partner).and_then(|p| p.parent) == Some(bottom)
            }
            _ => false,
        })
    }

    pub(crate) fn make_positive_node(&mut self, parent: NodeId, condition: CompiledCondition) -> Result<NodeId> {
        let alpha = self.alpha_for(&condition);
        let CompiledCondition { hash_loc, tests, .. } = condition;

        if let Some(memory) = self.memory_child(parent, hash_loc) {
            if let Some(join) = self.shared_join(memory, alpha, hash_loc, &tests) {
                self.remove_alpha_ref(alpha)?;
                return Ok(join);
            }
            return self.create_join(memory, alpha, hash_loc, tests);
        }
        if let Some(node) = self.shared_merged_join(parent, alpha, hash_loc, &tests) {
            self.remove_alpha_ref(alpha)?;
            return Ok(node);
        }
        if let Some(node) = self.splittable_merged_join(parent, hash_loc) {
            let memory = self.split_merged_join(node)?;
            return self.create_join(memory, alpha, hash_loc, tests);
        }
        self.create_merged_join(parent, alpha, hash_loc, tests)
    }

    pub(crate) fn make_negative_node(&mut self, parent: NodeId, condition: CompiledCondition) -> Result<NodeId> {
        let alpha = self.alpha_for(&condition);
        let CompiledCondition { hash_loc, tests, .. } = condition;
        if let Some(node) = self.shared_negative(parent, alpha, hash_loc, &tests) {
            self.remove_alpha_ref(alpha)?;
            return Ok(node);
        }
        self.create_negative(parent, alpha, hash_loc, tests)
    }

    /// CN node for a subnetwork hanging from `parent` and ending at `bottom`.
    pub(crate) fn make_cn_node(&mut self, parent: NodeId, bottom: NodeId, conjunct_levels: usize) -> Result<NodeId> {
        match self.shared_cn(parent, bottom) {
            Some(node) => Ok(node),
            None => self.create_cn(parent, bottom, conjunct_levels),
        }
    }

    pub(crate) fn create_memory(&mut self, parent: NodeId, hash_loc: Option<VarLoc>) -> Result<NodeId> {
        let node = self.new_node(
            parent,
            NodeKind::Memory {
                hash_loc,
                linked_children: Vec::new(),
            },
        );
        self.update_node_with_matches_from_above(node)?;
        debug!(node = %node, parent = %parent, "created memory node");
        Ok(node)
    }

    pub(crate) fn create_join(
        &mut self,
        memory: NodeId,
        alpha: AlphaId,
        hash_loc: Option<VarLoc>,
        tests: Vec<ReteTest>,
    ) -> Result<NodeId> {
        let spec = self.new_spec(memory, alpha, hash_loc, tests);
        let node = self.new_node(memory, NodeKind::Join { spec, left_linked: true });
        self.relink_to_right(node)?;
        match &mut self.nodes[memory].kind {
            NodeKind::Memory { linked_children, .. } => linked_children.push(node),
            other => {
                return Err(ReteError::UnexpectedNodeKind {
                    found: other.name(),
                    context: "join parent",
                })
            }
        }
        if self.nodes[memory].tokens.is_empty() {
            self.unlink_from_right(node)?;
        } else if self.alpha.memories[alpha].is_empty() {
            self.unlink_from_left(node)?;
        }
        debug!(node = %node, memory = %memory, alpha = %alpha, "created join node");
        Ok(node)
    }

    pub(crate) fn create_merged_join(
        &mut self,
        parent: NodeId,
        alpha: AlphaId,
        hash_loc: Option<VarLoc>,
        tests: Vec<ReteTest>,
    ) -> Result<NodeId> {
        let spec = self.new_spec(parent, alpha, hash_loc, tests);
        let node = self.new_node(
            parent,
            NodeKind::MergedJoin {
                spec,
                left_unlinked: false,
            },
        );
        self.relink_to_right(node)?;
        self.update_node_with_matches_from_above(node)?;
        if self.nodes[node].tokens.is_empty() {
            self.unlink_from_right(node)?;
        } else if self.alpha.memories[alpha].is_empty() {
            self.set_left_unlinked(node, true);
        }
        debug!(node = %node, parent = %parent, alpha = %alpha, "created merged join node");
        Ok(node)
    }

    pub(crate) fn create_negative(
        &mut self,
        parent: NodeId,
        alpha: AlphaId,
        hash_loc: Option<VarLoc>,
        tests: Vec<ReteTest>,
    ) -> Result<NodeId> {
        let spec = self.new_spec(parent, alpha, hash_loc, tests);
        let node = self.new_node(parent, NodeKind::Negative { spec });
        self.relink_to_right(node)?;
        self.update_node_with_matches_from_above(node)?;
        if self.nodes[node].tokens.is_empty() {
            self.unlink_from_right(node)?;
        }
        debug!(node = %node, parent = %parent, alpha = %alpha, "created negative node");
        Ok(node)
    }

    /// Create a CN node and its partner. The CN goes right after the
    /// subnetwork's top node so the subnetwork sees each token first.
    pub(crate) fn create_cn(&mut self, parent: NodeId, bottom: NodeId, conjunct_levels: usize) -> Result<NodeId> {
        let top = self.subnetwork_top(parent, bottom)?;
        let cn = self
            .nodes
            .insert(BetaNode::new(Some(parent), NodeKind::ConjunctiveNegation { partner: bottom }));
        let partner = self.new_node(
            bottom,
            NodeKind::ConjunctiveNegationPartner {
                owner_node: cn,
                conjunct_levels,
            },
        );
        self.nodes[cn].kind = NodeKind::ConjunctiveNegation { partner };

        let children = &mut self.nodes[parent].children;
        let at = children.iter().position(|&c| c == top).map_or(children.len(), |i| i + 1);
        children.insert(at, cn);

        self.update_node_with_matches_from_above(partner)?;
        self.update_node_with_matches_from_above(cn)?;
        debug!(node = %cn, partner = %partner, levels = conjunct_levels, "created cn node");
        Ok(cn)
    }

    /// The child of `parent` that a subnetwork ending at `bottom` starts from.
    fn subnetwork_top(&self, parent: NodeId, bottom: NodeId) -> Result<NodeId> {
        let mut node = bottom;
        loop {
            match self.nodes.get(node).and_then(|n| n.parent) {
                Some(p) if p == parent => return Ok(node),
                Some(p) => node = p,
                None => {
                    return Err(ReteError::structural(format!(
                        "node {} is not below cn parent {}",
                        bottom, parent
                    )))
                }
            }
        }
    }

    fn set_left_unlinked(&mut self, node: NodeId, value: bool) {
        if let NodeKind::MergedJoin { left_unlinked, .. } = &mut self.nodes[node].kind {
            *left_unlinked = value;
        }
    }

    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        for child in self.nodes[parent].children.iter_mut() {
            if *child == old {
                *child = new;
            }
        }
    }

    /// Move every token of `from` to `to`, re-keying the left index.
    fn move_tokens(&mut self, from: NodeId, to: NodeId) {
        let tokens = std::mem::take(&mut self.nodes[from].tokens);
        for &id in &tokens {
            let token = &mut self.tokens[id];
            token.node = to;
            if let Some(key) = token.hash_key.clone() {
                let old = (from, key.clone());
                if let Some(bucket) = self.left_index.get_mut(&old) {
                    bucket.swap_remove(&id);
                    if bucket.is_empty() {
                        self.left_index.remove(&old);
                    }
                }
                self.left_index.entry((to, key)).or_default().insert(id);
            }
        }
        self.nodes[to].tokens = tokens;
    }

    /// Split a merged memory-join into a memory node and a join below it.
    /// Tokens move to the memory unchanged. Returns the memory node.
    pub(crate) fn split_merged_join(&mut self, node: NodeId) -> Result<NodeId> {
        let (spec, left_unlinked) = match &self.nodes[node].kind {
            NodeKind::MergedJoin { spec, left_unlinked } => (spec.clone(), *left_unlinked),
            other => {
                return Err(ReteError::UnexpectedNodeKind {
                    found: other.name(),
                    context: "split",
                })
            }
        };
        let parent = self.parent_of(node)?;
        let memory = self.nodes.insert(BetaNode::new(
            Some(parent),
            NodeKind::Memory {
                hash_loc: spec.hash_loc,
                linked_children: Vec::new(),
            },
        ));
        self.replace_child(parent, node, memory);
        self.nodes[memory].children.push(node);
        self.nodes[node].parent = Some(memory);
        self.move_tokens(node, memory);

        let left_linked = !left_unlinked || !spec.right_linked;
        self.nodes[node].kind = NodeKind::Join { spec, left_linked };
        if left_linked {
            if let NodeKind::Memory { linked_children, .. } = &mut self.nodes[memory].kind {
                linked_children.push(node);
            }
        }
        debug!(node = %node, memory = %memory, "split merged join");
        Ok(memory)
    }

    /// Collapse a memory node with a single join child into a merged
    /// memory-join that takes over the join's id.
    pub(crate) fn merge_into_merged_join(&mut self, memory: NodeId) -> Result<()> {
        let join = match self.nodes[memory].children.as_slice() {
            [join] => *join,
            _ => {
                return Err(ReteError::structural(format!(
                    "memory {} does not have exactly one child",
                    memory
                )))
            }
        };
        let (spec, left_linked) = match &self.nodes[join].kind {
            NodeKind::Join { spec, left_linked } => (spec.clone(), *left_linked),
            other => {
                return Err(ReteError::UnexpectedNodeKind {
                    found: other.name(),
                    context: "merge",
                })
            }
        };
        let grandparent = self.parent_of(memory)?;
        self.replace_child(grandparent, memory, join);
        self.nodes[join].parent = Some(grandparent);
        self.move_tokens(memory, join);
        self.nodes.remove(memory);

        self.nodes[join].kind = NodeKind::MergedJoin {
            spec,
            left_unlinked: !left_linked,
        };
        if self.nodes[join].tokens.is_empty() {
            self.set_left_unlinked(join, false);
            self.unlink_from_right(join)?;
        }
        debug!(node = %join, memory = %memory, "merged memory into join");
        Ok(())
    }

    fn should_merge(&self, node: NodeId) -> bool {
        let beta = &self.nodes[node];
        matches!(beta.kind, NodeKind::Memory { .. })
            && matches!(beta.children.as_slice(), [child] if matches!(self.nodes[*child].kind, NodeKind::Join { .. }))
    }

    /// Remove a childless node and every ancestor it leaves childless,
    /// stopping at the dummy top node.
    pub(crate) fn deallocate_node(&mut self, node: NodeId) -> Result<()> {
        let mut current = node;
        loop {
            if current == self.dummy_top {
                return Ok(());
            }
            if !self.nodes[current].children.is_empty() {
                return Err(ReteError::structural(format!("node {} deallocated while it has children", current)));
            }
            let parent = self.parent_of(current)?;

            let partner = match &self.nodes[current].kind {
                NodeKind::ConjunctiveNegation { partner } => Some(*partner),
                _ => None,
            };
            if let Some(partner) = partner {
                self.deallocate_node(partner)?;
            }

            while let Some(&token) = self.nodes[current].tokens.first() {
                self.remove_token_and_subtree(token)?;
            }

            let alpha = self.nodes[current].kind.posneg().map(|spec| spec.alpha);
            if alpha.is_some() {
                self.unlink_from_right(current)?;
            }
            if let NodeKind::Memory { linked_children, .. } = &mut self.nodes[parent].kind {
                linked_children.retain(|&c| c != current);
            }
            self.nodes[parent].children.retain(|&c| c != current);
            if let Some(removed) = self.nodes.remove(current) {
                debug!(node = %current, kind = removed.kind.name(), "deallocated node");
            }
            if let Some(alpha) = alpha {
                self.remove_alpha_ref(alpha)?;
            }

            if self.nodes[parent].children.is_empty() {
                current = parent;
                continue;
            }
            if self.should_merge(parent) {
                self.merge_into_merged_join(parent)?;
            }
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use working_memory::{Condition, Production};

    fn branch(fx: &mut Fixture, name: &str, attr: &str) -> Production {
        let (s, x) = (fx.var("<s>"), fx.var("<x>"));
        Production::new(name)
            .with_condition(Condition::positive(s.clone(), fx.sym("foo"), x.clone()))
            .with_condition(Condition::positive(x, fx.sym(attr), fx.sym("1")))
    }

    fn kinds_under(rete: &Rete, node: NodeId) -> Vec<&'static str> {
        rete.nodes[node].children.iter().map(|&c| rete.nodes[c].kind.name()).collect()
    }

    #[test]
    fn test_shared_prefix_adds_only_divergent_nodes() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(branch(&mut fx, "a", "bar"), None).unwrap();
        let after_first = rete.nodes.len();

        rete.add_production(branch(&mut fx, "b", "baz"), None).unwrap();
        // The first-level node is shared; the second level is split into a
        // memory with two joins, plus a production node.
        let first = rete.nodes[rete.dummy_top].children[0];
        assert_eq!(rete.nodes[rete.dummy_top].children.len(), 1);
        assert_eq!(kinds_under(&rete, first), vec!["memory"]);
        let memory = rete.nodes[first].children[0];
        assert_eq!(kinds_under(&rete, memory), vec!["join", "join"]);
        assert_eq!(rete.nodes.len(), after_first + 3);
    }

    #[test]
    fn test_split_keeps_tokens_and_matches() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(branch(&mut fx, "a", "bar"), None).unwrap();
        rete.add_wme(fx.wme("S1", "foo", "X1")).unwrap();
        rete.add_wme(fx.wme("X1", "bar", "1")).unwrap();
        rete.add_wme(fx.wme("X1", "baz", "1")).unwrap();

        let first = rete.nodes[rete.dummy_top].children[0];
        let held = rete.nodes[rete.nodes[first].children[0]].tokens.clone();
        assert_eq!(held.len(), 1);

        rete.add_production(branch(&mut fx, "b", "baz"), None).unwrap();
        let memory = rete.nodes[first].children[0];
        assert_eq!(rete.nodes[memory].kind.name(), "memory");
        assert_eq!(rete.nodes[memory].tokens, held);

        let names: Vec<_> = rete.drain_assertions().map(|a| a.production_name).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_excise_merges_memory_back() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(branch(&mut fx, "a", "bar"), None).unwrap();
        let baseline = rete.nodes.len();
        let alphas = rete.alpha.len();

        rete.add_production(branch(&mut fx, "b", "baz"), None).unwrap();
        rete.excise_production("b").unwrap();

        let first = rete.nodes[rete.dummy_top].children[0];
        assert_eq!(kinds_under(&rete, first), vec!["merged-join"]);
        assert_eq!(rete.nodes.len(), baseline);
        assert_eq!(rete.alpha.len(), alphas);
    }

    #[test]
    fn test_excise_last_production_empties_network() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(branch(&mut fx, "a", "bar"), None).unwrap();
        rete.add_wme(fx.wme("S1", "foo", "X1")).unwrap();

        rete.excise_production("a").unwrap();
        assert!(rete.nodes[rete.dummy_top].children.is_empty());
        assert_eq!(rete.nodes.len(), 1);
        assert_eq!(rete.tokens.len(), 1);
        assert!(rete.alpha.is_empty());
    }
}
