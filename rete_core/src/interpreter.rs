//! Left and right activation for every node kind.
//!
//! A left activation carries `(token, wme)` from a parent node; a right
//! activation carries a WME from an alpha memory. Candidate matches are
//! always collected before any child is activated, so a destructive child
//! activation never invalidates the scan that triggered it.

use tracing::trace;

use working_memory::Timetag;

use crate::beta::{NodeId, NodeKind, PosNeg, ReteTest};
use crate::error::{ReteError, Result};
use crate::network::Rete;
use crate::tokens::{JoinResult, TokenId, TokenKind};

impl Rete {
    /// Activate every child of `node` (or only the override child while a
    /// new node is being fed from above).
    pub(crate) fn activate_children(&mut self, node: NodeId, token: TokenId, wme: Option<Timetag>) -> Result<()> {
        let children = match self.activation_override {
            Some((parent, child)) if parent == node => vec![child],
            _ => self.nodes[node].children.clone(),
        };
        for child in children {
            if self.nodes.contains(child) {
                self.left_activate(child, token, wme)?;
            }
        }
        Ok(())
    }

    pub(crate) fn left_activate(&mut self, node: NodeId, token: TokenId, wme: Option<Timetag>) -> Result<()> {
        self.counters.left_activations += 1;
        match &self.nodes[node].kind {
            NodeKind::Memory { .. } => self.memory_left_activation(node, token, wme),
            NodeKind::MergedJoin { .. } => self.merged_join_left_activation(node, token, wme),
            NodeKind::Negative { .. } => self.negative_left_activation(node, token, wme),
            NodeKind::ConjunctiveNegation { .. } => self.cn_left_activation(node, token, wme),
            NodeKind::ConjunctiveNegationPartner { .. } => self.partner_left_activation(node, token, wme),
            NodeKind::Production { .. } => self.production_left_activation(node, token, wme),
            other => Err(ReteError::UnexpectedNodeKind {
                found: other.name(),
                context: "left activation",
            }),
        }
    }

    pub(crate) fn right_activate(&mut self, node: NodeId, wme: Timetag) -> Result<()> {
        self.counters.right_activations += 1;
        match &self.nodes[node].kind {
            NodeKind::Join { .. } => self.join_right_activation(node, wme),
            NodeKind::MergedJoin { .. } => self.merged_join_right_activation(node, wme),
            NodeKind::Negative { .. } => self.negative_right_activation(node, wme),
            other => Err(ReteError::UnexpectedNodeKind {
                found: other.name(),
                context: "right activation",
            }),
        }
    }

    fn spec(&self, node: NodeId) -> Result<&PosNeg> {
        self.nodes[node]
            .kind
            .posneg()
            .ok_or_else(|| ReteError::structural(format!("node {} has no alpha memory", node)))
    }

    fn alpha_is_empty(&self, node: NodeId) -> Result<bool> {
        let am = self.spec(node)?.alpha;
        Ok(self.alpha.memories[am].is_empty())
    }

    /// Alpha entries that join with `token` under the node's tests.
    fn right_matches_for_token(&self, node: NodeId, token: TokenId) -> Result<Vec<Timetag>> {
        let spec = self.spec(node)?;
        let memory = &self.alpha.memories[spec.alpha];
        let candidates: Vec<Timetag> = match spec.hash_loc {
            Some(loc) => match self.symbol_at(token, loc, None) {
                Some(key) => memory.entries_with_id(&key).collect(),
                None => Vec::new(),
            },
            None => memory.entries.iter().copied().collect(),
        };
        Ok(candidates
            .into_iter()
            .filter(|&timetag| self.passes_tests(&spec.tests, token, timetag))
            .collect())
    }

    /// Tokens stored at `memory` that join with `wme` under `node`'s tests.
    fn left_matches_for_wme(&self, node: NodeId, memory: NodeId, wme: Timetag) -> Result<Vec<TokenId>> {
        let spec = self.spec(node)?;
        let slot = self.wmes.get(&wme).ok_or(ReteError::UnknownWme(wme))?;
        let candidates: Vec<TokenId> = match spec.hash_loc {
            Some(_) => self
                .left_index
                .get(&(memory, slot.wme.id.clone()))
                .map(|bucket| bucket.iter().copied().collect())
                .unwrap_or_default(),
            None => self.nodes[memory].tokens.iter().copied().collect(),
        };
        Ok(candidates
            .into_iter()
            .filter(|&token| self.passes_tests(&spec.tests, token, wme))
            .collect())
    }

    fn passes_tests(&self, tests: &[ReteTest], token: TokenId, wme: Timetag) -> bool {
        let Some(slot) = self.wmes.get(&wme) else {
            return false;
        };
        tests
            .iter()
            .all(|test| test.passes(&slot.wme, |loc| self.symbol_at(token, loc, Some(wme))))
    }

    fn memory_left_activation(&mut self, node: NodeId, token: TokenId, wme: Option<Timetag>) -> Result<()> {
        let new = self.new_left_token(node, token, wme, TokenKind::Plain)?;
        let joins = match &self.nodes[node].kind {
            NodeKind::Memory { linked_children, .. } => linked_children.clone(),
            _ => Vec::new(),
        };
        for join in joins {
            self.join_left_activation(join, new)?;
        }
        Ok(())
    }

    fn join_left_activation(&mut self, node: NodeId, token: TokenId) -> Result<()> {
        if !self.is_right_linked(node) {
            self.relink_to_right(node)?;
            if self.alpha_is_empty(node)? {
                self.unlink_from_left(node)?;
                return Ok(());
            }
        }
        for wme in self.right_matches_for_token(node, token)? {
            self.activate_children(node, token, Some(wme))?;
        }
        Ok(())
    }

    fn join_right_activation(&mut self, node: NodeId, wme: Timetag) -> Result<()> {
        let parent = self.parent_of(node)?;
        let left_linked = matches!(self.nodes[node].kind, NodeKind::Join { left_linked: true, .. });
        if !left_linked {
            self.relink_to_left(node)?;
            if self.nodes[parent].tokens.is_empty() {
                self.unlink_from_right(node)?;
                return Ok(());
            }
        }
        let matches = self.left_matches_for_wme(node, parent, wme)?;
        if matches.is_empty() {
            self.counters.null_right_activations += 1;
        }
        for token in matches {
            if self.tokens.get(token).map(|t| t.node) == Some(parent) {
                self.activate_children(node, token, Some(wme))?;
            }
        }
        Ok(())
    }

    fn set_merged_left_unlinked(&mut self, node: NodeId, value: bool) {
        if let NodeKind::MergedJoin { left_unlinked, .. } = &mut self.nodes[node].kind {
            *left_unlinked = value;
        }
    }

    fn merged_join_left_activation(&mut self, node: NodeId, token: TokenId, wme: Option<Timetag>) -> Result<()> {
        if !self.is_right_linked(node) {
            self.relink_to_right(node)?;
            let empty = self.alpha_is_empty(node)?;
            self.set_merged_left_unlinked(node, empty);
        }
        let new = self.new_left_token(node, token, wme, TokenKind::Plain)?;
        if matches!(self.nodes[node].kind, NodeKind::MergedJoin { left_unlinked: true, .. }) {
            return Ok(());
        }
        for right in self.right_matches_for_token(node, new)? {
            self.activate_children(node, new, Some(right))?;
        }
        Ok(())
    }

    fn merged_join_right_activation(&mut self, node: NodeId, wme: Timetag) -> Result<()> {
        if matches!(self.nodes[node].kind, NodeKind::MergedJoin { left_unlinked: true, .. }) {
            self.set_merged_left_unlinked(node, false);
            if self.nodes[node].tokens.is_empty() {
                self.unlink_from_right(node)?;
                return Ok(());
            }
        }
        let matches = self.left_matches_for_wme(node, node, wme)?;
        if matches.is_empty() {
            self.counters.null_right_activations += 1;
        }
        for token in matches {
            if self.tokens.get(token).map(|t| t.node) == Some(node) {
                self.activate_children(node, token, Some(wme))?;
            }
        }
        Ok(())
    }

    fn add_join_result(&mut self, owner: TokenId, wme: Timetag) -> Result<bool> {
        let id = self.join_results.insert(JoinResult { owner, wme });
        if let Some(slot) = self.wmes.get_mut(&wme) {
            slot.join_results.insert(id);
        }
        match &mut self.tokens[owner].kind {
            TokenKind::Negative { join_results } => {
                let first = join_results.is_empty();
                join_results.insert(id);
                Ok(first)
            }
            _ => Err(ReteError::structural(format!("token {} is not a negative token", owner))),
        }
    }

    fn negative_left_activation(&mut self, node: NodeId, token: TokenId, wme: Option<Timetag>) -> Result<()> {
        if !self.is_right_linked(node) {
            self.relink_to_right(node)?;
        }
        let kind = TokenKind::Negative {
            join_results: Default::default(),
        };
        let new = self.new_left_token(node, token, wme, kind)?;
        let blockers = self.right_matches_for_token(node, new)?;
        if blockers.is_empty() {
            return self.activate_children(node, new, None);
        }
        for blocker in blockers {
            self.add_join_result(new, blocker)?;
        }
        Ok(())
    }

    fn negative_right_activation(&mut self, node: NodeId, wme: Timetag) -> Result<()> {
        let matches = self.left_matches_for_wme(node, node, wme)?;
        if matches.is_empty() {
            self.counters.null_right_activations += 1;
        }
        for token in matches {
            if self.tokens.get(token).map(|t| t.node) != Some(node) {
                continue;
            }
            if self.add_join_result(token, wme)? {
                trace!(node = %node, token = %token, "negative condition now blocked");
                self.remove_children_of(token)?;
            }
        }
        Ok(())
    }

    fn cn_left_activation(&mut self, node: NodeId, token: TokenId, wme: Option<Timetag>) -> Result<()> {
        if self.cn_index.contains_key(&(node, token, wme)) {
            return Ok(());
        }
        let kind = TokenKind::ConjunctiveOwner {
            partner_results: Default::default(),
        };
        let new = self.new_left_token(node, token, wme, kind)?;
        self.activate_children(node, new, None)
    }

    fn partner_left_activation(&mut self, node: NodeId, token: TokenId, wme: Option<Timetag>) -> Result<()> {
        let (cn, levels) = match &self.nodes[node].kind {
            NodeKind::ConjunctiveNegationPartner {
                owner_node,
                conjunct_levels,
            } => (*owner_node, *conjunct_levels),
            other => {
                return Err(ReteError::UnexpectedNodeKind {
                    found: other.name(),
                    context: "cn partner activation",
                })
            }
        };

        let (mut owner_parent, mut owner_wme) = (token, wme);
        for _ in 0..levels {
            let tok = &self.tokens[owner_parent];
            owner_wme = tok.wme;
            owner_parent = tok
                .parent
                .ok_or_else(|| ReteError::structural("cn subnetwork deeper than its tokens"))?;
        }

        let owner = match self.cn_index.get(&(cn, owner_parent, owner_wme)) {
            Some(&owner) => owner,
            None => {
                let kind = TokenKind::ConjunctiveOwner {
                    partner_results: Default::default(),
                };
                self.new_left_token(cn, owner_parent, owner_wme, kind)?
            }
        };

        let result = self.new_left_token(node, token, wme, TokenKind::PartnerResult { owner })?;
        let first = match &mut self.tokens[owner].kind {
            TokenKind::ConjunctiveOwner { partner_results } => {
                let first = partner_results.is_empty();
                partner_results.insert(result);
                first
            }
            _ => return Err(ReteError::structural(format!("token {} is not a cn owner", owner))),
        };
        if first {
            trace!(node = %cn, token = %owner, "conjunctive negation now blocked");
            self.remove_children_of(owner)?;
        }
        Ok(())
    }

    /// Feed a freshly built node every match its parent currently has,
    /// without re-activating the parent's other children.
    pub(crate) fn update_node_with_matches_from_above(&mut self, child: NodeId) -> Result<()> {
        let parent = self.parent_of(child)?;
        let saved = self.activation_override.replace((parent, child));
        let outcome = self.feed_from_parent(parent, child);
        self.activation_override = saved;
        outcome
    }

    fn feed_from_parent(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        match &self.nodes[parent].kind {
            NodeKind::DummyTop => {
                let root = self.dummy_token;
                self.left_activate(child, root, None)
            }
            // Joins under a memory hold no state of their own.
            NodeKind::Memory { .. } => Ok(()),
            NodeKind::Join { spec, .. } | NodeKind::MergedJoin { spec, .. } => {
                let entries: Vec<Timetag> = self.alpha.memories[spec.alpha].entries.iter().copied().collect();
                for wme in entries {
                    self.right_activate(parent, wme)?;
                }
                Ok(())
            }
            NodeKind::Negative { .. } | NodeKind::ConjunctiveNegation { .. } => {
                let unblocked: Vec<TokenId> = self.nodes[parent]
                    .tokens
                    .iter()
                    .copied()
                    .filter(|&t| self.tokens[t].is_unblocked())
                    .collect();
                for token in unblocked {
                    self.left_activate(child, token, None)?;
                }
                Ok(())
            }
            other => Err(ReteError::UnexpectedNodeKind {
                found: other.name(),
                context: "parent of a new node",
            }),
        }
    }
}
