//! The token store.
//!
//! Tokens form a tree mirroring the beta network: each token's parent is the
//! partial match one level up. Siblings are kept in an index-linked list so
//! that a subtree can be torn down leaf-first without recursion.

use indexmap::IndexSet;
use tracing::trace;

use working_memory::{SymbolRef, Timetag};

use crate::arena::arena_id;
use crate::beta::{NodeId, NodeKind, VarLoc};
use crate::error::{ReteError, Result};
use crate::network::Rete;

arena_id!(
    /// Handle to a token.
    TokenId
);

arena_id!(
    /// Handle to a negative-node join result.
    JoinResultId
);

#[derive(Debug, Clone)]
pub enum TokenKind {
    Plain,
    /// A token at a negative node, with the WMEs currently blocking it.
    Negative { join_results: IndexSet<JoinResultId> },
    /// A token at a CN node, with the partner results currently blocking it.
    ConjunctiveOwner { partner_results: IndexSet<TokenId> },
    /// A token at a CN partner node, blocking `owner`.
    PartnerResult { owner: TokenId },
}

#[derive(Debug, Clone)]
pub struct Token {
    pub node: NodeId,
    pub parent: Option<TokenId>,
    pub wme: Option<Timetag>,
    pub first_child: Option<TokenId>,
    pub next_sibling: Option<TokenId>,
    pub prev_sibling: Option<TokenId>,
    /// Key under which the token is indexed in the left hash table.
    pub hash_key: Option<SymbolRef>,
    pub kind: TokenKind,
}

impl Token {
    pub(crate) fn root(node: NodeId) -> Self {
        Self {
            node,
            parent: None,
            wme: None,
            first_child: None,
            next_sibling: None,
            prev_sibling: None,
            hash_key: None,
            kind: TokenKind::Plain,
        }
    }

    /// Whether a negative or CN token is currently unblocked.
    pub fn is_unblocked(&self) -> bool {
        match &self.kind {
            TokenKind::Negative { join_results } => join_results.is_empty(),
            TokenKind::ConjunctiveOwner { partner_results } => partner_results.is_empty(),
            _ => true,
        }
    }
}

/// A WME that blocks a negative-node token.
#[derive(Debug, Clone, Copy)]
pub struct JoinResult {
    pub owner: TokenId,
    pub wme: Timetag,
}

impl Rete {
    /// Create a token at `node` and link it everywhere it must be found:
    /// its node, its parent's children, its WME, and the left hash table.
    pub(crate) fn new_left_token(
        &mut self,
        node: NodeId,
        parent: TokenId,
        wme: Option<Timetag>,
        kind: TokenKind,
    ) -> Result<TokenId> {
        if let Some(limit) = self.token_limit {
            if self.tokens.len() >= limit {
                return Err(ReteError::ResourceExhausted {
                    resource: "tokens",
                    limit,
                });
            }
        }
        let next_sibling = self.tokens[parent].first_child;
        let token = Token {
            node,
            parent: Some(parent),
            wme,
            first_child: None,
            next_sibling,
            prev_sibling: None,
            hash_key: None,
            kind,
        };
        let id = self.tokens.insert(token);
        if let Some(sibling) = next_sibling {
            self.tokens[sibling].prev_sibling = Some(id);
        }
        self.tokens[parent].first_child = Some(id);
        self.nodes[node].tokens.insert(id);

        if let Some(timetag) = wme {
            let slot = self
                .wmes
                .get_mut(&timetag)
                .ok_or(ReteError::UnknownWme(timetag))?;
            slot.tokens.insert(id);
        }

        if let Some(loc) = self.nodes[node].kind.token_hash_loc() {
            if let Some(key) = self.symbol_at(id, loc, None) {
                self.left_index
                    .entry((node, key.clone()))
                    .or_default()
                    .insert(id);
                self.tokens[id].hash_key = Some(key);
            }
        }

        if matches!(self.nodes[node].kind, NodeKind::ConjunctiveNegation { .. }) {
            self.cn_index.insert((node, parent, wme), id);
        }
        Ok(id)
    }

    /// Resolve a variable location against a token (and the WME being
    /// joined, for `levels_up == 0`).
    pub(crate) fn symbol_at(&self, token: TokenId, loc: VarLoc, wme: Option<Timetag>) -> Option<SymbolRef> {
        let timetag = if loc.levels_up == 0 {
            wme?
        } else {
            let mut current = token;
            for _ in 1..loc.levels_up {
                current = self.tokens.get(current)?.parent?;
            }
            self.tokens.get(current)?.wme?
        };
        self.wmes
            .get(&timetag)
            .map(|slot| slot.wme.field(loc.field).clone())
    }

    /// WMEs matched along the chain ending at `token`, oldest first.
    pub(crate) fn token_wmes(&self, token: TokenId, levels: usize) -> Vec<Option<Timetag>> {
        let mut out = Vec::with_capacity(levels);
        let mut current = Some(token);
        for _ in 0..levels {
            match current.and_then(|t| self.tokens.get(t)) {
                Some(tok) => {
                    out.push(tok.wme);
                    current = tok.parent;
                }
                None => out.push(None),
            }
        }
        out.reverse();
        out
    }

    /// Remove `root` and every token below it, leftmost leaf first.
    pub(crate) fn remove_token_and_subtree(&mut self, root: TokenId) -> Result<()> {
        let mut current = root;
        loop {
            while let Some(child) = self.tokens[current].first_child {
                current = child;
            }
            let next = if current == root {
                None
            } else {
                let tok = &self.tokens[current];
                tok.next_sibling.or(tok.parent)
            };
            self.remove_single_token(current, root)?;
            match next {
                Some(n) => current = n,
                None => return Ok(()),
            }
        }
    }

    /// Remove every child subtree of `token`, keeping the token itself.
    pub(crate) fn remove_children_of(&mut self, token: TokenId) -> Result<()> {
        while let Some(child) = self.tokens.get(token).and_then(|t| t.first_child) {
            self.remove_token_and_subtree(child)?;
        }
        Ok(())
    }

    fn is_within(&self, token: TokenId, root: TokenId) -> bool {
        let mut current = Some(token);
        while let Some(t) = current {
            if t == root {
                return true;
            }
            current = self.tokens.get(t).and_then(|tok| tok.parent);
        }
        false
    }

    /// Unlink a childless token from the tree and every index.
    fn detach_token(&mut self, id: TokenId) -> Result<Token> {
        let token = self
            .tokens
            .remove(id)
            .ok_or_else(|| ReteError::structural(format!("token {} is already gone", id)))?;
        if token.first_child.is_some() {
            return Err(ReteError::structural(format!("token {} removed before its children", id)));
        }

        match token.prev_sibling {
            Some(prev) => self.tokens[prev].next_sibling = token.next_sibling,
            None => {
                if let Some(parent) = token.parent.and_then(|p| self.tokens.get_mut(p)) {
                    parent.first_child = token.next_sibling;
                }
            }
        }
        if let Some(next) = token.next_sibling {
            self.tokens[next].prev_sibling = token.prev_sibling;
        }

        if let Some(node) = self.nodes.get_mut(token.node) {
            node.tokens.swap_remove(&id);
        }
        if let Some(slot) = token.wme.and_then(|t| self.wmes.get_mut(&t)) {
            slot.tokens.swap_remove(&id);
        }
        if let Some(key) = &token.hash_key {
            let index_key = (token.node, key.clone());
            if let Some(bucket) = self.left_index.get_mut(&index_key) {
                bucket.swap_remove(&id);
                if bucket.is_empty() {
                    self.left_index.remove(&index_key);
                }
            }
        }
        Ok(token)
    }

    pub(crate) fn free_join_result(&mut self, id: JoinResultId) {
        if let Some(result) = self.join_results.remove(id) {
            if let Some(slot) = self.wmes.get_mut(&result.wme) {
                slot.join_results.swap_remove(&id);
            }
        }
    }

    fn remove_single_token(&mut self, id: TokenId, root: TokenId) -> Result<()> {
        let token = self.detach_token(id)?;
        let node = token.node;
        let node_empty = self.nodes[node].tokens.is_empty();

        match &self.nodes[node].kind {
            NodeKind::Memory { linked_children, .. } => {
                if node_empty {
                    for join in linked_children.clone() {
                        self.unlink_from_right(join)?;
                    }
                }
            }
            NodeKind::MergedJoin { .. } | NodeKind::Negative { .. } => {
                if node_empty {
                    self.unlink_from_right(node)?;
                }
            }
            NodeKind::ConjunctiveNegation { .. } => {
                if let Some(parent) = token.parent {
                    self.cn_index.remove(&(node, parent, token.wme));
                }
            }
            NodeKind::ConjunctiveNegationPartner { owner_node, .. } => {
                let owner_node = *owner_node;
                if let TokenKind::PartnerResult { owner } = token.kind {
                    let now_unblocked = match self.tokens.get_mut(owner).map(|t| &mut t.kind) {
                        Some(TokenKind::ConjunctiveOwner { partner_results }) => {
                            partner_results.swap_remove(&id);
                            partner_results.is_empty()
                        }
                        _ => false,
                    };
                    if now_unblocked && !self.is_within(owner, root) {
                        trace!(token = %owner, "cn owner unblocked");
                        self.activate_children(owner_node, owner, None)?;
                    }
                }
            }
            NodeKind::Production { production } => {
                let production = *production;
                self.production_left_removal(production, id)?;
            }
            other => {
                return Err(ReteError::UnexpectedNodeKind {
                    found: other.name(),
                    context: "token removal",
                })
            }
        }

        match token.kind {
            TokenKind::Negative { join_results } => {
                for result in join_results {
                    self.free_join_result(result);
                }
            }
            TokenKind::ConjunctiveOwner { partner_results } => {
                for result in partner_results {
                    self.detach_token(result)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
