//! The matcher for one agent.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace, warn};

use working_memory::{AgentId, SymbolRef, Timetag, Wme};

use crate::alpha::{AlphaId, AlphaNetwork};
use crate::arena::Arena;
use crate::beta::{BetaNode, NodeId, NodeKind};
use crate::config::ReteConfig;
use crate::error::{ReteError, Result};
use crate::match_set::MatchSet;
use crate::production::{ProductionId, ReteProduction};
use crate::tokens::{JoinResult, JoinResultId, Token, TokenId, TokenKind};

/// A WME as the network holds it, with everything that refers to it.
#[derive(Debug)]
pub(crate) struct WmeSlot {
    pub wme: Rc<Wme>,
    pub alpha_memories: Vec<AlphaId>,
    pub tokens: IndexSet<TokenId>,
    /// Negative-node join results this WME is blocking with.
    pub join_results: IndexSet<JoinResultId>,
}

/// Activation counts since the network was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationCounters {
    pub left_activations: u64,
    pub right_activations: u64,
    /// Right activations that found no partner token.
    pub null_right_activations: u64,
}

/// A Rete network: alpha memories, beta nodes, tokens and the match set.
///
/// Each agent owns its own instance; nothing is shared between instances.
#[derive(Debug)]
pub struct Rete {
    pub(crate) agent: AgentId,
    pub(crate) config: ReteConfig,
    pub(crate) alpha: AlphaNetwork,
    pub(crate) nodes: Arena<NodeId, BetaNode>,
    pub(crate) tokens: Arena<TokenId, Token>,
    pub(crate) join_results: Arena<JoinResultId, JoinResult>,
    pub(crate) wmes: IndexMap<Timetag, WmeSlot>,
    /// Tokens at hashed nodes, by node and hashed symbol.
    pub(crate) left_index: HashMap<(NodeId, SymbolRef), IndexSet<TokenId>>,
    /// CN tokens by node, parent token and WME.
    pub(crate) cn_index: HashMap<(NodeId, TokenId, Option<Timetag>), TokenId>,
    pub(crate) productions: Arena<ProductionId, ReteProduction>,
    pub(crate) by_name: HashMap<String, ProductionId>,
    pub(crate) match_set: MatchSet,
    pub(crate) dummy_top: NodeId,
    pub(crate) dummy_token: TokenId,
    /// While a new node is being fed from above: (parent, new child).
    pub(crate) activation_override: Option<(NodeId, NodeId)>,
    /// Token ceiling, armed only while a WME is being added.
    pub(crate) token_limit: Option<usize>,
    pub(crate) counters: ActivationCounters,
}

impl Rete {
    pub fn new(config: ReteConfig) -> Self {
        let mut nodes = Arena::new();
        let dummy_top = nodes.insert(BetaNode::new(None, NodeKind::DummyTop));
        let mut tokens = Arena::new();
        let dummy_token = tokens.insert(Token::root(dummy_top));
        nodes[dummy_top].tokens.insert(dummy_token);

        let agent = AgentId::new();
        debug!(agent = %agent, "created rete network");
        Self {
            agent,
            config,
            alpha: AlphaNetwork::new(),
            nodes,
            tokens,
            join_results: Arena::new(),
            wmes: IndexMap::new(),
            left_index: HashMap::new(),
            cn_index: HashMap::new(),
            productions: Arena::new(),
            by_name: HashMap::new(),
            match_set: MatchSet::new(),
            dummy_top,
            dummy_token,
            activation_override: None,
            token_limit: None,
            counters: ActivationCounters::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ReteConfig::default())
    }

    pub fn agent(&self) -> AgentId {
        self.agent
    }

    pub fn config(&self) -> &ReteConfig {
        &self.config
    }

    pub fn counters(&self) -> ActivationCounters {
        self.counters
    }

    /// Add a WME and propagate it through the network.
    ///
    /// If the token limit is reached part way through, the WME is taken
    /// back out before the error is returned.
    pub fn add_wme(&mut self, wme: Rc<Wme>) -> Result<()> {
        if self.wmes.contains_key(&wme.timetag) {
            return Err(ReteError::DuplicateWme(wme.timetag));
        }
        let limit = self.config.limits.max_tokens;
        if let Some(limit) = limit {
            if self.tokens.len() >= limit {
                return Err(ReteError::ResourceExhausted {
                    resource: "tokens",
                    limit,
                });
            }
        }
        trace!(wme = %wme, "add wme");
        self.wmes.insert(
            wme.timetag,
            WmeSlot {
                wme: wme.clone(),
                alpha_memories: Vec::new(),
                tokens: IndexSet::new(),
                join_results: IndexSet::new(),
            },
        );

        self.token_limit = limit;
        let outcome = self.add_wme_to_alpha(&wme);
        self.token_limit = None;
        match outcome {
            Err(err @ ReteError::ResourceExhausted { .. }) => {
                warn!(wme = %wme, "token limit reached, withdrawing wme");
                self.remove_wme(wme.timetag)?;
                Err(err)
            }
            other => other,
        }
    }

    /// Remove a WME: every token built on it goes, and negative tokens it
    /// was blocking are re-checked.
    pub fn remove_wme(&mut self, timetag: Timetag) -> Result<Rc<Wme>> {
        let (wme, memories) = match self.wmes.get(&timetag) {
            Some(slot) => (slot.wme.clone(), slot.alpha_memories.clone()),
            None => return Err(ReteError::UnknownWme(timetag)),
        };
        trace!(wme = %wme, "remove wme");
        self.remove_wme_from_alpha(&wme, &memories)?;

        while let Some(token) = self.wmes.get(&timetag).and_then(|slot| slot.tokens.first().copied()) {
            self.remove_token_and_subtree(token)?;
        }

        while let Some(result) = self.wmes.get(&timetag).and_then(|slot| slot.join_results.first().copied()) {
            let owner = self.join_results[result].owner;
            self.free_join_result(result);
            let unblocked = match self.tokens.get_mut(owner).map(|t| &mut t.kind) {
                Some(TokenKind::Negative { join_results }) => {
                    join_results.swap_remove(&result);
                    join_results.is_empty()
                }
                _ => false,
            };
            if unblocked {
                let node = self.tokens[owner].node;
                trace!(node = %node, token = %owner, "negative condition unblocked");
                self.activate_children(node, owner, None)?;
            }
        }

        self.wmes.swap_remove(&timetag);
        Ok(wme)
    }

    pub fn contains_wme(&self, timetag: Timetag) -> bool {
        self.wmes.contains_key(&timetag)
    }

    pub fn wme_count(&self) -> usize {
        self.wmes.len()
    }

    pub fn find_production(&self, name: &str) -> Option<ProductionId> {
        self.by_name.get(name).copied()
    }

    pub fn production(&self, id: ProductionId) -> Option<&ReteProduction> {
        self.productions.get(id)
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionId, &ReteProduction)> {
        self.productions.iter()
    }

    pub(crate) fn production_by_name(&self, name: &str) -> Result<ProductionId> {
        self.find_production(name)
            .ok_or_else(|| ReteError::UnknownProduction(name.to_string()))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn alpha_memory_count(&self) -> usize {
        self.alpha.len()
    }
}

impl Default for Rete {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain_production, Fixture};
    use working_memory::{Condition, Production};

    #[test]
    fn test_new_network_has_dummy_top_and_token() {
        let rete = Rete::with_defaults();
        assert_eq!(rete.node_count(), 1);
        assert_eq!(rete.token_count(), 1);
        assert_eq!(rete.tokens[rete.dummy_token].node, rete.dummy_top);
    }

    #[test]
    fn test_duplicate_and_unknown_wmes() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let w = fx.wme("S1", "foo", "X1");
        rete.add_wme(w.clone()).unwrap();
        assert!(matches!(rete.add_wme(w.clone()), Err(ReteError::DuplicateWme(_))));

        rete.remove_wme(w.timetag).unwrap();
        assert!(!rete.contains_wme(w.timetag));
        assert!(matches!(rete.remove_wme(w.timetag), Err(ReteError::UnknownWme(_))));
    }

    #[test]
    fn test_token_limit() {
        let mut fx = Fixture::new();
        let config = ReteConfig::from_toml_str("[limits]\nmax_tokens = 1").unwrap();
        let mut rete = Rete::new(config);
        let err = rete.add_wme(fx.wme("S1", "foo", "X1")).unwrap_err();
        assert!(matches!(err, ReteError::ResourceExhausted { resource: "tokens", .. }));
        assert_eq!(rete.wme_count(), 0);
    }

    #[test]
    fn test_token_limit_reached_mid_propagation_withdraws_wme() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        rete.add_wme(fx.wme("X1", "bar", "1")).unwrap();
        let tokens = rete.token_count();

        // The next WME needs a second-level token and a production token.
        rete.config.limits.max_tokens = Some(tokens + 1);
        let w = fx.wme("S1", "foo", "X1");
        let err = rete.add_wme(w.clone()).unwrap_err();
        assert!(matches!(err, ReteError::ResourceExhausted { resource: "tokens", .. }));
        assert!(!rete.contains_wme(w.timetag));
        assert_eq!(rete.token_count(), tokens);
        assert!(!rete.has_pending_changes());

        rete.config.limits.max_tokens = None;
        rete.add_wme(w).unwrap();
        let names: Vec<_> = rete.drain_assertions().map(|a| a.production_name).collect();
        assert_eq!(names, vec!["p".to_string()]);
    }

    #[test]
    fn test_negative_condition_tracks_absence() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let s = fx.var("<s>");
        let production = Production::new("no-block")
            .with_condition(Condition::positive(s.clone(), fx.sym("on"), fx.sym("table")))
            .with_condition(Condition::negative(s, fx.sym("blocked"), fx.sym("yes")));
        rete.add_production(production, None).unwrap();

        rete.add_wme(fx.wme("B1", "on", "table")).unwrap();
        assert_eq!(rete.drain_assertions().count(), 1);

        let blocker = fx.wme("B1", "blocked", "yes");
        rete.add_wme(blocker.clone()).unwrap();
        assert_eq!(rete.drain_retractions().count(), 1);
        assert_eq!(rete.production_match_count("no-block").unwrap(), 0);

        // A blocker on another id leaves the match alone.
        rete.add_wme(fx.wme("B2", "blocked", "yes")).unwrap();
        assert!(!rete.has_pending_changes());

        rete.remove_wme(blocker.timetag).unwrap();
        let assertions: Vec<_> = rete.drain_assertions().collect();
        assert_eq!(assertions.len(), 1);
        assert_eq!(assertions[0].wmes.len(), 2);
        assert!(assertions[0].wmes[1].is_none());
    }

    #[test]
    fn test_conjunctive_negation() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let (s, x) = (fx.var("<s>"), fx.var("<x>"));
        let production = Production::new("no-red-child")
            .with_condition(Condition::positive(s.clone(), fx.sym("type"), fx.sym("box")))
            .with_condition(Condition::ConjunctiveNegation(vec![
                Condition::positive(s, fx.sym("child"), x.clone()),
                Condition::positive(x, fx.sym("color"), fx.sym("red")),
            ]));
        rete.add_production(production, None).unwrap();

        rete.add_wme(fx.wme("S1", "type", "box")).unwrap();
        rete.add_wme(fx.wme("S1", "child", "C1")).unwrap();
        assert_eq!(rete.drain_assertions().count(), 1);

        let red = fx.wme("C1", "color", "red");
        rete.add_wme(red.clone()).unwrap();
        assert_eq!(rete.drain_retractions().count(), 1);

        rete.remove_wme(red.timetag).unwrap();
        assert_eq!(rete.drain_assertions().count(), 1);
        assert_eq!(rete.production_match_count("no-red-child").unwrap(), 1);
    }

    #[test]
    fn test_conjunctive_negation_built_over_existing_matches() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_wme(fx.wme("S1", "type", "box")).unwrap();
        rete.add_wme(fx.wme("S2", "type", "box")).unwrap();
        rete.add_wme(fx.wme("S1", "child", "C1")).unwrap();
        rete.add_wme(fx.wme("C1", "color", "red")).unwrap();

        let (s, x) = (fx.var("<s>"), fx.var("<x>"));
        let production = Production::new("no-red-child")
            .with_condition(Condition::positive(s.clone(), fx.sym("type"), fx.sym("box")))
            .with_condition(Condition::ConjunctiveNegation(vec![
                Condition::positive(s, fx.sym("child"), x.clone()),
                Condition::positive(x, fx.sym("color"), fx.sym("red")),
            ]));
        rete.add_production(production, None).unwrap();

        let assertions: Vec<_> = rete.drain_assertions().collect();
        assert_eq!(assertions.len(), 1);
        let id = assertions[0].wmes[0].as_ref().map(|w| w.id.clone());
        assert_eq!(id, Some(fx.sym("S2")));
    }

    #[test]
    fn test_remove_wme_leaves_no_reference() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        let w1 = fx.wme("S1", "foo", "X1");
        rete.add_wme(w1.clone()).unwrap();
        rete.add_wme(fx.wme("X1", "bar", "1")).unwrap();
        rete.drain_assertions().count();

        rete.remove_wme(w1.timetag).unwrap();
        assert!(rete.tokens.iter().all(|(_, t)| t.wme != Some(w1.timetag)));
        assert_eq!(rete.drain_retractions().count(), 1);
        let node = rete.productions[rete.find_production("p").unwrap()].node;
        assert!(rete.nodes[node].tokens.is_empty());
    }
}
