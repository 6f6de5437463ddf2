//! The match-set buffer.
//!
//! Every token that reaches a production node becomes a pending assertion,
//! or cancels a pending retraction of an instantiation with the same WMEs.
//! Every token that leaves a production node cancels its pending assertion,
//! or becomes a pending retraction of the instantiation it supports. A match
//! that appears and disappears within one batch is never reported.

use indexmap::IndexSet;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::trace;

use working_memory::{GoalLevel, Timetag, Wme};

use crate::arena::{arena_id, Arena};
use crate::beta::{NodeId, NodeKind};
use crate::error::{ReteError, Result};
use crate::network::Rete;
use crate::production::{ProductionId, RefractedInstantiation};
use crate::tokens::{TokenId, TokenKind};

arena_id!(
    /// Handle to a pending match-set change.
    MscId
);

arena_id!(
    /// Handle to an instantiation (a match that has been handed out).
    InstantiationId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Assertion { token: TokenId },
    Retraction { instantiation: InstantiationId },
}

#[derive(Debug, Clone)]
pub struct MatchSetChange {
    pub production: ProductionId,
    pub kind: ChangeKind,
    pub goal: Option<GoalLevel>,
}

/// A match that has been handed out as an assertion and not yet retracted.
#[derive(Debug, Clone)]
pub struct Instantiation {
    pub production: ProductionId,
    /// The production-node token currently supporting it.
    pub(crate) token: Option<TokenId>,
    /// One entry per top-level condition; `None` for negated ones.
    pub wmes: Vec<Option<Rc<Wme>>>,
    pub goal: Option<GoalLevel>,
}

impl Instantiation {
    pub fn timetags(&self) -> Vec<Option<Timetag>> {
        self.wmes.iter().map(|w| w.as_ref().map(|w| w.timetag)).collect()
    }

    pub fn is_supported(&self) -> bool {
        self.token.is_some()
    }
}

/// A new match, handed to the caller to fire.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub production: ProductionId,
    pub production_name: String,
    pub instantiation: InstantiationId,
    pub wmes: Vec<Option<Rc<Wme>>>,
    pub goal: Option<GoalLevel>,
}

/// A match that no longer holds, handed to the caller to retract.
#[derive(Debug, Clone)]
pub struct Retraction {
    pub production: ProductionId,
    pub production_name: String,
    pub instantiation: InstantiationId,
    pub wmes: Vec<Option<Rc<Wme>>>,
    pub goal: Option<GoalLevel>,
}

#[derive(Debug, Default)]
pub struct MatchSet {
    pub(crate) changes: Arena<MscId, MatchSetChange>,
    assertions: IndexSet<MscId>,
    retractions: IndexSet<MscId>,
    goal_assertions: BTreeMap<Option<GoalLevel>, IndexSet<MscId>>,
    goal_retractions: BTreeMap<Option<GoalLevel>, IndexSet<MscId>>,
    pub(crate) assertion_by_token: HashMap<TokenId, MscId>,
    pub(crate) instantiations: Arena<InstantiationId, Instantiation>,
    pub(crate) inst_by_token: HashMap<TokenId, InstantiationId>,
}

impl MatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, change: MatchSetChange) -> MscId {
        let goal = change.goal;
        let is_assertion = matches!(change.kind, ChangeKind::Assertion { .. });
        let msc = self.changes.insert(change);
        if is_assertion {
            self.assertions.insert(msc);
            self.goal_assertions.entry(goal).or_default().insert(msc);
        } else {
            self.retractions.insert(msc);
            self.goal_retractions.entry(goal).or_default().insert(msc);
        }
        msc
    }

    /// Remove a change from every list it is on.
    fn unlink(&mut self, msc: MscId) -> Option<MatchSetChange> {
        let change = self.changes.remove(msc)?;
        let (global, by_goal) = match change.kind {
            ChangeKind::Assertion { .. } => (&mut self.assertions, &mut self.goal_assertions),
            ChangeKind::Retraction { .. } => (&mut self.retractions, &mut self.goal_retractions),
        };
        global.shift_remove(&msc);
        if let Some(list) = by_goal.get_mut(&change.goal) {
            list.shift_remove(&msc);
            if list.is_empty() {
                by_goal.remove(&change.goal);
            }
        }
        Some(change)
    }

    pub fn pending_assertions(&self) -> usize {
        self.assertions.len()
    }

    pub fn pending_retractions(&self) -> usize {
        self.retractions.len()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.assertions.is_empty() || !self.retractions.is_empty()
    }

    /// Goal levels that currently have pending changes, shallowest first.
    pub fn active_goals(&self) -> Vec<Option<GoalLevel>> {
        let goals: std::collections::BTreeSet<_> = self
            .goal_assertions
            .keys()
            .chain(self.goal_retractions.keys())
            .copied()
            .collect();
        goals.into_iter().collect()
    }

    pub fn instantiation(&self, id: InstantiationId) -> Option<&Instantiation> {
        self.instantiations.get(id)
    }
}

impl Rete {
    /// The goal a match belongs to: the deepest goal among its WME ids.
    fn goal_for(&self, timetags: &[Option<Timetag>]) -> Option<GoalLevel> {
        timetags
            .iter()
            .flatten()
            .filter_map(|t| self.wmes.get(t))
            .filter_map(|slot| slot.wme.id.goal_level())
            .max()
    }

    fn resolve_wmes(&self, timetags: &[Option<Timetag>]) -> Vec<Option<Rc<Wme>>> {
        timetags
            .iter()
            .map(|t| t.and_then(|t| self.wmes.get(&t)).map(|slot| slot.wme.clone()))
            .collect()
    }

    pub(crate) fn production_left_activation(
        &mut self,
        node: NodeId,
        token: TokenId,
        wme: Option<Timetag>,
    ) -> Result<()> {
        let production = match &self.nodes[node].kind {
            NodeKind::Production { production } => *production,
            other => {
                return Err(ReteError::UnexpectedNodeKind {
                    found: other.name(),
                    context: "production activation",
                })
            }
        };
        let new = self.new_left_token(node, token, wme, TokenKind::Plain)?;
        let depth = self.productions[production].depth;
        let timetags = self.token_wmes(new, depth);

        let cancelled = self.productions[production]
            .tentative_retractions
            .iter()
            .copied()
            .find(|&msc| match self.match_set.changes.get(msc).map(|c| c.kind) {
                Some(ChangeKind::Retraction { instantiation }) => self
                    .match_set
                    .instantiations
                    .get(instantiation)
                    .map_or(false, |inst| inst.timetags() == timetags),
                _ => false,
            });

        if let Some(msc) = cancelled {
            self.productions[production].tentative_retractions.shift_remove(&msc);
            if let Some(MatchSetChange {
                kind: ChangeKind::Retraction { instantiation },
                ..
            }) = self.match_set.unlink(msc)
            {
                if let Some(inst) = self.match_set.instantiations.get_mut(instantiation) {
                    inst.token = Some(new);
                }
                self.match_set.inst_by_token.insert(new, instantiation);
            }
            trace!(production = %self.productions[production].name, "retraction cancelled");
            return Ok(());
        }

        let goal = self.goal_for(&timetags);
        let msc = self.match_set.push(MatchSetChange {
            production,
            kind: ChangeKind::Assertion { token: new },
            goal,
        });
        self.productions[production].tentative_assertions.insert(msc);
        self.match_set.assertion_by_token.insert(new, msc);
        trace!(production = %self.productions[production].name, "assertion pending");
        Ok(())
    }

    pub(crate) fn production_left_removal(&mut self, production: ProductionId, token: TokenId) -> Result<()> {
        match self.productions.get(production) {
            Some(p) if !p.excised => {}
            _ => return Ok(()),
        }

        if let Some(msc) = self.match_set.assertion_by_token.remove(&token) {
            self.match_set.unlink(msc);
            self.productions[production].tentative_assertions.shift_remove(&msc);
            trace!(production = %self.productions[production].name, "assertion cancelled");
            return Ok(());
        }

        let instantiation = self
            .match_set
            .inst_by_token
            .remove(&token)
            .ok_or_else(|| ReteError::structural(format!("production token {} has no match-set record", token)))?;
        let goal = match self.match_set.instantiations.get_mut(instantiation) {
            Some(inst) => {
                inst.token = None;
                inst.goal
            }
            None => return Err(ReteError::UnknownInstantiation(instantiation.0 as usize)),
        };
        let msc = self.match_set.push(MatchSetChange {
            production,
            kind: ChangeKind::Retraction { instantiation },
            goal,
        });
        self.productions[production].tentative_retractions.insert(msc);
        trace!(production = %self.productions[production].name, "retraction pending");
        Ok(())
    }

    fn take_assertion(&mut self, msc: MscId) -> Option<Assertion> {
        let change = self.match_set.unlink(msc)?;
        let ChangeKind::Assertion { token } = change.kind else {
            return None;
        };
        self.match_set.assertion_by_token.remove(&token);
        let production = change.production;
        let depth = {
            let p = self.productions.get_mut(production)?;
            p.tentative_assertions.shift_remove(&msc);
            p.depth
        };
        let wmes = self.resolve_wmes(&self.token_wmes(token, depth));
        let instantiation = self.match_set.instantiations.insert(Instantiation {
            production,
            token: Some(token),
            wmes: wmes.clone(),
            goal: change.goal,
        });
        self.match_set.inst_by_token.insert(token, instantiation);
        let p = self.productions.get_mut(production)?;
        p.instantiations.insert(instantiation);
        Some(Assertion {
            production,
            production_name: p.name.clone(),
            instantiation,
            wmes,
            goal: change.goal,
        })
    }

    fn take_retraction(&mut self, msc: MscId) -> Option<Retraction> {
        let change = self.match_set.unlink(msc)?;
        let ChangeKind::Retraction { instantiation } = change.kind else {
            return None;
        };
        let inst = self.match_set.instantiations.remove(instantiation)?;
        let name = match self.productions.get_mut(change.production) {
            Some(p) => {
                p.tentative_retractions.shift_remove(&msc);
                p.instantiations.shift_remove(&instantiation);
                p.name.clone()
            }
            None => String::new(),
        };
        Some(Retraction {
            production: change.production,
            production_name: name,
            instantiation,
            wmes: inst.wmes,
            goal: inst.goal,
        })
    }

    /// Hand out the oldest pending assertion, registering its instantiation.
    pub fn next_assertion(&mut self) -> Option<Assertion> {
        let msc = *self.match_set.assertions.first()?;
        self.take_assertion(msc)
    }

    /// Hand out the oldest pending retraction, releasing its instantiation.
    pub fn next_retraction(&mut self) -> Option<Retraction> {
        let msc = *self.match_set.retractions.first()?;
        self.take_retraction(msc)
    }

    pub fn next_assertion_at_goal(&mut self, goal: Option<GoalLevel>) -> Option<Assertion> {
        let msc = *self.match_set.goal_assertions.get(&goal)?.first()?;
        self.take_assertion(msc)
    }

    pub fn next_retraction_at_goal(&mut self, goal: Option<GoalLevel>) -> Option<Retraction> {
        let msc = *self.match_set.goal_retractions.get(&goal)?.first()?;
        self.take_retraction(msc)
    }

    pub fn drain_assertions(&mut self) -> impl Iterator<Item = Assertion> + '_ {
        std::iter::from_fn(move || self.next_assertion())
    }

    pub fn drain_retractions(&mut self) -> impl Iterator<Item = Retraction> + '_ {
        std::iter::from_fn(move || self.next_retraction())
    }

    pub fn drain_assertions_at_goal(&mut self, goal: Option<GoalLevel>) -> impl Iterator<Item = Assertion> + '_ {
        std::iter::from_fn(move || self.next_assertion_at_goal(goal))
    }

    pub fn drain_retractions_at_goal(&mut self, goal: Option<GoalLevel>) -> impl Iterator<Item = Retraction> + '_ {
        std::iter::from_fn(move || self.next_retraction_at_goal(goal))
    }

    pub fn has_pending_changes(&self) -> bool {
        self.match_set.has_pending_changes()
    }

    pub fn has_pending_changes_at_goal(&self, goal: Option<GoalLevel>) -> bool {
        self.match_set.goal_assertions.contains_key(&goal) || self.match_set.goal_retractions.contains_key(&goal)
    }

    pub fn match_set(&self) -> &MatchSet {
        &self.match_set
    }

    /// Seed a refracted instantiation as a retraction visible only to its
    /// production, so a matching token arriving during the update cancels it.
    pub(crate) fn seed_refraction(
        &mut self,
        production: ProductionId,
        refracted: &RefractedInstantiation,
    ) -> (MscId, InstantiationId) {
        let instantiation = self.match_set.instantiations.insert(Instantiation {
            production,
            token: None,
            wmes: refracted.wmes.clone(),
            goal: refracted.goal,
        });
        let msc = self.match_set.changes.insert(MatchSetChange {
            production,
            kind: ChangeKind::Retraction { instantiation },
            goal: refracted.goal,
        });
        let p = &mut self.productions[production];
        p.tentative_retractions.insert(msc);
        p.instantiations.insert(instantiation);
        (msc, instantiation)
    }

    /// Whether the seeded refraction was matched. An unmatched seed is
    /// withdrawn along with its instantiation.
    pub(crate) fn finish_refraction(
        &mut self,
        production: ProductionId,
        msc: MscId,
        instantiation: InstantiationId,
    ) -> bool {
        let matched = self
            .match_set
            .instantiations
            .get(instantiation)
            .map_or(false, Instantiation::is_supported);
        if matched {
            return true;
        }
        self.match_set.unlink(msc);
        self.match_set.instantiations.remove(instantiation);
        let p = &mut self.productions[production];
        p.tentative_retractions.shift_remove(&msc);
        p.instantiations.shift_remove(&instantiation);
        false
    }

    /// Detach every match-set record of a production that is about to be
    /// excised, returning retractions for the instantiations it had out.
    pub(crate) fn release_production_matches(&mut self, production: ProductionId) -> Vec<Retraction> {
        let (assertions, retractions, instantiations, name) = match self.productions.get_mut(production) {
            Some(p) => (
                std::mem::take(&mut p.tentative_assertions),
                std::mem::take(&mut p.tentative_retractions),
                std::mem::take(&mut p.instantiations),
                p.name.clone(),
            ),
            None => return Vec::new(),
        };

        for msc in assertions {
            if let Some(MatchSetChange {
                kind: ChangeKind::Assertion { token },
                ..
            }) = self.match_set.unlink(msc)
            {
                self.match_set.assertion_by_token.remove(&token);
            }
        }
        for msc in retractions {
            self.match_set.unlink(msc);
        }

        let mut out = Vec::new();
        for instantiation in instantiations {
            let Some(inst) = self.match_set.instantiations.remove(instantiation) else {
                continue;
            };
            if let Some(token) = inst.token {
                self.match_set.inst_by_token.remove(&token);
            }
            out.push(Retraction {
                production,
                production_name: name.clone(),
                instantiation,
                wmes: inst.wmes,
                goal: inst.goal,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain_production, Fixture};

    #[test]
    fn test_assertion_then_retraction() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();

        let w1 = fx.wme("S1", "foo", "X1");
        let w2 = fx.wme("X1", "bar", "1");
        rete.add_wme(w1.clone()).unwrap();
        rete.add_wme(w2.clone()).unwrap();

        let assertions: Vec<_> = rete.drain_assertions().collect();
        assert_eq!(assertions.len(), 1);
        assert_eq!(assertions[0].production_name, "p");
        let timetags: Vec<_> = assertions[0].wmes.iter().map(|w| w.as_ref().map(|w| w.timetag)).collect();
        assert_eq!(timetags, vec![Some(w1.timetag), Some(w2.timetag)]);
        assert!(!rete.has_pending_changes());

        rete.remove_wme(w2.timetag).unwrap();
        let retractions: Vec<_> = rete.drain_retractions().collect();
        assert_eq!(retractions.len(), 1);
        assert_eq!(retractions[0].instantiation, assertions[0].instantiation);
        assert_eq!(rete.production_match_count("p").unwrap(), 0);
        assert!(rete.match_set().instantiation(assertions[0].instantiation).is_none());
    }

    #[test]
    fn test_strobe_produces_no_changes() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        rete.add_wme(fx.wme("S1", "foo", "X1")).unwrap();

        let w2 = fx.wme("X1", "bar", "1");
        rete.add_wme(w2.clone()).unwrap();
        assert!(rete.has_pending_changes());
        rete.remove_wme(w2.timetag).unwrap();
        assert!(!rete.has_pending_changes());
        assert_eq!(rete.drain_assertions().count(), 0);
        assert_eq!(rete.drain_retractions().count(), 0);
    }

    #[test]
    fn test_retraction_cancelled_by_rematch() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        rete.add_wme(fx.wme("S1", "foo", "X1")).unwrap();
        let w2 = fx.wme("X1", "bar", "1");
        rete.add_wme(w2.clone()).unwrap();
        assert_eq!(rete.drain_assertions().count(), 1);

        // The same WME leaving and coming back within a batch is invisible.
        rete.remove_wme(w2.timetag).unwrap();
        assert_eq!(rete.match_set().pending_retractions(), 1);
        rete.add_wme(w2).unwrap();
        assert!(!rete.has_pending_changes());
        assert_eq!(rete.production_match_count("p").unwrap(), 1);
    }

    #[test]
    fn test_goal_scoped_lists() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();

        fx.sym("X2").set_goal_level(Some(2));
        rete.add_wme(fx.wme("S1", "foo", "X1")).unwrap();
        rete.add_wme(fx.wme("X1", "bar", "1")).unwrap();
        rete.add_wme(fx.wme("S1", "foo", "X2")).unwrap();
        rete.add_wme(fx.wme("X2", "bar", "1")).unwrap();

        assert_eq!(rete.match_set().active_goals(), vec![None, Some(2)]);
        assert!(rete.has_pending_changes_at_goal(Some(2)));
        let deep: Vec<_> = rete.drain_assertions_at_goal(Some(2)).collect();
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].goal, Some(2));
        assert_eq!(rete.drain_assertions_at_goal(None).count(), 1);
        assert!(!rete.has_pending_changes());
    }
}
