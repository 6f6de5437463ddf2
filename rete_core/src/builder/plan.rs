//! Dry run of a build: which existing nodes a condition list would share
//! and how many nodes and alpha memories it would add.
//!
//! Sharing follows the same order as the builder. Once one condition
//! needs a new node, everything below it is new as well.

use std::collections::HashSet;

use working_memory::{Condition, SymbolRef};

use super::bindings::VarBindings;
use super::nodes::CompiledCondition;
use super::{compile_tests, validate};
use crate::alpha::AlphaId;
use crate::beta::NodeId;
use crate::error::Result;
use crate::network::Rete;

/// What building a condition list would do to the network.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct BuildPlan {
    /// The bottom node, when every condition already has one.
    pub shared_bottom: Option<NodeId>,
    pub new_nodes: usize,
    pub new_alphas: usize,
}

struct Planner<'a> {
    rete: &'a Rete,
    new_nodes: usize,
    new_alphas: HashSet<([Option<SymbolRef>; 3], bool)>,
}

impl Planner<'_> {
    fn alpha(&mut self, condition: &CompiledCondition) -> Option<AlphaId> {
        let found = self.rete.alpha.lookup(&condition.constants, condition.acceptable);
        if found.is_none() {
            self.new_alphas
                .insert((condition.constants.clone(), condition.acceptable));
        }
        found
    }

    fn positive(&mut self, parent: Option<NodeId>, condition: &CompiledCondition) -> Option<NodeId> {
        let alpha = self.alpha(condition);
        let Some(parent) = parent else {
            self.new_nodes += 1;
            return None;
        };
        let rete = self.rete;
        let (hash_loc, tests) = (condition.hash_loc, condition.tests.as_slice());

        if let Some(memory) = rete.memory_child(parent, hash_loc) {
            let shared = alpha.and_then(|alpha| rete.shared_join(memory, alpha, hash_loc, tests));
            if shared.is_none() {
                self.new_nodes += 1;
            }
            return shared;
        }
        if let Some(node) = alpha.and_then(|alpha| rete.shared_merged_join(parent, alpha, hash_loc, tests)) {
            return Some(node);
        }
        // A split adds the memory as well as the join.
        self.new_nodes += match rete.splittable_merged_join(parent, hash_loc) {
            Some(_) => 2,
            None => 1,
        };
        None
    }

    fn negative(&mut self, parent: Option<NodeId>, condition: &CompiledCondition) -> Option<NodeId> {
        let alpha = self.alpha(condition);
        let shared = parent
            .zip(alpha)
            .and_then(|(parent, alpha)| self.rete.shared_negative(parent, alpha, condition.hash_loc, &condition.tests));
        if shared.is_none() {
            self.new_nodes += 1;
        }
        shared
    }

    fn conditions(
        &mut self,
        conditions: &[Condition],
        parent: Option<NodeId>,
        depth: usize,
        bindings: &mut VarBindings,
    ) -> Result<(Option<NodeId>, usize)> {
        let (mut node, mut depth) = (parent, depth);
        for condition in conditions {
            node = match condition {
                Condition::Positive(tests) => {
                    validate::bind_equalities(tests, depth, bindings);
                    let compiled = compile_tests(tests, depth, bindings)?;
                    self.positive(node, &compiled)
                }
                Condition::Negative(tests) => {
                    let mark = bindings.mark();
                    validate::bind_equalities(tests, depth, bindings);
                    let compiled = compile_tests(tests, depth, bindings);
                    bindings.pop_to(mark);
                    self.negative(node, &compiled?)
                }
                Condition::ConjunctiveNegation(subconditions) => {
                    let mark = bindings.mark();
                    let planned = self.conditions(subconditions, node, depth, bindings);
                    bindings.pop_to(mark);
                    let (bottom, _) = planned?;
                    let shared = node
                        .zip(bottom)
                        .and_then(|(parent, bottom)| self.rete.shared_cn(parent, bottom));
                    if shared.is_none() {
                        // The CN and its partner.
                        self.new_nodes += 2;
                    }
                    shared
                }
            };
            depth += 1;
        }
        Ok((node, depth))
    }
}

impl Rete {
    /// Walk `conditions` from the top of the network without changing it.
    /// `bindings` is left holding what a build would leave bound.
    pub(crate) fn plan_conditions(&self, conditions: &[Condition], bindings: &mut VarBindings) -> Result<BuildPlan> {
        let mut planner = Planner {
            rete: self,
            new_nodes: 0,
            new_alphas: HashSet::new(),
        };
        let (bottom, _) = planner.conditions(conditions, Some(self.dummy_top), 1, bindings)?;
        Ok(BuildPlan {
            shared_bottom: bottom,
            new_nodes: planner.new_nodes,
            new_alphas: planner.new_alphas.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain_production, Fixture};
    use working_memory::Production;

    fn plan(rete: &Rete, production: &Production) -> BuildPlan {
        rete.plan_conditions(&production.conditions, &mut VarBindings::new())
            .unwrap()
    }

    #[test]
    fn test_plan_matches_what_the_build_adds() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let first = chain_production(&mut fx, "a");
        let planned = plan(&rete, &first);
        assert_eq!(planned.shared_bottom, None);
        assert_eq!((planned.new_nodes, planned.new_alphas), (2, 2));

        let (nodes, alphas) = (rete.nodes.len(), rete.alpha.len());
        rete.add_production(first, None).unwrap();
        // One more node for the production itself.
        assert_eq!(rete.nodes.len(), nodes + planned.new_nodes + 1);
        assert_eq!(rete.alpha.len(), alphas + planned.new_alphas);
    }

    #[test]
    fn test_plan_finds_shared_bottom() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "a"), None).unwrap();
        let before = rete.nodes.len();

        let planned = plan(&rete, &chain_production(&mut fx, "b"));
        assert!(planned.shared_bottom.is_some());
        assert_eq!((planned.new_nodes, planned.new_alphas), (0, 0));
        assert_eq!(rete.nodes.len(), before);
    }

    #[test]
    fn test_plan_counts_split() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "a"), None).unwrap();

        let (s, x) = (fx.var("<s>"), fx.var("<x>"));
        let branch = Production::new("b")
            .with_condition(Condition::positive(s, fx.sym("foo"), x.clone()))
            .with_condition(Condition::positive(x, fx.sym("baz"), fx.sym("1")));
        let planned = plan(&rete, &branch);
        assert_eq!(planned.shared_bottom, None);
        assert_eq!((planned.new_nodes, planned.new_alphas), (2, 1));

        let nodes = rete.nodes.len();
        rete.add_production(branch, None).unwrap();
        assert_eq!(rete.nodes.len(), nodes + planned.new_nodes + 1);
    }
}
