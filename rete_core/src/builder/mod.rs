//! Compiles productions into the beta network.
//!
//! Conditions are compiled top-down. Each positive condition binds the
//! variables it introduces at its depth; negative and conjunctive-negation
//! conditions bind locally and restore the bindings on exit. Input checks,
//! duplicate and name lookups and resource limits are all settled by a dry
//! run before the first node is touched.

mod bindings;
mod nodes;
mod plan;
mod rhs;
mod validate;

pub use bindings::{BindingMark, VarBindings};
pub use rhs::*;

pub(crate) use nodes::CompiledCondition;

use tracing::{debug, warn};

use working_memory::{Condition, Field, Production, ProductionKind, Relation, Test, ThreeFieldTests};

use crate::beta::{BetaNode, NodeId, NodeKind, ReteTest};
use crate::config::RefractionPolicy;
use crate::error::{ReteError, Result};
use crate::match_set::Retraction;
use crate::network::Rete;
use crate::production::{AddResult, ConditionNames, ProductionId, RefractedInstantiation, ReteProduction, VarNames};

/// Turn one condition's field tests into an alpha pattern, a hash location
/// and the remaining rete tests. Variables must already be bound.
pub(crate) fn compile_tests(
    tests: &ThreeFieldTests,
    depth: usize,
    bindings: &VarBindings,
) -> Result<CompiledCondition> {
    let mut constants: [Option<working_memory::SymbolRef>; 3] = [None, None, None];
    let mut out = Vec::new();

    for field in Field::ALL {
        for test in tests.field(field).simple_tests() {
            match test {
                Test::Blank => {}
                Test::Equality(sym) if sym.is_variable() => {
                    let location = bindings
                        .location(sym, depth)
                        .ok_or_else(|| ReteError::UnboundVariable(sym.to_string()))?;
                    if location.levels_up == 0 && location.field == field {
                        continue;
                    }
                    out.push(ReteTest::VariableRelational {
                        field,
                        relation: Relation::Equal,
                        location,
                    });
                }
                Test::Equality(sym) => {
                    let slot = &mut constants[field.index()];
                    if slot.is_none() {
                        *slot = Some(sym.clone());
                    } else {
                        out.push(ReteTest::ConstantRelational {
                            field,
                            relation: Relation::Equal,
                            referent: sym.clone(),
                        });
                    }
                }
                Test::Relational { relation, referent } if referent.is_variable() => {
                    let location = bindings
                        .location(referent, depth)
                        .ok_or_else(|| ReteError::UnboundVariable(referent.to_string()))?;
                    out.push(ReteTest::VariableRelational {
                        field,
                        relation: *relation,
                        location,
                    });
                }
                Test::Relational { relation, referent } => out.push(ReteTest::ConstantRelational {
                    field,
                    relation: *relation,
                    referent: referent.clone(),
                }),
                Test::Disjunction(options) => out.push(ReteTest::Disjunction {
                    field,
                    options: options.clone(),
                }),
                Test::Goal => out.push(ReteTest::IdIsGoal),
                Test::Impasse => out.push(ReteTest::IdIsImpasse),
                Test::Conjunction(_) => {
                    return Err(ReteError::structural("nested conjunction survived flattening"));
                }
            }
        }
    }

    let hashed = out.iter().position(|test| {
        matches!(test, ReteTest::VariableRelational {
            field: Field::Id,
            relation: Relation::Equal,
            location,
        } if location.levels_up > 0)
    });
    let hash_loc = match hashed.map(|i| out.remove(i)) {
        Some(ReteTest::VariableRelational { location, .. }) => Some(location),
        _ => None,
    };

    Ok(CompiledCondition {
        constants,
        acceptable: tests.acceptable,
        hash_loc,
        tests: out,
    })
}

/// Names of the equality variables on each field, for reconstruction.
fn condition_names(condition: &Condition) -> ConditionNames {
    let field_names = |tests: &ThreeFieldTests| {
        Field::ALL.map(|field| {
            tests
                .field(field)
                .simple_tests()
                .into_iter()
                .filter_map(|t| match t {
                    Test::Equality(sym) if sym.is_variable() => Some(sym.clone()),
                    _ => None,
                })
                .collect()
        })
    };
    match condition {
        Condition::Positive(tests) | Condition::Negative(tests) => ConditionNames::Simple(field_names(tests)),
        Condition::ConjunctiveNegation(subconditions) => {
            ConditionNames::Conjunctive(subconditions.iter().map(condition_names).collect())
        }
    }
}

impl Rete {
    /// Build (or share) nodes for `conditions` below `parent`, the first
    /// condition sitting at `depth`. Returns the bottom node and the depth
    /// following the last condition.
    pub(crate) fn build_conditions(
        &mut self,
        conditions: &[Condition],
        parent: NodeId,
        depth: usize,
        bindings: &mut VarBindings,
    ) -> Result<(NodeId, usize)> {
        let (mut node, mut depth) = (parent, depth);
        for condition in conditions {
            node = match condition {
                Condition::Positive(tests) => {
                    validate::bind_equalities(tests, depth, bindings);
                    let compiled = compile_tests(tests, depth, bindings)?;
                    self.make_positive_node(node, compiled)?
                }
                Condition::Negative(tests) => {
                    let mark = bindings.mark();
                    validate::bind_equalities(tests, depth, bindings);
                    let compiled = compile_tests(tests, depth, bindings);
                    bindings.pop_to(mark);
                    self.make_negative_node(node, compiled?)?
                }
                Condition::ConjunctiveNegation(subconditions) => {
                    let mark = bindings.mark();
                    let built = self.build_conditions(subconditions, node, depth, bindings);
                    bindings.pop_to(mark);
                    let (bottom, end) = built?;
                    self.make_cn_node(node, bottom, end - depth)?
                }
            };
            depth += 1;
        }
        Ok((node, depth))
    }

    /// Compile a production into the network.
    ///
    /// With `refracted`, the given instantiation is treated as already
    /// fired: if it matches it is placed in flight without an assertion.
    pub fn add_production(
        &mut self,
        production: Production,
        refracted: Option<RefractedInstantiation>,
    ) -> Result<AddResult> {
        self.validate_production(&production, refracted.as_ref())?;

        let mut planned = VarBindings::new();
        let plan = self.plan_conditions(&production.conditions, &mut planned)?;
        let mut compiler = RhsCompiler::new(&planned);
        let actions: Vec<ReteAction> = production.actions.iter().map(|a| compiler.compile(a)).collect();
        let unbound = compiler.unbound;

        let duplicate = plan.shared_bottom.and_then(|bottom| {
            self.nodes[bottom].children.iter().find_map(|&child| match self.nodes[child].kind {
                NodeKind::Production { production: existing }
                    if same_rhs(&self.productions[existing].actions, &actions) =>
                {
                    Some(existing)
                }
                _ => None,
            })
        });
        if let Some(existing) = duplicate {
            warn!(
                production = %production.name,
                existing = %self.productions[existing].name,
                "ignoring duplicate production"
            );
            return Ok(AddResult::Duplicate { existing });
        }
        if self.by_name.contains_key(&production.name) {
            return Err(ReteError::malformed(
                &production.name,
                "a different production with this name is already in the network",
            ));
        }
        self.check_growth(&plan)?;

        let mut bindings = VarBindings::new();
        let (bottom, end) = self.build_conditions(&production.conditions, self.dummy_top, 1, &mut bindings)?;
        let depth = end - 1;

        let Production {
            name,
            kind,
            conditions,
            documentation,
            ..
        } = production;
        let var_names = (self.config.keep_variable_names && kind != ProductionKind::Justification).then(|| VarNames {
            conditions: conditions.iter().map(condition_names).collect(),
            unbound,
        });

        let id = self.install_production(bottom, name.clone(), kind, depth);
        let node = {
            let p = &mut self.productions[id];
            p.actions = actions;
            p.documentation = documentation;
            p.var_names = var_names;
            p.node
        };
        debug!(production = %name, node = %node, depth, "added production");

        let Some(refracted) = refracted else {
            self.update_node_with_matches_from_above(node)?;
            return Ok(AddResult::NoRefraction(id));
        };

        let (msc, instantiation) = self.seed_refraction(id, &refracted);
        self.update_node_with_matches_from_above(node)?;
        if self.finish_refraction(id, msc, instantiation) {
            return Ok(AddResult::RefractionMatched {
                production: id,
                instantiation,
            });
        }
        if kind == ProductionKind::Justification && self.config.refraction == RefractionPolicy::TolerateJustifications {
            return Ok(AddResult::NoRefraction(id));
        }
        warn!(production = %name, "refracted instantiation does not match");
        Ok(AddResult::RefractionDidNotMatch(id))
    }

    /// Hang a production node named `name` below `bottom`. The node is
    /// not fed from above.
    pub(crate) fn install_production(
        &mut self,
        bottom: NodeId,
        name: String,
        kind: ProductionKind,
        depth: usize,
    ) -> ProductionId {
        let nodes = &mut self.nodes;
        let id = self.productions.insert_with(|id| {
            let node = nodes.insert(BetaNode::new(Some(bottom), NodeKind::Production { production: id }));
            ReteProduction::new(name.clone(), kind, node, depth)
        });
        let node = self.productions[id].node;
        self.nodes[bottom].children.push(node);
        self.by_name.insert(name, id);
        id
    }

    /// Remove a production and every node only it was using.
    ///
    /// Returns retractions for all of its instantiations, fired or pending,
    /// so nothing left in the match set refers to it.
    pub fn excise_production(&mut self, name: &str) -> Result<Vec<Retraction>> {
        let id = self
            .by_name
            .remove(name)
            .ok_or_else(|| ReteError::UnknownProduction(name.to_string()))?;
        self.excise(id)
    }

    pub(crate) fn excise(&mut self, id: ProductionId) -> Result<Vec<Retraction>> {
        let retractions = self.release_production_matches(id);
        let node = {
            let p = &mut self.productions[id];
            p.excised = true;
            p.node
        };
        self.deallocate_node(node)?;
        if let Some(p) = self.productions.remove(id) {
            self.by_name.remove(&p.name);
            debug!(production = %p.name, retractions = retractions.len(), "excised production");
        }
        Ok(retractions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beta::NodeType;
    use crate::test_support::{chain_production, Fixture};
    use working_memory::{Action, Test};

    #[test]
    fn test_compile_tests_extracts_hash_location() {
        let mut fx = Fixture::new();
        let (s, x) = (fx.var("<s>"), fx.var("<x>"));
        let mut bindings = VarBindings::new();
        bindings.bind_if_unbound(&s, 1, Field::Id);
        bindings.bind_if_unbound(&x, 1, Field::Value);

        let tests = ThreeFieldTests::new(
            x,
            fx.sym("size"),
            Test::Relational {
                relation: Relation::Greater,
                referent: fx.sym("3"),
            },
        );
        let compiled = compile_tests(&tests, 2, &bindings).unwrap();
        assert_eq!(compiled.hash_loc, Some(crate::beta::VarLoc::new(1, Field::Value)));
        assert_eq!(compiled.constants[1], Some(fx.sym("size")));
        assert_eq!(compiled.tests.len(), 1);
        assert!(matches!(
            compiled.tests[0],
            ReteTest::ConstantRelational {
                field: Field::Value,
                relation: Relation::Greater,
                ..
            }
        ));
    }

    #[test]
    fn test_compile_tests_reports_unbound_variable() {
        let mut fx = Fixture::new();
        let bindings = VarBindings::new();
        let tests = ThreeFieldTests::new(fx.var("<q>"), fx.sym("a"), fx.sym("b"));
        let err = compile_tests(&tests, 1, &bindings).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_duplicate_production_changes_nothing() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let first = rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        rete.add_wme(fx.wme("S1", "foo", "X1")).unwrap();
        let (nodes, tokens, alphas) = (rete.nodes.len(), rete.tokens.len(), rete.alpha.len());

        let again = rete.add_production(chain_production(&mut fx, "p-copy"), None).unwrap();
        assert_eq!(
            again,
            AddResult::Duplicate {
                existing: first.production().unwrap()
            }
        );
        assert_eq!((rete.nodes.len(), rete.tokens.len(), rete.alpha.len()), (nodes, tokens, alphas));
        assert!(rete.find_production("p-copy").is_none());
    }

    #[test]
    fn test_same_production_twice_is_duplicate() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        let nodes = rete.nodes.len();
        let again = rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        assert!(matches!(again, AddResult::Duplicate { .. }));
        assert_eq!(rete.nodes.len(), nodes);
    }

    #[test]
    fn test_name_clash_leaves_network_untouched() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        let first = rete.nodes[rete.dummy_top].children[0];
        let second = rete.nodes[first].children.clone();
        let (nodes, alphas) = (rete.nodes.len(), rete.alpha.len());

        let (s, x) = (fx.var("<s>"), fx.var("<x>"));
        let other = Production::new("p")
            .with_condition(Condition::positive(s, fx.sym("foo"), x.clone()))
            .with_condition(Condition::positive(x, fx.sym("baz"), fx.sym("1")));
        let err = rete.add_production(other, None).unwrap_err();
        assert!(matches!(err, ReteError::MalformedProduction { .. }));
        assert_eq!((rete.nodes.len(), rete.alpha.len()), (nodes, alphas));

        // The second level would have been split to make room; it was not.
        assert_eq!(rete.nodes[first].children, second);
        assert_eq!(rete.nodes[second[0]].kind.name(), "merged-join");
        let stats = rete.statistics();
        assert_eq!(stats.actual.get(&NodeType::UnhashedMergedJoin), Some(&1));
        assert_eq!(stats.actual.get(&NodeType::HashedMergedJoin), Some(&1));
        assert_eq!(stats.actual.get(&NodeType::HashedMemory), None);
    }

    #[test]
    fn test_function_call_actions_prevent_duplicates() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let write = Action::FunctionCall {
            name: fx.sym("write"),
            args: Vec::new(),
        };
        let a = chain_production(&mut fx, "a").with_action(write.clone());
        let b = chain_production(&mut fx, "b").with_action(write);
        rete.add_production(a, None).unwrap();
        let result = rete.add_production(b, None).unwrap();
        assert!(matches!(result, AddResult::NoRefraction(_)));
    }

    #[test]
    fn test_malformed_productions_rejected_before_mutation() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let nodes = rete.nodes.len();

        let empty = Production::new("empty");
        let only_negative = Production::new("neg").with_condition(Condition::negative(fx.var("<s>"), fx.sym("a"), fx.sym("b")));
        let unbound = Production::new("unbound")
            .with_condition(Condition::positive(fx.var("<s>"), fx.sym("a"), fx.var("<x>")))
            .with_condition(Condition::positive(
                fx.var("<s>"),
                fx.sym("b"),
                Test::Relational {
                    relation: Relation::Less,
                    referent: fx.var("<y>"),
                },
            ));
        let goal_on_value = Production::new("goal")
            .with_condition(Condition::positive(fx.var("<s>"), fx.sym("a"), Test::Goal));

        for production in [empty, only_negative, unbound, goal_on_value] {
            let err = rete.add_production(production, None).unwrap_err();
            assert!(matches!(err, ReteError::MalformedProduction { .. }));
        }
        assert_eq!(rete.nodes.len(), nodes);
        assert!(rete.alpha.is_empty());
    }

    #[test]
    fn test_beta_node_limit() {
        let mut fx = Fixture::new();
        let config = crate::config::ReteConfig::from_toml_str("[limits]\nmax_beta_nodes = 1").unwrap();
        let mut rete = Rete::new(config);
        let err = rete.add_production(chain_production(&mut fx, "p"), None).unwrap_err();
        assert!(matches!(err, ReteError::ResourceExhausted { .. }));
    }

    fn long_chain(fx: &mut Fixture, name: &str, length: usize) -> Production {
        let vars: Vec<_> = (0..=length).map(|i| fx.var(&format!("<v{}>", i))).collect();
        (0..length).fold(Production::new(name), |p, i| {
            let attr = fx.sym(&format!("link{}", i));
            p.with_condition(Condition::positive(vars[i].clone(), attr, vars[i + 1].clone()))
        })
    }

    #[test]
    fn test_one_production_cannot_outgrow_beta_node_limit() {
        let mut fx = Fixture::new();
        let config = crate::config::ReteConfig::from_toml_str("[limits]\nmax_beta_nodes = 3").unwrap();
        let mut rete = Rete::new(config);
        let err = rete.add_production(long_chain(&mut fx, "long", 6), None).unwrap_err();
        assert!(matches!(err, ReteError::ResourceExhausted { resource: "beta nodes", limit: 3 }));
        assert_eq!(rete.nodes.len(), 1);
        assert!(rete.alpha.is_empty());

        // Dummy top, six joins and the production node fit exactly.
        rete.config.limits.max_beta_nodes = Some(8);
        rete.add_production(long_chain(&mut fx, "long", 6), None).unwrap();
        assert_eq!(rete.nodes.len(), 8);
    }

    #[test]
    fn test_alpha_memory_limit_counts_new_patterns() {
        let mut fx = Fixture::new();
        let config = crate::config::ReteConfig::from_toml_str("[limits]\nmax_alpha_memories = 1").unwrap();
        let mut rete = Rete::new(config);
        let err = rete.add_production(chain_production(&mut fx, "p"), None).unwrap_err();
        assert!(matches!(err, ReteError::ResourceExhausted { resource: "alpha memories", .. }));
        assert!(rete.alpha.is_empty());
        assert_eq!(rete.nodes.len(), 1);
    }

    #[test]
    fn test_rejects_unbound_negative_id() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let (s, x) = (fx.var("<s>"), fx.var("<x>"));
        let production = Production::new("p")
            .with_condition(Condition::negative(s.clone(), fx.sym("stop"), fx.sym("yes")))
            .with_condition(Condition::positive(s, fx.sym("foo"), x));
        let err = rete.add_production(production, None).unwrap_err();
        assert!(matches!(err, ReteError::MalformedProduction { .. }));
        assert_eq!(rete.nodes.len(), 1);
        assert!(rete.alpha.is_empty());
    }

    #[test]
    fn test_rejects_unbound_conjunctive_negation_id() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let (s, x, y) = (fx.var("<s>"), fx.var("<x>"), fx.var("<y>"));
        let production = Production::new("p")
            .with_condition(Condition::positive(s, fx.sym("foo"), fx.sym("1")))
            .with_condition(Condition::ConjunctiveNegation(vec![
                Condition::positive(x.clone(), fx.sym("bar"), y),
                Condition::positive(x, fx.sym("baz"), fx.sym("2")),
            ]));
        let err = rete.add_production(production, None).unwrap_err();
        assert!(matches!(err, ReteError::MalformedProduction { .. }));
        assert_eq!(rete.nodes.len(), 1);
    }

    #[test]
    fn test_refraction_matched_and_not_matched() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let w1 = fx.wme("S1", "foo", "X1");
        let w2 = fx.wme("X1", "bar", "1");
        let other = fx.wme("S1", "foo", "X9");
        for w in [&w1, &w2, &other] {
            rete.add_wme(w.clone()).unwrap();
        }

        let refracted = RefractedInstantiation {
            wmes: vec![Some(w1.clone()), Some(w2.clone())],
            goal: None,
        };
        let chunk = chain_production(&mut fx, "chunk").with_kind(ProductionKind::Chunk);
        let result = rete.add_production(chunk, Some(refracted)).unwrap();
        let AddResult::RefractionMatched { production, instantiation } = result else {
            panic!("unexpected result {:?}", result);
        };
        assert!(!rete.has_pending_changes());
        assert_eq!(rete.productions[production].instantiations().collect::<Vec<_>>(), vec![instantiation]);

        // Retracting the evidence retracts the refracted instantiation.
        rete.remove_wme(w2.timetag).unwrap();
        let retractions: Vec<_> = rete.drain_retractions().collect();
        assert_eq!(retractions.len(), 1);
        assert_eq!(retractions[0].instantiation, instantiation);

        let stale = RefractedInstantiation {
            wmes: vec![Some(other.clone()), Some(w2.clone())],
            goal: None,
        };
        let mark = Action::make(fx.var("<s>"), fx.sym("seen"), fx.var("<x>"));
        let justification = chain_production(&mut fx, "j")
            .with_kind(ProductionKind::Justification)
            .with_action(mark);
        let result = rete.add_production(justification, Some(stale)).unwrap();
        assert!(matches!(result, AddResult::RefractionDidNotMatch(_)));
    }

    #[test]
    fn test_tolerant_policy_for_justifications() {
        let mut fx = Fixture::new();
        let config = crate::config::ReteConfig {
            refraction: RefractionPolicy::TolerateJustifications,
            ..Default::default()
        };
        let mut rete = Rete::new(config);
        let stale = RefractedInstantiation {
            wmes: vec![Some(fx.wme("S1", "foo", "X1")), Some(fx.wme("X1", "bar", "1"))],
            goal: None,
        };
        let justification = chain_production(&mut fx, "j").with_kind(ProductionKind::Justification);
        let result = rete.add_production(justification, Some(stale)).unwrap();
        assert!(matches!(result, AddResult::NoRefraction(_)));
        assert!(rete.productions[result.production().unwrap()].var_names.is_none());
    }

    #[test]
    fn test_excise_returns_retractions_and_clears_pending() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        rete.add_wme(fx.wme("S1", "foo", "X1")).unwrap();
        rete.add_wme(fx.wme("X1", "bar", "1")).unwrap();
        assert_eq!(rete.drain_assertions().count(), 1);

        rete.add_wme(fx.wme("S1", "foo", "X2")).unwrap();
        rete.add_wme(fx.wme("X2", "bar", "1")).unwrap();
        assert_eq!(rete.match_set().pending_assertions(), 1);

        let retractions = rete.excise_production("p").unwrap();
        assert_eq!(retractions.len(), 1);
        assert!(!rete.has_pending_changes());
        assert!(rete.find_production("p").is_none());
        assert!(matches!(
            rete.excise_production("p"),
            Err(ReteError::UnknownProduction(_))
        ));
    }
}
