//! Checks a production must pass before the network is touched.

use working_memory::{Condition, Field, Production, Test, ThreeFieldTests};

use super::bindings::VarBindings;
use super::plan::BuildPlan;
use crate::error::{ReteError, Result};
use crate::network::Rete;
use crate::production::RefractedInstantiation;

impl Rete {
    pub(crate) fn validate_production(
        &self,
        production: &Production,
        refracted: Option<&RefractedInstantiation>,
    ) -> Result<()> {
        let name = production.name.as_str();
        if production.conditions.is_empty() {
            return Err(ReteError::malformed(name, "no conditions"));
        }
        if !production.conditions.iter().any(Condition::is_positive) {
            return Err(ReteError::malformed(name, "no positive condition"));
        }
        if let Some(refracted) = refracted {
            if refracted.wmes.len() != production.conditions.len() {
                return Err(ReteError::malformed(
                    name,
                    format!(
                        "refracted instantiation has {} WMEs for {} conditions",
                        refracted.wmes.len(),
                        production.conditions.len()
                    ),
                ));
            }
        }

        let mut bindings = VarBindings::new();
        check_conditions(name, &production.conditions, 1, &mut bindings)?;
        Ok(())
    }

    /// Reject a build that would take the network past a configured limit.
    pub(crate) fn check_growth(&self, plan: &BuildPlan) -> Result<()> {
        let limits = &self.config.limits;
        if let Some(limit) = limits.max_beta_nodes {
            // The production node is always new.
            if self.nodes.len() + plan.new_nodes + 1 > limit {
                return Err(ReteError::ResourceExhausted {
                    resource: "beta nodes",
                    limit,
                });
            }
        }
        if let Some(limit) = limits.max_alpha_memories {
            if self.alpha.len() + plan.new_alphas > limit {
                return Err(ReteError::ResourceExhausted {
                    resource: "alpha memories",
                    limit,
                });
            }
        }
        Ok(())
    }
}

/// Walk the conditions binding variables exactly as the builder will.
fn check_conditions(name: &str, conditions: &[Condition], mut depth: usize, bindings: &mut VarBindings) -> Result<usize> {
    for condition in conditions {
        match condition {
            Condition::Positive(tests) => check_tests(name, tests, depth, bindings)?,
            Condition::Negative(tests) => {
                check_negated_id(name, condition, bindings)?;
                let mark = bindings.mark();
                let outcome = check_tests(name, tests, depth, bindings);
                bindings.pop_to(mark);
                outcome?;
            }
            Condition::ConjunctiveNegation(subconditions) => {
                if subconditions.is_empty() {
                    return Err(ReteError::malformed(name, "empty conjunctive negation"));
                }
                check_negated_id(name, condition, bindings)?;
                let mark = bindings.mark();
                let outcome = check_conditions(name, subconditions, depth, bindings);
                bindings.pop_to(mark);
                outcome?;
            }
        }
        depth += 1;
    }
    Ok(depth)
}

/// A negated condition has to test an identifier that an earlier condition
/// already bound. For a conjunctive negation that is its first condition.
fn check_negated_id(name: &str, condition: &Condition, bindings: &VarBindings) -> Result<()> {
    let tests = match condition {
        Condition::Positive(tests) | Condition::Negative(tests) => tests,
        Condition::ConjunctiveNegation(subconditions) => {
            return match subconditions.first() {
                Some(first) => check_negated_id(name, first, bindings),
                None => Ok(()),
            };
        }
    };
    for test in tests.field(Field::Id).simple_tests() {
        if let Test::Equality(sym) = test {
            if sym.is_variable() && bindings.lookup(sym).is_none() {
                return Err(ReteError::malformed(
                    name,
                    format!("negated condition tests identifier {} that nothing binds", sym),
                ));
            }
        }
    }
    Ok(())
}

fn check_tests(name: &str, tests: &ThreeFieldTests, depth: usize, bindings: &mut VarBindings) -> Result<()> {
    bind_equalities(tests, depth, bindings);
    for field in Field::ALL {
        for test in tests.field(field).simple_tests() {
            match test {
                Test::Relational { referent, .. } if referent.is_variable() => {
                    if bindings.lookup(referent).is_none() {
                        return Err(ReteError::malformed(
                            name,
                            format!("relational test against unbound variable {}", referent),
                        ));
                    }
                }
                Test::Disjunction(options) => {
                    if options.is_empty() || options.iter().any(|o| o.is_variable()) {
                        return Err(ReteError::malformed(name, "disjunction options must be constants"));
                    }
                }
                Test::Goal | Test::Impasse if field != Field::Id => {
                    return Err(ReteError::malformed(name, "goal and impasse tests apply to the id field only"));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Bind every variable that appears in an equality test and is not yet bound.
pub(crate) fn bind_equalities(tests: &ThreeFieldTests, depth: usize, bindings: &mut VarBindings) {
    for field in Field::ALL {
        for test in tests.field(field).simple_tests() {
            if let Test::Equality(sym) = test {
                if sym.is_variable() {
                    bindings.bind_if_unbound(sym, depth, field);
                }
            }
        }
    }
}
