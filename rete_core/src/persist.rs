//! Saving and loading the network structure.
//!
//! Only productions and the nodes they need are written; WMEs, tokens and
//! the match set are not. A network loaded from disk is rebuilt through
//! the ordinary node constructors, so it starts out consistent with an
//! empty working memory.
//!
//! Identifiers cannot be saved (they only mean something inside the
//! agent that created them), and neither can justifications.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use working_memory::{AgentId, Field, PreferenceType, ProductionKind, Relation, SymbolRef, SymbolTable, SymbolValue};

use crate::alpha::AlphaId;
use crate::beta::{NodeId, NodeKind, PosNeg, ReteTest, VarLoc};
use crate::builder::{ReteAction, ReteRhsValue};
use crate::config::ReteConfig;
use crate::error::{ReteError, Result};
use crate::network::Rete;
use crate::production::{ConditionNames, ReteProduction, VarNames};

const MAGIC: [u8; 8] = *b"RETENETW";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Header {
    version: u32,
    /// Agent that wrote the file.
    saved_by: Uuid,
}

#[derive(Serialize, Deserialize)]
struct SavedNetwork {
    symbols: Vec<SymbolValue>,
    alpha: Vec<SavedAlpha>,
    /// Every node but the dummy top, parents before children.
    nodes: Vec<SavedNode>,
    productions: Vec<SavedProduction>,
}

#[derive(Serialize, Deserialize)]
struct SavedAlpha {
    id: Option<u32>,
    attr: Option<u32>,
    value: Option<u32>,
    acceptable: bool,
}

#[derive(Serialize, Deserialize)]
struct SavedNode {
    /// Position in the node list plus one; 0 is the dummy top.
    parent: u32,
    kind: SavedNodeKind,
}

#[derive(Serialize, Deserialize)]
enum SavedNodeKind {
    Memory {
        hash_loc: Option<VarLoc>,
    },
    Join {
        alpha: u32,
        hash_loc: Option<VarLoc>,
        tests: Vec<SavedTest>,
    },
    MergedJoin {
        alpha: u32,
        hash_loc: Option<VarLoc>,
        tests: Vec<SavedTest>,
    },
    Negative {
        alpha: u32,
        hash_loc: Option<VarLoc>,
        tests: Vec<SavedTest>,
    },
    /// Recreated together with its partner, which is skipped.
    ConjunctiveNegation {
        bottom: u32,
        conjunct_levels: usize,
    },
    Partner,
    Production {
        production: u32,
    },
}

#[derive(Serialize, Deserialize)]
enum SavedTest {
    Constant { field: Field, relation: Relation, referent: u32 },
    Variable { field: Field, relation: Relation, location: VarLoc },
    Disjunction { field: Field, options: Vec<u32> },
    Goal,
    Impasse,
}

#[derive(Serialize, Deserialize)]
enum SavedRhs {
    Constant(u32),
    Bound { depth: usize, field: Field },
    Unbound(usize),
    Call { name: u32, args: Vec<SavedRhs> },
}

#[derive(Serialize, Deserialize)]
enum SavedAction {
    Make {
        id: SavedRhs,
        attr: SavedRhs,
        value: SavedRhs,
        preference: PreferenceType,
        referent: Option<SavedRhs>,
    },
    Call {
        name: u32,
        args: Vec<SavedRhs>,
    },
}

#[derive(Serialize, Deserialize)]
enum SavedNames {
    Simple([Vec<u32>; 3]),
    Conjunctive(Vec<SavedNames>),
}

#[derive(Serialize, Deserialize)]
struct SavedProduction {
    name: String,
    kind: ProductionKind,
    documentation: Option<String>,
    depth: usize,
    actions: Vec<SavedAction>,
    names: Option<(Vec<SavedNames>, Vec<u32>)>,
}

/// Interns symbols into the file's symbol list.
#[derive(Default)]
struct Writer {
    index: HashMap<SymbolRef, u32>,
    symbols: Vec<SymbolValue>,
    alpha: HashMap<AlphaId, u32>,
    saved_alpha: Vec<SavedAlpha>,
}

impl Writer {
    fn symbol(&mut self, sym: &SymbolRef) -> Result<u32> {
        if sym.is_identifier() {
            return Err(ReteError::IdentifierInSavedNetwork(sym.to_string()));
        }
        if let Some(&i) = self.index.get(sym) {
            return Ok(i);
        }
        let i = self.symbols.len() as u32;
        self.symbols.push(sym.value().clone());
        self.index.insert(sym.clone(), i);
        Ok(i)
    }

    fn optional(&mut self, sym: &Option<SymbolRef>) -> Result<Option<u32>> {
        sym.as_ref().map(|s| self.symbol(s)).transpose()
    }

    fn alpha(&mut self, rete: &Rete, am: AlphaId) -> Result<u32> {
        if let Some(&i) = self.alpha.get(&am) {
            return Ok(i);
        }
        let memory = rete
            .alpha
            .get(am)
            .ok_or_else(|| ReteError::structural(format!("alpha memory {} is gone", am)))?;
        let saved = SavedAlpha {
            id: self.optional(&memory.id)?,
            attr: self.optional(&memory.attr)?,
            value: self.optional(&memory.value)?,
            acceptable: memory.acceptable,
        };
        let i = self.saved_alpha.len() as u32;
        self.saved_alpha.push(saved);
        self.alpha.insert(am, i);
        Ok(i)
    }

    fn tests(&mut self, tests: &[ReteTest]) -> Result<Vec<SavedTest>> {
        tests
            .iter()
            .map(|test| {
                Ok(match test {
                    ReteTest::ConstantRelational {
                        field,
                        relation,
                        referent,
                    } => SavedTest::Constant {
                        field: *field,
                        relation: *relation,
                        referent: self.symbol(referent)?,
                    },
                    ReteTest::VariableRelational {
                        field,
                        relation,
                        location,
                    } => SavedTest::Variable {
                        field: *field,
                        relation: *relation,
                        location: *location,
                    },
                    ReteTest::Disjunction { field, options } => SavedTest::Disjunction {
                        field: *field,
                        options: options.iter().map(|o| self.symbol(o)).collect::<Result<_>>()?,
                    },
                    ReteTest::IdIsGoal => SavedTest::Goal,
                    ReteTest::IdIsImpasse => SavedTest::Impasse,
                })
            })
            .collect()
    }

    fn spec(&mut self, rete: &Rete, spec: &PosNeg) -> Result<(u32, Option<VarLoc>, Vec<SavedTest>)> {
        Ok((self.alpha(rete, spec.alpha)?, spec.hash_loc, self.tests(&spec.tests)?))
    }

    fn rhs(&mut self, value: &ReteRhsValue) -> Result<SavedRhs> {
        Ok(match value {
            ReteRhsValue::Constant(sym) => SavedRhs::Constant(self.symbol(sym)?),
            ReteRhsValue::Bound { depth, field } => SavedRhs::Bound {
                depth: *depth,
                field: *field,
            },
            ReteRhsValue::Unbound(i) => SavedRhs::Unbound(*i),
            ReteRhsValue::FunctionCall { name, args } => SavedRhs::Call {
                name: self.symbol(name)?,
                args: args.iter().map(|a| self.rhs(a)).collect::<Result<_>>()?,
            },
        })
    }

    fn action(&mut self, action: &ReteAction) -> Result<SavedAction> {
        Ok(match action {
            ReteAction::Make {
                id,
                attr,
                value,
                preference,
                referent,
            } => SavedAction::Make {
                id: self.rhs(id)?,
                attr: self.rhs(attr)?,
                value: self.rhs(value)?,
                preference: *preference,
                referent: referent.as_ref().map(|r| self.rhs(r)).transpose()?,
            },
            ReteAction::FunctionCall { name, args } => SavedAction::Call {
                name: self.symbol(name)?,
                args: args.iter().map(|a| self.rhs(a)).collect::<Result<_>>()?,
            },
        })
    }

    fn names(&mut self, names: &ConditionNames) -> Result<SavedNames> {
        Ok(match names {
            ConditionNames::Simple(fields) => {
                let mut out: [Vec<u32>; 3] = Default::default();
                for (slot, field) in out.iter_mut().zip(fields) {
                    *slot = field.iter().map(|s| self.symbol(s)).collect::<Result<_>>()?;
                }
                SavedNames::Simple(out)
            }
            ConditionNames::Conjunctive(inner) => {
                SavedNames::Conjunctive(inner.iter().map(|n| self.names(n)).collect::<Result<_>>()?)
            }
        })
    }

    fn production(&mut self, p: &ReteProduction) -> Result<SavedProduction> {
        let names = match &p.var_names {
            Some(names) => Some((
                names.conditions.iter().map(|n| self.names(n)).collect::<Result<_>>()?,
                names.unbound.iter().map(|s| self.symbol(s)).collect::<Result<_>>()?,
            )),
            None => None,
        };
        Ok(SavedProduction {
            name: p.name.clone(),
            kind: p.kind,
            documentation: p.documentation.clone(),
            depth: p.depth,
            actions: p.actions.iter().map(|a| self.action(a)).collect::<Result<_>>()?,
            names,
        })
    }
}

fn bad(what: impl Into<String>) -> ReteError {
    ReteError::BadNetworkFile(what.into())
}

/// Resolves file indices back into live symbols.
struct Loader {
    symbols: Vec<SymbolRef>,
    alpha: Vec<SavedAlpha>,
}

impl Loader {
    fn symbol(&self, i: u32) -> Result<SymbolRef> {
        self.symbols
            .get(i as usize)
            .cloned()
            .ok_or_else(|| bad(format!("symbol index {} out of range", i)))
    }

    fn optional(&self, i: Option<u32>) -> Result<Option<SymbolRef>> {
        i.map(|i| self.symbol(i)).transpose()
    }

    /// Takes one reference on the alpha memory, as the builder does.
    fn alpha(&self, rete: &mut Rete, i: u32) -> Result<AlphaId> {
        let saved = self
            .alpha
            .get(i as usize)
            .ok_or_else(|| bad(format!("alpha memory index {} out of range", i)))?;
        let (id, attr, value) = (
            self.optional(saved.id)?,
            self.optional(saved.attr)?,
            self.optional(saved.value)?,
        );
        Ok(rete.find_or_make_alpha(id, attr, value, saved.acceptable))
    }

    fn tests(&self, tests: Vec<SavedTest>) -> Result<Vec<ReteTest>> {
        tests
            .into_iter()
            .map(|test| {
                Ok(match test {
                    SavedTest::Constant {
                        field,
                        relation,
                        referent,
                    } => ReteTest::ConstantRelational {
                        field,
                        relation,
                        referent: self.symbol(referent)?,
                    },
                    SavedTest::Variable {
                        field,
                        relation,
                        location,
                    } => ReteTest::VariableRelational {
                        field,
                        relation,
                        location,
                    },
                    SavedTest::Disjunction { field, options } => ReteTest::Disjunction {
                        field,
                        options: options.into_iter().map(|o| self.symbol(o)).collect::<Result<_>>()?,
                    },
                    SavedTest::Goal => ReteTest::IdIsGoal,
                    SavedTest::Impasse => ReteTest::IdIsImpasse,
                })
            })
            .collect()
    }

    fn rhs(&self, value: SavedRhs) -> Result<ReteRhsValue> {
        Ok(match value {
            SavedRhs::Constant(i) => ReteRhsValue::Constant(self.symbol(i)?),
            SavedRhs::Bound { depth, field } => ReteRhsValue::Bound { depth, field },
            SavedRhs::Unbound(i) => ReteRhsValue::Unbound(i),
            SavedRhs::Call { name, args } => ReteRhsValue::FunctionCall {
                name: self.symbol(name)?,
                args: args.into_iter().map(|a| self.rhs(a)).collect::<Result<_>>()?,
            },
        })
    }

    fn action(&self, action: SavedAction) -> Result<ReteAction> {
        Ok(match action {
            SavedAction::Make {
                id,
                attr,
                value,
                preference,
                referent,
            } => ReteAction::Make {
                id: self.rhs(id)?,
                attr: self.rhs(attr)?,
                value: self.rhs(value)?,
                preference,
                referent: referent.map(|r| self.rhs(r)).transpose()?,
            },
            SavedAction::Call { name, args } => ReteAction::FunctionCall {
                name: self.symbol(name)?,
                args: args.into_iter().map(|a| self.rhs(a)).collect::<Result<_>>()?,
            },
        })
    }

    fn names(&self, names: SavedNames) -> Result<ConditionNames> {
        Ok(match names {
            SavedNames::Simple(fields) => {
                let [id, attr, value] = fields;
                let resolve = |v: Vec<u32>| v.into_iter().map(|i| self.symbol(i)).collect::<Result<Vec<_>>>();
                ConditionNames::Simple([resolve(id)?, resolve(attr)?, resolve(value)?])
            }
            SavedNames::Conjunctive(inner) => {
                ConditionNames::Conjunctive(inner.into_iter().map(|n| self.names(n)).collect::<Result<_>>()?)
            }
        })
    }
}

impl Rete {
    /// Write the network's productions and nodes to `writer`.
    pub fn save(&self, mut writer: impl Write) -> Result<()> {
        if let Some((_, p)) = self.productions.iter().find(|(_, p)| p.kind == ProductionKind::Justification) {
            return Err(ReteError::JustificationInSavedNetwork(p.name.clone()));
        }

        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[self.dummy_top].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            order.push(node);
            stack.extend(self.nodes[node].children.iter().rev().copied());
        }
        let mut position: HashMap<NodeId, u32> = HashMap::with_capacity(order.len() + 1);
        position.insert(self.dummy_top, 0);
        for (i, &node) in order.iter().enumerate() {
            position.insert(node, i as u32 + 1);
        }
        let index_of = |node: NodeId| {
            position
                .get(&node)
                .copied()
                .ok_or_else(|| ReteError::structural(format!("node {} is not reachable from the top", node)))
        };

        let mut w = Writer::default();
        let mut nodes = Vec::with_capacity(order.len());
        let mut productions = Vec::new();
        for &node in &order {
            let beta = &self.nodes[node];
            let parent = index_of(self.parent_of(node)?)?;
            let kind = match &beta.kind {
                NodeKind::Memory { hash_loc, .. } => SavedNodeKind::Memory { hash_loc: *hash_loc },
                NodeKind::Join { spec, .. } => {
                    let (alpha, hash_loc, tests) = w.spec(self, spec)?;
                    SavedNodeKind::Join { alpha, hash_loc, tests }
                }
                NodeKind::MergedJoin { spec, .. } => {
                    let (alpha, hash_loc, tests) = w.spec(self, spec)?;
                    SavedNodeKind::MergedJoin { alpha, hash_loc, tests }
                }
                NodeKind::Negative { spec } => {
                    let (alpha, hash_loc, tests) = w.spec(self, spec)?;
                    SavedNodeKind::Negative { alpha, hash_loc, tests }
                }
                NodeKind::ConjunctiveNegation { partner } => {
                    let conjunct_levels = match self.nodes[*partner].kind {
                        NodeKind::ConjunctiveNegationPartner { conjunct_levels, .. } => conjunct_levels,
                        ref other => {
                            return Err(ReteError::UnexpectedNodeKind {
                                found: other.name(),
                                context: "cn partner",
                            })
                        }
                    };
                    SavedNodeKind::ConjunctiveNegation {
                        bottom: index_of(self.parent_of(*partner)?)?,
                        conjunct_levels,
                    }
                }
                NodeKind::ConjunctiveNegationPartner { .. } => SavedNodeKind::Partner,
                NodeKind::Production { production } => {
                    productions.push(w.production(&self.productions[*production])?);
                    SavedNodeKind::Production {
                        production: productions.len() as u32 - 1,
                    }
                }
                NodeKind::DummyTop => return Err(ReteError::structural("second dummy top node")),
            };
            nodes.push(SavedNode { parent, kind });
        }

        let network = SavedNetwork {
            symbols: w.symbols,
            alpha: w.saved_alpha,
            nodes,
            productions,
        };
        bincode::serialize_into(&mut writer, &MAGIC)?;
        bincode::serialize_into(
            &mut writer,
            &Header {
                version: FORMAT_VERSION,
                saved_by: self.agent.0,
            },
        )?;
        bincode::serialize_into(&mut writer, &network)?;
        writer.flush()?;
        info!(
            nodes = network.nodes.len(),
            productions = network.productions.len(),
            "saved rete network"
        );
        Ok(())
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        self.save(BufWriter::new(File::create(path)?))
    }

    /// Rebuild a network written by [`Rete::save`]. Symbols are interned
    /// into `symbols`; the network belongs to the agent that saved it.
    pub fn load(mut reader: impl Read, symbols: &mut SymbolTable, config: ReteConfig) -> Result<Rete> {
        let magic: [u8; 8] = bincode::deserialize_from(&mut reader)?;
        if magic != MAGIC {
            return Err(bad("missing network header"));
        }
        let header: Header = bincode::deserialize_from(&mut reader)?;
        if header.version != FORMAT_VERSION {
            return Err(bad(format!("unsupported format version {}", header.version)));
        }
        let network: SavedNetwork = bincode::deserialize_from(&mut reader)?;

        let interned = network
            .symbols
            .into_iter()
            .map(|value| match value {
                SymbolValue::Identifier { .. } => Err(bad(format!("identifier {} in symbol list", value))),
                value => Ok(symbols.intern(value)),
            })
            .collect::<Result<Vec<_>>>()?;
        let loader = Loader {
            symbols: interned,
            alpha: network.alpha,
        };

        let mut rete = Rete::new(config);
        rete.agent = AgentId(header.saved_by);
        let mut productions: Vec<Option<SavedProduction>> = network.productions.into_iter().map(Some).collect();
        let mut placed: Vec<Option<NodeId>> = vec![Some(rete.dummy_top)];

        for record in network.nodes {
            let parent = placed
                .get(record.parent as usize)
                .copied()
                .flatten()
                .ok_or_else(|| bad(format!("node parent {} not yet placed", record.parent)))?;
            let node = match record.kind {
                SavedNodeKind::Memory { hash_loc } => Some(rete.create_memory(parent, hash_loc)?),
                SavedNodeKind::Join { alpha, hash_loc, tests } => {
                    let alpha = loader.alpha(&mut rete, alpha)?;
                    Some(rete.create_join(parent, alpha, hash_loc, loader.tests(tests)?)?)
                }
                SavedNodeKind::MergedJoin { alpha, hash_loc, tests } => {
                    let alpha = loader.alpha(&mut rete, alpha)?;
                    Some(rete.create_merged_join(parent, alpha, hash_loc, loader.tests(tests)?)?)
                }
                SavedNodeKind::Negative { alpha, hash_loc, tests } => {
                    let alpha = loader.alpha(&mut rete, alpha)?;
                    Some(rete.create_negative(parent, alpha, hash_loc, loader.tests(tests)?)?)
                }
                SavedNodeKind::ConjunctiveNegation {
                    bottom,
                    conjunct_levels,
                } => {
                    let bottom = placed
                        .get(bottom as usize)
                        .copied()
                        .flatten()
                        .ok_or_else(|| bad(format!("cn bottom {} not yet placed", bottom)))?;
                    Some(rete.create_cn(parent, bottom, conjunct_levels)?)
                }
                SavedNodeKind::Partner => None,
                SavedNodeKind::Production { production } => {
                    let saved = productions
                        .get_mut(production as usize)
                        .and_then(Option::take)
                        .ok_or_else(|| bad(format!("production {} missing or placed twice", production)))?;
                    if rete.by_name.contains_key(&saved.name) {
                        return Err(bad(format!("production {} appears twice", saved.name)));
                    }
                    let actions = saved
                        .actions
                        .into_iter()
                        .map(|a| loader.action(a))
                        .collect::<Result<Vec<_>>>()?;
                    let var_names = match saved.names {
                        Some((conditions, unbound)) => Some(VarNames {
                            conditions: conditions
                                .into_iter()
                                .map(|n| loader.names(n))
                                .collect::<Result<_>>()?,
                            unbound: unbound.into_iter().map(|i| loader.symbol(i)).collect::<Result<_>>()?,
                        }),
                        None => None,
                    };
                    let id = rete.install_production(parent, saved.name, saved.kind, saved.depth);
                    let node = {
                        let p = &mut rete.productions[id];
                        p.actions = actions;
                        p.documentation = saved.documentation;
                        p.var_names = var_names;
                        p.node
                    };
                    rete.update_node_with_matches_from_above(node)?;
                    Some(node)
                }
            };
            placed.push(node);
        }

        debug!(agent = %rete.agent, saved_by = %header.saved_by, "loaded rete network");
        info!(
            nodes = rete.node_count(),
            productions = rete.productions.len(),
            "loaded rete network"
        );
        Ok(rete)
    }

    pub fn load_from_path(path: impl AsRef<Path>, symbols: &mut SymbolTable, config: ReteConfig) -> Result<Rete> {
        Self::load(BufReader::new(File::open(path)?), symbols, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain_production, Fixture};
    use working_memory::{Action, Condition, Production};

    fn sample(fx: &mut Fixture) -> Rete {
        let mut rete = Rete::with_defaults();
        let (s, x) = (fx.var("<s>"), fx.var("<x>"));
        let chain = chain_production(fx, "chain").with_action(Action::make(s.clone(), fx.sym("seen"), x.clone()));
        rete.add_production(chain, None).unwrap();
        let guarded = Production::new("guarded")
            .with_condition(Condition::positive(s.clone(), fx.sym("foo"), x.clone()))
            .with_condition(Condition::ConjunctiveNegation(vec![
                Condition::positive(x.clone(), fx.sym("bar"), fx.var("<y>")),
                Condition::positive(fx.var("<y>"), fx.sym("baz"), fx.sym("2")),
            ]))
            .with_condition(Condition::negative(s, fx.sym("stop"), fx.sym("yes")))
            .with_documentation("no bar chain to a 2");
        rete.add_production(guarded, None).unwrap();
        rete
    }

    #[test]
    fn test_save_and_load_rebuilds_same_network() {
        let mut fx = Fixture::new();
        let original = sample(&mut fx);
        let mut bytes = Vec::new();
        original.save(&mut bytes).unwrap();

        let mut loaded = Rete::load(bytes.as_slice(), &mut fx.symbols, ReteConfig::default()).unwrap();
        assert_eq!(loaded.agent(), original.agent());
        assert_eq!(loaded.node_count(), original.node_count());
        assert_eq!(loaded.alpha_memory_count(), original.alpha_memory_count());
        assert_eq!(loaded.statistics().actual, original.statistics().actual);
        for name in ["chain", "guarded"] {
            let before = original.production_conditions(name, &mut fx.symbols).unwrap();
            let after = loaded.production_conditions(name, &mut fx.symbols).unwrap();
            assert_eq!(before, after);
        }
        let guarded = loaded.find_production("guarded").unwrap();
        assert_eq!(
            loaded.production(guarded).unwrap().documentation.as_deref(),
            Some("no bar chain to a 2")
        );

        loaded.add_wme(fx.wme("S1", "foo", "X1")).unwrap();
        let assertion = loaded.next_assertion().unwrap();
        assert_eq!(assertion.production_name, "guarded");
        loaded.add_wme(fx.wme("X1", "bar", "1")).unwrap();
        let assertion = loaded.next_assertion().unwrap();
        assert_eq!(assertion.production_name, "chain");
    }

    #[test]
    fn test_identifiers_cannot_be_saved() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let production =
            Production::new("p").with_condition(Condition::positive(fx.var("<s>"), fx.sym("link"), fx.sym("S9")));
        rete.add_production(production, None).unwrap();
        let mut bytes = Vec::new();
        assert!(matches!(
            rete.save(&mut bytes),
            Err(ReteError::IdentifierInSavedNetwork(_))
        ));
    }

    #[test]
    fn test_justifications_cannot_be_saved() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let production = chain_production(&mut fx, "j").with_kind(ProductionKind::Justification);
        rete.add_production(production, None).unwrap();
        assert!(matches!(
            rete.save(Vec::new()),
            Err(ReteError::JustificationInSavedNetwork(name)) if name == "j"
        ));
    }

    #[test]
    fn test_load_rejects_foreign_bytes() {
        let mut symbols = SymbolTable::new();
        let result = Rete::load(&b"definitely not a network"[..], &mut symbols, ReteConfig::default());
        assert!(matches!(result, Err(ReteError::BadNetworkFile(_))));
    }
}
