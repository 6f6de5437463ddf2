//! Rebuilding condition and action lists from the network.
//!
//! A production's conditions are not stored anywhere; they are read back
//! from the nodes on its path. Variable names come from the names kept
//! at build time when available, otherwise they are made up from the
//! position that binds them. Given an instantiation, positive top-level
//! conditions are filled in with the matched WMEs instead.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use working_memory::{Action, Condition, Field, Relation, RhsValue, SymbolRef, SymbolTable, Test, ThreeFieldTests, Wme};

use crate::alpha::AlphaMemory;
use crate::beta::{NodeId, NodeKind, PosNeg, ReteTest};
use crate::builder::{ReteAction, ReteRhsValue};
use crate::error::{ReteError, Result};
use crate::match_set::InstantiationId;
use crate::network::Rete;
use crate::production::{ConditionNames, ProductionId};

/// Conditions and actions read back from the network.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub conditions: Vec<Condition>,
    /// Identifier pairs that must differ, from `<>` tests in an
    /// instantiation's positive conditions.
    pub nots: Vec<(SymbolRef, SymbolRef)>,
    pub actions: Vec<Action>,
}

enum CondNode {
    Simple(NodeId),
    Conjunctive(NodeId, Vec<CondNode>),
}

/// Conjunctive-negation bodies number their conditions from the depth of
/// the negation, so positions are keyed by scope as well.
struct Scope {
    start: usize,
    parent: Option<usize>,
}

/// (scope, depth, field)
type Key = (usize, usize, Field);

struct Rebuilder<'a> {
    rete: &'a Rete,
    symbols: &'a mut SymbolTable,
    wmes: Option<&'a [Option<Rc<Wme>>]>,
    unbound: &'a [SymbolRef],
    scopes: Vec<Scope>,
    scope_of: HashMap<NodeId, usize>,
    aliases: HashMap<Key, Key>,
    referenced: HashSet<Key>,
    named: HashSet<Key>,
    names: HashMap<Key, SymbolRef>,
    nots: Vec<(SymbolRef, SymbolRef)>,
}

impl<'a> Rebuilder<'a> {
    fn new(
        rete: &'a Rete,
        symbols: &'a mut SymbolTable,
        wmes: Option<&'a [Option<Rc<Wme>>]>,
        unbound: &'a [SymbolRef],
    ) -> Self {
        Self {
            rete,
            symbols,
            wmes,
            unbound,
            scopes: vec![Scope { start: 1, parent: None }],
            scope_of: HashMap::new(),
            aliases: HashMap::new(),
            referenced: HashSet::new(),
            named: HashSet::new(),
            names: HashMap::new(),
            nots: Vec::new(),
        }
    }

    /// The key of `depth` as seen from inside `scope`.
    fn key(&self, mut scope: usize, depth: usize, field: Field) -> Key {
        while depth < self.scopes[scope].start {
            match self.scopes[scope].parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        (scope, depth, field)
    }

    /// Follow equality aliases back to the binding position.
    fn canonical(&self, mut key: Key) -> Key {
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(&key) {
                Some(&next) => key = next,
                None => break,
            }
        }
        key
    }

    fn location(&self, scope: usize, depth: usize, levels_up: usize, field: Field) -> Key {
        self.key(scope, depth.saturating_sub(levels_up), field)
    }

    /// First pass: scopes, equality aliases and referenced positions.
    fn scan(&mut self, conditions: &[CondNode], mut depth: usize, scope: usize) {
        let rete = self.rete;
        for condition in conditions {
            match condition {
                CondNode::Simple(node) => {
                    if let Some(spec) = rete.nodes[*node].kind.posneg() {
                        if let Some(loc) = spec.hash_loc {
                            let target = self.location(scope, depth, loc.levels_up, loc.field);
                            self.referenced.insert(target);
                            self.aliases.entry((scope, depth, Field::Id)).or_insert(target);
                        }
                        for test in &spec.tests {
                            if let ReteTest::VariableRelational { field, relation, location } = test {
                                let own = (scope, depth, *field);
                                let target = self.location(scope, depth, location.levels_up, location.field);
                                self.referenced.insert(target);
                                if *relation == Relation::Equal && target != own {
                                    self.aliases.entry(own).or_insert(target);
                                }
                            }
                        }
                    }
                }
                CondNode::Conjunctive(cn, body) => {
                    let inner = self.scopes.len();
                    self.scopes.push(Scope {
                        start: depth,
                        parent: Some(scope),
                    });
                    self.scope_of.insert(*cn, inner);
                    self.scan(body, depth, inner);
                }
            }
            depth += 1;
        }
    }

    fn reference_rhs(&mut self, value: &ReteRhsValue) {
        match value {
            ReteRhsValue::Bound { depth, field } => {
                self.referenced.insert((0, *depth, *field));
            }
            ReteRhsValue::FunctionCall { args, .. } => args.iter().for_each(|a| self.reference_rhs(a)),
            _ => {}
        }
    }

    fn reference_action(&mut self, action: &ReteAction) {
        match action {
            ReteAction::Make {
                id,
                attr,
                value,
                referent,
                ..
            } => {
                for v in [id, attr, value].into_iter().chain(referent.as_ref()) {
                    self.reference_rhs(v);
                }
            }
            ReteAction::FunctionCall { args, .. } => args.iter().for_each(|a| self.reference_rhs(a)),
        }
    }

    fn assign_names(&mut self, conditions: &[CondNode], names: &[ConditionNames], mut depth: usize, scope: usize) {
        for (condition, names) in conditions.iter().zip(names) {
            match (condition, names) {
                (CondNode::Simple(_), ConditionNames::Simple(fields)) => {
                    for field in Field::ALL {
                        if let Some(name) = fields[field.index()].first() {
                            let own = (scope, depth, field);
                            self.named.insert(own);
                            let key = self.canonical(own);
                            self.names.entry(key).or_insert_with(|| name.clone());
                        }
                    }
                }
                (CondNode::Conjunctive(cn, body), ConditionNames::Conjunctive(inner)) => {
                    if let Some(&inner_scope) = self.scope_of.get(cn) {
                        self.assign_names(body, inner, depth, inner_scope);
                    }
                }
                _ => {}
            }
            depth += 1;
        }
    }

    /// The symbol at a position: the matched value when an instantiation
    /// supplies one, otherwise a variable.
    fn value_of(&mut self, key: Key) -> SymbolRef {
        let key = self.canonical(key);
        let (scope, depth, field) = key;
        if scope == 0 {
            if let Some(Some(wme)) = self.wmes.and_then(|w| w.get(depth.wrapping_sub(1))) {
                return wme.field(field).clone();
            }
        }
        if let Some(name) = self.names.get(&key) {
            return name.clone();
        }
        let letter = match field {
            Field::Id => 'i',
            Field::Attr => 'a',
            Field::Value => 'v',
        };
        let name = if scope == 0 {
            format!("<{}{}>", letter, depth)
        } else {
            format!("<{}{}-{}>", letter, depth, scope)
        };
        let sym = self.symbols.variable(name);
        self.names.insert(key, sym.clone());
        sym
    }

    fn field_tests(&mut self, spec: &PosNeg, memory: &AlphaMemory, depth: usize, scope: usize) -> ThreeFieldTests {
        let mut fields: [Test; 3] = [Test::Blank, Test::Blank, Test::Blank];
        for field in Field::ALL {
            let own = (scope, depth, field);
            let mut tests = Vec::new();
            if self.aliases.contains_key(&own) || self.referenced.contains(&own) || self.named.contains(&own) {
                tests.push(Test::Equality(self.value_of(own)));
            }
            let constant = match field {
                Field::Id => &memory.id,
                Field::Attr => &memory.attr,
                Field::Value => &memory.value,
            };
            if let Some(constant) = constant {
                tests.push(Test::Equality(constant.clone()));
            }
            for test in spec.tests.iter().filter(|t| t.field() == field) {
                let rebuilt = match test {
                    ReteTest::ConstantRelational {
                        relation: Relation::Equal,
                        referent,
                        ..
                    } => Test::Equality(referent.clone()),
                    ReteTest::ConstantRelational { relation, referent, .. } => Test::Relational {
                        relation: *relation,
                        referent: referent.clone(),
                    },
                    ReteTest::VariableRelational { relation, location, .. } => {
                        let target = self.location(scope, depth, location.levels_up, location.field);
                        let referent = self.value_of(target);
                        match relation {
                            Relation::Equal => Test::Equality(referent),
                            _ => Test::Relational {
                                relation: *relation,
                                referent,
                            },
                        }
                    }
                    ReteTest::Disjunction { options, .. } => Test::Disjunction(options.clone()),
                    ReteTest::IdIsGoal => Test::Goal,
                    ReteTest::IdIsImpasse => Test::Impasse,
                };
                if !tests.contains(&rebuilt) {
                    tests.push(rebuilt);
                }
            }
            fields[field.index()] = match tests.len() {
                0 => Test::Blank,
                1 => tests.remove(0),
                _ => Test::Conjunction(tests),
            };
        }
        let [id, attr, value] = fields;
        ThreeFieldTests::new(id, attr, value)
    }

    /// `<>` tests between identifiers in a matched positive condition.
    fn collect_nots(&mut self, spec: &PosNeg, wme: &Wme, depth: usize) {
        for test in &spec.tests {
            if let ReteTest::VariableRelational {
                field,
                relation: Relation::NotEqual,
                location,
            } = test
            {
                let own = wme.field(*field).clone();
                let target = self.location(0, depth, location.levels_up, location.field);
                let referent = self.value_of(target);
                if own.is_identifier() && referent.is_identifier() {
                    self.nots.push((own, referent));
                }
            }
        }
    }

    fn build(&mut self, conditions: &[CondNode], mut depth: usize, scope: usize) -> Result<Vec<Condition>> {
        let rete = self.rete;
        let mut out = Vec::with_capacity(conditions.len());
        for condition in conditions {
            out.push(match condition {
                CondNode::Simple(node) => {
                    let kind = &rete.nodes[*node].kind;
                    let spec = kind.posneg().ok_or(ReteError::UnexpectedNodeKind {
                        found: kind.name(),
                        context: "condition reconstruction",
                    })?;
                    let memory = rete
                        .alpha
                        .get(spec.alpha)
                        .ok_or_else(|| ReteError::structural(format!("node {} has no alpha memory", node)))?;
                    let positive = !matches!(kind, NodeKind::Negative { .. });
                    let matched = match self.wmes {
                        Some(wmes) if positive && scope == 0 => wmes.get(depth - 1).cloned().flatten(),
                        _ => None,
                    };
                    let tests = match matched {
                        Some(wme) => {
                            self.collect_nots(spec, &wme, depth);
                            ThreeFieldTests::new(wme.id.clone(), wme.attr.clone(), wme.value.clone())
                        }
                        None => self.field_tests(spec, memory, depth, scope),
                    }
                    .with_acceptable(memory.acceptable);
                    if positive {
                        Condition::Positive(tests)
                    } else {
                        Condition::Negative(tests)
                    }
                }
                CondNode::Conjunctive(cn, body) => {
                    let inner = self
                        .scope_of
                        .get(cn)
                        .copied()
                        .ok_or_else(|| ReteError::structural(format!("negation {} was never scanned", cn)))?;
                    Condition::ConjunctiveNegation(self.build(body, depth, inner)?)
                }
            });
            depth += 1;
        }
        Ok(out)
    }

    fn rhs_value(&mut self, value: &ReteRhsValue) -> RhsValue {
        match value {
            ReteRhsValue::Constant(sym) => RhsValue::Symbol(sym.clone()),
            ReteRhsValue::Bound { depth, field } => RhsValue::Symbol(self.value_of((0, *depth, *field))),
            ReteRhsValue::Unbound(index) => RhsValue::Symbol(match self.unbound.get(*index) {
                Some(name) => name.clone(),
                None => self.symbols.variable(format!("<u{}>", index)),
            }),
            ReteRhsValue::FunctionCall { name, args } => RhsValue::FunctionCall {
                name: name.clone(),
                args: args.iter().map(|a| self.rhs_value(a)).collect(),
            },
        }
    }

    fn action(&mut self, action: &ReteAction) -> Action {
        match action {
            ReteAction::Make {
                id,
                attr,
                value,
                preference,
                referent,
            } => Action::Make {
                id: self.rhs_value(id),
                attr: self.rhs_value(attr),
                value: self.rhs_value(value),
                preference: *preference,
                referent: referent.as_ref().map(|r| self.rhs_value(r)),
            },
            ReteAction::FunctionCall { name, args } => Action::FunctionCall {
                name: name.clone(),
                args: args.iter().map(|a| self.rhs_value(a)).collect(),
            },
        }
    }
}

impl Rete {
    /// Condition-bearing nodes from `stop` (exclusive) down to `bottom`.
    fn condition_nodes(&self, bottom: NodeId, stop: NodeId) -> Result<Vec<CondNode>> {
        let mut out = Vec::new();
        let mut current = bottom;
        while current != stop {
            let node = self
                .nodes
                .get(current)
                .ok_or_else(|| ReteError::structural(format!("missing node {}", current)))?;
            match &node.kind {
                NodeKind::Join { .. } | NodeKind::MergedJoin { .. } | NodeKind::Negative { .. } => {
                    out.push(CondNode::Simple(current))
                }
                NodeKind::ConjunctiveNegation { partner } => {
                    let body_bottom = self.parent_of(*partner)?;
                    let parent = self.parent_of(current)?;
                    out.push(CondNode::Conjunctive(current, self.condition_nodes(body_bottom, parent)?));
                }
                NodeKind::Memory { .. } => {}
                other => {
                    return Err(ReteError::UnexpectedNodeKind {
                        found: other.name(),
                        context: "condition reconstruction",
                    })
                }
            }
            current = self.parent_of(current)?;
        }
        out.reverse();
        Ok(out)
    }

    /// Read a production's conditions and actions back from the network.
    /// With an instantiation, matched positive conditions are filled in
    /// with their WMEs and bound variables with their values.
    pub fn node_to_conditions(
        &self,
        production: ProductionId,
        instantiation: Option<InstantiationId>,
        symbols: &mut SymbolTable,
    ) -> Result<Reconstruction> {
        let p = self
            .productions
            .get(production)
            .ok_or_else(|| ReteError::UnknownProduction(production.to_string()))?;
        let wmes = match instantiation {
            Some(id) => {
                let inst = self
                    .match_set
                    .instantiation(id)
                    .filter(|inst| inst.production == production)
                    .ok_or(ReteError::UnknownInstantiation(id.0 as usize))?;
                Some(inst.wmes.as_slice())
            }
            None => None,
        };
        let bottom = self.parent_of(p.node)?;
        let nodes = self.condition_nodes(bottom, self.dummy_top)?;

        let unbound = p.var_names.as_ref().map_or(&[][..], |names| names.unbound.as_slice());
        let mut rebuilder = Rebuilder::new(self, symbols, wmes, unbound);
        rebuilder.scan(&nodes, 1, 0);
        p.actions.iter().for_each(|a| rebuilder.reference_action(a));
        if let Some(names) = &p.var_names {
            rebuilder.assign_names(&nodes, &names.conditions, 1, 0);
        }
        let conditions = rebuilder.build(&nodes, 1, 0)?;
        let actions = p.actions.iter().map(|a| rebuilder.action(a)).collect();
        Ok(Reconstruction {
            conditions,
            nots: rebuilder.nots,
            actions,
        })
    }

    pub fn production_conditions(&self, name: &str, symbols: &mut SymbolTable) -> Result<Reconstruction> {
        let id = self.production_by_name(name)?;
        self.node_to_conditions(id, None, symbols)
    }

    pub fn instantiation_conditions(
        &self,
        instantiation: InstantiationId,
        symbols: &mut SymbolTable,
    ) -> Result<Reconstruction> {
        let production = self
            .match_set
            .instantiation(instantiation)
            .map(|inst| inst.production)
            .ok_or(ReteError::UnknownInstantiation(instantiation.0 as usize))?;
        self.node_to_conditions(production, Some(instantiation), symbols)
    }
}
