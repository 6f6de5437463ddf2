//! Read-only diagnostics over the network.

use std::collections::BTreeMap;
use std::fmt;

use crate::beta::{NodeId, NodeKind, NodeType};
use crate::error::Result;
use crate::network::{ActivationCounters, Rete};

/// Node counts by type, plus token and activation totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReteStatistics {
    pub actual: BTreeMap<NodeType, usize>,
    /// As if merged memory-joins were kept as a memory and a join.
    pub if_no_merging: BTreeMap<NodeType, usize>,
    /// As if every production had its own path.
    pub if_no_sharing: BTreeMap<NodeType, usize>,
    pub alpha_memories: usize,
    pub tokens: usize,
    pub wmes: usize,
    pub productions: usize,
    pub activations: ActivationCounters,
}

impl ReteStatistics {
    pub fn total(counts: &BTreeMap<NodeType, usize>) -> usize {
        counts.values().sum()
    }
}

impl fmt::Display for ReteStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20}{:>10}{:>14}{:>14}", "node type", "actual", "no merging", "no sharing")?;
        for node_type in NodeType::ALL {
            let get = |counts: &BTreeMap<NodeType, usize>| counts.get(&node_type).copied().unwrap_or(0);
            writeln!(
                f,
                "{:<20}{:>10}{:>14}{:>14}",
                node_type.to_string(),
                get(&self.actual),
                get(&self.if_no_merging),
                get(&self.if_no_sharing)
            )?;
        }
        writeln!(
            f,
            "{:<20}{:>10}{:>14}{:>14}",
            "total",
            Self::total(&self.actual),
            Self::total(&self.if_no_merging),
            Self::total(&self.if_no_sharing)
        )?;
        write!(
            f,
            "Alpha memories: {}, Tokens: {}, WMEs: {}, Productions: {}, Activations: left {} right {} (null {})",
            self.alpha_memories,
            self.tokens,
            self.wmes,
            self.productions,
            self.activations.left_activations,
            self.activations.right_activations,
            self.activations.null_right_activations
        )
    }
}

impl Rete {
    /// Every node a production depends on, its production node first.
    /// Conjunctive-negation subnetworks are included.
    fn path_nodes(&self, production_node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![(production_node, self.dummy_top)];
        while let Some((bottom, stop)) = stack.pop() {
            let mut current = Some(bottom);
            while let Some(node) = current.filter(|&n| n != stop) {
                let Some(beta) = self.nodes.get(node) else {
                    break;
                };
                out.push(node);
                if let NodeKind::ConjunctiveNegation { partner } = beta.kind {
                    if let Some(parent) = beta.parent {
                        stack.push((partner, parent));
                    }
                }
                current = beta.parent;
            }
        }
        out
    }

    /// Tokens held along a production's path.
    pub fn count_tokens(&self, name: &str) -> Result<usize> {
        let id = self.production_by_name(name)?;
        let node = self.productions[id].node;
        Ok(self
            .path_nodes(node)
            .into_iter()
            .map(|n| self.nodes[n].tokens.len())
            .sum())
    }

    /// Current complete matches of a production.
    pub fn production_match_count(&self, name: &str) -> Result<usize> {
        let id = self.production_by_name(name)?;
        Ok(self.nodes[self.productions[id].node].tokens.len())
    }

    pub fn statistics(&self) -> ReteStatistics {
        let mut stats = ReteStatistics {
            alpha_memories: self.alpha.len(),
            tokens: self.tokens.len(),
            wmes: self.wmes.len(),
            productions: self.productions.len(),
            activations: self.counters,
            ..Default::default()
        };

        for (_, node) in self.nodes.iter() {
            let node_type = node.kind.node_type();
            *stats.actual.entry(node_type).or_default() += 1;
            for unmerged in node_type.unmerged() {
                *stats.if_no_merging.entry(unmerged).or_default() += 1;
            }
        }

        *stats.if_no_sharing.entry(NodeType::DummyTop).or_default() += 1;
        for (_, production) in self.productions.iter() {
            for node in self.path_nodes(production.node) {
                *stats.if_no_sharing.entry(self.nodes[node].kind.node_type()).or_default() += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain_production, Fixture};
    use working_memory::{Condition, Production};

    #[test]
    fn test_counts_reflect_sharing_and_merging() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "a"), None).unwrap();
        let (s, x) = (fx.var("<s>"), fx.var("<x>"));
        let b = Production::new("b")
            .with_condition(Condition::positive(s, fx.sym("foo"), x.clone()))
            .with_condition(Condition::positive(x, fx.sym("baz"), fx.sym("1")));
        rete.add_production(b, None).unwrap();

        let stats = rete.statistics();
        assert_eq!(ReteStatistics::total(&stats.actual), rete.node_count());
        assert_eq!(stats.actual.get(&NodeType::HashedMemory), Some(&1));
        assert_eq!(stats.actual.get(&NodeType::HashedJoin), Some(&2));
        assert_eq!(stats.actual.get(&NodeType::UnhashedMergedJoin), Some(&1));
        assert_eq!(stats.if_no_merging.get(&NodeType::UnhashedJoin), Some(&1));
        // Each production alone needs the shared top node again.
        assert_eq!(stats.if_no_sharing.get(&NodeType::UnhashedMergedJoin), Some(&2));
        assert_eq!(stats.if_no_sharing.get(&NodeType::Production), Some(&2));
        assert!(stats.to_string().contains("total"));
    }

    #[test]
    fn test_count_tokens_follows_path() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        rete.add_production(chain_production(&mut fx, "p"), None).unwrap();
        assert_eq!(rete.count_tokens("p").unwrap(), 1);

        rete.add_wme(fx.wme("S1", "foo", "X1")).unwrap();
        rete.add_wme(fx.wme("X1", "bar", "1")).unwrap();
        assert_eq!(rete.count_tokens("p").unwrap(), 3);
        assert_eq!(rete.production_match_count("p").unwrap(), 1);
        assert!(rete.count_tokens("missing").is_err());

        let stats = rete.statistics();
        assert!(stats.activations.right_activations >= 2);
    }
}
