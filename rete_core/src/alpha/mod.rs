//! The alpha network.
//!
//! Sixteen hash tables, one per combination of {id tested, attr tested,
//! value tested, acceptable}, map constant patterns to alpha memories.
//! Each memory holds the WMEs currently matching its pattern plus the
//! beta nodes that are right-linked to it.

use indexmap::IndexSet;
use std::collections::HashMap;
use tracing::{debug, trace};

use working_memory::{SymbolRef, Timetag, Wme};

use crate::arena::{arena_id, Arena};
use crate::beta::{NodeId, NodeKind};
use crate::error::{ReteError, Result};
use crate::network::Rete;

arena_id!(
    /// Handle to an alpha memory.
    AlphaId
);

type AlphaKey = (Option<SymbolRef>, Option<SymbolRef>, Option<SymbolRef>);

#[derive(Debug)]
pub struct AlphaMemory {
    pub id: Option<SymbolRef>,
    pub attr: Option<SymbolRef>,
    pub value: Option<SymbolRef>,
    pub acceptable: bool,
    /// Matching WMEs in arrival order.
    pub entries: IndexSet<Timetag>,
    /// Entries grouped by WME id, for hashed joins.
    pub by_id: HashMap<SymbolRef, IndexSet<Timetag>>,
    /// Right-linked beta nodes, descendants before ancestors.
    pub successors: Vec<NodeId>,
    pub reference_count: usize,
}

impl AlphaMemory {
    fn new(id: Option<SymbolRef>, attr: Option<SymbolRef>, value: Option<SymbolRef>, acceptable: bool) -> Self {
        Self {
            id,
            attr,
            value,
            acceptable,
            entries: IndexSet::new(),
            by_id: HashMap::new(),
            successors: Vec::new(),
            reference_count: 1,
        }
    }

    /// Whether the WME satisfies this memory's constant pattern.
    pub fn matches(&self, wme: &Wme) -> bool {
        let field_ok = |constant: &Option<SymbolRef>, actual: &SymbolRef| {
            constant.as_ref().map_or(true, |c| c == actual)
        };
        self.acceptable == wme.acceptable
            && field_ok(&self.id, &wme.id)
            && field_ok(&self.attr, &wme.attr)
            && field_ok(&self.value, &wme.value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, wme: &Wme) {
        self.entries.insert(wme.timetag);
        self.by_id
            .entry(wme.id.clone())
            .or_default()
            .insert(wme.timetag);
    }

    fn remove(&mut self, wme: &Wme) {
        self.entries.swap_remove(&wme.timetag);
        if let Some(bucket) = self.by_id.get_mut(&wme.id) {
            bucket.swap_remove(&wme.timetag);
            if bucket.is_empty() {
                self.by_id.remove(&wme.id);
            }
        }
    }

    /// Entries whose id is `id`.
    pub fn entries_with_id(&self, id: &SymbolRef) -> impl Iterator<Item = Timetag> + '_ {
        self.by_id.get(id).into_iter().flat_map(|b| b.iter().copied())
    }

    fn mask(&self) -> usize {
        table_mask(self.id.is_some(), self.attr.is_some(), self.value.is_some(), self.acceptable)
    }

    fn key(&self) -> AlphaKey {
        (self.id.clone(), self.attr.clone(), self.value.clone())
    }
}

fn table_mask(id: bool, attr: bool, value: bool, acceptable: bool) -> usize {
    (id as usize) | (attr as usize) << 1 | (value as usize) << 2 | (acceptable as usize) << 3
}

/// The sixteen alpha hash tables and the memories they index.
#[derive(Debug, Default)]
pub struct AlphaNetwork {
    pub(crate) memories: Arena<AlphaId, AlphaMemory>,
    tables: [HashMap<AlphaKey, AlphaId>; 16],
}

impl AlphaNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn get(&self, id: AlphaId) -> Option<&AlphaMemory> {
        self.memories.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AlphaId, &AlphaMemory)> {
        self.memories.iter()
    }

    /// Alpha memories a WME belongs to: up to eight probes.
    fn route(&self, wme: &Wme) -> Vec<AlphaId> {
        let mut hits = Vec::new();
        for bits in 0..8usize {
            let (id, attr, value) = (bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
            let key = (
                id.then(|| wme.id.clone()),
                attr.then(|| wme.attr.clone()),
                value.then(|| wme.value.clone()),
            );
            let table = &self.tables[table_mask(id, attr, value, wme.acceptable)];
            if let Some(&am) = table.get(&key) {
                hits.push(am);
            }
        }
        hits
    }

    fn find(&self, key: &AlphaKey, acceptable: bool) -> Option<AlphaId> {
        let mask = table_mask(key.0.is_some(), key.1.is_some(), key.2.is_some(), acceptable);
        self.tables[mask].get(key).copied()
    }

    /// Existing memory for a pattern of optional id, attr and value constants.
    pub(crate) fn lookup(&self, constants: &[Option<SymbolRef>; 3], acceptable: bool) -> Option<AlphaId> {
        let [id, attr, value] = constants.clone();
        self.find(&(id, attr, value), acceptable)
    }

    /// The most specific existing memory whose pattern is a strict
    /// generalization of `key`.
    fn most_specific_generalization(&self, key: &AlphaKey, acceptable: bool) -> Option<AlphaId> {
        let present = [key.0.is_some(), key.1.is_some(), key.2.is_some()];
        let mut subsets: Vec<usize> = (0..8usize)
            .filter(|bits| {
                (0..3).all(|i| bits & (1 << i) == 0 || present[i])
                    && bits.count_ones() < present.iter().filter(|p| **p).count() as u32
            })
            .collect();
        subsets.sort_by_key(|bits| std::cmp::Reverse(bits.count_ones()));

        subsets.into_iter().find_map(|bits| {
            let general = (
                key.0.clone().filter(|_| bits & 1 != 0),
                key.1.clone().filter(|_| bits & 2 != 0),
                key.2.clone().filter(|_| bits & 4 != 0),
            );
            self.find(&general, acceptable)
        })
    }
}

impl Rete {
    /// Return an alpha memory for the pattern, creating and seeding it if
    /// absent. The caller owns one reference either way.
    pub(crate) fn find_or_make_alpha(
        &mut self,
        id: Option<SymbolRef>,
        attr: Option<SymbolRef>,
        value: Option<SymbolRef>,
        acceptable: bool,
    ) -> AlphaId {
        let key = (id, attr, value);
        if let Some(existing) = self.alpha.find(&key, acceptable) {
            self.alpha.memories[existing].reference_count += 1;
            return existing;
        }

        let mut memory = AlphaMemory::new(key.0.clone(), key.1.clone(), key.2.clone(), acceptable);
        let seed: Vec<Timetag> = match self.alpha.most_specific_generalization(&key, acceptable) {
            Some(general) => self.alpha.memories[general].entries.iter().copied().collect(),
            None => self.wmes.keys().copied().collect(),
        };
        let mut seeded = Vec::new();
        for timetag in seed {
            if let Some(slot) = self.wmes.get(&timetag) {
                if memory.matches(&slot.wme) {
                    memory.insert(&slot.wme);
                    seeded.push(timetag);
                }
            }
        }

        let mask = memory.mask();
        let am = self.alpha.memories.insert(memory);
        self.alpha.tables[mask].insert(key, am);
        for timetag in seeded {
            if let Some(slot) = self.wmes.get_mut(&timetag) {
                slot.alpha_memories.push(am);
            }
        }
        debug!(alpha = %am, "created alpha memory");
        am
    }

    /// Drop one reference; the memory is destroyed when none remain.
    pub(crate) fn remove_alpha_ref(&mut self, am: AlphaId) -> Result<()> {
        let memory = self
            .alpha
            .memories
            .get_mut(am)
            .ok_or_else(|| ReteError::structural(format!("alpha memory {} is gone", am)))?;
        memory.reference_count -= 1;
        if memory.reference_count > 0 {
            return Ok(());
        }
        if !memory.successors.is_empty() {
            return Err(ReteError::structural(format!(
                "alpha memory {} released while nodes are still linked to it",
                am
            )));
        }

        let mask = memory.mask();
        let key = memory.key();
        let entries: Vec<Timetag> = memory.entries.iter().copied().collect();
        self.alpha.tables[mask].remove(&key);
        self.alpha.memories.remove(am);
        for timetag in entries {
            if let Some(slot) = self.wmes.get_mut(&timetag) {
                slot.alpha_memories.retain(|&a| a != am);
            }
        }
        debug!(alpha = %am, "released alpha memory");
        Ok(())
    }

    /// Put a WME into every alpha memory it matches, right-activating each
    /// memory's successors as it goes.
    pub(crate) fn add_wme_to_alpha(&mut self, wme: &Wme) -> Result<()> {
        for am in self.alpha.route(wme) {
            self.alpha.memories[am].insert(wme);
            if let Some(slot) = self.wmes.get_mut(&wme.timetag) {
                slot.alpha_memories.push(am);
            }

            let successors = self.alpha.memories[am].successors.clone();
            for node in successors {
                let still_linked = self
                    .nodes
                    .get(node)
                    .and_then(|n| n.kind.posneg())
                    .map_or(false, |spec| spec.right_linked && spec.alpha == am);
                if still_linked {
                    trace!(node = %node, timetag = wme.timetag, "right activation");
                    self.right_activate(node, wme.timetag)?;
                }
            }
        }
        Ok(())
    }

    /// Remove a WME from its alpha memories. Join nodes whose alpha memory
    /// just emptied are left-unlinked.
    pub(crate) fn remove_wme_from_alpha(&mut self, wme: &Wme, memories: &[AlphaId]) -> Result<()> {
        for &am in memories {
            let Some(memory) = self.alpha.memories.get_mut(am) else {
                continue;
            };
            memory.remove(wme);
            if !memory.is_empty() {
                continue;
            }
            for node in memory.successors.clone() {
                let linked_join = matches!(self.nodes[node].kind, NodeKind::Join { left_linked: true, .. });
                if linked_join {
                    self.unlink_from_left(node)?;
                } else if let NodeKind::MergedJoin { left_unlinked, .. } = &mut self.nodes[node].kind {
                    *left_unlinked = true;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    #[test]
    fn test_alpha_memory_matches_pattern() {
        let mut fx = Fixture::new();
        let w = fx.wme("S1", "color", "red");
        let memory = AlphaMemory::new(None, Some(fx.sym("color")), None, false);
        assert!(memory.matches(&w));

        let acceptable = AlphaMemory::new(None, Some(fx.sym("color")), None, true);
        assert!(!acceptable.matches(&w));
    }

    #[test]
    fn test_find_or_make_shares_and_seeds() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let w1 = fx.wme("S1", "color", "red");
        let w2 = fx.wme("S1", "size", "big");
        rete.add_wme(w1.clone()).unwrap();
        rete.add_wme(w2).unwrap();

        let general = rete.find_or_make_alpha(None, Some(fx.sym("color")), None, false);
        assert_eq!(rete.alpha.memories[general].entries.len(), 1);

        let again = rete.find_or_make_alpha(None, Some(fx.sym("color")), None, false);
        assert_eq!(general, again);
        assert_eq!(rete.alpha.memories[general].reference_count, 2);

        let specific = rete.find_or_make_alpha(None, Some(fx.sym("color")), Some(fx.sym("red")), false);
        assert_eq!(
            rete.alpha.memories[specific].entries.iter().copied().collect::<Vec<_>>(),
            vec![w1.timetag]
        );
        assert_eq!(rete.alpha.len(), 2);

        rete.remove_alpha_ref(specific).unwrap();
        rete.remove_alpha_ref(general).unwrap();
        rete.remove_alpha_ref(general).unwrap();
        assert!(rete.alpha.is_empty());
        assert!(rete.wmes.values().all(|slot| slot.alpha_memories.is_empty()));
    }

    #[test]
    fn test_route_probes_matching_tables_only() {
        let mut fx = Fixture::new();
        let mut rete = Rete::with_defaults();
        let attr_only = rete.find_or_make_alpha(None, Some(fx.sym("color")), None, false);
        let other = rete.find_or_make_alpha(None, Some(fx.sym("size")), None, false);

        let w = fx.wme("S1", "color", "blue");
        rete.add_wme(w.clone()).unwrap();
        assert!(rete.alpha.memories[attr_only].entries.contains(&w.timetag));
        assert!(rete.alpha.memories[other].is_empty());

        rete.remove_wme(w.timetag).unwrap();
        assert!(rete.alpha.memories[attr_only].is_empty());
    }
}
