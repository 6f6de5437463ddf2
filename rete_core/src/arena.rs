//! Slot arena with free-list reuse, indexed by typed ids.
//!
//! Nodes, tokens, alpha memories and match-set records all live in arenas
//! and refer to each other by id. A freed slot may be handed out again, so
//! holders must drop an id when the record it names is freed.

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A dense id into an `Arena`.
pub trait ArenaId: Copy + Eq + std::hash::Hash + std::fmt::Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name(pub u32);

        impl $crate::arena::ArenaId for $name {
            #[inline]
            fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

pub(crate) use arena_id;

/// Contiguous storage with free-list reuse.
#[derive(Debug, Clone)]
pub struct Arena<I: ArenaId, T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    len: usize,
    _id: PhantomData<I>,
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _id: PhantomData,
        }
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning its id.
    pub fn insert(&mut self, value: T) -> I {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(value);
            I::from_index(index)
        } else {
            self.slots.push(Some(value));
            I::from_index(self.slots.len() - 1)
        }
    }

    /// Store a value built from its own id.
    pub fn insert_with(&mut self, build: impl FnOnce(I) -> T) -> I {
        let index = match self.free.last() {
            Some(&index) => index,
            None => self.slots.len(),
        };
        let value = build(I::from_index(index));
        self.insert(value)
    }

    pub fn remove(&mut self, id: I) -> Option<T> {
        let value = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id.index());
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (I::from_index(i), v)))
    }
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("stale arena id {:?}", id),
        }
    }
}

impl<I: ArenaId, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("stale arena id {:?}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    arena_id!(TestId);

    #[test]
    fn test_insert_and_reuse() {
        let mut arena: Arena<TestId, &str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.remove(a), Some("a"));
        assert!(!arena.contains(a));

        let c = arena.insert("c");
        assert_eq!(c, a);
        assert_eq!(arena[b], "b");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_insert_with_sees_own_id() {
        let mut arena: Arena<TestId, TestId> = Arena::new();
        arena.insert(TestId(99));
        let id = arena.insert_with(|id| id);
        assert_eq!(arena[id], id);
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut arena: Arena<TestId, u32> = Arena::new();
        let ids: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
        arena.remove(ids[1]);

        let live: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![0, 2, 3]);
    }
}
