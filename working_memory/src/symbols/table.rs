//! The symbol table: interning with release-on-drop.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::{Symbol, SymbolRef, SymbolValue};

/// Interns symbols so that equal values share one `Symbol`.
///
/// The table only holds weak references; a symbol lives as long as some
/// handle (a WME, an alpha memory, a rete test, ...) still refers to it.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: HashMap<SymbolValue, Weak<Symbol>>,
    next_hash_id: u32,
    id_counters: HashMap<char, u64>,
}

impl SymbolTable {
    /// Create a new empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a value, returning the shared symbol for it.
    pub fn intern(&mut self, value: SymbolValue) -> SymbolRef {
        if let Some(existing) = self.entries.get(&value).and_then(Weak::upgrade) {
            return SymbolRef(existing);
        }

        self.next_hash_id = self.next_hash_id.wrapping_add(1);
        if let SymbolValue::Identifier { letter, number } = value {
            let counter = self.id_counters.entry(letter).or_insert(0);
            if number > *counter {
                *counter = number;
            }
        }

        let symbol = Rc::new(Symbol {
            hash_id: self.next_hash_id,
            value: value.clone(),
            goal_level: Cell::new(None),
            impasse: Cell::new(false),
        });
        self.entries.insert(value, Rc::downgrade(&symbol));
        SymbolRef(symbol)
    }

    /// Look up a value without interning it.
    pub fn find(&self, value: &SymbolValue) -> Option<SymbolRef> {
        self.entries.get(value).and_then(Weak::upgrade).map(SymbolRef)
    }

    pub fn variable(&mut self, name: impl Into<String>) -> SymbolRef {
        self.intern(SymbolValue::Variable(name.into()))
    }

    pub fn str_constant(&mut self, s: impl Into<String>) -> SymbolRef {
        self.intern(SymbolValue::Str(s.into()))
    }

    pub fn int_constant(&mut self, i: i64) -> SymbolRef {
        self.intern(SymbolValue::Int(i))
    }

    pub fn float_constant(&mut self, x: f64) -> SymbolRef {
        self.intern(SymbolValue::Float(x))
    }

    /// Intern a specific identifier, e.g. `identifier('S', 1)` for `S1`.
    pub fn identifier(&mut self, letter: char, number: u64) -> SymbolRef {
        self.intern(SymbolValue::Identifier {
            letter: letter.to_ascii_uppercase(),
            number,
        })
    }

    /// Generate a fresh identifier with the given letter.
    pub fn new_identifier(&mut self, letter: char) -> SymbolRef {
        let letter = letter.to_ascii_uppercase();
        let number = self.id_counters.get(&letter).copied().unwrap_or(0) + 1;
        self.identifier(letter, number)
    }

    /// Drop table entries whose symbols have been released.
    pub fn purge_released(&mut self) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of live symbols.
    pub fn live_count(&self) -> usize {
        self.entries.values().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_on_drop() {
        let mut table = SymbolTable::new();
        let sym = table.str_constant("transient");
        assert_eq!(table.live_count(), 1);
        assert_eq!(sym.reference_count(), 1);

        drop(sym);
        assert!(table.find(&SymbolValue::Str("transient".into())).is_none());

        table.purge_released();
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn test_new_identifier_skips_used_numbers() {
        let mut table = SymbolTable::new();
        let s3 = table.identifier('s', 3);
        let next = table.new_identifier('S');

        assert_eq!(s3.to_string(), "S3");
        assert_eq!(next.to_string(), "S4");
    }

    #[test]
    fn test_reinterning_after_release_gets_new_hash_id() {
        let mut table = SymbolTable::new();
        let first = table.int_constant(7).hash_id();
        let again = table.int_constant(7);
        assert_ne!(first, again.hash_id());
    }
}
