//! Shared fixture for the unit tests.

use std::rc::Rc;

use working_memory::{Condition, Production, SymbolRef, SymbolTable, Wme, WorkingMemory};

/// A symbol table and working memory that understand shorthand symbols:
/// `S1` is an identifier, `3` an integer, `<x>` a variable, anything else
/// a string constant.
pub struct Fixture {
    pub symbols: SymbolTable,
    pub memory: WorkingMemory,
    held: Vec<SymbolRef>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            memory: WorkingMemory::new(),
            held: Vec::new(),
        }
    }

    pub fn sym(&mut self, text: &str) -> SymbolRef {
        let mut chars = text.chars();
        let sym = match (chars.next(), chars.as_str().parse::<u64>()) {
            _ if text.starts_with('<') => self.symbols.variable(text),
            (Some(letter), Ok(number)) if letter.is_ascii_uppercase() => self.symbols.identifier(letter, number),
            _ => match text.parse::<i64>() {
                Ok(i) => self.symbols.int_constant(i),
                Err(_) => self.symbols.str_constant(text),
            },
        };
        // Symbols are released when the last handle drops; keep one so
        // marks such as goal levels survive between calls.
        self.held.push(sym.clone());
        sym
    }

    pub fn var(&mut self, name: &str) -> SymbolRef {
        self.sym(name)
    }

    pub fn wme(&mut self, id: &str, attr: &str, value: &str) -> Rc<Wme> {
        let (id, attr, value) = (self.sym(id), self.sym(attr), self.sym(value));
        self.memory.add(id, attr, value, false).unwrap()
    }
}

/// `(<s> ^foo <x>) (<x> ^bar 1)`
pub fn chain_production(fx: &mut Fixture, name: &str) -> Production {
    let (s, x) = (fx.var("<s>"), fx.var("<x>"));
    Production::new(name)
        .with_condition(Condition::positive(s, fx.sym("foo"), x.clone()))
        .with_condition(Condition::positive(x, fx.sym("bar"), fx.sym("1")))
}
