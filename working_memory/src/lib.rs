//! # Working Memory
//!
//! The substrate the matcher consumes: interned symbols, working memory
//! elements, and compiled productions (condition and action lists).
//! This crate holds no matching logic.

pub mod memory;
pub mod productions;
pub mod symbols;

pub use memory::*;
pub use productions::*;
pub use symbols::*;
