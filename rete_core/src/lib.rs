//! # Rete Core
//!
//! The incremental matcher of the production system. Productions are
//! compiled into a shared Rete network; WMEs added to or removed from it
//! update stored partial matches, and complete matches come out as
//! buffered assertions and retractions in the match set.
//!
//! ## Core Components
//!
//! - **alpha**: constant tests, sixteen hash tables of alpha memories
//! - **beta**: join, negative and conjunctive-negation nodes, with left
//!   and right unlinking
//! - **builder**: production compilation, node sharing, excision
//! - **match_set**: pending assertions and retractions, per goal level
//! - **reconstruct**: reading conditions back from the network
//! - **persist**: saving and loading the network structure

pub mod alpha;
mod arena;
pub mod beta;
pub mod builder;
pub mod config;
pub mod error;
mod interpreter;
pub mod match_set;
pub mod network;
pub mod persist;
pub mod production;
pub mod reconstruct;
pub mod stats;
pub mod tokens;

#[cfg(test)]
mod test_support;

pub use alpha::{AlphaId, AlphaMemory};
pub use beta::{NodeId, NodeType, ReteTest, VarLoc};
pub use builder::{ReteAction, ReteRhsValue};
pub use config::{RefractionPolicy, ResourceLimits, ReteConfig};
pub use error::{ReteError, Result};
pub use match_set::{Assertion, Instantiation, InstantiationId, Retraction};
pub use network::{ActivationCounters, Rete};
pub use production::{AddResult, ProductionId, RefractedInstantiation, ReteProduction};
pub use reconstruct::Reconstruction;
pub use stats::ReteStatistics;
