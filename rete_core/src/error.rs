//! Errors raised by the matcher.

use thiserror::Error;
use working_memory::Timetag;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReteError>;

/// Everything that can go wrong inside the matcher.
///
/// Structural variants indicate a builder or interpreter bug and leave the
/// network in an unknown state; the others are rejected before anything is
/// mutated.
#[derive(Debug, Error)]
pub enum ReteError {
    // Structural errors.
    #[error("variable {0} is referenced but not bound")]
    UnboundVariable(String),

    #[error("structural violation: {0}")]
    StructuralViolation(String),

    #[error("unexpected node kind {found} ({context})")]
    UnexpectedNodeKind { found: &'static str, context: &'static str },

    // Input errors.
    #[error("malformed production {name}: {reason}")]
    MalformedProduction { name: String, reason: String },

    #[error("WME with timetag {0} is already in the network")]
    DuplicateWme(Timetag),

    #[error("no WME with timetag {0} in the network")]
    UnknownWme(Timetag),

    #[error("unknown production {0}")]
    UnknownProduction(String),

    #[error("unknown instantiation {0}")]
    UnknownInstantiation(usize),

    #[error("resource limit exceeded: {resource} (limit {limit})")]
    ResourceExhausted { resource: &'static str, limit: usize },

    // Configuration and persistence.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("not a saved network: {0}")]
    BadNetworkFile(String),

    #[error("cannot save a network that references identifier {0}")]
    IdentifierInSavedNetwork(String),

    #[error("cannot save a network containing justification {0}")]
    JustificationInSavedNetwork(String),
}

impl ReteError {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        ReteError::StructuralViolation(msg.into())
    }

    pub(crate) fn malformed(name: &str, reason: impl Into<String>) -> Self {
        ReteError::MalformedProduction {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error leaves shared network state untrustworthy.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ReteError::UnboundVariable(_)
                | ReteError::StructuralViolation(_)
                | ReteError::UnexpectedNodeKind { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(ReteError::UnboundVariable("<x>".into()).is_structural());
        assert!(ReteError::structural("dangling token").is_structural());
        assert!(!ReteError::UnknownWme(3).is_structural());
        assert!(!ReteError::malformed("p", "empty").is_structural());
    }

    #[test]
    fn test_messages() {
        let err = ReteError::ResourceExhausted {
            resource: "tokens",
            limit: 10,
        };
        assert_eq!(err.to_string(), "resource limit exceeded: tokens (limit 10)");
    }
}
