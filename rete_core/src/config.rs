//! Matcher configuration, loadable from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// How refraction is applied to newly learned justifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefractionPolicy {
    /// A refracted instantiation that does not match is always reported.
    #[default]
    Strict,
    /// For justifications, a non-matching refracted instantiation is
    /// reported as if no refraction had been requested.
    TolerateJustifications,
}

/// Optional ceilings on network size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_tokens: Option<usize>,
    pub max_beta_nodes: Option<usize>,
    pub max_alpha_memories: Option<usize>,
}

/// Configuration for one matcher instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReteConfig {
    pub refraction: RefractionPolicy,

    /// Keep variable names for reconstructing non-justification productions.
    pub keep_variable_names: bool,

    pub limits: ResourceLimits,
}

impl Default for ReteConfig {
    fn default() -> Self {
        Self {
            refraction: RefractionPolicy::Strict,
            keep_variable_names: true,
            limits: ResourceLimits::default(),
        }
    }
}

impl ReteConfig {
    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = ReteConfig::from_toml_str("").unwrap();
        assert_eq!(config, ReteConfig::default());
        assert!(config.keep_variable_names);
    }

    #[test]
    fn test_parse_full_config() {
        let config = ReteConfig::from_toml_str(
            r#"
            refraction = "tolerate_justifications"
            keep_variable_names = false

            [limits]
            max_tokens = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.refraction, RefractionPolicy::TolerateJustifications);
        assert!(!config.keep_variable_names);
        assert_eq!(config.limits.max_tokens, Some(1000));
        assert_eq!(config.limits.max_beta_nodes, None);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        assert!(ReteConfig::from_toml_str("refraction = \"sometimes\"").is_err());
    }
}
