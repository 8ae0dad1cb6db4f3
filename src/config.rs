//! Ledger node configuration.
//!
//! Parsed from TOML; every field has a default so an empty document yields a
//! usable in-memory configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Directory of the sled database.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Open a throwaway database that is removed when dropped.
    #[serde(default)]
    pub temporary: bool,

    /// Organization of the node executing invocations.
    #[serde(default = "default_node_org")]
    pub node_org: String,

    #[serde(default)]
    pub policy: AccessPolicy,
}

/// Which of the optional authorization checks are enforced.
///
/// Both default to off: the org-match and role checks then pass for every
/// caller and only the advisor check gates mutations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessPolicy {
    #[serde(default)]
    pub enforce_org_match: bool,
    #[serde(default)]
    pub enforce_roles: bool,
}

fn default_path() -> PathBuf {
    PathBuf::from("traceability.db")
}

fn default_node_org() -> String {
    "Org1MSP".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            temporary: false,
            node_org: default_node_org(),
            policy: AccessPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node_org.trim().is_empty() {
            return Err(ConfigError::Validation(
                "node_org must not be empty".to_string(),
            ));
        }
        if !self.temporary && self.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "path is required unless temporary is set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = LedgerConfig::from_toml("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert!(!config.policy.enforce_org_match);
        assert!(!config.policy.enforce_roles);
    }

    #[test]
    fn parses_policy_table() {
        let config = LedgerConfig::from_toml(
            r#"
            path = "/var/lib/ledger"
            node_org = "Org2MSP"

            [policy]
            enforce_roles = true
            "#,
        )
        .unwrap();

        assert_eq!(config.path, PathBuf::from("/var/lib/ledger"));
        assert_eq!(config.node_org, "Org2MSP");
        assert!(config.policy.enforce_roles);
        assert!(!config.policy.enforce_org_match);
    }

    #[test]
    fn rejects_blank_org() {
        let err = LedgerConfig::from_toml(r#"node_org = " ""#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = LedgerConfig::from_toml("temporary = maybe").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ledger.toml");
        std::fs::write(&file, "temporary = true\n").unwrap();

        let config = LedgerConfig::from_file(&file).unwrap();
        assert!(config.temporary);
    }
}
