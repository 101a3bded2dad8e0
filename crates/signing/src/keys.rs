//! Credential group resolution

use shipwright_config::{SigningConfig, SigningGroupConfig, SigningGroupKind};
use shipwright_errors::{Error, SigningError};
use std::path::PathBuf;

/// A resolved signing credential group
///
/// Resolution checks the group's required environment variables and the
/// kind-specific settings up front, so a misconfigured group fails at
/// plan time instead of mid-run.
#[derive(Debug, Clone)]
pub enum CredentialGroup {
    /// No signing; the authority is never contacted
    Unsigned,
    /// Local minisign key, for test releases
    Minisign {
        public_key: String,
        secret_key_path: PathBuf,
    },
    /// External signing authority invoked per file
    Command {
        public_key: String,
        argv: Vec<String>,
    },
}

impl CredentialGroup {
    /// Resolve a named group from the signing configuration
    ///
    /// # Errors
    ///
    /// Returns `UnknownGroup` for a name with no configuration and
    /// `CredentialsMissing` when required settings or environment
    /// variables are absent.
    pub fn resolve(name: &str, config: &SigningConfig) -> Result<Self, Error> {
        let group = if let Some(group) = config.groups.get(name) {
            group.clone()
        } else if name == "unsigned" {
            return Ok(Self::Unsigned);
        } else {
            return Err(SigningError::UnknownGroup {
                group: name.to_string(),
            }
            .into());
        };

        Self::from_group_config(name, &group)
    }

    /// Build a credential group from its parsed configuration
    ///
    /// # Errors
    ///
    /// Returns `CredentialsMissing` when the group's settings or
    /// required environment variables are incomplete.
    pub fn from_group_config(name: &str, group: &SigningGroupConfig) -> Result<Self, Error> {
        let missing_env: Vec<&str> = group
            .required_env
            .iter()
            .filter(|var| std::env::var(var.as_str()).is_err())
            .map(String::as_str)
            .collect();
        if !missing_env.is_empty() {
            return Err(SigningError::CredentialsMissing {
                group: name.to_string(),
                missing: missing_env.join(", "),
            }
            .into());
        }

        match group.kind {
            SigningGroupKind::Unsigned => Ok(Self::Unsigned),
            SigningGroupKind::Minisign => {
                let public_key = require(name, group.public_key.as_deref(), "public_key")?;
                let secret_key_path = group.secret_key_path.clone().ok_or_else(|| {
                    Error::from(SigningError::CredentialsMissing {
                        group: name.to_string(),
                        missing: "secret_key_path".to_string(),
                    })
                })?;
                Ok(Self::Minisign {
                    public_key,
                    secret_key_path,
                })
            }
            SigningGroupKind::Command => {
                let public_key = require(name, group.public_key.as_deref(), "public_key")?;
                if group.command.is_empty() {
                    return Err(SigningError::CredentialsMissing {
                        group: name.to_string(),
                        missing: "command".to_string(),
                    }
                    .into());
                }
                Ok(Self::Command {
                    public_key,
                    argv: group.command.clone(),
                })
            }
        }
    }

    /// Whether this group skips signing entirely
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        matches!(self, Self::Unsigned)
    }

    /// The trusted public key, absent for `unsigned`
    #[must_use]
    pub fn public_key(&self) -> Option<&str> {
        match self {
            Self::Unsigned => None,
            Self::Minisign { public_key, .. } | Self::Command { public_key, .. } => {
                Some(public_key)
            }
        }
    }
}

fn require(group: &str, value: Option<&str>, field: &str) -> Result<String, Error> {
    value.map(str::to_string).ok_or_else(|| {
        SigningError::CredentialsMissing {
            group: group.to_string(),
            missing: field.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config_with(groups: BTreeMap<String, SigningGroupConfig>) -> SigningConfig {
        SigningConfig {
            default_group: "unsigned".to_string(),
            groups,
            attempts: 3,
            retry_delay_ms: 10,
        }
    }

    #[test]
    fn test_unsigned_always_resolves() {
        let config = config_with(BTreeMap::new());
        let group = CredentialGroup::resolve("unsigned", &config).unwrap();
        assert!(group.is_unsigned());
        assert!(group.public_key().is_none());
    }

    #[test]
    fn test_unknown_group_is_fatal() {
        let config = config_with(BTreeMap::new());
        let err = CredentialGroup::resolve("release", &config).unwrap_err();
        assert!(err.to_string().contains("unknown credential group"));
    }

    #[test]
    fn test_command_group_requires_public_key() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "release".to_string(),
            SigningGroupConfig {
                kind: SigningGroupKind::Command,
                public_key: None,
                secret_key_path: None,
                command: vec!["sign-client".to_string()],
                required_env: Vec::new(),
            },
        );
        let config = config_with(groups);
        let err = CredentialGroup::resolve("release", &config).unwrap_err();
        assert!(err.to_string().contains("public_key"));
    }

    #[test]
    fn test_missing_required_env() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "release".to_string(),
            SigningGroupConfig {
                kind: SigningGroupKind::Command,
                public_key: Some("RWT000".to_string()),
                secret_key_path: None,
                command: vec!["sign-client".to_string()],
                required_env: vec!["SHIPWRIGHT_TEST_ABSENT_TOKEN".to_string()],
            },
        );
        let config = config_with(groups);
        let err = CredentialGroup::resolve("release", &config).unwrap_err();
        assert!(err.to_string().contains("SHIPWRIGHT_TEST_ABSENT_TOKEN"));
    }
}
