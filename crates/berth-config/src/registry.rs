use std::fmt;

use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// The backend a registry declaration refers to.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    /// The catalog bundled under `root_path`.
    Builtin,
    /// A remote git repository.
    Git,
    /// A directory on the local filesystem.
    Filesystem,
    /// No registry; only meaningful as `default_registry`.
    None,
}

impl RegistryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryKind::Builtin => "builtin",
            RegistryKind::Git => "git",
            RegistryKind::Filesystem => "filesystem",
            RegistryKind::None => "none",
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declares a registry providing port metadata.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Documented, DocumentedFields)]
pub struct RegistryConfig {
    /// Registry backend: "builtin", "git", "filesystem" or "none".
    pub kind: RegistryKind,

    /// Baseline to resolve default versions from.
    /// A 40 character commit id for builtin and git registries, a key of
    /// `versions/baseline.json` for filesystem registries.
    /// Default (filesystem): "default"
    pub baseline: Option<String>,

    /// Git repository URL (git registries only).
    pub repository: Option<String>,

    /// Branch or tag to track (git registries only).
    /// Default: "HEAD"
    pub reference: Option<String>,

    /// Registry root directory (filesystem registries only).
    pub path: Option<String>,

    /// Ports provided by this registry. Entries may end in `*` to match a prefix.
    /// Required for entries of `registries`, ignored for `default_registry`.
    pub packages: Option<Vec<String>>,
}

impl RegistryConfig {
    pub fn builtin(baseline: Option<String>) -> Self {
        Self {
            kind: RegistryKind::Builtin,
            baseline,
            repository: None,
            reference: None,
            path: None,
            packages: None,
        }
    }

    pub fn git(repository: &str, baseline: &str) -> Self {
        Self {
            kind: RegistryKind::Git,
            baseline: Some(baseline.to_string()),
            repository: Some(repository.to_string()),
            reference: None,
            path: None,
            packages: None,
        }
    }

    pub fn filesystem(path: &str) -> Self {
        Self {
            kind: RegistryKind::Filesystem,
            baseline: None,
            repository: None,
            reference: None,
            path: Some(path.to_string()),
            packages: None,
        }
    }

    pub fn with_packages<S: AsRef<str>>(mut self, packages: &[S]) -> Self {
        self.packages = Some(packages.iter().map(|p| p.as_ref().to_string()).collect());
        self
    }

    pub fn reference(&self) -> &str {
        self.reference.as_deref().unwrap_or("HEAD")
    }

    pub fn filesystem_baseline(&self) -> &str {
        self.baseline.as_deref().unwrap_or("default")
    }

    pub fn packages(&self) -> &[String] {
        self.packages.as_deref().unwrap_or_default()
    }

    /// Checks the fields required and permitted by `kind`.
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind.as_str();
        let reject = |present: bool, field| {
            if present {
                Err(ConfigError::UnexpectedRegistryField { kind, field })
            } else {
                Ok(())
            }
        };

        match self.kind {
            RegistryKind::Builtin => {
                reject(self.repository.is_some(), "repository")?;
                reject(self.reference.is_some(), "reference")?;
                reject(self.path.is_some(), "path")?;
                if let Some(baseline) = &self.baseline {
                    validate_commit(baseline)?;
                }
            }
            RegistryKind::Git => {
                reject(self.path.is_some(), "path")?;
                if self.repository.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::MissingRegistryField {
                        kind,
                        field: "repository",
                    });
                }
                let Some(baseline) = &self.baseline else {
                    return Err(ConfigError::MissingRegistryField {
                        kind,
                        field: "baseline",
                    });
                };
                validate_commit(baseline)?;
            }
            RegistryKind::Filesystem => {
                reject(self.repository.is_some(), "repository")?;
                reject(self.reference.is_some(), "reference")?;
                if self.path.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::MissingRegistryField { kind, field: "path" });
                }
            }
            RegistryKind::None => {
                reject(self.baseline.is_some(), "baseline")?;
                reject(self.repository.is_some(), "repository")?;
                reject(self.reference.is_some(), "reference")?;
                reject(self.path.is_some(), "path")?;
            }
        }

        Ok(())
    }
}

fn validate_commit(baseline: &str) -> Result<()> {
    if berth_utils::hash::is_lower_hex(baseline, 40) {
        Ok(())
    } else {
        Err(ConfigError::InvalidBaseline(baseline.to_string()))
    }
}
