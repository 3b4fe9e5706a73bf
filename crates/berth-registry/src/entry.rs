//! Per-port version catalogs returned by registry backends.

use std::{fmt, path::PathBuf, sync::Arc};

use tracing::debug;

use crate::{
    error::{RegistryError, Result},
    vcs::VersionControl,
    version::Version,
};

/// A port definition on disk and the download location recorded for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAndLocation {
    pub path: PathBuf,
    /// SPDX download location; empty when unknown.
    pub location: String,
}

impl PathAndLocation {
    pub fn spdx_location(&self) -> &str {
        if self.location.is_empty() {
            "NOASSERTION"
        } else {
            &self.location
        }
    }
}

enum Locations {
    /// Definitions already on disk, parallel to the version list.
    Local(Vec<PathBuf>),
    /// Git trees materialized on demand, parallel to the version list.
    GitTrees {
        repository: String,
        trees: Vec<String>,
        vc: Arc<dyn VersionControl>,
    },
}

/// The versions one registry knows for a port.
pub struct RegistryEntry {
    port_name: String,
    versions: Vec<Version>,
    locations: Locations,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("port_name", &self.port_name)
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

impl RegistryEntry {
    /// An entry whose definitions are plain directories.
    pub fn local(port_name: impl Into<String>, rows: Vec<(Version, PathBuf)>) -> Self {
        let (versions, paths) = rows.into_iter().unzip();
        Self {
            port_name: port_name.into(),
            versions,
            locations: Locations::Local(paths),
        }
    }

    /// An entry whose definitions are git trees of `repository`.
    pub fn git_trees(
        port_name: impl Into<String>,
        repository: impl Into<String>,
        rows: Vec<(Version, String)>,
        vc: Arc<dyn VersionControl>,
    ) -> Self {
        let (versions, trees) = rows.into_iter().unzip();
        Self {
            port_name: port_name.into(),
            versions,
            locations: Locations::GitTrees {
                repository: repository.into(),
                trees,
                vc,
            },
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Known versions, in the order the registry lists them.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Resolves `version` to its definition, extracting git trees as needed.
    pub fn get_version(&self, version: &Version) -> Result<PathAndLocation> {
        let Some(index) = self.versions.iter().position(|v| v == version) else {
            return Err(RegistryError::VersionNotFound {
                port: self.port_name.clone(),
                version: version.to_string(),
            });
        };

        match &self.locations {
            Locations::Local(paths) => {
                Ok(PathAndLocation {
                    path: paths[index].clone(),
                    location: String::new(),
                })
            }
            Locations::GitTrees {
                repository,
                trees,
                vc,
            } => {
                let tree = &trees[index];
                debug!("Extracting {}@{} from tree {}", self.port_name, version, tree);
                let path = vc.extract_tree(repository, tree)?;
                Ok(PathAndLocation {
                    path,
                    location: format!("git+{repository}@{tree}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::test_utils::FakeVersionControl;

    const TREE: &str = "5b8e9e8ad2d1a1e7f8e6e3b2a1c0d9e8f7a6b5c4";

    #[test]
    fn test_spdx_location() {
        let mut loc = PathAndLocation {
            path: PathBuf::from("/ports/zlib"),
            location: String::new(),
        };
        assert_eq!(loc.spdx_location(), "NOASSERTION");
        loc.location = "git+https://example.com/r@abc".to_string();
        assert_eq!(loc.spdx_location(), "git+https://example.com/r@abc");
    }

    #[test]
    fn test_local_entry() {
        let entry = RegistryEntry::local(
            "zlib",
            vec![
                (Version::new("1.2.11", 1), PathBuf::from("/r/ports/zlib/1")),
                (Version::new("1.2.11", 0), PathBuf::from("/r/ports/zlib/0")),
            ],
        );

        assert_eq!(entry.versions().len(), 2);
        let found = entry.get_version(&Version::new("1.2.11", 0)).unwrap();
        assert_eq!(found.path, Path::new("/r/ports/zlib/0"));
        assert_eq!(found.location, "");

        assert!(matches!(
            entry.get_version(&Version::new("1.2.12", 0)),
            Err(RegistryError::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_git_entry_extracts_lazily() {
        let vc = Arc::new(FakeVersionControl::new());
        vc.add_tree(TREE, "/cache/trees/zlib");

        let entry = RegistryEntry::git_trees(
            "zlib",
            "https://example.com/registry",
            vec![(Version::new("1.2.11", 0), TREE.to_string())],
            vc.clone(),
        );
        assert_eq!(vc.extract_count(), 0);

        let found = entry.get_version(&Version::new("1.2.11", 0)).unwrap();
        assert_eq!(found.path, Path::new("/cache/trees/zlib"));
        assert_eq!(found.location, format!("git+https://example.com/registry@{TREE}"));
        assert_eq!(vc.extract_count(), 1);
    }
}
