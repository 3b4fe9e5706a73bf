use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use berth_utils::fs::{list_dir, read_optional, EntryKind};
use serde::Deserialize;
use tracing::{debug, warn};

use super::collect_versions_dir;
use crate::{
    baseline::{baseline_version, parse_baseline, Baseline, BASELINE_FILE},
    entry::RegistryEntry,
    error::{RegistryError, Result},
    vcs::{blob_text, VersionControl},
    version::{SchemedVersion, Version, VersionScheme},
    versiondb::{load_versions_file, versions_file_path, VersionDbLocation, VersionDbType},
};

/// Upstream repository the builtin catalog is published from.
pub const BUILTIN_REPOSITORY: &str = "https://github.com/microsoft/vcpkg";

const DEFAULT_BASELINE: &str = "default";

struct PinnedBaseline {
    commit: String,
    vc: Arc<dyn VersionControl>,
    cache: OnceLock<Baseline>,
}

/// The catalog shipped with the tool.
///
/// Without a baseline, every port has exactly the version of its checked-out
/// manifest. With a baseline, versions come from the versions database and
/// baselines are read from the catalog repository at the baseline commit.
pub struct BuiltinRegistry {
    root: PathBuf,
    pinned: Option<PinnedBaseline>,
}

impl PinnedBaseline {
    /// The `default` baseline at the pinned commit, loaded once.
    fn baseline(&self) -> Result<&Baseline> {
        if let Some(baseline) = self.cache.get() {
            return Ok(baseline);
        }

        let origin = format!("{BUILTIN_REPOSITORY}@{}:{BASELINE_FILE}", self.commit);
        let missing = || {
            RegistryError::BaselineMissing {
                baseline: DEFAULT_BASELINE.to_string(),
                origin: origin.clone(),
            }
        };

        let bytes = self
            .vc
            .read_blob(BUILTIN_REPOSITORY, &self.commit, BASELINE_FILE)?
            .ok_or_else(missing)?;
        let text = blob_text(bytes, &origin)?;
        let baseline = parse_baseline(&text, DEFAULT_BASELINE, &origin)?.ok_or_else(missing)?;

        debug!("Loaded builtin baseline {} ({} ports)", self.commit, baseline.len());
        Ok(self.cache.get_or_init(|| baseline))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PortManifest {
    name: String,
    version: Option<String>,
    version_semver: Option<String>,
    version_date: Option<String>,
    version_string: Option<String>,
    #[serde(default)]
    port_version: u32,
}

impl PortManifest {
    fn schemed_version(self, origin: &str) -> Result<SchemedVersion> {
        let invalid = |message: String| {
            RegistryError::InvalidManifest {
                origin: origin.to_string(),
                message,
            }
        };

        let declared: Vec<(VersionScheme, String)> = [
            (VersionScheme::Relaxed, self.version),
            (VersionScheme::Semver, self.version_semver),
            (VersionScheme::Date, self.version_date),
            (VersionScheme::String, self.version_string),
        ]
        .into_iter()
        .filter_map(|(scheme, text)| text.map(|t| (scheme, t)))
        .collect();

        let [(scheme, text)] = <[_; 1]>::try_from(declared).map_err(|declared| {
            invalid(format!(
                "expected exactly one version field, found {}",
                declared.len()
            ))
        })?;

        scheme.validate(&text).map_err(invalid)?;
        Ok(SchemedVersion::new(scheme, Version::new(text, self.port_version)))
    }
}

fn load_port_manifest(root: &Path, port_name: &str) -> Result<Option<SchemedVersion>> {
    let path = root.join("ports").join(port_name).join("vcpkg.json");
    let Some(text) = read_optional(&path)? else {
        return Ok(None);
    };

    let origin = path.display().to_string();
    let manifest: PortManifest = serde_json::from_str(&text).map_err(|source| {
        RegistryError::InvalidJson {
            origin: origin.clone(),
            source,
        }
    })?;

    if manifest.name != port_name {
        return Err(RegistryError::InvalidManifest {
            origin,
            message: format!("declares name `{}`, expected `{port_name}`", manifest.name),
        });
    }

    manifest.schemed_version(&origin).map(Some)
}

/// Reads the versions database of `port_name` from the builtin tree.
///
/// Returns each version with its git tree id, or `None` if the port has no
/// versions file.
pub fn get_builtin_versions(
    root: &Path,
    port_name: &str,
) -> Result<Option<Vec<(SchemedVersion, String)>>> {
    let path = root.join(versions_file_path(port_name));
    let Some(text) = read_optional(&path)? else {
        return Ok(None);
    };

    let rows = load_versions_file(&text, VersionDbType::Git, root, &path.display().to_string())?;
    Ok(Some(
        rows.into_iter()
            .filter_map(|row| {
                match row.location {
                    VersionDbLocation::GitTree(tree) => Some((row.version, tree)),
                    VersionDbLocation::Path(_) => None,
                }
            })
            .collect(),
    ))
}

/// Reads the `default` baseline of the checked-out builtin tree.
pub fn get_builtin_baseline(root: &Path) -> Result<BTreeMap<String, Version>> {
    let path = root.join(BASELINE_FILE);
    let origin = path.display().to_string();
    let missing = || {
        RegistryError::BaselineMissing {
            baseline: DEFAULT_BASELINE.to_string(),
            origin: origin.clone(),
        }
    };

    let text = read_optional(&path)?.ok_or_else(missing)?;
    parse_baseline(&text, DEFAULT_BASELINE, &origin)?.ok_or_else(missing)
}

impl BuiltinRegistry {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            pinned: None,
        }
    }

    pub fn with_baseline(
        root: impl AsRef<Path>,
        baseline: impl Into<String>,
        vc: Arc<dyn VersionControl>,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            pinned: Some(PinnedBaseline {
                commit: baseline.into(),
                vc,
                cache: OnceLock::new(),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The pinned baseline commit, if any.
    pub fn baseline(&self) -> Option<&str> {
        self.pinned.as_ref().map(|p| p.commit.as_str())
    }

    pub fn get_port_entry(&self, port_name: &str) -> Result<Option<RegistryEntry>> {
        let Some(pinned) = &self.pinned else {
            let Some(version) = load_port_manifest(&self.root, port_name)? else {
                debug!("Port {} not found in builtin ports", port_name);
                return Ok(None);
            };
            let path = self.root.join("ports").join(port_name);
            return Ok(Some(RegistryEntry::local(
                port_name,
                vec![(version.version, path)],
            )));
        };

        let Some(rows) = get_builtin_versions(&self.root, port_name)? else {
            debug!("Port {} not found in builtin versions database", port_name);
            return Ok(None);
        };

        Ok(Some(RegistryEntry::git_trees(
            port_name,
            BUILTIN_REPOSITORY,
            rows.into_iter().map(|(v, tree)| (v.version, tree)).collect(),
            Arc::clone(&pinned.vc),
        )))
    }

    pub fn get_all_port_names(&self, out: &mut Vec<String>) {
        if self.pinned.is_some() {
            collect_versions_dir(&self.root.join("versions"), out);
            return;
        }

        let ports_dir = self.root.join("ports");
        match list_dir(&ports_dir) {
            Ok(entries) => {
                out.extend(
                    entries
                        .into_iter()
                        .filter(|e| e.kind == EntryKind::Directory)
                        .map(|e| e.name),
                );
            }
            Err(err) => warn!("Failed to list {}: {}", ports_dir.display(), err),
        }
    }

    pub fn get_baseline_version(&self, port_name: &str) -> Result<Version> {
        let Some(pinned) = &self.pinned else {
            return load_port_manifest(&self.root, port_name)?
                .map(|v| v.version)
                .ok_or_else(|| {
                    RegistryError::BaselineEntryMissing {
                        port: port_name.to_string(),
                        baseline: "ports".to_string(),
                    }
                });
        };

        baseline_version(pinned.baseline()?, port_name, &pinned.commit)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::test_utils::FakeVersionControl;

    const BASELINE: &str = "0123456789abcdef0123456789abcdef01234567";
    const TREE: &str = "5b8e9e8ad2d1a1e7f8e6e3b2a1c0d9e8f7a6b5c4";

    fn catalog() -> TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("ports/zlib")).unwrap();
        fs::write(
            root.join("ports/zlib/vcpkg.json"),
            r#"{"name": "zlib", "version": "1.2.11", "port-version": 9, "license": "Zlib"}"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("ports/fmt")).unwrap();
        fs::write(
            root.join("ports/fmt/vcpkg.json"),
            r#"{"name": "fmt", "version-semver": "7.1.3"}"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("versions/z-")).unwrap();
        fs::write(
            root.join("versions/z-/zlib.json"),
            format!(
                r#"{{"versions": [
                    {{"version": "1.2.11", "port-version": 9, "git-tree": "{TREE}"}},
                    {{"version": "1.2.10", "git-tree": "{TREE}"}}
                ]}}"#
            ),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_unpinned_reads_port_manifests() {
        let dir = catalog();
        let registry = BuiltinRegistry::new(dir.path());

        let entry = registry.get_port_entry("zlib").unwrap().unwrap();
        assert_eq!(entry.versions(), [Version::new("1.2.11", 9)]);

        let found = entry.get_version(&Version::new("1.2.11", 9)).unwrap();
        assert_eq!(found.path, dir.path().join("ports/zlib"));
        assert_eq!(found.spdx_location(), "NOASSERTION");

        assert!(registry.get_port_entry("curl").unwrap().is_none());
        assert_eq!(
            registry.get_baseline_version("fmt").unwrap(),
            Version::new("7.1.3", 0)
        );
        assert!(registry.get_baseline_version("curl").is_err());

        let mut names = Vec::new();
        registry.get_all_port_names(&mut names);
        assert_eq!(names, ["fmt", "zlib"]);
    }

    #[test]
    fn test_manifest_name_mismatch() {
        let dir = catalog();
        fs::create_dir_all(dir.path().join("ports/curl")).unwrap();
        fs::write(
            dir.path().join("ports/curl/vcpkg.json"),
            r#"{"name": "libcurl", "version": "8.0.0"}"#,
        )
        .unwrap();
        let registry = BuiltinRegistry::new(dir.path());
        assert!(matches!(
            registry.get_port_entry("curl"),
            Err(RegistryError::InvalidManifest { .. })
        ));
    }

    #[test]
    fn test_manifest_requires_one_version_field() {
        let manifest: PortManifest =
            serde_json::from_str(r#"{"name": "x", "version": "1", "version-string": "a"}"#).unwrap();
        assert!(manifest.schemed_version("x").is_err());

        let manifest: PortManifest = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert!(manifest.schemed_version("x").is_err());
    }

    #[test]
    fn test_pinned_reads_versions_database_and_baseline() {
        let dir = catalog();
        let vc = Arc::new(FakeVersionControl::new());
        vc.add_file(
            BUILTIN_REPOSITORY,
            BASELINE,
            BASELINE_FILE,
            r#"{"default": {"zlib": {"baseline": "1.2.10"}}}"#,
        );
        vc.add_tree(TREE, "/cache/git-trees/zlib");

        let registry = BuiltinRegistry::with_baseline(dir.path(), BASELINE, vc.clone());

        let entry = registry.get_port_entry("zlib").unwrap().unwrap();
        assert_eq!(entry.versions().len(), 2);
        let found = entry.get_version(&Version::new("1.2.10", 0)).unwrap();
        assert_eq!(found.location, format!("git+{BUILTIN_REPOSITORY}@{TREE}"));

        assert!(registry.get_port_entry("fmt").unwrap().is_none());

        assert_eq!(
            registry.get_baseline_version("zlib").unwrap(),
            Version::new("1.2.10", 0)
        );
        assert!(matches!(
            registry.get_baseline_version("fmt"),
            Err(RegistryError::BaselineEntryMissing { .. })
        ));

        let mut names = Vec::new();
        registry.get_all_port_names(&mut names);
        assert_eq!(names, ["zlib"]);
    }

    #[test]
    fn test_pinned_missing_baseline_file() {
        let dir = catalog();
        let vc = Arc::new(FakeVersionControl::new());
        let registry = BuiltinRegistry::with_baseline(dir.path(), BASELINE, vc);
        assert!(matches!(
            registry.get_baseline_version("zlib"),
            Err(RegistryError::BaselineMissing { .. })
        ));
    }

    #[test]
    fn test_get_builtin_baseline() {
        let dir = catalog();
        assert!(get_builtin_baseline(dir.path()).is_err());

        fs::write(
            dir.path().join(BASELINE_FILE),
            r#"{"default": {"zlib": {"baseline": "1.2.11", "port-version": 9}}}"#,
        )
        .unwrap();
        let baseline = get_builtin_baseline(dir.path()).unwrap();
        assert_eq!(baseline["zlib"].to_string(), "1.2.11#9");
    }
}
