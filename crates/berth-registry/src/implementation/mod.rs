//! Registry backends.
//!
//! A [`RegistryImplementation`] answers three questions about the ports it
//! hosts: which versions exist, where each version's definition lives, and
//! which version is the baseline default.

mod builtin;
mod filesystem;
mod git;

use std::{path::Path, sync::Arc};

use berth_utils::{
    fs::{list_dir, EntryKind},
    pattern::{is_valid_package_pattern, is_wildcard_pattern},
};
use tracing::{debug, warn};

pub use builtin::{get_builtin_baseline, get_builtin_versions, BuiltinRegistry, BUILTIN_REPOSITORY};
pub use filesystem::FilesystemRegistry;
pub use git::GitRegistry;

use crate::{
    entry::RegistryEntry, error::Result, lockfile::LockFile, vcs::VersionControl,
    version::Version,
};

/// A source of port metadata.
pub enum RegistryImplementation {
    Builtin(BuiltinRegistry),
    Git(GitRegistry),
    Filesystem(FilesystemRegistry),
}

impl RegistryImplementation {
    /// The builtin catalog as currently checked out under `root`.
    pub fn builtin(root: impl AsRef<Path>) -> Self {
        Self::Builtin(BuiltinRegistry::new(root))
    }

    /// The builtin catalog under `root` with baselines read at `baseline`.
    pub fn builtin_with_baseline(
        root: impl AsRef<Path>,
        baseline: impl Into<String>,
        vc: Arc<dyn VersionControl>,
    ) -> Self {
        Self::Builtin(BuiltinRegistry::with_baseline(root, baseline, vc))
    }

    pub fn git(
        repository: impl Into<String>,
        reference: impl Into<String>,
        baseline: Option<String>,
        lock: Arc<LockFile>,
        vc: Arc<dyn VersionControl>,
    ) -> Self {
        Self::Git(GitRegistry::new(repository, reference, baseline, lock, vc))
    }

    pub fn filesystem(root: impl AsRef<Path>, baseline: impl Into<String>) -> Self {
        Self::Filesystem(FilesystemRegistry::new(root, baseline))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RegistryImplementation::Builtin(_) => "builtin",
            RegistryImplementation::Git(_) => "git",
            RegistryImplementation::Filesystem(_) => "filesystem",
        }
    }

    /// Returns the versions this backend knows for `port_name`, or `None` if
    /// it does not host the port.
    pub fn get_port_entry(&self, port_name: &str) -> Result<Option<RegistryEntry>> {
        if !is_port_name(port_name) {
            debug!("`{}` is not a valid port name", port_name);
            return Ok(None);
        }

        match self {
            RegistryImplementation::Builtin(registry) => registry.get_port_entry(port_name),
            RegistryImplementation::Git(registry) => registry.get_port_entry(port_name),
            RegistryImplementation::Filesystem(registry) => registry.get_port_entry(port_name),
        }
    }

    /// Appends the name of every port this backend hosts to `out`.
    ///
    /// Listing is best effort: unreadable entries are skipped and logged.
    pub fn get_all_port_names(&self, out: &mut Vec<String>) {
        match self {
            RegistryImplementation::Builtin(registry) => registry.get_all_port_names(out),
            RegistryImplementation::Git(registry) => registry.get_all_port_names(out),
            RegistryImplementation::Filesystem(registry) => registry.get_all_port_names(out),
        }
    }

    pub fn get_baseline_version(&self, port_name: &str) -> Result<Version> {
        match self {
            RegistryImplementation::Builtin(registry) => registry.get_baseline_version(port_name),
            RegistryImplementation::Git(registry) => registry.get_baseline_version(port_name),
            RegistryImplementation::Filesystem(registry) => {
                registry.get_baseline_version(port_name)
            }
        }
    }

    /// Whether this is the builtin catalog without a pinned baseline.
    pub fn is_builtin_without_baseline(&self) -> bool {
        matches!(self, RegistryImplementation::Builtin(b) if b.baseline().is_none())
    }
}

fn is_port_name(name: &str) -> bool {
    is_valid_package_pattern(name) && !is_wildcard_pattern(name)
}

/// Collects port names from a `versions/<c>-/<port>.json` tree on disk.
fn collect_versions_dir(versions_dir: &Path, out: &mut Vec<String>) {
    let buckets = match list_dir(versions_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Failed to list {}: {}", versions_dir.display(), err);
            return;
        }
    };

    for bucket in buckets {
        if bucket.kind != EntryKind::Directory || !bucket.name.ends_with('-') {
            continue;
        }
        let bucket_dir = versions_dir.join(&bucket.name);
        let files = match list_dir(&bucket_dir) {
            Ok(files) => files,
            Err(err) => {
                warn!("Failed to list {}: {}", bucket_dir.display(), err);
                continue;
            }
        };
        collect_port_files(
            files
                .into_iter()
                .filter(|f| f.kind == EntryKind::File)
                .map(|f| f.name),
            out,
        );
    }
}

/// Appends the port names of `<port>.json` file names, skipping anything else.
fn collect_port_files(names: impl Iterator<Item = String>, out: &mut Vec<String>) {
    for name in names {
        match name.strip_suffix(".json") {
            Some(port) if is_port_name(port) => out.push(port.to_string()),
            _ => debug!("Skipping unexpected versions file {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(RegistryImplementation::builtin("/r").kind(), "builtin");
        assert_eq!(
            RegistryImplementation::filesystem("/r", "default").kind(),
            "filesystem"
        );
        assert!(RegistryImplementation::builtin("/r").is_builtin_without_baseline());
        assert!(!RegistryImplementation::filesystem("/r", "default").is_builtin_without_baseline());
    }

    #[test]
    fn test_invalid_port_names_are_not_found() {
        let registry = RegistryImplementation::filesystem("/nonexistent", "default");
        assert!(registry.get_port_entry("../etc").unwrap().is_none());
        assert!(registry.get_port_entry("").unwrap().is_none());
        assert!(registry.get_port_entry("boost-*").unwrap().is_none());
    }

    #[test]
    fn test_collect_versions_dir_skips_noise() {
        let dir = tempdir().unwrap();
        let versions = dir.path().join("versions");
        fs::create_dir_all(versions.join("z-")).unwrap();
        fs::create_dir_all(versions.join("b-")).unwrap();
        fs::create_dir_all(versions.join("notes")).unwrap();
        fs::write(versions.join("z-/zlib.json"), "{}").unwrap();
        fs::write(versions.join("z-/README.md"), "").unwrap();
        fs::write(versions.join("b-/boost-asio.json"), "{}").unwrap();
        fs::write(versions.join("notes/x.json"), "{}").unwrap();
        fs::write(versions.join("baseline.json"), "{}").unwrap();

        let mut names = Vec::new();
        collect_versions_dir(&versions, &mut names);
        assert_eq!(names, ["boost-asio", "zlib"]);
    }
}
