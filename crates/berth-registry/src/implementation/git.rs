use std::{
    path::Path,
    sync::{Arc, OnceLock},
};

use berth_config::error::ConfigError;
use tracing::{debug, info, warn};

use super::collect_port_files;
use crate::{
    baseline::{baseline_version, parse_baseline, Baseline, BASELINE_FILE},
    entry::RegistryEntry,
    error::{RegistryError, Result},
    lockfile::LockFile,
    vcs::{blob_text, TreeEntryKind, VersionControl},
    version::Version,
    versiondb::{load_versions_file, versions_file_path, VersionDbLocation, VersionDbType},
};

const DEFAULT_BASELINE: &str = "default";

/// A registry published as a git repository.
///
/// The tracked reference is pinned through the shared [`LockFile`]; the
/// baseline is read at a fixed commit.
pub struct GitRegistry {
    repository: String,
    reference: String,
    baseline: Option<String>,
    lock: Arc<LockFile>,
    vc: Arc<dyn VersionControl>,
    baseline_cache: OnceLock<Baseline>,
}

impl GitRegistry {
    pub fn new(
        repository: impl Into<String>,
        reference: impl Into<String>,
        baseline: Option<String>,
        lock: Arc<LockFile>,
        vc: Arc<dyn VersionControl>,
    ) -> Self {
        Self {
            repository: repository.into(),
            reference: reference.into(),
            baseline,
            lock,
            vc,
            baseline_cache: OnceLock::new(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }

    /// Reads the versions database of `port_name` at `commit`.
    fn read_versions(
        &self,
        commit: &str,
        port_name: &str,
    ) -> Result<Option<Vec<(Version, String)>>> {
        let path = versions_file_path(port_name);
        let Some(bytes) = self.vc.read_blob(&self.repository, commit, &path)? else {
            return Ok(None);
        };

        let origin = format!("{}@{}:{}", self.repository, commit, path);
        let text = blob_text(bytes, &origin)?;
        let rows = load_versions_file(&text, VersionDbType::Git, Path::new(""), &origin)?;

        Ok(Some(
            rows.into_iter()
                .filter_map(|row| {
                    match row.location {
                        VersionDbLocation::GitTree(tree) => Some((row.version.version, tree)),
                        VersionDbLocation::Path(_) => None,
                    }
                })
                .collect(),
        ))
    }

    pub fn get_port_entry(&self, port_name: &str) -> Result<Option<RegistryEntry>> {
        let vc = self.vc.as_ref();
        let pinned = self.lock.get_or_fetch(vc, &self.repository, &self.reference)?;

        let rows = match self.read_versions(&pinned.commit_id, port_name)? {
            Some(rows) => Some(rows),
            None if pinned.stale => {
                info!(
                    "Port {} not found at pinned {}@{}, refreshing",
                    port_name, self.repository, pinned.commit_id
                );
                let refreshed = self
                    .lock
                    .ensure_up_to_date(vc, &self.repository, &self.reference)?;
                self.read_versions(&refreshed.commit_id, port_name)?
            }
            None => None,
        };

        let Some(rows) = rows else {
            debug!("Port {} not found in {}", port_name, self.repository);
            return Ok(None);
        };

        Ok(Some(RegistryEntry::git_trees(
            port_name,
            self.repository.clone(),
            rows,
            Arc::clone(&self.vc),
        )))
    }

    pub fn get_all_port_names(&self, out: &mut Vec<String>) {
        let vc = self.vc.as_ref();
        let pinned = match self.lock.get_or_fetch(vc, &self.repository, &self.reference) {
            Ok(pinned) => pinned,
            Err(err) => {
                warn!("Failed to resolve {}: {}", self.repository, err);
                return;
            }
        };

        let buckets = match vc.list_tree(&self.repository, &pinned.commit_id, "versions") {
            Ok(buckets) => buckets,
            Err(err) => {
                warn!("Failed to list versions of {}: {}", self.repository, err);
                return;
            }
        };

        for bucket in buckets {
            if bucket.kind != TreeEntryKind::Tree || !bucket.name.ends_with('-') {
                continue;
            }
            let dir = format!("versions/{}", bucket.name);
            match vc.list_tree(&self.repository, &pinned.commit_id, &dir) {
                Ok(files) => {
                    collect_port_files(
                        files
                            .into_iter()
                            .filter(|f| f.kind == TreeEntryKind::Blob)
                            .map(|f| f.name),
                        out,
                    );
                }
                Err(err) => warn!("Failed to list {} of {}: {}", dir, self.repository, err),
            }
        }
    }

    fn load_baseline(&self) -> Result<&Baseline> {
        if let Some(baseline) = self.baseline_cache.get() {
            return Ok(baseline);
        }

        let commit = self.baseline.as_deref().ok_or(ConfigError::MissingRegistryField {
            kind: "git",
            field: "baseline",
        })?;

        let origin = format!("{}@{}:{}", self.repository, commit, BASELINE_FILE);
        let missing = || {
            RegistryError::BaselineMissing {
                baseline: DEFAULT_BASELINE.to_string(),
                origin: origin.clone(),
            }
        };

        let bytes = self
            .vc
            .read_blob(&self.repository, commit, BASELINE_FILE)?
            .ok_or_else(missing)?;
        let text = blob_text(bytes, &origin)?;
        let baseline = parse_baseline(&text, DEFAULT_BASELINE, &origin)?.ok_or_else(missing)?;

        debug!("Loaded baseline {} of {}", commit, self.repository);
        Ok(self.baseline_cache.get_or_init(|| baseline))
    }

    pub fn get_baseline_version(&self, port_name: &str) -> Result<Version> {
        let baseline = self.load_baseline()?;
        baseline_version(baseline, port_name, self.baseline.as_deref().unwrap_or_default())
    }
}
