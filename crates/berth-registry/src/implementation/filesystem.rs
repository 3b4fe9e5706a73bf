use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use berth_utils::fs::read_optional;
use tracing::debug;

use super::collect_versions_dir;
use crate::{
    baseline::{baseline_version, parse_baseline, Baseline, BASELINE_FILE},
    entry::RegistryEntry,
    error::{RegistryError, Result},
    version::Version,
    versiondb::{load_versions_file, versions_file_path, VersionDbLocation, VersionDbType},
};

/// A registry stored in a local directory.
///
/// Version rows point at `$/`-relative directories below `root`.
pub struct FilesystemRegistry {
    root: PathBuf,
    baseline: String,
    baseline_cache: OnceLock<Baseline>,
}

impl FilesystemRegistry {
    pub fn new(root: impl AsRef<Path>, baseline: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            baseline: baseline.into(),
            baseline_cache: OnceLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn get_port_entry(&self, port_name: &str) -> Result<Option<RegistryEntry>> {
        let path = self.root.join(versions_file_path(port_name));
        let Some(text) = read_optional(&path)? else {
            debug!("Port {} not found in {}", port_name, self.root.display());
            return Ok(None);
        };

        let rows = load_versions_file(
            &text,
            VersionDbType::Filesystem,
            &self.root,
            &path.display().to_string(),
        )?;

        let rows = rows
            .into_iter()
            .filter_map(|row| {
                match row.location {
                    VersionDbLocation::Path(path) => Some((row.version.version, path)),
                    VersionDbLocation::GitTree(_) => None,
                }
            })
            .collect();

        Ok(Some(RegistryEntry::local(port_name, rows)))
    }

    pub fn get_all_port_names(&self, out: &mut Vec<String>) {
        collect_versions_dir(&self.root.join("versions"), out);
    }

    fn load_baseline(&self) -> Result<&Baseline> {
        if let Some(baseline) = self.baseline_cache.get() {
            return Ok(baseline);
        }

        let path = self.root.join(BASELINE_FILE);
        let origin = path.display().to_string();
        let missing = || {
            RegistryError::BaselineMissing {
                baseline: self.baseline.clone(),
                origin: origin.clone(),
            }
        };

        let text = read_optional(&path)?.ok_or_else(missing)?;
        let baseline = parse_baseline(&text, &self.baseline, &origin)?.ok_or_else(missing)?;

        debug!("Loaded baseline {} from {}", self.baseline, origin);
        Ok(self.baseline_cache.get_or_init(|| baseline))
    }

    pub fn get_baseline_version(&self, port_name: &str) -> Result<Version> {
        baseline_version(self.load_baseline()?, port_name, &self.baseline)
    }
}
