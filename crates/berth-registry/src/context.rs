use std::{path::PathBuf, sync::Arc};

use berth_config::config::Config;

use crate::{
    error::Result,
    lockfile::LockFile,
    vcs::{GitCommand, VersionControl},
};

/// Collaborators shared by every registry built from one configuration.
#[derive(Clone)]
pub struct RegistryContext {
    /// Root of the builtin catalog.
    pub builtin_root: PathBuf,
    pub vc: Arc<dyn VersionControl>,
    pub lockfile: Arc<LockFile>,
}

impl RegistryContext {
    pub fn new(
        builtin_root: impl Into<PathBuf>,
        vc: Arc<dyn VersionControl>,
        lockfile: Arc<LockFile>,
    ) -> Self {
        Self {
            builtin_root: builtin_root.into(),
            vc,
            lockfile,
        }
    }

    /// Builds the context described by `config`: a `git` backed
    /// [`VersionControl`] caching under the cache path, and the lock file
    /// loaded from the lock file path.
    pub fn from_config(config: &Config) -> Result<Self> {
        let builtin_root = config.get_root_path()?;
        let vc = Arc::new(GitCommand::new(config.get_cache_path()?));
        let lockfile = Arc::new(LockFile::load(config.get_lockfile_path()?)?);
        Ok(Self::new(builtin_root, vc, lockfile))
    }
}
