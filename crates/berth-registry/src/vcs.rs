//! Access to version-controlled registries.
//!
//! Registries never talk to git directly; they go through [`VersionControl`],
//! which resolves references, reads files at a commit and materializes tree
//! snapshots. [`GitCommand`] implements it by running the `git` executable
//! against a bare cache repository per remote.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use berth_utils::{
    fs::{ensure_dir_exists, safe_remove},
    hash::cache_key,
    lock::FileLock,
};
use tracing::{debug, info};

use crate::{
    error::{ErrorContext, RegistryError, Result},
    lockfile::is_git_commit_sha,
};

/// Kind of an entry returned by [`VersionControl::list_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TreeEntryKind {
    Blob,
    Tree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub kind: TreeEntryKind,
}

pub trait VersionControl: Send + Sync {
    /// Resolves a branch, tag or commit of `repository` to a commit id.
    fn resolve(&self, repository: &str, reference: &str) -> Result<String>;

    /// Lists the directory `path` of `repository` at `commit`.
    ///
    /// A missing directory yields an empty list.
    fn list_tree(&self, repository: &str, commit: &str, path: &str) -> Result<Vec<TreeEntry>>;

    /// Reads the file `path` of `repository` at `commit`, or `None` if it
    /// does not exist.
    fn read_blob(&self, repository: &str, commit: &str, path: &str) -> Result<Option<Vec<u8>>>;

    /// Checks out the tree `tree_id` and returns the directory holding it.
    fn extract_tree(&self, repository: &str, tree_id: &str) -> Result<PathBuf>;
}

/// Decodes a blob returned by [`VersionControl::read_blob`].
pub fn blob_text(bytes: Vec<u8>, origin: &str) -> Result<String> {
    String::from_utf8(bytes).map_err(|source| {
        RegistryError::InvalidEncoding {
            origin: origin.to_string(),
            source,
        }
    })
}

/// [`VersionControl`] backed by the `git` executable.
///
/// Objects of each remote are fetched into a bare repository under
/// `<cache>/git/<blake3(url)>`; extracted trees live in `<cache>/git-trees/<tree>`.
#[derive(Debug, Clone)]
pub struct GitCommand {
    cache_root: PathBuf,
    git: PathBuf,
}

impl GitCommand {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            git: PathBuf::from("git"),
        }
    }

    /// Uses a specific `git` executable instead of the one on `PATH`.
    pub fn with_executable(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    fn repo_dir(&self, repository: &str) -> PathBuf {
        self.cache_root.join("git").join(cache_key(repository))
    }

    fn run(&self, repository: &str, git_dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
        let output = self
            .command(git_dir)
            .args(args)
            .output()
            .with_context(|| format!("running git {}", args.join(" ")))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(RegistryError::Git {
                repository: repository.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn succeeds(&self, git_dir: &Path, args: &[&str]) -> Result<bool> {
        let status = self
            .command(git_dir)
            .args(args)
            .output()
            .with_context(|| format!("running git {}", args.join(" ")))?
            .status;
        Ok(status.success())
    }

    fn command(&self, git_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.git);
        cmd.arg("--git-dir").arg(git_dir);
        cmd
    }

    /// Initializes the bare cache of `repository` if needed.
    fn ensure_repo(&self, repository: &str) -> Result<PathBuf> {
        let dir = self.repo_dir(repository);
        if dir.join("HEAD").exists() {
            return Ok(dir);
        }

        ensure_dir_exists(&dir)?;
        let _lock = FileLock::acquire(&dir)?;
        if !dir.join("HEAD").exists() {
            debug!("Initializing git cache for {} at {}", repository, dir.display());
            let output = Command::new(&self.git)
                .args(["init", "--bare", "--quiet"])
                .arg(&dir)
                .output()
                .with_context(|| format!("initializing {}", dir.display()))?;
            if !output.status.success() {
                return Err(RegistryError::Git {
                    repository: repository.to_string(),
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
        }
        Ok(dir)
    }

    fn has_object(&self, git_dir: &Path, spec: &str) -> Result<bool> {
        self.succeeds(git_dir, &["cat-file", "-e", spec])
    }

    /// Makes sure `commit` is present in the cache, fetching it if needed.
    fn ensure_commit(&self, repository: &str, commit: &str) -> Result<PathBuf> {
        let dir = self.ensure_repo(repository)?;
        if self.has_object(&dir, &format!("{commit}^{{commit}}"))? {
            return Ok(dir);
        }

        let _lock = FileLock::acquire(&dir)?;
        info!("Fetching commit {} from {}", commit, repository);
        self.run(repository, &dir, &["fetch", "--quiet", repository, commit])?;
        Ok(dir)
    }
}

impl VersionControl for GitCommand {
    fn resolve(&self, repository: &str, reference: &str) -> Result<String> {
        if is_git_commit_sha(reference) {
            return Ok(reference.to_string());
        }

        let dir = self.ensure_repo(repository)?;
        let _lock = FileLock::acquire(&dir)?;

        info!("Fetching {} from {}", reference, repository);
        self.run(repository, &dir, &["fetch", "--quiet", repository, reference])?;
        let stdout = self.run(repository, &dir, &["rev-parse", "FETCH_HEAD"])?;
        let commit = String::from_utf8_lossy(&stdout).trim().to_string();

        if is_git_commit_sha(&commit) {
            Ok(commit)
        } else {
            Err(RegistryError::InvalidCommitId(commit))
        }
    }

    fn list_tree(&self, repository: &str, commit: &str, path: &str) -> Result<Vec<TreeEntry>> {
        let dir = self.ensure_commit(repository, commit)?;
        let spec = if path.is_empty() {
            commit.to_string()
        } else {
            format!("{commit}:{path}")
        };

        if !self.has_object(&dir, &spec)? {
            return Ok(Vec::new());
        }

        let stdout = self.run(repository, &dir, &["ls-tree", &spec])?;
        let listing = String::from_utf8_lossy(&stdout);

        // <mode> SP <type> SP <object> TAB <name>
        let entries = listing
            .lines()
            .filter_map(|line| {
                let (meta, name) = line.split_once('\t')?;
                let kind = match meta.split(' ').nth(1)? {
                    "blob" => TreeEntryKind::Blob,
                    "tree" => TreeEntryKind::Tree,
                    _ => return None,
                };
                Some(TreeEntry {
                    name: name.to_string(),
                    kind,
                })
            })
            .collect();

        Ok(entries)
    }

    fn read_blob(&self, repository: &str, commit: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let dir = self.ensure_commit(repository, commit)?;
        let spec = format!("{commit}:{path}");

        if !self.has_object(&dir, &spec)? {
            debug!("{} not present at {} in {}", path, commit, repository);
            return Ok(None);
        }

        self.run(repository, &dir, &["cat-file", "blob", &spec]).map(Some)
    }

    fn extract_tree(&self, repository: &str, tree_id: &str) -> Result<PathBuf> {
        let target = self.cache_root.join("git-trees").join(tree_id);
        if target.is_dir() {
            debug!("Using extracted tree {}", target.display());
            return Ok(target);
        }

        let dir = self.ensure_repo(repository)?;
        let _lock = FileLock::acquire(&dir)?;

        // extracted by another caller while waiting for the lock
        if target.is_dir() {
            debug!("Using extracted tree {}", target.display());
            return Ok(target);
        }

        if !self.has_object(&dir, &format!("{tree_id}^{{tree}}"))? {
            info!("Fetching {} to locate tree {}", repository, tree_id);
            self.run(repository, &dir, &["fetch", "--quiet", repository, "HEAD"])?;
        }

        let staging = target.with_extension("tmp");
        safe_remove(&staging)?;
        ensure_dir_exists(&staging)?;

        let index = staging.with_extension("index");
        let work_tree = staging.to_string_lossy().to_string();
        let checkout = |args: &[&str]| -> Result<()> {
            let output = self
                .command(&dir)
                .arg("--work-tree")
                .arg(&work_tree)
                .args(args)
                .env("GIT_INDEX_FILE", &index)
                .output()
                .with_context(|| format!("extracting tree {tree_id}"))?;
            if output.status.success() {
                Ok(())
            } else {
                Err(RegistryError::Git {
                    repository: repository.to_string(),
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        };

        checkout(&["read-tree", tree_id])?;
        checkout(&["checkout-index", "--all", "--force"])?;
        safe_remove(&index)?;

        fs::rename(&staging, &target)
            .with_context(|| format!("moving extracted tree to {}", target.display()))?;
        info!("Extracted tree {} to {}", tree_id, target.display());

        Ok(target)
    }
}
