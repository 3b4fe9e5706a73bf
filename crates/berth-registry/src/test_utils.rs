use std::{
    collections::{BTreeSet, HashMap},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use crate::{
    error::{RegistryError, Result},
    vcs::{TreeEntry, TreeEntryKind, VersionControl},
};

/// In-memory [`VersionControl`] serving files registered per commit.
#[derive(Default)]
pub struct FakeVersionControl {
    refs: Mutex<HashMap<(String, String), String>>,
    files: Mutex<HashMap<(String, String), HashMap<String, Vec<u8>>>>,
    trees: Mutex<HashMap<String, PathBuf>>,
    resolves: AtomicUsize,
    extracts: AtomicUsize,
}

impl FakeVersionControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ref(&self, repository: &str, reference: &str, commit: &str) {
        self.refs.lock().unwrap().insert(
            (repository.to_string(), reference.to_string()),
            commit.to_string(),
        );
    }

    pub fn add_file(
        &self,
        repository: &str,
        commit: &str,
        path: &str,
        content: impl AsRef<[u8]>,
    ) {
        self.files
            .lock()
            .unwrap()
            .entry((repository.to_string(), commit.to_string()))
            .or_default()
            .insert(path.to_string(), content.as_ref().to_vec());
    }

    pub fn add_tree(&self, tree_id: &str, path: &str) {
        self.trees
            .lock()
            .unwrap()
            .insert(tree_id.to_string(), PathBuf::from(path));
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn extract_count(&self) -> usize {
        self.extracts.load(Ordering::SeqCst)
    }
}

impl VersionControl for FakeVersionControl {
    fn resolve(&self, repository: &str, reference: &str) -> Result<String> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.refs
            .lock()
            .unwrap()
            .get(&(repository.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| {
                RegistryError::Git {
                    repository: repository.to_string(),
                    detail: format!("unknown reference {reference}"),
                }
            })
    }

    fn list_tree(&self, repository: &str, commit: &str, path: &str) -> Result<Vec<TreeEntry>> {
        let files = self.files.lock().unwrap();
        let Some(files) = files.get(&(repository.to_string(), commit.to_string())) else {
            return Ok(Vec::new());
        };

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let mut seen = BTreeSet::new();
        for file in files.keys() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => seen.insert((dir.to_string(), TreeEntryKind::Tree)),
                None => seen.insert((rest.to_string(), TreeEntryKind::Blob)),
            };
        }

        Ok(seen
            .into_iter()
            .map(|(name, kind)| TreeEntry { name, kind })
            .collect())
    }

    fn read_blob(&self, repository: &str, commit: &str, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&(repository.to_string(), commit.to_string()))
            .and_then(|files| files.get(path).cloned()))
    }

    fn extract_tree(&self, repository: &str, tree_id: &str) -> Result<PathBuf> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        self.trees
            .lock()
            .unwrap()
            .get(tree_id)
            .cloned()
            .ok_or_else(|| {
                RegistryError::Git {
                    repository: repository.to_string(),
                    detail: format!("unknown tree {tree_id}"),
                }
            })
    }
}
