//! Pins symbolic git references of registries to commit ids.
//!
//! The lock file maps a repository URI to the references resolved in it. An
//! entry fetched during this process is fresh. Entries loaded from disk are
//! stale: they are used as-is until a lookup misses, at which point the
//! registry refreshes them with [`LockFile::ensure_up_to_date`].

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use berth_utils::{
    fs::{read_optional, write_atomic},
    hash::is_lower_hex,
    lock::FileLock,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{RegistryError, Result},
    vcs::VersionControl,
};

/// Returns `true` if `s` is a full 40 character lowercase git object id.
pub fn is_git_commit_sha(s: &str) -> bool {
    is_lower_hex(s, 40)
}

/// Snapshot of one pinned reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub uri: String,
    pub reference: String,
    pub commit_id: String,
    pub stale: bool,
}

#[derive(Debug, Clone)]
struct EntryData {
    commit_id: String,
    stale: bool,
}

/// A reference slot; `None` until the first successful fetch.
type Slot = Arc<Mutex<Option<EntryData>>>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PersistedEntry {
    reference: String,
    commit_id: String,
    #[serde(default)]
    stale: bool,
}

type PersistedLockFile = BTreeMap<String, Vec<PersistedEntry>>;

/// Process-wide cache of pinned registry references.
///
/// Lookups of different keys proceed independently; lookups of the same
/// (uri, reference) key serialize so the reference is fetched at most once.
#[derive(Debug, Default)]
pub struct LockFile {
    entries: Mutex<BTreeMap<String, Vec<(String, Slot)>>>,
    modified: AtomicBool,
}

impl LockFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the persisted form. Every entry is loaded as stale.
    pub fn from_json(text: &str) -> Result<Self> {
        let persisted: PersistedLockFile = serde_json::from_str(text).map_err(|source| {
            RegistryError::InvalidJson {
                origin: "lock file".to_string(),
                source,
            }
        })?;

        let mut entries = BTreeMap::new();
        for (uri, refs) in persisted {
            let mut slots: Vec<(String, Slot)> = Vec::with_capacity(refs.len());
            for entry in refs {
                if !is_git_commit_sha(&entry.commit_id) {
                    return Err(RegistryError::InvalidCommitId(entry.commit_id));
                }
                if slots.iter().any(|(reference, _)| *reference == entry.reference) {
                    debug!("Ignoring duplicate lock entry {} of {}", entry.reference, uri);
                    continue;
                }
                let data = EntryData {
                    commit_id: entry.commit_id,
                    stale: true,
                };
                slots.push((entry.reference, Arc::new(Mutex::new(Some(data)))));
            }
            entries.insert(uri, slots);
        }

        Ok(Self {
            entries: Mutex::new(entries),
            modified: AtomicBool::new(false),
        })
    }

    /// Loads the lock file at `path`; a missing file yields an empty lock.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match read_optional(path)? {
            Some(text) => {
                debug!("Loading lock file {}", path.display());
                Self::from_json(&text)
            }
            None => Ok(Self::new()),
        }
    }

    /// Serializes every resolved entry, sorted by URI.
    pub fn to_json(&self) -> Result<String> {
        let mut persisted = PersistedLockFile::new();
        for entry in self.entries() {
            persisted
                .entry(entry.uri)
                .or_default()
                .push(PersistedEntry {
                    reference: entry.reference,
                    commit_id: entry.commit_id,
                    stale: entry.stale,
                });
        }

        serde_json::to_string_pretty(&persisted).map_err(|source| {
            RegistryError::InvalidJson {
                origin: "lock file".to_string(),
                source,
            }
        })
    }

    /// Writes the lock file to `path` and clears the modified flag.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;

        let _lock = FileLock::acquire(path)?;
        write_atomic(path, format!("{json}\n").as_bytes())?;
        self.mark_persisted();

        info!("Lock file saved to {}", path.display());
        Ok(())
    }

    /// Returns the slot of (uri, reference), creating an empty one if needed.
    fn slot(&self, uri: &str, reference: &str) -> Slot {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let refs = entries.entry(uri.to_string()).or_default();
        if let Some((_, slot)) = refs.iter().find(|(r, _)| r == reference) {
            return Arc::clone(slot);
        }
        let slot = Slot::default();
        refs.push((reference.to_string(), Arc::clone(&slot)));
        slot
    }

    fn resolve_into(
        &self,
        vc: &dyn VersionControl,
        uri: &str,
        reference: &str,
        data: &mut Option<EntryData>,
    ) -> Result<LockEntry> {
        let commit_id = vc.resolve(uri, reference)?;
        if !is_git_commit_sha(&commit_id) {
            return Err(RegistryError::InvalidCommitId(commit_id));
        }

        *data = Some(EntryData {
            commit_id: commit_id.clone(),
            stale: false,
        });
        self.modified.store(true, Ordering::SeqCst);

        Ok(LockEntry {
            uri: uri.to_string(),
            reference: reference.to_string(),
            commit_id,
            stale: false,
        })
    }

    /// Returns the pinned commit of `reference` in `uri`, fetching it when the
    /// key is unknown.
    pub fn get_or_fetch(
        &self,
        vc: &dyn VersionControl,
        uri: &str,
        reference: &str,
    ) -> Result<LockEntry> {
        let slot = self.slot(uri, reference);
        let mut data = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = data.as_ref() {
            debug!(
                "Lock entry {}@{} -> {} (stale: {})",
                uri, reference, existing.commit_id, existing.stale
            );
            return Ok(LockEntry {
                uri: uri.to_string(),
                reference: reference.to_string(),
                commit_id: existing.commit_id.clone(),
                stale: existing.stale,
            });
        }

        info!("Resolving {} of {}", reference, uri);
        self.resolve_into(vc, uri, reference, &mut data)
    }

    /// Re-resolves `reference` in `uri` if its entry is stale or missing.
    ///
    /// A refreshed entry is no longer stale, even when the commit did not
    /// change. Fresh entries are returned unchanged.
    pub fn ensure_up_to_date(
        &self,
        vc: &dyn VersionControl,
        uri: &str,
        reference: &str,
    ) -> Result<LockEntry> {
        let slot = self.slot(uri, reference);
        let mut data = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = data.as_ref().filter(|d| !d.stale) {
            return Ok(LockEntry {
                uri: uri.to_string(),
                reference: reference.to_string(),
                commit_id: existing.commit_id.clone(),
                stale: false,
            });
        }

        info!("Refreshing {} of {}", reference, uri);
        self.resolve_into(vc, uri, reference, &mut data)
    }

    /// Snapshot of every resolved entry, sorted by URI then insertion order.
    pub fn entries(&self) -> Vec<LockEntry> {
        let slots: Vec<(String, String, Slot)> = {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .iter()
                .flat_map(|(uri, refs)| {
                    refs.iter().map(move |(reference, slot)| {
                        (uri.clone(), reference.clone(), Arc::clone(slot))
                    })
                })
                .collect()
        };

        slots
            .into_iter()
            .filter_map(|(uri, reference, slot)| {
                let data = slot.lock().unwrap_or_else(PoisonError::into_inner);
                data.as_ref().map(|d| {
                    LockEntry {
                        uri,
                        reference,
                        commit_id: d.commit_id.clone(),
                        stale: d.stale,
                    }
                })
            })
            .collect()
    }

    /// Whether any entry was fetched or refreshed since the last save.
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    pub fn mark_persisted(&self) {
        self.modified.store(false, Ordering::SeqCst);
    }
}
