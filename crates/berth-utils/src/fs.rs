use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::error::{FileSystemError, FileSystemResult};

/// The kind of a directory entry returned by [`FileSystemProvider::list_dir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A single entry returned by [`FileSystemProvider::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

pub trait FileSystemProvider {
    /// Reads a UTF-8 file, returning `Ok(None)` when it does not exist.
    ///
    /// Registry lookups treat a missing file as "not found" rather than as an
    /// error, so only genuine I/O failures are reported.
    ///
    /// # Errors
    ///
    /// Returns a [`FileSystemError::File`] if the file exists but cannot be read.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use berth_utils::error::FileSystemResult;
    /// use berth_utils::fs::{FileSystemProvider, StandardFileSystemProvider};
    ///
    /// fn main() -> FileSystemResult<()> {
    ///     let fs = StandardFileSystemProvider;
    ///     if let Some(text) = fs.read_optional("/registry/versions/baseline.json")? {
    ///         println!("{text}");
    ///     }
    ///     Ok(())
    /// }
    /// ```
    fn read_optional<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<Option<String>>;

    /// Lists the entries of a directory, sorted by name.
    ///
    /// A missing directory yields an empty list. Entries whose names are not valid
    /// UTF-8, and entries that are neither files nor directories, are skipped.
    ///
    /// # Errors
    ///
    /// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
    /// * [`FileSystemError::Directory`] if the directory cannot be read.
    fn list_dir<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<Vec<DirEntry>>;

    /// Creates a directory structure if it doesn't exist.
    ///
    /// # Errors
    ///
    /// * [`FileSystemError::Directory`] if the directory could not be created.
    /// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
    fn ensure_dir_exists<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()>;

    /// Removes the specified file or directory, ignoring paths that do not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`FileSystemError::File`] if the removal fails for any reason other than
    /// the path not existing.
    fn safe_remove<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()>;
}

#[derive(Default, Clone)]
pub struct StandardFileSystemProvider;

impl FileSystemProvider for StandardFileSystemProvider {
    fn read_optional<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<Option<String>> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(FileSystemError::File {
                    path: path.to_path_buf(),
                    action: "read",
                    source: err,
                })
            }
        }
    }

    fn list_dir<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<Vec<DirEntry>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        if !path.is_dir() {
            return Err(FileSystemError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        let dir_error = |err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "read",
                source: err,
            }
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(dir_error)? {
            let entry = entry.map_err(dir_error)?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let file_type = entry.file_type().map_err(dir_error)?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                continue;
            };
            entries.push(DirEntry { name, kind });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn ensure_dir_exists<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path).map_err(|err| {
                FileSystemError::Directory {
                    path: path.to_path_buf(),
                    action: "create",
                    source: err,
                }
            })?;
        } else if !path.is_dir() {
            return Err(FileSystemError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }

    fn safe_remove<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(());
        }

        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        result.map_err(|err| {
            FileSystemError::File {
                path: path.to_path_buf(),
                action: "remove",
                source: err,
            }
        })
    }
}

/// Reads a file, returning `Ok(None)` when it does not exist.
///
/// See [`FileSystemProvider::read_optional`] for detailed documentation.
pub fn read_optional<P: AsRef<Path>>(path: P) -> FileSystemResult<Option<String>> {
    StandardFileSystemProvider.read_optional(path)
}

/// Lists a directory's entries sorted by name.
///
/// See [`FileSystemProvider::list_dir`] for detailed documentation.
pub fn list_dir<P: AsRef<Path>>(path: P) -> FileSystemResult<Vec<DirEntry>> {
    StandardFileSystemProvider.list_dir(path)
}

/// Creates a directory structure if it doesn't exist.
///
/// See [`FileSystemProvider::ensure_dir_exists`] for detailed documentation.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    StandardFileSystemProvider.ensure_dir_exists(path)
}

/// Removes the specified file or directory safely.
///
/// See [`FileSystemProvider::safe_remove`] for detailed documentation.
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    StandardFileSystemProvider.safe_remove(path)
}

/// Writes `content` to `path` through a sibling temporary file and a rename, so
/// readers never observe a half-written file.
pub fn write_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> FileSystemResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir_exists(parent)?;
    }

    let mut tmp = PathBuf::from(path);
    tmp.as_mut_os_string().push(".tmp");

    let file_error = |target: &Path, action, err| {
        FileSystemError::File {
            path: target.to_path_buf(),
            action,
            source: err,
        }
    };

    fs::write(&tmp, content).map_err(|err| file_error(&tmp, "write", err))?;
    fs::rename(&tmp, path).map_err(|err| file_error(path, "replace", err))
}
