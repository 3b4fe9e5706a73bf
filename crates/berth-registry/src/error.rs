//! Error types for the registry crate.
//!
//! [`RegistryError`] is returned by every fallible registry operation.
//! [`SchemaError`] describes a malformed version database or baseline row and
//! carries the JSON path of the offending value.

use berth_config::error::ConfigError;
use berth_utils::error::{FileSystemError, LockError, PathError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

/// A JSON value that does not match the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {message} (while reading {type_name})")]
pub struct SchemaError {
    /// JSON path of the offending value, e.g. `$.versions[2].git-tree`.
    pub path: String,
    /// Human readable name of the expected type.
    pub type_name: &'static str,
    pub message: String,
}

impl SchemaError {
    pub fn new(path: impl Into<String>, type_name: &'static str, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            type_name,
            message: message.into(),
        }
    }
}

/// Errors that can occur while resolving ports against registries.
#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(berth_registry::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {origin}: {source}")]
    #[diagnostic(
        code(berth_registry::json),
        help("The file may be corrupted or in an invalid format")
    )]
    InvalidJson {
        origin: String,
        source: serde_json::Error,
    },

    #[error("Invalid {origin}: {source}")]
    #[diagnostic(code(berth_registry::schema))]
    Schema { origin: String, source: SchemaError },

    #[error("{origin} is not valid UTF-8")]
    #[diagnostic(code(berth_registry::encoding))]
    InvalidEncoding {
        origin: String,
        source: std::string::FromUtf8Error,
    },

    #[error("Invalid port manifest {origin}: {message}")]
    #[diagnostic(code(berth_registry::manifest))]
    InvalidManifest { origin: String, message: String },

    #[error("Version {version} of port `{port}` is not in the registry")]
    #[diagnostic(
        code(berth_registry::version_not_found),
        help("Check the versions database of the registry providing `{port}`")
    )]
    VersionNotFound { port: String, version: String },

    #[error("Baseline `{baseline}` not found in {origin}")]
    #[diagnostic(
        code(berth_registry::baseline_missing),
        help("Make sure the baseline exists in `versions/baseline.json` of the registry")
    )]
    BaselineMissing { baseline: String, origin: String },

    #[error("Port `{port}` has no entry in baseline `{baseline}`")]
    #[diagnostic(code(berth_registry::baseline_entry_missing))]
    BaselineEntryMissing { port: String, baseline: String },

    #[error("No registry provides port `{0}`")]
    #[diagnostic(
        code(berth_registry::no_registry),
        help("Add the port to the `packages` of a registry or configure a default registry")
    )]
    NoRegistryForPort(String),

    #[error("Git operation on {repository} failed: {detail}")]
    #[diagnostic(
        code(berth_registry::git),
        help("Verify the repository URL is correct and accessible")
    )]
    Git { repository: String, detail: String },

    #[error("Invalid commit id `{0}`: expected 40 lowercase hex digits")]
    #[diagnostic(code(berth_registry::invalid_commit))]
    InvalidCommitId(String),

    #[error(transparent)]
    #[diagnostic(code(berth_registry::utils))]
    Utils(#[from] UtilsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

impl From<FileSystemError> for RegistryError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

impl From<PathError> for RegistryError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<LockError> for RegistryError {
    fn from(err: LockError) -> Self {
        Self::Utils(UtilsError::Lock(err))
    }
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    /// Adds context to an error, describing what action was being performed.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            RegistryError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::NoRegistryForPort("zlib".to_string());
        assert_eq!(err.to_string(), "No registry provides port `zlib`");

        let err = RegistryError::VersionNotFound {
            port: "zlib".to_string(),
            version: "1.2.11#9".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Version 1.2.11#9 of port `zlib` is not in the registry"
        );
    }

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::new(
            "$.versions[2].git-tree",
            "a version database entry",
            "expected a git object id",
        );
        assert_eq!(
            err.to_string(),
            "$.versions[2].git-tree: expected a git object id (while reading a version database entry)"
        );
    }

    #[test]
    fn test_with_context() {
        let result: std::io::Result<()> = Err(std::io::Error::other("boom"));
        let err = result.with_context(|| "reading baseline".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Error while reading baseline: boom");
    }
}
