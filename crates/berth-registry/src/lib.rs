//! Port registry resolution for the berth package manager.
//!
//! A registry answers three questions about a port: which versions exist,
//! where the files of each version live, and which version is the default
//! (the baseline). This crate implements three kinds of registry and the
//! rules deciding which one serves a given port.
//!
//! # Overview
//!
//! - **Builtin**: the catalog under the berth root, optionally pinned to a
//!   baseline commit of the upstream repository
//! - **Git**: a remote repository whose tracked reference is pinned to a
//!   commit through the shared [`LockFile`]
//! - **Filesystem**: a local directory laid out like a registry
//!
//! A [`RegistrySet`] holds an optional default registry plus scoped
//! registries that claim ports by exact name or `prefix*` pattern.
//!
//! # Example
//!
//! ```no_run
//! use berth_config::config::get_config;
//! use berth_registry::{RegistryContext, RegistrySet};
//!
//! fn default_zlib() -> berth_registry::Result<()> {
//!     let config = get_config();
//!     let ctx = RegistryContext::from_config(&config)?;
//!     let registries = RegistrySet::from_config(&config, &ctx)?;
//!
//!     let version = registries.baseline_for_port("zlib")?;
//!     println!("zlib {version}");
//!
//!     if ctx.lockfile.is_modified() {
//!         ctx.lockfile.save(config.get_lockfile_path()?)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod baseline;
pub mod context;
pub mod entry;
pub mod error;
pub mod implementation;
pub mod lockfile;
pub mod set;
pub mod vcs;
pub mod version;
pub mod versiondb;

#[cfg(test)]
pub mod test_utils;

pub use context::RegistryContext;
pub use entry::{PathAndLocation, RegistryEntry};
pub use error::{ErrorContext, RegistryError, Result, SchemaError};
pub use implementation::RegistryImplementation;
pub use lockfile::{LockEntry, LockFile};
pub use set::{Registry, RegistrySet};
pub use vcs::{GitCommand, VersionControl};
pub use version::{SchemedVersion, Version, VersionScheme};
pub use versiondb::{VersionDbEntry, VersionDbEntryArrayDeserializer, VersionDbEntryDeserializer};
