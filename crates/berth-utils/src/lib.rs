//! Shared helpers for the berth registry crates: error types, filesystem
//! access, path expansion, advisory file locks and package-name patterns.

pub mod error;
pub mod fs;
pub mod hash;
pub mod lock;
pub mod path;
pub mod pattern;
