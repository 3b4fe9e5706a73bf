use berth_utils::error::{FileSystemError, PathError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(berth_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(berth_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(berth_config::already_exists),
        help("Remove the existing config file or use a different location")
    )]
    ConfigAlreadyExists,

    #[error("A {kind} registry requires the `{field}` field")]
    #[diagnostic(
        code(berth_config::missing_registry_field),
        help("Add `{field}` to the registry declaration")
    )]
    MissingRegistryField { kind: &'static str, field: &'static str },

    #[error("Registry field `{field}` is not valid for a {kind} registry")]
    #[diagnostic(code(berth_config::unexpected_registry_field))]
    UnexpectedRegistryField { kind: &'static str, field: &'static str },

    #[error("Invalid baseline `{0}`: expected a 40 character lowercase git commit id")]
    #[diagnostic(
        code(berth_config::invalid_baseline),
        help("Use the full commit sha, e.g. the output of `git rev-parse HEAD`")
    )]
    InvalidBaseline(String),

    #[error("Registry kind `none` is only valid for `default_registry`")]
    #[diagnostic(code(berth_config::none_registry))]
    NoneRegistryNotDefault,

    #[error("Registry #{0} does not declare any packages")]
    #[diagnostic(
        code(berth_config::missing_packages),
        help("Scoped registries must list the packages (or `prefix*` patterns) they provide")
    )]
    MissingPackages(usize),

    #[error("Invalid package pattern: {0}")]
    #[diagnostic(
        code(berth_config::invalid_package_pattern),
        help("Package names use lowercase letters, digits and `-`, optionally ending in a single `*`")
    )]
    InvalidPackagePattern(String),

    #[error("Package `{package}` is declared by registry #{first} and registry #{second}")]
    #[diagnostic(
        code(berth_config::duplicate_package),
        help("Each package may only be declared by one registry")
    )]
    DuplicatePackage {
        package: String,
        first: usize,
        second: usize,
    },

    #[error("IO error: {0}")]
    #[diagnostic(code(berth_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(berth_config::utils))]
    Utils(#[from] UtilsError),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(berth_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(berth_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),

    #[error("Failed to annotate first table in array: {0}")]
    #[diagnostic(code(berth_config::annotate_first_table))]
    AnnotateFirstTable(String),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<FileSystemError> for ConfigError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
