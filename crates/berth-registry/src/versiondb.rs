//! Version database rows and their JSON encodings.
//!
//! A version database lists every known version of a port together with the
//! place its definition is stored. Git-backed registries store a git tree id
//! (`git-tree`), filesystem registries a registry-relative path (`path`).
//! Both encodings decode into [`VersionDbEntry`].

use std::path::{Path, PathBuf};

use berth_utils::path::{registry_relative_path, to_registry_relative};
use serde_json::{Map, Value};

use crate::{
    error::{RegistryError, Result, SchemaError},
    lockfile::is_git_commit_sha,
    version::{SchemedVersion, Version, VersionScheme},
};

/// Which encoding a version database uses for row locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionDbType {
    Git,
    Filesystem,
}

impl VersionDbType {
    /// The JSON field holding the location of a row.
    pub fn location_field(&self) -> &'static str {
        match self {
            VersionDbType::Git => "git-tree",
            VersionDbType::Filesystem => "path",
        }
    }

    fn other_location_field(&self) -> &'static str {
        match self {
            VersionDbType::Git => "path",
            VersionDbType::Filesystem => "git-tree",
        }
    }
}

/// Where the definition of one version is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionDbLocation {
    /// A git tree object id.
    GitTree(String),
    /// An absolute path below the registry root.
    Path(PathBuf),
}

/// One row of a version database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDbEntry {
    pub version: SchemedVersion,
    pub location: VersionDbLocation,
}

impl VersionDbEntry {
    pub fn git_tree(&self) -> Option<&str> {
        match &self.location {
            VersionDbLocation::GitTree(tree) => Some(tree),
            VersionDbLocation::Path(_) => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            VersionDbLocation::GitTree(_) => None,
            VersionDbLocation::Path(path) => Some(path),
        }
    }

    /// Serializes the row back to its on-disk form.
    ///
    /// Paths below `registry_root` are written as `$/` paths; any other path is
    /// written verbatim.
    pub fn to_json(&self, registry_root: &Path) -> Value {
        let mut obj = Map::new();
        obj.insert(
            self.version.scheme.field_name().to_string(),
            Value::String(self.version.version.text().to_string()),
        );
        if self.version.version.port_version() > 0 {
            obj.insert(
                "port-version".to_string(),
                Value::from(self.version.version.port_version()),
            );
        }

        match &self.location {
            VersionDbLocation::GitTree(tree) => {
                obj.insert("git-tree".to_string(), Value::String(tree.clone()));
            }
            VersionDbLocation::Path(path) => {
                let rendered = to_registry_relative(registry_root, path)
                    .unwrap_or_else(|| path.display().to_string());
                obj.insert("path".to_string(), Value::String(rendered));
            }
        }

        Value::Object(obj)
    }
}

/// Decodes a single version database row.
#[derive(Debug, Clone)]
pub struct VersionDbEntryDeserializer {
    db_type: VersionDbType,
    registry_root: PathBuf,
}

impl VersionDbEntryDeserializer {
    pub fn new(db_type: VersionDbType, registry_root: impl Into<PathBuf>) -> Self {
        Self {
            db_type,
            registry_root: registry_root.into(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        "a version database entry"
    }

    /// Fields permitted in a row of this database type.
    pub fn valid_fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<_> = VersionScheme::ALL.iter().map(|s| s.field_name()).collect();
        fields.push("port-version");
        fields.push(self.db_type.location_field());
        fields
    }

    pub fn deserialize(
        &self,
        value: &Value,
        path: &str,
    ) -> std::result::Result<VersionDbEntry, SchemaError> {
        let err = |at: String, message: String| SchemaError::new(at, self.type_name(), message);

        let Some(obj) = value.as_object() else {
            return Err(err(path.to_string(), "expected an object".to_string()));
        };

        let valid_fields = self.valid_fields();
        for key in obj.keys() {
            if key == self.db_type.other_location_field() {
                return Err(err(
                    format!("{path}.{key}"),
                    format!(
                        "`{key}` is not valid in a {} registry; expected `{}`",
                        match self.db_type {
                            VersionDbType::Git => "git",
                            VersionDbType::Filesystem => "filesystem",
                        },
                        self.db_type.location_field()
                    ),
                ));
            }
            if !valid_fields.contains(&key.as_str()) {
                return Err(err(
                    format!("{path}.{key}"),
                    format!("unexpected field, expected one of: {}", valid_fields.join(", ")),
                ));
            }
        }

        let mut schemes = VersionScheme::ALL
            .into_iter()
            .filter(|scheme| obj.contains_key(scheme.field_name()));
        let scheme = match (schemes.next(), schemes.next()) {
            (Some(scheme), None) => scheme,
            (None, _) => {
                return Err(err(
                    path.to_string(),
                    "missing a version field (version, version-semver, version-date or version-string)"
                        .to_string(),
                ));
            }
            (Some(first), Some(second)) => {
                return Err(err(
                    path.to_string(),
                    format!("found both `{first}` and `{second}`; only one version field is allowed"),
                ));
            }
        };

        let field = scheme.field_name();
        let text = obj[field]
            .as_str()
            .ok_or_else(|| err(format!("{path}.{field}"), "expected a string".to_string()))?;
        scheme
            .validate(text)
            .map_err(|message| err(format!("{path}.{field}"), message))?;

        let port_version = match obj.get("port-version") {
            None => 0,
            Some(value) => {
                value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        err(
                            format!("{path}.port-version"),
                            "expected a non-negative integer".to_string(),
                        )
                    })?
            }
        };

        let location_field = self.db_type.location_field();
        let location_path = format!("{path}.{location_field}");
        let location_text = obj
            .get(location_field)
            .ok_or_else(|| err(path.to_string(), format!("missing required field `{location_field}`")))?
            .as_str()
            .ok_or_else(|| err(location_path.clone(), "expected a string".to_string()))?;

        let location = match self.db_type {
            VersionDbType::Git => {
                if !is_git_commit_sha(location_text) {
                    return Err(err(
                        location_path,
                        format!("`{location_text}` is not a 40 character lowercase git object id"),
                    ));
                }
                VersionDbLocation::GitTree(location_text.to_string())
            }
            VersionDbType::Filesystem => {
                let resolved = registry_relative_path(&self.registry_root, location_text)
                    .map_err(|e| err(location_path, e.to_string()))?;
                VersionDbLocation::Path(resolved)
            }
        };

        Ok(VersionDbEntry {
            version: SchemedVersion::new(scheme, Version::new(text, port_version)),
            location,
        })
    }
}

/// Decodes an array of version database rows.
#[derive(Debug, Clone)]
pub struct VersionDbEntryArrayDeserializer {
    inner: VersionDbEntryDeserializer,
}

impl VersionDbEntryArrayDeserializer {
    pub fn new(db_type: VersionDbType, registry_root: impl Into<PathBuf>) -> Self {
        Self {
            inner: VersionDbEntryDeserializer::new(db_type, registry_root),
        }
    }

    pub fn type_name(&self) -> &'static str {
        "an array of versions"
    }

    pub fn deserialize(
        &self,
        value: &Value,
        path: &str,
    ) -> std::result::Result<Vec<VersionDbEntry>, SchemaError> {
        let Some(items) = value.as_array() else {
            return Err(SchemaError::new(path, self.type_name(), "expected an array"));
        };

        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.inner.deserialize(item, &format!("{path}[{i}]")))
            .collect()
    }
}

/// Path of the versions file of `port_name`, relative to the registry root.
///
/// ```
/// assert_eq!(berth_registry::versiondb::versions_file_path("zlib"), "versions/z-/zlib.json");
/// ```
pub fn versions_file_path(port_name: &str) -> String {
    let first = port_name.chars().next().unwrap_or('_');
    format!("versions/{first}-/{port_name}.json")
}

/// Parses a `{"versions": [...]}` document.
///
/// `origin` names the document in error messages.
pub fn load_versions_file(
    text: &str,
    db_type: VersionDbType,
    registry_root: &Path,
    origin: &str,
) -> Result<Vec<VersionDbEntry>> {
    let document: Value = serde_json::from_str(text).map_err(|source| {
        RegistryError::InvalidJson {
            origin: origin.to_string(),
            source,
        }
    })?;

    let schema_error = |source| {
        RegistryError::Schema {
            origin: origin.to_string(),
            source,
        }
    };

    let deserializer = VersionDbEntryArrayDeserializer::new(db_type, registry_root);
    let versions = document
        .as_object()
        .ok_or_else(|| schema_error(SchemaError::new("$", "a versions file", "expected an object")))?
        .get("versions")
        .ok_or_else(|| {
            schema_error(SchemaError::new(
                "$",
                "a versions file",
                "missing required field `versions`",
            ))
        })?;

    deserializer
        .deserialize(versions, "$.versions")
        .map_err(schema_error)
}
