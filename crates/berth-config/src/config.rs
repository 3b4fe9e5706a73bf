use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{LazyLock, RwLock},
};

use berth_utils::{
    path::{resolve_path, xdg_config_home, xdg_data_home},
    pattern::{is_valid_package_pattern, is_wildcard_pattern},
};
use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::{debug, info, warn};

use crate::{
    annotations::{annotate_toml_array_of_tables, annotate_toml_table},
    error::{ConfigError, Result},
    registry::{RegistryConfig, RegistryKind},
};

/// Registry resolution configuration
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Root of the builtin port catalog (`ports/` and `versions/`).
    /// Default: $BERTH_ROOT or $XDG_DATA_HOME/berth
    pub root_path: Option<String>,

    /// Directory holding cached git objects of remote registries.
    /// Default: <root_path>/cache
    pub cache_path: Option<String>,

    /// File pinning git registry references to commits.
    /// Default: <root_path>/berth-lock.json
    pub lockfile_path: Option<String>,

    /// Registry used for ports not claimed by any entry of `registries`.
    /// Default: the builtin registry. Use `kind = "none"` to disable it.
    pub default_registry: Option<RegistryConfig>,

    /// Scoped registries, in priority order.
    pub registries: Vec<RegistryConfig>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("BERTH_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("berth").join("config.toml"),
    })
});

pub fn init() -> Result<()> {
    let config = Config::new()?;
    let mut global_config = CONFIG.write().unwrap();
    *global_config = Some(config);
    Ok(())
}

pub fn get_config() -> Config {
    if let Some(config) = CONFIG.read().unwrap().as_ref() {
        return config.clone();
    }

    let mut config_guard = CONFIG.write().unwrap();
    config_guard.get_or_insert_with(Config::default_config).clone()
}

impl Config {
    pub fn default_config() -> Self {
        let root = std::env::var("BERTH_ROOT")
            .unwrap_or_else(|_| format!("{}/berth", xdg_data_home().display()));

        Self {
            root_path: Some(root.clone()),
            cache_path: Some(format!("{root}/cache")),
            lockfile_path: Some(format!("{root}/berth-lock.json")),
            default_registry: None,
            registries: Vec::new(),
        }
    }

    /// Loads the configuration file, falling back to the default configuration
    /// when it does not exist.
    pub fn new() -> Result<Self> {
        let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => {
                debug!("Loading configuration from {}", config_path.display());
                toml::from_str(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default_config(),
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    /// Validates registry declarations.
    ///
    /// Besides per-registry field checks, a literal package name may be
    /// declared by only one scoped registry.
    pub fn resolve(&mut self) -> Result<()> {
        if let Some(default) = &self.default_registry {
            default.validate()?;
            if !default.packages().is_empty() {
                warn!("`packages` is ignored for the default registry");
            }
        }

        let mut declared: HashMap<&str, usize> = HashMap::new();

        for (index, registry) in self.registries.iter().enumerate() {
            if registry.kind == RegistryKind::None {
                return Err(ConfigError::NoneRegistryNotDefault);
            }
            registry.validate()?;

            if registry.packages().is_empty() {
                return Err(ConfigError::MissingPackages(index));
            }

            for package in registry.packages() {
                if !is_valid_package_pattern(package) {
                    return Err(ConfigError::InvalidPackagePattern(package.clone()));
                }
                if is_wildcard_pattern(package) {
                    continue;
                }
                match declared.get(package.as_str()) {
                    Some(&first) if first != index => {
                        return Err(ConfigError::DuplicatePackage {
                            package: package.clone(),
                            first,
                            second: index,
                        });
                    }
                    Some(_) => {}
                    None => {
                        declared.insert(package.as_str(), index);
                    }
                }
            }
        }

        Ok(())
    }

    /// The default registry in effect: builtin when unset, nothing when
    /// declared with `kind = "none"`.
    pub fn effective_default_registry(&self) -> Option<RegistryConfig> {
        match &self.default_registry {
            None => Some(RegistryConfig::builtin(None)),
            Some(registry) if registry.kind == RegistryKind::None => None,
            Some(registry) => Some(registry.clone()),
        }
    }

    pub fn get_root_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("BERTH_ROOT") {
            return Ok(resolve_path(&env_path)?);
        }
        if let Some(root_path) = &self.root_path {
            return Ok(resolve_path(root_path)?);
        }
        Ok(xdg_data_home().join("berth"))
    }

    pub fn get_cache_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("BERTH_CACHE") {
            return Ok(resolve_path(&env_path)?);
        }
        if let Some(cache_path) = &self.cache_path {
            return Ok(resolve_path(cache_path)?);
        }
        Ok(self.get_root_path()?.join("cache"))
    }

    pub fn get_lockfile_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("BERTH_LOCKFILE") {
            return Ok(resolve_path(&env_path)?);
        }
        if let Some(lockfile_path) = &self.lockfile_path {
            return Ok(resolve_path(lockfile_path)?);
        }
        Ok(self.get_root_path()?.join("berth-lock.json"))
    }

    /// Resolves a filesystem registry's `path` relative to the environment.
    pub fn resolve_registry_path(&self, registry: &RegistryConfig) -> Result<PathBuf> {
        let path = registry
            .path
            .as_deref()
            .ok_or(ConfigError::MissingRegistryField {
                kind: "filesystem",
                field: "path",
            })?;
        Ok(resolve_path(path)?)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = CONFIG_PATH.read().unwrap().to_path_buf();
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&config_path, serialized)?;
        info!("Configuration saved to {}", config_path.display());
        Ok(())
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        annotate_toml_table::<Config>(doc.as_table_mut(), true)?;

        if let Some(table) = doc
            .get_mut("default_registry")
            .and_then(|item| item.as_table_mut())
        {
            annotate_toml_table::<RegistryConfig>(table, false)?;
        }

        if let Some(array) = doc
            .get_mut("registries")
            .and_then(|item| item.as_array_of_tables_mut())
        {
            annotate_toml_array_of_tables::<RegistryConfig>(array)?;
        }

        Ok(doc)
    }
}

pub fn generate_default_config() -> Result<()> {
    let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

    if config_path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let annotated_doc = Config::default_config().to_annotated_document()?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        config_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::test_utils::with_env;

    const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

    fn scoped_git(packages: &[&str]) -> RegistryConfig {
        RegistryConfig::git("https://example.com/registry", COMMIT).with_packages(packages)
    }

    #[test]
    fn test_default_config_uses_builtin_default() {
        let config = Config::default_config();
        assert!(config.registries.is_empty());
        assert_eq!(
            config.effective_default_registry(),
            Some(RegistryConfig::builtin(None))
        );
    }

    #[test]
    fn test_none_default_registry_disables_default() {
        let mut config = Config::default_config();
        config.default_registry = Some(RegistryConfig {
            kind: RegistryKind::None,
            ..RegistryConfig::builtin(None)
        });
        config.resolve().unwrap();
        assert!(config.effective_default_registry().is_none());
    }

    #[test]
    fn test_none_registry_rejected_in_registries() {
        let mut config = Config::default_config();
        config.registries.push(RegistryConfig {
            kind: RegistryKind::None,
            ..RegistryConfig::builtin(None).with_packages(&["zlib"])
        });
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::NoneRegistryNotDefault)
        ));
    }

    #[test]
    fn test_scoped_registry_requires_packages() {
        let mut config = Config::default_config();
        config
            .registries
            .push(RegistryConfig::filesystem("/srv/registry"));
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::MissingPackages(0))
        ));
    }

    #[test]
    fn test_invalid_package_pattern() {
        let mut config = Config::default_config();
        config.registries.push(scoped_git(&["bo*st"]));
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidPackagePattern(p)) if p == "bo*st"
        ));
    }

    #[test]
    fn test_duplicate_literal_package_across_registries() {
        let mut config = Config::default_config();
        config.registries.push(scoped_git(&["zlib", "fmt"]));
        config
            .registries
            .push(RegistryConfig::filesystem("/srv/registry").with_packages(&["zlib"]));

        assert!(matches!(
            config.resolve(),
            Err(ConfigError::DuplicatePackage { package, first: 0, second: 1 }) if package == "zlib"
        ));
    }

    #[test]
    fn test_overlapping_patterns_are_allowed() {
        let mut config = Config::default_config();
        config.registries.push(scoped_git(&["boost-*", "zlib", "zlib"]));
        config
            .registries
            .push(RegistryConfig::filesystem("/srv/registry").with_packages(&["b*"]));
        assert!(config.resolve().is_ok());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let content = format!(
            r#"
            root_path = "/opt/berth"

            [default_registry]
            kind = "builtin"
            baseline = "{COMMIT}"

            [[registries]]
            kind = "git"
            repository = "https://example.com/registry"
            reference = "main"
            baseline = "{COMMIT}"
            packages = ["beicode", "beison"]

            [[registries]]
            kind = "filesystem"
            path = "/srv/registry"
            packages = ["boost-*"]
            "#
        );

        let mut config: Config = toml::from_str(&content).unwrap();
        config.resolve().unwrap();

        assert_eq!(config.registries.len(), 2);
        assert_eq!(config.registries[0].reference(), "main");
        assert_eq!(
            config.effective_default_registry().unwrap().baseline.as_deref(),
            Some(COMMIT)
        );

        let serialized = toml::to_string(&config).unwrap();
        let reparsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.registries, config.registries);
    }

    #[test]
    fn test_annotated_document_contains_docs() {
        let mut config = Config::default_config();
        config.registries.push(scoped_git(&["zlib"]));
        let doc = config.to_annotated_document().unwrap().to_string();
        assert!(doc.contains("# Root of the builtin port catalog"));
        assert!(doc.contains("# Scoped registries, in priority order."));
    }

    #[test]
    #[serial]
    fn test_path_env_overrides() {
        with_env(
            vec![
                ("BERTH_ROOT", Some("/custom/root")),
                ("BERTH_CACHE", None),
                ("BERTH_LOCKFILE", Some("/custom/lock.json")),
            ],
            || {
                let config = Config::default_config();
                assert_eq!(config.get_root_path().unwrap(), PathBuf::from("/custom/root"));
                assert_eq!(
                    config.get_lockfile_path().unwrap(),
                    PathBuf::from("/custom/lock.json")
                );
                assert_eq!(
                    config.get_cache_path().unwrap(),
                    PathBuf::from("/custom/root/cache")
                );
            },
        );
    }

    #[test]
    #[serial]
    fn test_paths_without_env() {
        with_env(
            vec![
                ("BERTH_ROOT", None),
                ("BERTH_CACHE", None),
                ("BERTH_LOCKFILE", None),
            ],
            || {
                let config = Config {
                    root_path: Some("/opt/berth".to_string()),
                    cache_path: None,
                    lockfile_path: None,
                    default_registry: None,
                    registries: Vec::new(),
                };
                assert_eq!(
                    config.get_cache_path().unwrap(),
                    PathBuf::from("/opt/berth/cache")
                );
                assert_eq!(
                    config.get_lockfile_path().unwrap(),
                    PathBuf::from("/opt/berth/berth-lock.json")
                );
            },
        );
    }
}
