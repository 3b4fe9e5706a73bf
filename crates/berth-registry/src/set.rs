//! Selection of the registry responsible for a port.
//!
//! Scoped registries claim ports by name or by `prefix*` pattern. A port is
//! served by the scoped registry with the most specific claim (an exact name
//! beats any pattern, a longer prefix beats a shorter one, and earlier
//! registries win ties). Ports no scoped registry claims fall back to the
//! default registry.

use std::sync::Arc;

use berth_config::{
    config::Config,
    error::ConfigError,
    registry::{RegistryConfig, RegistryKind},
};
use berth_utils::pattern::best_match_score;
use tracing::{debug, info};

use crate::{
    context::RegistryContext,
    error::{RegistryError, Result},
    implementation::{BuiltinRegistry, RegistryImplementation},
    vcs::VersionControl,
    version::Version,
};

/// A backend bound to the packages it provides.
pub struct Registry {
    packages: Vec<String>,
    implementation: RegistryImplementation,
}

impl Registry {
    /// Binds `implementation` to `packages`, which are sorted and deduplicated.
    pub fn new(mut packages: Vec<String>, implementation: RegistryImplementation) -> Self {
        packages.sort();
        packages.dedup();
        Self {
            packages,
            implementation,
        }
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn implementation(&self) -> &RegistryImplementation {
        &self.implementation
    }

    /// Specificity of this registry's best claim on `port_name`; `0` if none.
    pub fn match_score(&self, port_name: &str) -> usize {
        best_match_score(port_name, &self.packages)
    }
}

/// The registries of a project: an optional default plus scoped registries in
/// priority order.
#[derive(Default)]
pub struct RegistrySet {
    default_registry: Option<RegistryImplementation>,
    registries: Vec<Registry>,
}

impl RegistrySet {
    pub fn new(default_registry: Option<RegistryImplementation>, registries: Vec<Registry>) -> Self {
        Self {
            default_registry,
            registries,
        }
    }

    /// Builds the registry set declared by `config`.
    pub fn from_config(config: &Config, ctx: &RegistryContext) -> Result<Self> {
        let default_registry = config
            .effective_default_registry()
            .map(|registry| implementation_from_config(config, &registry, ctx))
            .transpose()?;

        let registries = config
            .registries
            .iter()
            .map(|registry| {
                Ok(Registry::new(
                    registry.packages().to_vec(),
                    implementation_from_config(config, registry, ctx)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Configured {} scoped registries (default: {})",
            registries.len(),
            default_registry.as_ref().map_or("none", |r| r.kind())
        );

        Ok(Self::new(default_registry, registries))
    }

    pub fn default_registry(&self) -> Option<&RegistryImplementation> {
        self.default_registry.as_ref()
    }

    pub fn registries(&self) -> &[Registry] {
        &self.registries
    }

    /// The registry serving `port_name`, if any.
    pub fn registry_for_port(&self, port_name: &str) -> Option<&RegistryImplementation> {
        let mut best: Option<(&Registry, usize)> = None;
        for registry in &self.registries {
            let score = registry.match_score(port_name);
            if score > 0 && best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((registry, score));
            }
        }

        match best {
            Some((registry, _)) => Some(&registry.implementation),
            None => self.default_registry.as_ref(),
        }
    }

    /// Every registry claiming `port_name`, most specific first, followed by
    /// the default registry.
    pub fn registries_for_port(&self, port_name: &str) -> Vec<&RegistryImplementation> {
        let mut candidates: Vec<(usize, &Registry)> = self
            .registries
            .iter()
            .map(|registry| (registry.match_score(port_name), registry))
            .filter(|(score, _)| *score > 0)
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        candidates
            .into_iter()
            .map(|(_, registry)| &registry.implementation)
            .chain(self.default_registry.as_ref())
            .collect()
    }

    /// The baseline version of `port_name` in the registry serving it.
    pub fn baseline_for_port(&self, port_name: &str) -> Result<Version> {
        let registry = self
            .registry_for_port(port_name)
            .ok_or_else(|| RegistryError::NoRegistryForPort(port_name.to_string()))?;
        registry.get_baseline_version(port_name)
    }

    /// Whether this is the out-of-the-box setup: the unpinned builtin catalog
    /// and no scoped registries.
    pub fn is_default_builtin_registry(&self) -> bool {
        self.registries.is_empty()
            && self
                .default_registry
                .as_ref()
                .is_some_and(RegistryImplementation::is_builtin_without_baseline)
    }

    /// Whether the set differs from the out-of-the-box setup.
    pub fn has_modifications(&self) -> bool {
        !self.registries.is_empty() || !self.is_default_builtin_registry()
    }

    /// Pins every builtin registry of the set to `baseline`.
    pub fn experimental_set_builtin_registry_baseline(
        &mut self,
        baseline: &str,
        vc: Arc<dyn VersionControl>,
    ) {
        let pin = |implementation: &mut RegistryImplementation| {
            if let RegistryImplementation::Builtin(builtin) = implementation {
                info!("Pinning builtin registry to baseline {}", baseline);
                *builtin = BuiltinRegistry::with_baseline(builtin.root(), baseline, Arc::clone(&vc));
            }
        };

        if let Some(default) = self.default_registry.as_mut() {
            pin(default);
        }
        for registry in &mut self.registries {
            pin(&mut registry.implementation);
        }
    }

    /// Names of every port some registry of the set can serve, sorted and
    /// deduplicated.
    pub fn get_all_reachable_port_names(&self) -> Vec<String> {
        let mut names = Vec::new();

        if let Some(default) = &self.default_registry {
            default.get_all_port_names(&mut names);
        }

        for registry in &self.registries {
            let mut hosted = Vec::new();
            registry.implementation.get_all_port_names(&mut hosted);
            names.extend(hosted.into_iter().filter(|name| registry.match_score(name) > 0));
        }

        names.sort();
        names.dedup();
        names
    }
}

fn implementation_from_config(
    config: &Config,
    registry: &RegistryConfig,
    ctx: &RegistryContext,
) -> Result<RegistryImplementation> {
    registry.validate()?;

    let implementation = match registry.kind {
        RegistryKind::Builtin => {
            match &registry.baseline {
                Some(baseline) => {
                    RegistryImplementation::builtin_with_baseline(
                        &ctx.builtin_root,
                        baseline.clone(),
                        Arc::clone(&ctx.vc),
                    )
                }
                None => RegistryImplementation::builtin(&ctx.builtin_root),
            }
        }
        RegistryKind::Git => {
            let repository = registry
                .repository
                .clone()
                .ok_or(ConfigError::MissingRegistryField {
                    kind: "git",
                    field: "repository",
                })?;
            RegistryImplementation::git(
                repository,
                registry.reference(),
                registry.baseline.clone(),
                Arc::clone(&ctx.lockfile),
                Arc::clone(&ctx.vc),
            )
        }
        RegistryKind::Filesystem => {
            RegistryImplementation::filesystem(
                config.resolve_registry_path(registry)?,
                registry.filesystem_baseline(),
            )
        }
        RegistryKind::None => return Err(ConfigError::NoneRegistryNotDefault.into()),
    };

    Ok(implementation)
}
