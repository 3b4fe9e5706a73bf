use std::{
    env,
    iter::Peekable,
    path::{Path, PathBuf},
    str::Chars,
};

use crate::error::{PathError, PathResult};

/// Prefix marking a path as relative to a filesystem registry's root.
pub const REGISTRY_ROOT_PREFIX: &str = "$/";

pub trait PathResolver {
    /// Resolves a path string that may contain environment variables.
    ///
    /// Expands `$VAR` and `${VAR}`, resolves a leading `~` to the user's home
    /// directory, and makes relative paths absolute against the current
    /// working directory.
    ///
    /// # Errors
    ///
    /// * [`PathError::Empty`] if the path is empty
    /// * [`PathError::CurrentDir`] if the current directory cannot be determined
    /// * [`PathError::MissingEnvVar`] if a referenced variable is undefined
    /// * [`PathError::UnclosedVariable`] if a `${` is never closed
    ///
    /// # Example
    ///
    /// ```
    /// use berth_utils::error::PathResult;
    /// use berth_utils::path::{PathResolver, SystemPathResolver};
    ///
    /// fn main() -> PathResult<()> {
    ///     let resolved = SystemPathResolver.resolve_path("$HOME/.local/share/berth")?;
    ///     println!("Resolved path is {:#?}", resolved);
    ///     Ok(())
    /// }
    /// ```
    fn resolve_path(&self, path: &str) -> PathResult<PathBuf>;

    /// Returns the user's home directory.
    ///
    /// Uses `HOME`, falling back to the passwd entry of the current user.
    fn home_dir(&self) -> PathBuf;

    /// `XDG_CONFIG_HOME`, or `$HOME/.config`.
    fn xdg_config_home(&self) -> PathBuf {
        env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.home_dir().join(".config"))
    }

    /// `XDG_DATA_HOME`, or `$HOME/.local/share`.
    fn xdg_data_home(&self) -> PathBuf {
        env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.home_dir().join(".local/share"))
    }

    /// `XDG_CACHE_HOME`, or `$HOME/.cache`.
    fn xdg_cache_home(&self) -> PathBuf {
        env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.home_dir().join(".cache"))
    }
}

/// The default [`PathResolver`] backed by the process environment.
pub struct SystemPathResolver;

impl PathResolver for SystemPathResolver {
    fn resolve_path(&self, path: &str) -> PathResult<PathBuf> {
        let path = path.trim();

        if path.is_empty() {
            return Err(PathError::Empty);
        }

        let path_buf = PathBuf::from(self.expand_variables(path)?);

        if path_buf.is_absolute() {
            Ok(path_buf)
        } else {
            env::current_dir()
                .map(|cwd| cwd.join(path_buf))
                .map_err(|err| PathError::CurrentDir { source: err })
        }
    }

    fn home_dir(&self) -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home);
        }

        nix::unistd::User::from_uid(nix::unistd::getuid())
            .ok()
            .flatten()
            .map(|user| user.dir)
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}

impl SystemPathResolver {
    fn expand_variables(&self, path: &str) -> PathResult<String> {
        let mut result = String::with_capacity(path.len());
        let mut chars = path.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    let var_name = Self::consume_braced(&mut chars)?;
                    self.push_env_var(&var_name, &mut result, path)?;
                }
                '$' => {
                    let var_name = Self::consume_var_name(&mut chars);
                    if var_name.is_empty() {
                        result.push('$');
                    } else {
                        self.push_env_var(&var_name, &mut result, path)?;
                    }
                }
                '~' if result.is_empty() => result.push_str(&self.home_dir().to_string_lossy()),
                _ => result.push(c),
            }
        }

        Ok(result)
    }

    fn consume_braced(chars: &mut Peekable<Chars>) -> PathResult<String> {
        let mut var_name = String::new();
        for c in chars.by_ref() {
            if c == '}' {
                return Ok(var_name);
            }
            var_name.push(c);
        }

        Err(PathError::UnclosedVariable {
            input: format!("${{{var_name}"),
        })
    }

    fn consume_var_name(chars: &mut Peekable<Chars>) -> String {
        let mut var_name = String::new();
        while let Some(c) = chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
            var_name.push(c);
        }
        var_name
    }

    fn push_env_var(&self, var_name: &str, result: &mut String, original: &str) -> PathResult<()> {
        let value = match var_name {
            "HOME" => self.home_dir(),
            "XDG_CONFIG_HOME" => self.xdg_config_home(),
            "XDG_DATA_HOME" => self.xdg_data_home(),
            "XDG_CACHE_HOME" => self.xdg_cache_home(),
            _ => {
                let value = env::var(var_name).map_err(|_| {
                    PathError::MissingEnvVar {
                        input: original.into(),
                        var: var_name.into(),
                    }
                })?;
                PathBuf::from(value)
            }
        };
        result.push_str(&value.to_string_lossy());
        Ok(())
    }
}

/// Resolves a path string using the system path resolver.
///
/// See [`PathResolver::resolve_path`] for detailed documentation.
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    SystemPathResolver.resolve_path(path)
}

/// See [`PathResolver::xdg_config_home`].
pub fn xdg_config_home() -> PathBuf {
    SystemPathResolver.xdg_config_home()
}

/// See [`PathResolver::xdg_data_home`].
pub fn xdg_data_home() -> PathBuf {
    SystemPathResolver.xdg_data_home()
}

/// Resolves a `$/`-prefixed registry path against `root`.
///
/// Filesystem registries store port locations as `$/ports/zlib/1.3`. The
/// segments after the prefix must be plain names: `.`, `..`, empty segments
/// and backslashes are rejected so an entry can never point outside `root`.
///
/// # Errors
///
/// * [`PathError::NotRegistryRelative`] if `input` lacks the `$/` prefix
/// * [`PathError::EscapesRoot`] if a segment is not a plain name
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use berth_utils::path::registry_relative_path;
///
/// let path = registry_relative_path(Path::new("/registry"), "$/ports/zlib").unwrap();
/// assert_eq!(path, Path::new("/registry/ports/zlib"));
/// ```
pub fn registry_relative_path(root: &Path, input: &str) -> PathResult<PathBuf> {
    let Some(rest) = input.strip_prefix(REGISTRY_ROOT_PREFIX) else {
        return Err(PathError::NotRegistryRelative {
            input: input.into(),
        });
    };

    if rest.contains('\\') {
        return Err(PathError::EscapesRoot {
            input: input.into(),
        });
    }

    let mut path = root.to_path_buf();
    for segment in rest.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(PathError::EscapesRoot {
                input: input.into(),
            });
        }
        path.push(segment);
    }

    Ok(path)
}

/// Renders `path` as a `$/`-prefixed registry path if it lives under `root`.
pub fn to_registry_relative(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    if segments.is_empty() {
        return None;
    }
    Some(format!("{REGISTRY_ROOT_PREFIX}{}", segments.join("/")))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_expand_variables_simple_and_braced() {
        env::set_var("BERTH_TEST_VAR", "value");
        let resolver = SystemPathResolver;
        assert_eq!(
            resolver.expand_variables("$BERTH_TEST_VAR/path").unwrap(),
            "value/path"
        );
        assert_eq!(
            resolver.expand_variables("${BERTH_TEST_VAR}_x").unwrap(),
            "value_x"
        );
        env::remove_var("BERTH_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_variables_missing_var() {
        env::remove_var("BERTH_MISSING_VAR");
        let result = SystemPathResolver.expand_variables("$BERTH_MISSING_VAR/path");
        assert!(matches!(result, Err(PathError::MissingEnvVar { .. })));
    }

    #[test]
    fn test_expand_variables_unclosed() {
        let result = SystemPathResolver.expand_variables("${UNCLOSED/path");
        assert!(matches!(result, Err(PathError::UnclosedVariable { .. })));
    }

    #[test]
    fn test_expand_variables_lone_dollar() {
        assert_eq!(SystemPathResolver.expand_variables("a$/b").unwrap(), "a$/b");
    }

    #[test]
    #[serial]
    fn test_resolve_path_home_and_relative() {
        env::set_var("HOME", "/home/berth");
        assert_eq!(
            resolve_path("~/data").unwrap(),
            PathBuf::from("/home/berth/data")
        );

        let cwd = env::current_dir().unwrap();
        assert_eq!(resolve_path("registry").unwrap(), cwd.join("registry"));
        assert!(matches!(resolve_path("  "), Err(PathError::Empty)));
    }

    #[test]
    #[serial]
    fn test_xdg_fallbacks() {
        env::set_var("HOME", "/home/berth");
        env::remove_var("XDG_DATA_HOME");
        assert_eq!(xdg_data_home(), PathBuf::from("/home/berth/.local/share"));

        env::set_var("XDG_DATA_HOME", "/xdg/data");
        assert_eq!(xdg_data_home(), PathBuf::from("/xdg/data"));
        env::remove_var("XDG_DATA_HOME");
    }

    #[test]
    fn test_registry_relative_path() {
        let root = Path::new("/registry");
        assert_eq!(
            registry_relative_path(root, "$/ports/zlib/1.3").unwrap(),
            PathBuf::from("/registry/ports/zlib/1.3")
        );
    }

    #[test]
    fn test_registry_relative_path_rejects_escapes() {
        let root = Path::new("/registry");
        for bad in ["$/../etc", "$/ports/./zlib", "$/ports//zlib", "$/ports\\zlib", "$/"] {
            assert!(
                matches!(
                    registry_relative_path(root, bad),
                    Err(PathError::EscapesRoot { .. })
                ),
                "{bad} should be rejected"
            );
        }
        assert!(matches!(
            registry_relative_path(root, "ports/zlib"),
            Err(PathError::NotRegistryRelative { .. })
        ));
    }

    #[test]
    fn test_to_registry_relative() {
        let root = Path::new("/registry");
        assert_eq!(
            to_registry_relative(root, Path::new("/registry/ports/zlib")).as_deref(),
            Some("$/ports/zlib")
        );
        assert!(to_registry_relative(root, Path::new("/elsewhere/zlib")).is_none());
        assert!(to_registry_relative(root, root).is_none());
    }
}
