//! Port versions and the schemes used to compare them.

use std::{cmp::Ordering, fmt, sync::LazyLock};

use regex::Regex;

static RELAXED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)*)(?:-([0-9A-Za-z.-]+))?(?:\+[0-9A-Za-z.-]+)?$").unwrap()
});

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})((?:\.\d+)*)$").unwrap());

/// How the version strings of a port are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionScheme {
    /// Dot separated numbers with an optional pre-release tag (`version`).
    Relaxed,
    /// Semantic versioning 2.0 (`version-semver`).
    Semver,
    /// `YYYY-MM-DD` followed by optional `.N` components (`version-date`).
    Date,
    /// Opaque text, only comparable for equality (`version-string`).
    String,
}

impl VersionScheme {
    pub const ALL: [VersionScheme; 4] = [
        VersionScheme::Relaxed,
        VersionScheme::Semver,
        VersionScheme::Date,
        VersionScheme::String,
    ];

    /// The JSON field carrying a version of this scheme.
    pub fn field_name(&self) -> &'static str {
        match self {
            VersionScheme::Relaxed => "version",
            VersionScheme::Semver => "version-semver",
            VersionScheme::Date => "version-date",
            VersionScheme::String => "version-string",
        }
    }

    pub fn from_field_name(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.field_name() == field)
    }

    /// Checks that `text` is well formed under this scheme.
    pub fn validate(&self, text: &str) -> Result<(), String> {
        if text.is_empty() {
            return Err("version text must not be empty".to_string());
        }
        if text.contains('#') {
            return Err(format!(
                "`{text}` contains `#`; use `port-version` for port revisions"
            ));
        }

        let valid = match self {
            VersionScheme::Relaxed => RELAXED_RE.is_match(text),
            VersionScheme::Semver => semver::Version::parse(text).is_ok(),
            VersionScheme::Date => DATE_RE.is_match(text),
            VersionScheme::String => true,
        };

        if valid {
            Ok(())
        } else {
            Err(format!("`{text}` is not a valid {} value", self.field_name()))
        }
    }
}

impl fmt::Display for VersionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A version of a port: upstream version text plus the port revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    text: String,
    port_version: u32,
}

impl Version {
    pub fn new(text: impl Into<String>, port_version: u32) -> Self {
        Self {
            text: text.into(),
            port_version,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn port_version(&self) -> u32 {
        self.port_version
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port_version > 0 {
            write!(f, "{}#{}", self.text, self.port_version)
        } else {
            f.write_str(&self.text)
        }
    }
}

/// A version together with the scheme it was declared with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemedVersion {
    pub scheme: VersionScheme,
    pub version: Version,
}

impl SchemedVersion {
    pub fn new(scheme: VersionScheme, version: Version) -> Self {
        Self { scheme, version }
    }
}

/// Compares two versions of the same port under `scheme`.
///
/// Returns `None` when the texts are not comparable: unequal `version-string`
/// values, or texts that are malformed for the scheme. Equal texts are ordered
/// by port version.
pub fn compare_versions(a: &Version, b: &Version, scheme: VersionScheme) -> Option<Ordering> {
    let text_order = if a.text == b.text {
        Ordering::Equal
    } else {
        match scheme {
            VersionScheme::String => return None,
            VersionScheme::Relaxed => compare_relaxed(&a.text, &b.text)?,
            VersionScheme::Semver => compare_semver(&a.text, &b.text)?,
            VersionScheme::Date => compare_date(&a.text, &b.text)?,
        }
    };

    Some(text_order.then(a.port_version.cmp(&b.port_version)))
}

fn numeric_components(text: &str) -> Option<Vec<u64>> {
    text.split('.')
        .filter(|c| !c.is_empty())
        .map(|c| c.parse().ok())
        .collect()
}

fn compare_relaxed(a: &str, b: &str) -> Option<Ordering> {
    let ca = RELAXED_RE.captures(a)?;
    let cb = RELAXED_RE.captures(b)?;

    let na = numeric_components(&ca[1])?;
    let nb = numeric_components(&cb[1])?;

    let pre = match (ca.get(2), cb.get(2)) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(pa), Some(pb)) => pa.as_str().cmp(pb.as_str()),
    };

    Some(na.cmp(&nb).then(pre))
}

fn compare_semver(a: &str, b: &str) -> Option<Ordering> {
    let mut va = semver::Version::parse(a).ok()?;
    let mut vb = semver::Version::parse(b).ok()?;
    va.build = semver::BuildMetadata::EMPTY;
    vb.build = semver::BuildMetadata::EMPTY;
    Some(va.cmp(&vb))
}

fn compare_date(a: &str, b: &str) -> Option<Ordering> {
    let ca = DATE_RE.captures(a)?;
    let cb = DATE_RE.captures(b)?;

    let suffix_a = numeric_components(&ca[2])?;
    let suffix_b = numeric_components(&cb[2])?;

    Some(ca[1].cmp(&cb[1]).then(suffix_a.cmp(&suffix_b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_port_version() {
        assert_eq!(Version::new("1.2.11", 0).to_string(), "1.2.11");
        assert_eq!(Version::new("1.2.11", 9).to_string(), "1.2.11#9");
    }

    #[test]
    fn test_scheme_field_names() {
        for scheme in VersionScheme::ALL {
            assert_eq!(VersionScheme::from_field_name(scheme.field_name()), Some(scheme));
        }
        assert_eq!(VersionScheme::from_field_name("port-version"), None);
    }

    #[test]
    fn test_validate() {
        assert!(VersionScheme::Relaxed.validate("1.2.11").is_ok());
        assert!(VersionScheme::Relaxed.validate("1.2-rc1").is_ok());
        assert!(VersionScheme::Relaxed.validate("1.2.x").is_err());
        assert!(VersionScheme::Semver.validate("1.0.0-alpha+001").is_ok());
        assert!(VersionScheme::Semver.validate("1.0").is_err());
        assert!(VersionScheme::Date.validate("2021-01-01.2").is_ok());
        assert!(VersionScheme::Date.validate("2021-1-1").is_err());
        assert!(VersionScheme::String.validate("vista").is_ok());
        assert!(VersionScheme::String.validate("1.0#2").is_err());
        assert!(VersionScheme::String.validate("").is_err());
    }

    #[test]
    fn test_compare_relaxed() {
        let cmp = |a: &str, b: &str| {
            compare_versions(&Version::new(a, 0), &Version::new(b, 0), VersionScheme::Relaxed)
        };
        assert_eq!(cmp("1.10", "1.9"), Some(Ordering::Greater));
        assert_eq!(cmp("1.0", "1.0.0"), Some(Ordering::Less));
        assert_eq!(cmp("2.0-rc1", "2.0"), Some(Ordering::Less));
        assert_eq!(cmp("garbage", "1.0"), None);
    }

    #[test]
    fn test_compare_semver_ignores_build() {
        let a = Version::new("1.0.0+build1", 0);
        let b = Version::new("1.0.0+build2", 0);
        assert_eq!(
            compare_versions(&a, &b, VersionScheme::Semver),
            Some(Ordering::Equal)
        );
        let pre = Version::new("1.0.0-alpha", 0);
        assert_eq!(
            compare_versions(&pre, &a, VersionScheme::Semver),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_compare_date() {
        let a = Version::new("2021-01-01.1", 0);
        let b = Version::new("2021-01-01", 0);
        let c = Version::new("2020-12-31.5", 0);
        assert_eq!(compare_versions(&a, &b, VersionScheme::Date), Some(Ordering::Greater));
        assert_eq!(compare_versions(&c, &b, VersionScheme::Date), Some(Ordering::Less));
    }

    #[test]
    fn test_compare_string_and_port_version() {
        let a = Version::new("vista", 1);
        let b = Version::new("vista", 3);
        let c = Version::new("xp", 0);
        assert_eq!(compare_versions(&a, &b, VersionScheme::String), Some(Ordering::Less));
        assert_eq!(compare_versions(&a, &c, VersionScheme::String), None);
    }
}
