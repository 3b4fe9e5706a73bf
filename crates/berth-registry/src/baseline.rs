//! Baseline files: the default version of every port, per named baseline.
//!
//! ```json
//! { "default": { "zlib": { "baseline": "1.2.11", "port-version": 9 } } }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    error::{RegistryError, Result},
    version::Version,
};

/// Location of the baseline file relative to a registry root.
pub const BASELINE_FILE: &str = "versions/baseline.json";

/// Default versions of one named baseline, by port name.
pub type Baseline = BTreeMap<String, Version>;

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct BaselineRow {
    baseline: String,
    #[serde(default)]
    port_version: u32,
}

/// Parses a baseline file and returns the baseline named `name`, or `None` if
/// the file does not declare it.
pub fn parse_baseline(text: &str, name: &str, origin: &str) -> Result<Option<Baseline>> {
    let mut baselines: BTreeMap<String, BTreeMap<String, BaselineRow>> = serde_json::from_str(text)
        .map_err(|source| {
            RegistryError::InvalidJson {
                origin: origin.to_string(),
                source,
            }
        })?;

    Ok(baselines.remove(name).map(|rows| {
        rows.into_iter()
            .map(|(port, row)| (port, Version::new(row.baseline, row.port_version)))
            .collect()
    }))
}

/// Looks up `port` in `baseline`.
pub fn baseline_version(baseline: &Baseline, port: &str, baseline_name: &str) -> Result<Version> {
    baseline.get(port).cloned().ok_or_else(|| {
        RegistryError::BaselineEntryMissing {
            port: port.to_string(),
            baseline: baseline_name.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = r#"{
        "default": {
            "zlib": { "baseline": "1.2.11", "port-version": 9 },
            "fmt": { "baseline": "7.1.3" }
        },
        "next": {
            "zlib": { "baseline": "1.2.12" }
        }
    }"#;

    #[test]
    fn test_parse_named_baseline() {
        let baseline = parse_baseline(TEXT, "default", "baseline.json").unwrap().unwrap();
        assert_eq!(baseline["zlib"], Version::new("1.2.11", 9));
        assert_eq!(baseline["fmt"], Version::new("7.1.3", 0));

        let next = parse_baseline(TEXT, "next", "baseline.json").unwrap().unwrap();
        assert_eq!(next.len(), 1);

        assert!(parse_baseline(TEXT, "missing", "baseline.json").unwrap().is_none());
    }

    #[test]
    fn test_malformed_baseline() {
        assert!(matches!(
            parse_baseline(r#"{"default": {"zlib": {"baseline": 1}}}"#, "default", "baseline.json"),
            Err(RegistryError::InvalidJson { .. })
        ));
        assert!(parse_baseline(
            r#"{"default": {"zlib": {"baseline": "1", "extra": 1}}}"#,
            "default",
            "baseline.json"
        )
        .is_err());
    }

    #[test]
    fn test_baseline_version_lookup() {
        let baseline = parse_baseline(TEXT, "default", "baseline.json").unwrap().unwrap();
        assert_eq!(
            baseline_version(&baseline, "fmt", "default").unwrap(),
            Version::new("7.1.3", 0)
        );
        assert!(matches!(
            baseline_version(&baseline, "curl", "default"),
            Err(RegistryError::BaselineEntryMissing { .. })
        ));
    }
}
