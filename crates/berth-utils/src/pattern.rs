/// Scores how specifically `pattern` matches the package `name`.
///
/// Returns `0` when the pattern is empty or does not match. An exact match returns
/// [`usize::MAX`]. A trailing-wildcard pattern such as `boost-*` matches every
/// name starting with its literal prefix and scores the prefix length plus one,
/// so longer prefixes take precedence and the bare `*` still scores `1`.
///
/// Only a single trailing `*` acts as a wildcard; any other pattern must match
/// exactly.
///
/// # Examples
///
/// ```
/// use berth_utils::pattern::package_match_prefix;
///
/// assert_eq!(package_match_prefix("boost-asio", "boost-asio"), usize::MAX);
/// assert_eq!(package_match_prefix("boost-asio", "boost-*"), 7);
/// assert_eq!(package_match_prefix("boost-asio", "b*"), 2);
/// assert_eq!(package_match_prefix("boost-asio", "*"), 1);
/// assert_eq!(package_match_prefix("boost-asio", "qt*"), 0);
/// ```
pub fn package_match_prefix(name: &str, pattern: &str) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    if name == pattern {
        return usize::MAX;
    }

    match pattern.strip_suffix('*') {
        Some(prefix) if name.starts_with(prefix) => prefix.len() + 1,
        _ => 0,
    }
}

/// Returns `true` if `pattern` is a valid package declaration: a non-empty
/// name made of lowercase ASCII letters, digits and `-`, optionally followed
/// by a single trailing `*`.
///
/// # Examples
///
/// ```
/// use berth_utils::pattern::is_valid_package_pattern;
///
/// assert!(is_valid_package_pattern("zlib"));
/// assert!(is_valid_package_pattern("boost-*"));
/// assert!(is_valid_package_pattern("*"));
/// assert!(!is_valid_package_pattern("bo*st"));
/// assert!(!is_valid_package_pattern("Zlib"));
/// ```
pub fn is_valid_package_pattern(pattern: &str) -> bool {
    let literal = pattern.strip_suffix('*').unwrap_or(pattern);
    if literal.is_empty() {
        return pattern == "*";
    }

    literal
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Returns `true` if `pattern` contains a wildcard.
pub fn is_wildcard_pattern(pattern: &str) -> bool {
    pattern.ends_with('*')
}

/// Returns the highest score of `name` against any of `patterns`.
pub fn best_match_score<S: AsRef<str>>(name: &str, patterns: &[S]) -> usize {
    patterns
        .iter()
        .map(|pattern| package_match_prefix(name, pattern.as_ref()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_beats_patterns() {
        assert_eq!(package_match_prefix("zlib", "zlib"), usize::MAX);
        assert!(package_match_prefix("zlib", "zlib") > package_match_prefix("zlib", "zli*"));
    }

    #[test]
    fn test_longer_prefix_is_more_specific() {
        let specific = package_match_prefix("boost-asio", "boost-*");
        let broad = package_match_prefix("boost-asio", "b*");
        assert!(broad > 0);
        assert!(specific > broad);
    }

    #[test]
    fn test_non_matching_patterns() {
        assert_eq!(package_match_prefix("boost-asio", "qt*"), 0);
        assert_eq!(package_match_prefix("boost-asio", "boost"), 0);
        assert_eq!(package_match_prefix("boost", "boost-*"), 0);
        assert_eq!(package_match_prefix("boost-asio", ""), 0);
        assert_eq!(package_match_prefix("", ""), 0);
    }

    #[test]
    fn test_wildcard_only_trailing() {
        assert_eq!(package_match_prefix("boost-asio", "*-asio"), 0);
        assert_eq!(package_match_prefix("b*c", "b*c"), usize::MAX);
    }

    #[test]
    fn test_pattern_validation() {
        assert!(is_valid_package_pattern("boost-asio"));
        assert!(is_valid_package_pattern("lib2*"));
        assert!(!is_valid_package_pattern(""));
        assert!(!is_valid_package_pattern("**"));
        assert!(!is_valid_package_pattern("*boost"));
        assert!(!is_valid_package_pattern("boost_asio"));
    }

    #[test]
    fn test_best_match_score() {
        let patterns = vec!["b*", "boost-*", "zlib"];
        assert_eq!(best_match_score("boost-asio", &patterns), 7);
        assert_eq!(best_match_score("zlib", &patterns), usize::MAX);
        assert_eq!(best_match_score("qt", &patterns), 0);
        assert_eq!(best_match_score::<&str>("qt", &[]), 0);
    }
}
