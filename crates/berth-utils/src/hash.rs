/// Derives a stable, filesystem-safe directory name from an arbitrary key.
///
/// Repository URIs contain characters that are not valid in file names, so
/// per-repository cache directories are named after the blake3 hash of the URI.
///
/// # Example
///
/// ```
/// use berth_utils::hash::cache_key;
///
/// let key = cache_key("https://github.com/example/registry");
/// assert_eq!(key.len(), 64);
/// assert_eq!(key, cache_key("https://github.com/example/registry"));
/// ```
pub fn cache_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

/// Returns `true` if `s` is exactly `len` lowercase hexadecimal digits.
pub fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
