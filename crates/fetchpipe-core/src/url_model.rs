//! Turning raw items into fetchable addresses.

/// Scheme prepended to items that don't carry a recognized one.
pub const DEFAULT_SCHEME_PREFIX: &str = "https://";

const RECOGNIZED_PREFIXES: [&str; 2] = ["http://", "https://"];

/// True if `item` starts with `http://` or `https://` (ASCII case-insensitive).
pub fn has_recognized_scheme(item: &str) -> bool {
    RECOGNIZED_PREFIXES.iter().any(|prefix| {
        item.len() >= prefix.len()
            && item.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    })
}

/// Normalizes an item into a fetch target.
///
/// Surrounding whitespace is trimmed. Items with an `http`/`https` scheme are
/// returned unchanged; everything else gets `https://` prepended. No further
/// validation happens here: a malformed item (including the empty string)
/// still produces a target and fails at fetch time.
///
/// # Examples
///
/// - `normalize_url("example.com")` → `"https://example.com"`
/// - `normalize_url("http://example.com")` → `"http://example.com"`
pub fn normalize_url(item: &str) -> String {
    let item = item.trim();
    if has_recognized_scheme(item) {
        item.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME_PREFIX, item)
    }
}
