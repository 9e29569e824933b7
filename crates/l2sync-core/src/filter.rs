//! Wildcard patterns and per-group filtering
//!
//! Patterns support a single leading or trailing `*`:
//!
//! | pattern    | matches                       |
//! |------------|-------------------------------|
//! | `*`        | everything                    |
//! | `*.3.4`    | text ending in `.3.4`         |
//! | `10.*`     | text starting with `10.`      |
//! | `1.2.3.4`  | exactly `1.2.3.4`             |
//!
//! There is no escaping. An internal `*` is compared literally.

use crate::config::AddressGroupSpec;
use crate::traits::SourceIpRecord;

/// Match `text` against a single-`*` glob pattern
pub fn matches_pattern(text: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return text.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return text.starts_with(prefix);
    }
    text == pattern
}

/// Whether `ip` passes a group's include/exclude patterns
///
/// Exclusion is checked first and always wins.
pub fn is_selected(ip: &str, spec: &AddressGroupSpec) -> bool {
    if spec
        .exclude_patterns
        .iter()
        .any(|pattern| matches_pattern(ip, pattern))
    {
        return false;
    }

    spec.include_patterns.is_empty()
        || spec
            .include_patterns
            .iter()
            .any(|pattern| matches_pattern(ip, pattern))
}

/// Apply a group's patterns to a record list, preserving input order
pub fn filter_group(ips: &[SourceIpRecord], spec: &AddressGroupSpec) -> Vec<SourceIpRecord> {
    if spec.include_patterns.is_empty() && spec.exclude_patterns.is_empty() {
        return ips.to_vec();
    }

    ips.iter()
        .filter(|record| is_selected(&record.ip, spec))
        .cloned()
        .collect()
}
