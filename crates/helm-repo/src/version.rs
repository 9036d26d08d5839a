//! Chart version ordering
//!
//! Chart versions in the wild are not reliably semver (`v1.2`, `1.0.0-rc.1`,
//! `2024.01.5`), so ordering is purely numeric: each `.`-separated segment is
//! reduced to its digits and compared as a number. Anything unparsable counts
//! as zero. Digits of a prerelease suffix join the segment they appear in,
//! so `1.0.0-rc1` orders like `1.0.01`.

use std::cmp::Ordering;

/// Numeric components of a version string.
fn components(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|segment| {
            let digits: String = segment.chars().filter(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// Compare two version strings numerically, component by component.
///
/// The shorter sequence is padded with zeros, so `1.2` equals `1.2.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = components(a);
    let b = components(b);
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Sort newest first; versions that compare equal keep their original order.
pub fn sort_descending<T>(items: &mut [T], version: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| compare_versions(version(b), version(a)));
}
