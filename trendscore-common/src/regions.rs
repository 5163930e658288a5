//! Region codes scores are reported for

/// Region every search-term model scores into
pub const DEFAULT_REGION: &str = "e";

/// Known regions as (code, display name)
pub const REGIONS: [(&str, &str); 5] = [
    ("e", "England"),
    ("s", "South England"),
    ("m", "Midlands"),
    ("l", "London"),
    ("n", "North England"),
];

/// Resolve a region code from either its code or its display name
///
/// Used when reading CSV headers, which may name regions either way.
pub fn resolve_region(label: &str) -> Option<&'static str> {
    let label = label.trim();
    REGIONS
        .iter()
        .find(|(code, name)| *code == label || *name == label)
        .map(|(code, _)| *code)
}
