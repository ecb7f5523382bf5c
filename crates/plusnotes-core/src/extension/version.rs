//! Loose version comparison
//!
//! Extension versions come from hand-written manifests and git tags, so they
//! are not reliably semver. Only the leading `digits(.digits)*` run is
//! compared; anything after it (`-beta`, `+build`, ...) is ignored, which
//! means `1.0.0-beta` and `1.0.0` compare equal.

use std::cmp::Ordering;

use crate::error::{PlusNotesError, Result};

const FALLBACK_VERSION: &str = "0.0.0";

/// Drop a single leading `v`/`V` tag prefix
pub fn strip_prefix(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Leading run of digits and dots, "0.0.0" when there is none
fn numeric_core(version: &str) -> &str {
    let stripped = strip_prefix(version);
    let end = stripped
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(stripped.len());

    match &stripped[..end] {
        "" => FALLBACK_VERSION,
        core => core,
    }
}

fn parse_segments(version: &str) -> Result<Vec<u64>> {
    numeric_core(version)
        .split('.')
        .map(|segment| {
            segment
                .parse::<u64>()
                .map_err(|_| PlusNotesError::MalformedVersion {
                    version: version.to_string(),
                })
        })
        .collect()
}

/// Compare two loosely formatted versions.
///
/// Segments are compared left to right over the shorter length; when they
/// are all equal the version with more segments is greater, so
/// `2.0 < 2.0.0`.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    let left = parse_segments(a)?;
    let right = parse_segments(b)?;

    for (l, r) in left.iter().zip(right.iter()) {
        match l.cmp(r) {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }

    Ok(left.len().cmp(&right.len()))
}

/// True when `remote` is strictly newer than `installed`.
///
/// Malformed versions never count as an update.
pub fn is_newer(remote: &str, installed: &str) -> bool {
    match compare(remote, installed) {
        Ok(ordering) => ordering == Ordering::Greater,
        Err(e) => {
            tracing::debug!("Ignoring version comparison: {}", e);
            false
        }
    }
}
