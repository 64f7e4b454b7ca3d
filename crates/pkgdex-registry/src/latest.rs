//! Latest-version pointer policy.
//!
//! Stability outranks recency: the first stable release replaces a
//! prerelease "latest" even if it is numerically older, and a prerelease
//! never displaces a stable "latest". Within the same stability class the
//! higher version wins.

use std::cmp::Ordering;

use crate::model::PackageVersion;
use crate::version::{self, Version};

/// Whether `candidate` should become the package's latest version.
pub fn select(current_latest: Option<&PackageVersion>, candidate: &PackageVersion) -> bool {
    select_version(current_latest.map(|pv| &pv.version), &candidate.version)
}

/// [`select`] over bare version identifiers.
pub fn select_version(current_latest: Option<&Version>, candidate: &Version) -> bool {
    let Some(current) = current_latest else {
        return true;
    };

    match (current.is_prerelease(), candidate.is_prerelease()) {
        (true, false) => true,
        (false, true) => false,
        _ => version::compare(candidate, current) == Ordering::Greater,
    }
}
