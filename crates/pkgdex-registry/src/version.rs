//! Version identifiers and their total ordering.
//!
//! Parsing is delegated to the `semver` crate. Ordering is defined here:
//! numeric `major.minor.patch` first, then prerelease status (a release
//! ranks above every prerelease of the same triple), then the prerelease
//! suffix identifier by identifier. Build metadata only breaks the final tie
//! so that distinct identifiers never compare equal.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A parsed, immutable version identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(semver::Version);

impl Version {
    /// A release version with no prerelease or build suffix.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version(semver::Version::new(major, minor, patch))
    }

    /// Parse a version string like "1.2.3" or "2.0.0-beta.1".
    pub fn parse(s: &str) -> Result<Self, semver::Error> {
        semver::Version::parse(s).map(Version)
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// The prerelease suffix, empty for releases.
    pub fn prerelease(&self) -> &str {
        self.0.pre.as_str()
    }

    /// The build metadata suffix, empty when absent.
    pub fn build(&self) -> &str {
        self.0.build.as_str()
    }

    /// True when the identifier carries a prerelease suffix.
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Version {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl From<semver::Version> for Version {
    fn from(v: semver::Version) -> Self {
        Version(v)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version identifiers.
///
/// This is the single ordering used for latest-version selection and for
/// sort-order reconciliation. It is a strict total order consistent with
/// `Eq`.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    (a.major(), a.minor(), a.patch())
        .cmp(&(b.major(), b.minor(), b.patch()))
        .then_with(|| compare_prerelease(a.prerelease(), b.prerelease()))
        .then_with(|| a.build().cmp(b.build()))
}

/// Order two prerelease suffixes, where the empty suffix means "release".
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_identifiers(a.split('.'), b.split('.')),
    }
}

/// Dot-separated identifiers compared pairwise; a shorter list that is a
/// prefix of a longer one ranks lower.
fn compare_identifiers<'a>(
    mut a: impl Iterator<Item = &'a str>,
    mut b: impl Iterator<Item = &'a str>,
) -> Ordering {
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match compare_identifier(x, y) {
                Ordering::Equal => continue,
                ord => return ord,
            },
        }
    }
}

fn compare_identifier(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        // Numeric identifiers carry no leading zeros, so length decides first
        // and arbitrarily long digit strings never overflow.
        (true, true) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

fn is_numeric(ident: &str) -> bool {
    !ident.is_empty() && ident.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn numeric_components_compare_as_integers() {
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("10.0.0") > v("9.99.99"));
        assert!(v("0.0.10") > v("0.0.2"));
    }

    #[test]
    fn documented_chain() {
        assert!(v("1.2.0") > v("1.1.9"));
        assert!(v("1.1.9") > v("1.1.9-beta"));
        assert!(v("1.1.9-beta") > v("1.0.0"));
    }

    #[test]
    fn release_outranks_prerelease_of_same_triple() {
        assert!(v("2.0.0") > v("2.0.0-rc.9"));
        assert!(v("2.0.0") > v("2.0.0-zzz"));
        assert!(v("2.0.0-rc.1") > v("1.99.99"));
    }

    #[test]
    fn prerelease_identifiers() {
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.1") < v("1.0.0-alpha.beta"));
        assert!(v("1.0.0-alpha.beta") < v("1.0.0-beta"));
        assert!(v("1.0.0-beta.2") < v("1.0.0-beta.11"));
        assert!(v("1.0.0-beta.11") < v("1.0.0-rc.1"));
        assert!(v("1.0.0-1") < v("1.0.0-a"));
        assert!(v("1.0.0-10") > v("1.0.0-9"));
    }

    #[test]
    fn build_metadata_breaks_ties_only() {
        assert!(v("1.0.0+b") > v("1.0.0+a"));
        assert!(v("1.0.0+zzz") < v("1.0.1"));
        assert!(!v("1.0.0+build").is_prerelease());
        assert_ne!(compare(&v("1.0.0+a"), &v("1.0.0")), Ordering::Equal);
    }

    #[test]
    fn equal_inputs_compare_equal() {
        assert_eq!(compare(&v("1.2.3-rc.1"), &v("1.2.3-rc.1")), Ordering::Equal);
    }

    #[test]
    fn prerelease_flag() {
        assert!(v("1.0.0-dev").is_prerelease());
        assert!(!v("1.0.0").is_prerelease());
        assert_eq!(v("1.0.0-dev").prerelease(), "dev");
    }

    #[test]
    fn malformed_identifiers_fail_to_parse() {
        assert!(Version::parse("1.0").is_err());
        assert!(Version::parse("one.two.three").is_err());
        assert!(Version::parse("1.0.0-").is_err());
    }

    #[test]
    fn display_round_trips() {
        assert_eq!(v("1.2.3-beta.1+sha.5").to_string(), "1.2.3-beta.1+sha.5");
        assert_eq!("0.4.0".parse::<Version>().unwrap(), Version::new(0, 4, 0));
    }

    #[test]
    fn serde_uses_plain_string() {
        let json = serde_json::to_string(&v("1.0.0-rc.1")).unwrap();
        assert_eq!(json, "\"1.0.0-rc.1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.0.0-rc.1"));
    }

    fn arb_version() -> impl Strategy<Value = Version> {
        let ident = prop_oneof!["[0-9]{1,3}", "[a-z]{1,4}"];
        let pre = prop::collection::vec(ident, 0..3);
        (0u64..4, 0u64..4, 0u64..4, pre).prop_map(|(ma, mi, pa, pre)| {
            // Strip leading zeros so the identifier stays valid.
            let pre: Vec<String> = pre
                .into_iter()
                .map(|id| match id.parse::<u64>() {
                    Ok(n) => n.to_string(),
                    Err(_) => id,
                })
                .collect();
            let mut s = format!("{ma}.{mi}.{pa}");
            if !pre.is_empty() {
                s.push('-');
                s.push_str(&pre.join("."));
            }
            Version::parse(&s).unwrap()
        })
    }

    proptest! {
        #[test]
        fn reflexive(a in arb_version()) {
            prop_assert_eq!(compare(&a, &a), Ordering::Equal);
        }

        #[test]
        fn antisymmetric(a in arb_version(), b in arb_version()) {
            prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
            prop_assert_eq!(compare(&a, &b) == Ordering::Equal, a == b);
        }

        #[test]
        fn transitive(a in arb_version(), b in arb_version(), c in arb_version()) {
            let mut sorted = [a, b, c];
            sorted.sort_by(compare);
            prop_assert_ne!(compare(&sorted[0], &sorted[1]), Ordering::Greater);
            prop_assert_ne!(compare(&sorted[1], &sorted[2]), Ordering::Greater);
            prop_assert_ne!(compare(&sorted[0], &sorted[2]), Ordering::Greater);
        }

        #[test]
        fn agrees_with_semver_precedence(a in arb_version(), b in arb_version()) {
            prop_assert_eq!(compare(&a, &b), a.0.cmp(&b.0));
        }
    }
}
