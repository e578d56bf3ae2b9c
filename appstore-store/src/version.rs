//! # Version ordering
//!
//! Version strings are free-form at upload time. For ordering they are parsed
//! as `major.minor.patch(-pre)(+build)`; anything that does not parse becomes
//! [`VersionKey::Unparsed`], which sorts below every parsed version.
//!
//! Records with equal keys (including any two unparsed versions) are ordered
//! by upload time and then by record id, so [`compare_records`] is a total
//! order and "latest" is always well defined.

use appstore_catalog::PackageVersion;
use std::cmp::{Ordering, Reverse};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid semantic version '{input}': {reason}")]
pub struct ParseVersionError {
    pub input: String,
    pub reason: &'static str,
}

/// One dot-separated pre-release identifier.
///
/// Variant order matters: numeric identifiers sort below alphanumeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identifier {
    Numeric(u64),
    AlphaNumeric(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{}", n),
            Identifier::AlphaNumeric(s) => f.write_str(s),
        }
    }
}

/// A parsed semantic version. Build metadata is kept but never compared.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<Identifier>,
    pub build: Option<String>,
}

impl SemanticVersion {
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // a release outranks any of its pre-releases
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            let pre: Vec<String> = self.pre.iter().map(|id| id.to_string()).collect();
            write!(f, "-{}", pre.join("."))?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = ParseVersionError;

    /// Parse a version, accepting a leading `v` and one or two component
    /// forms (`1`, `1.2`) which are padded with zeros.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = |reason| ParseVersionError {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        let unprefixed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let (rest, build) = match unprefixed.split_once('+') {
            Some((rest, build)) => {
                if !valid_identifiers(build) {
                    return Err(fail("malformed build metadata"));
                }
                (rest, Some(build.to_string()))
            }
            None => (unprefixed, None),
        };

        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => {
                if !valid_identifiers(pre) {
                    return Err(fail("malformed pre-release"));
                }
                let pre = pre
                    .split('.')
                    .map(parse_identifier)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| fail("pre-release number out of range"))?;
                (core, pre)
            }
            None => (rest, Vec::new()),
        };

        let mut numbers = [0u64; 3];
        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > numbers.len() {
            return Err(fail("too many numeric components"));
        }
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(fail("numeric component expected"));
            }
            *slot = part
                .parse()
                .map_err(|_| fail("numeric component out of range"))?;
        }

        Ok(SemanticVersion {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
            build,
        })
    }
}

fn valid_identifiers(s: &str) -> bool {
    s.split('.').all(|id| {
        !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

fn parse_identifier(id: &str) -> Option<Identifier> {
    if id.bytes().all(|b| b.is_ascii_digit()) {
        id.parse().ok().map(Identifier::Numeric)
    } else {
        Some(Identifier::AlphaNumeric(id.to_string()))
    }
}

/// Ordering key for a version string.
///
/// Variant order matters: every unparsed version sorts below every parsed one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionKey {
    Unparsed,
    Semantic(SemanticVersion),
}

impl VersionKey {
    /// Never fails; malformed input yields [`VersionKey::Unparsed`]
    pub fn parse(version: &str) -> Self {
        version
            .parse()
            .map(VersionKey::Semantic)
            .unwrap_or(VersionKey::Unparsed)
    }
}

/// Total order over version records, ascending.
///
/// Version key first, then upload time, then record id.
pub fn compare_records(a: &PackageVersion, b: &PackageVersion) -> Ordering {
    VersionKey::parse(&a.version)
        .cmp(&VersionKey::parse(&b.version))
        .then_with(|| a.uploaded_at.cmp(&b.uploaded_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort records so the highest version comes first
pub fn sort_newest_first(versions: &mut [PackageVersion]) {
    versions.sort_by_cached_key(|v| Reverse((VersionKey::parse(&v.version), v.uploaded_at, v.id)));
}

/// The maximal record under [`compare_records`]
pub fn latest(versions: Vec<PackageVersion>) -> Option<PackageVersion> {
    versions.into_iter().max_by(compare_records)
}
