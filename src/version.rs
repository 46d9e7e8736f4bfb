//! Ordered `major.minor.patch[-qualifier][N][-SNAPSHOT]` versions.
//!
//! Update steps declare the version they migrate to and the ledger stores the
//! last version applied per data type, so everything here hinges on a total
//! order: numbers first, then the qualifier rank (release highest), then the
//! qualifier number, and finally a release build outranks a snapshot build of
//! the same version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

const SNAPSHOT: &str = "snapshot";

/// `-20240131.120501-3` style qualifiers produced by maven deployments.
static MAVEN_UNIQUE_SNAPSHOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{8}\.[0-9]{6}-[0-9]+$").expect("valid snapshot pattern"));

/// Pre-release qualifier, ranked from earliest to final release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Qualifier {
    EarlyAccess,
    Milestone,
    Alpha,
    Beta,
    ReleaseCandidate,
    Release,
}

impl Qualifier {
    /// All qualifiers in declaration order; parsing tries them in this order.
    pub const ALL: [Qualifier; 6] = [
        Qualifier::EarlyAccess,
        Qualifier::Milestone,
        Qualifier::Alpha,
        Qualifier::Beta,
        Qualifier::ReleaseCandidate,
        Qualifier::Release,
    ];

    /// Canonical text used when formatting, `None` for plain releases.
    pub const fn id(self) -> Option<&'static str> {
        match self {
            Qualifier::EarlyAccess => Some("ea"),
            Qualifier::Milestone => Some("M"),
            Qualifier::Alpha => Some("alpha"),
            Qualifier::Beta => Some("beta"),
            Qualifier::ReleaseCandidate => Some("RC"),
            Qualifier::Release => None,
        }
    }

    /// Lower-case spellings accepted while parsing. Longer spellings come
    /// first so `early2` is not read as `ea` followed by garbage.
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Qualifier::EarlyAccess => &["earlyaccess", "early", "ea"],
            Qualifier::Milestone => &["milestone", "m"],
            Qualifier::Alpha => &["alpha"],
            Qualifier::Beta => &["beta"],
            Qualifier::ReleaseCandidate => &["rc", "cr"],
            Qualifier::Release => &[],
        }
    }
}

/// Raised by the strict [`FromStr`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not parse version {input:?}: {reason}")]
pub struct VersionParseError {
    input: String,
    reason: String,
}

impl VersionParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }
}

/// An immutable, totally ordered version value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
    qualifier: Qualifier,
    qualifier_version: u32,
    snapshot: bool,
}

impl Version {
    /// A plain release version.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            qualifier: Qualifier::Release,
            qualifier_version: 1,
            snapshot: false,
        }
    }

    /// Returns a copy carrying the given pre-release qualifier. Plain
    /// releases have no qualifier number, so it is pinned to 1 for them.
    pub const fn with_qualifier(mut self, qualifier: Qualifier, qualifier_version: u32) -> Self {
        self.qualifier = qualifier;
        self.qualifier_version = match qualifier {
            Qualifier::Release => 1,
            _ => qualifier_version,
        };
        self
    }

    /// Returns a copy marked as a snapshot build.
    pub const fn as_snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }

    /// Lenient parse used by ledger bootstrap and step registration: input
    /// that fails integer parsing is logged and reported as absent.
    pub fn parse(input: &str) -> Option<Version> {
        match input.parse::<Version>() {
            Ok(version) => Some(version),
            Err(err) => {
                warn!(
                    target: "scm_update",
                    event = "version_parse_failed",
                    input = %input,
                    error = %err
                );
                None
            }
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    pub fn qualifier(&self) -> Qualifier {
        self.qualifier
    }

    /// The number following the qualifier, e.g. `2` for `beta2`.
    pub fn qualifier_version(&self) -> u32 {
        self.qualifier_version
    }

    pub fn is_snapshot(&self) -> bool {
        self.snapshot
    }

    /// Returns true if `self` is strictly newer than `other`.
    pub fn is_newer(&self, other: &Version) -> bool {
        self > other
    }

    pub fn is_newer_or_equal(&self, other: &Version) -> bool {
        self >= other
    }

    /// Returns true if `self` is strictly older than `other`.
    pub fn is_older(&self, other: &Version) -> bool {
        self < other
    }

    pub fn is_older_or_equal(&self, other: &Version) -> bool {
        self <= other
    }

    /// Like [`Version::is_newer`]; an unparseable `other` yields `false`.
    pub fn is_newer_str(&self, other: &str) -> bool {
        other
            .parse::<Version>()
            .map(|other| self.is_newer(&other))
            .unwrap_or(false)
    }

    /// Like [`Version::is_older`]; an unparseable `other` yields `false`.
    pub fn is_older_str(&self, other: &str) -> bool {
        other
            .parse::<Version>()
            .map(|other| self.is_older(&other))
            .unwrap_or(false)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then(self.qualifier.cmp(&other.qualifier))
            .then(self.qualifier_version.cmp(&other.qualifier_version))
            // a release build ranks above the snapshot of the same version
            .then(other.snapshot.cmp(&self.snapshot))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (core, qualifier_part) = match trimmed.split_once('-') {
            Some((core, rest)) => (core, Some(rest)),
            None => (trimmed, None),
        };
        if core.is_empty() {
            return Err(VersionParseError::new(input, "missing numeric part"));
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(core.split('.')) {
            *slot = part
                .parse::<u32>()
                .map_err(|err| VersionParseError::new(input, format!("{part:?}: {err}")))?;
        }

        let mut version = Version::new(numbers[0], numbers[1], numbers[2]);
        if let Some(qualifier_part) = qualifier_part {
            parse_qualifier(&mut version, qualifier_part, input)?;
        }
        Ok(version)
    }
}

fn parse_qualifier(version: &mut Version, raw: &str, input: &str) -> Result<(), VersionParseError> {
    let mut qualifier = raw.trim().to_lowercase();

    if qualifier.contains(SNAPSHOT) {
        version.snapshot = true;
        qualifier = qualifier.replace(SNAPSHOT, "");
    } else if MAVEN_UNIQUE_SNAPSHOT.is_match(&qualifier) {
        version.snapshot = true;
        qualifier.clear();
    }

    let token = qualifier.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace());
    if token.is_empty() {
        return Ok(());
    }

    for candidate in Qualifier::ALL {
        let Some(alias) = candidate
            .aliases()
            .iter()
            .find(|alias| token.starts_with(**alias))
        else {
            continue;
        };

        version.qualifier = candidate;
        let remainder = token[alias.len()..].trim_start_matches(['-', '.', '_']);
        let digits: String = remainder.chars().take_while(char::is_ascii_digit).collect();
        if !digits.is_empty() {
            version.qualifier_version = digits
                .parse::<u32>()
                .map_err(|err| VersionParseError::new(input, format!("{digits:?}: {err}")))?;
        }
        break;
    }
    Ok(())
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(id) = self.qualifier.id() {
            write!(f, "-{}{}", id, self.qualifier_version)?;
        }
        if self.snapshot {
            f.write_str("-SNAPSHOT")?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
