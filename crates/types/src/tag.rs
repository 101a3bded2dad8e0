//! Release tag parsing and ordering
//!
//! Tags follow the `major.minor.micro` scheme with an optional pre-release
//! phase suffix:
//! - `3.13.0a2` - second alpha
//! - `3.13.0b1` - first beta (feature freeze)
//! - `3.13.0rc1` - first release candidate
//! - `3.13.0` - final release
//!
//! Ordering is total: alphas sort before betas, betas before candidates,
//! candidates before the final release of the same version.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use shipwright_errors::VersionError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Pre-release phase of a release tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Alpha,
    Beta,
    Candidate,
    Final,
}

impl Phase {
    /// Marker as it appears inside a tag (`a`, `b`, `rc`, empty for final)
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Candidate => "rc",
            Self::Final => "",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Candidate => "release candidate",
            Self::Final => "final",
        };
        write!(f, "{name}")
    }
}

/// A fully-parsed release tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseTag {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub phase: Phase,
    /// Serial within the phase; always 0 for final releases
    pub serial: u32,
}

impl ReleaseTag {
    /// Create a final release tag
    #[must_use]
    pub fn new_final(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            phase: Phase::Final,
            serial: 0,
        }
    }

    /// Bare `major.minor.micro` without the phase suffix
    ///
    /// Server directory layouts key off the normalized form, so `3.13.0rc1`
    /// and `3.13.0` land in the same place.
    #[must_use]
    pub fn normalized(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.micro)
    }

    /// The `major.minor` series this tag belongs to
    #[must_use]
    pub fn series(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    #[must_use]
    pub fn is_final(&self) -> bool {
        self.phase == Phase::Final
    }

    #[must_use]
    pub fn is_candidate(&self) -> bool {
        self.phase == Phase::Candidate
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.is_final()
    }

    /// First beta of a version marks the feature freeze
    #[must_use]
    pub fn is_feature_freeze(&self) -> bool {
        self.phase == Phase::Beta && self.serial == 1
    }
}

impl FromStr for ReleaseTag {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || VersionError::InvalidTag {
            input: s.to_string(),
        };

        let mut parts = s.split('.');
        let major = parse_number(s, parts.next().ok_or_else(invalid)?)?;
        let minor = parse_number(s, parts.next().ok_or_else(invalid)?)?;
        let last = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        // The last component may carry a phase marker: "0", "0a2", "0rc1"
        let digits_end = last
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(last.len());
        let (micro_str, rest) = last.split_at(digits_end);
        let micro = parse_number(s, micro_str)?;

        if rest.is_empty() {
            return Ok(Self::new_final(major, minor, micro));
        }

        let (phase, serial_str) = if let Some(serial) = rest.strip_prefix("rc") {
            (Phase::Candidate, serial)
        } else if let Some(serial) = rest.strip_prefix('a') {
            (Phase::Alpha, serial)
        } else if let Some(serial) = rest.strip_prefix('b') {
            (Phase::Beta, serial)
        } else {
            return Err(VersionError::InvalidPhase {
                input: s.to_string(),
                suffix: rest.to_string(),
            });
        };

        if serial_str.is_empty() {
            return Err(VersionError::MissingSerial {
                input: s.to_string(),
            });
        }
        let serial = parse_number(s, serial_str)?;

        Ok(Self {
            major,
            minor,
            micro,
            phase,
            serial,
        })
    }
}

fn parse_number(input: &str, component: &str) -> Result<u32, VersionError> {
    if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::InvalidComponent {
            input: input.to_string(),
            component: component.to_string(),
        });
    }
    component
        .parse()
        .map_err(|e: std::num::ParseIntError| VersionError::ParseError {
            message: e.to_string(),
        })
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if self.phase != Phase::Final {
            write!(f, "{}{}", self.phase.marker(), self.serial)?;
        }
        Ok(())
    }
}

impl Ord for ReleaseTag {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro, self.phase, self.serial).cmp(&(
            other.major,
            other.minor,
            other.micro,
            other.phase,
            other.serial,
        ))
    }
}

impl PartialOrd for ReleaseTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for ReleaseTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReleaseTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
