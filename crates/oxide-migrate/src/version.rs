//! Migration version numbers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ResolutionError;

/// A dot-separated sequence of non-negative integers, e.g. `1`, `1.2`, `2.0.1`.
///
/// Versions compare numerically component by component, with missing
/// trailing components treated as zero, so `1.0 == 1` and `1.2 < 1.10`.
/// Repeatable migrations have no version; they use `Option::None`.
#[derive(Debug, Clone)]
pub struct MigrationVersion {
    parts: Vec<u64>,
}

impl MigrationVersion {
    /// Parses a version, accepting `.` or `_` between components.
    pub fn parse(text: &str) -> Result<Self, ResolutionError> {
        let invalid = |reason: &str| ResolutionError::InvalidVersion {
            version: text.to_string(),
            reason: reason.to_string(),
        };
        if text.is_empty() {
            return Err(invalid("version is empty"));
        }
        let parts = text
            .split(['.', '_'])
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid("components must be non-empty digit sequences"));
                }
                part.parse::<u64>()
                    .map_err(|_| invalid("component does not fit in 64 bits"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parts })
    }

    /// Creates a version from its components. An empty list means `0`.
    #[must_use]
    pub fn from_parts(parts: impl Into<Vec<u64>>) -> Self {
        let mut parts = parts.into();
        if parts.is_empty() {
            parts.push(0);
        }
        Self { parts }
    }

    /// Returns the components as written.
    #[must_use]
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    /// Components without trailing zeros; equal versions share this.
    fn significant(&self) -> &[u64] {
        let len = self
            .parts
            .iter()
            .rposition(|&p| p != 0)
            .map_or(0, |i| i + 1);
        &self.parts[..len]
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| {
                let a = self.parts.get(i).copied().unwrap_or(0);
                let b = other.parts.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for MigrationVersion {}

impl Hash for MigrationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for MigrationVersion {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MigrationVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MigrationVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Formats an optional version, showing repeatables as an empty string.
pub(crate) fn display_version(version: Option<&MigrationVersion>) -> String {
    version.map(ToString::to_string).unwrap_or_default()
}
