//! Firmware version comparison.
//!
//! Two flavours exist. [`FirmwareAge::compare_lexicographic`] sorts the two
//! version strings as text, which is what older scripts relied on: `"10.0"`
//! sorts before `"2.0"`. [`FirmwareVersion`] compares dot-separated numeric
//! components and should be preferred for new code.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::{Error, Result};

/// Age of a candidate firmware relative to the one running on the instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirmwareAge {
    Newer,
    Older,
}

impl FirmwareAge {
    /// Sorts `[candidate, installed]` as strings. The candidate counts as newer
    /// when the installed version sorts first, ties included.
    pub fn compare_lexicographic(installed: &str, candidate: &str) -> Self {
        let mut versions = [candidate, installed];
        versions.sort_unstable();
        if versions[0] == installed {
            FirmwareAge::Newer
        } else {
            FirmwareAge::Older
        }
    }
}

impl Display for FirmwareAge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareAge::Newer => f.write_str("newer"),
            FirmwareAge::Older => f.write_str("older"),
        }
    }
}

/// A firmware version such as `6.5.0.0` or `06.40.01001`.
///
/// Trailing zero components are not significant: `6.5 == 6.5.0.0`.
#[derive(Clone, Debug)]
pub struct FirmwareVersion {
    raw: String,
    components: Vec<u32>,
}

impl FirmwareVersion {
    pub fn components(&self) -> &[u32] {
        &self.components
    }

    fn significant(&self) -> &[u32] {
        let len = self
            .components
            .iter()
            .rposition(|x| *x != 0)
            .map_or(0, |x| x + 1);
        &self.components[..len]
    }
}

impl FromStr for FirmwareVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(Error::format(s, None));
        }
        let components = raw
            .split('.')
            .map(|x| x.parse::<u32>().map_err(|_| Error::format(s, None)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            raw: raw.to_string(),
            components,
        })
    }
}

impl Display for FirmwareVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for FirmwareVersion {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for FirmwareVersion {}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.significant().cmp(other.significant())
    }
}
