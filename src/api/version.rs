//! Array version parsing
//!
//! ZAPI reports an ONTAPI version (`1.180`), REST reports the release
//! (`9.11.1`, or `NetApp Release 9.11.1P3: Tue Feb 28 ...`).

use crate::error::{Error, Result};
use std::fmt;

/// Dotted numeric version; missing components compare as zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OntapVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OntapVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse `1.180`, `9.8`, `9.11.1`, `9.11.1P3` or a full release banner
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let candidate = trimmed
            .strip_prefix("NetApp Release ")
            .unwrap_or(trimmed)
            .split(|c: char| c == ':' || c.is_whitespace())
            .next()
            .unwrap_or_default();

        let mut parts = [0u32; 3];
        let mut count = 0;
        for (i, piece) in candidate.split('.').enumerate() {
            if i >= parts.len() {
                break;
            }
            // Patch suffixes such as "1P3" or "0RC1" keep their leading digits
            let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return Err(Error::VersionParse(raw.to_string()));
            }
            parts[i] = digits
                .parse()
                .map_err(|_| Error::VersionParse(raw.to_string()))?;
            count += 1;
        }

        if count < 2 {
            return Err(Error::VersionParse(raw.to_string()));
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }

    pub fn at_least(&self, other: &OntapVersion) -> bool {
        self >= other
    }
}

impl fmt::Display for OntapVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for OntapVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
