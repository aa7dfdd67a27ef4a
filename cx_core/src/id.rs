//! ABOUTME: ULID-backed identifiers for persisted records
//! ABOUTME: Creation-ordered, URL-safe, with a validating string conversion

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Record identifier.
///
/// ULIDs are lexicographically ordered by creation time, so id-ordered scans
/// come back roughly chronological. The string form is what repositories
/// persist and what appears in URLs and JWT subjects; parsing validates that
/// an externally supplied id at least has the right shape before it is used
/// in a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(ulid::Ulid);

impl Id {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s)
            .map(Self)
            .map_err(|_| Error::Validation(format!("Invalid identifier: {}", s)))
    }
}
