// 🎫 MKF Identifier - the unit of allocation
// 900 fixed tokens MKF1..MKF900, ordered numerically

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of the identifier pool (MKF1..MKF900)
pub const POOL_SIZE: u16 = 900;

/// One of the 900 MKF tokens
///
/// Ordering is numeric, so MKF2 sorts before MKF10 (a plain string sort
/// would not give that). Serializes as the token string, e.g. "MKF42".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MkfId(u16);

/// A token that is not `MKF<n>` with n in 1..=900
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0:?} is not an MKF identifier (expected MKF1..MKF900)")]
pub struct ParseMkfIdError(pub String);

impl MkfId {
    /// Create from a pool number. Returns None outside 1..=900.
    pub fn new(number: u16) -> Option<Self> {
        if (1..=POOL_SIZE).contains(&number) {
            Some(MkfId(number))
        } else {
            None
        }
    }

    /// The numeric part of the token
    pub fn number(self) -> u16 {
        self.0
    }

    /// The full identifier domain, in numeric order
    pub fn all() -> impl Iterator<Item = MkfId> {
        (1..=POOL_SIZE).map(MkfId)
    }
}

impl fmt::Display for MkfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MKF{}", self.0)
    }
}

impl FromStr for MkfId {
    type Err = ParseMkfIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("MKF")
            .ok_or_else(|| ParseMkfIdError(s.to_string()))?;
        let number: u16 = digits
            .parse()
            .map_err(|_| ParseMkfIdError(s.to_string()))?;
        MkfId::new(number).ok_or_else(|| ParseMkfIdError(s.to_string()))
    }
}

impl From<MkfId> for String {
    fn from(id: MkfId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for MkfId {
    type Error = ParseMkfIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ============================================================================
// TESTS
// ============================================================================
