use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// A short link identifier.
///
/// Ids are positive integers handed out sequentially by the active backend,
/// starting at 1. On the wire and in URLs they are rendered in decimal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(u64);

impl LinkId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The first id a fresh store hands out.
    pub const fn first() -> Self {
        Self(1)
    }

    /// Returns the id allocated right after this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self)
    }
}

impl Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LinkId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidLinkId(format!(
                "must be a positive decimal integer: '{}'",
                s
            )));
        }
        // One spelling per id: "01" is not the same link as "1".
        if s.len() > 1 && s.starts_with('0') {
            return Err(CoreError::InvalidLinkId(format!(
                "leading zeros are not allowed: '{}'",
                s
            )));
        }

        match s.parse::<u64>() {
            Ok(0) => Err(CoreError::InvalidLinkId("ids start at 1".to_string())),
            Ok(value) => Ok(Self(value)),
            Err(e) => Err(CoreError::InvalidLinkId(format!("'{}': {}", s, e))),
        }
    }
}

impl From<u64> for LinkId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
