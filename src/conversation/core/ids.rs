//! Identifier types for conversation state.
//!
//! Chat platforms hand out stable numeric user identifiers; the relay keeps
//! them opaque and never derives meaning from the value.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque, stable identifier of a chat user as delivered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Wrap a raw transport identifier.
    #[inline]
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Return the raw transport identifier.
    #[inline]
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    #[inline]
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<UserId> for i64 {
    #[inline]
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl FromStr for UserId {
    type Err = core::num::ParseIntError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}
