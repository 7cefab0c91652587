//! Protocol tags — the string key that binds a device to its driver family.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Lowercase protocol identifier (`esphome`, `matter`, …).
///
/// The tag is opaque to the core: whether a driver exists for it is decided
/// by the driver registry at pairing time, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolTag(String);

impl ProtocolTag {
    pub const ESPHOME: &'static str = "esphome";
    pub const MATTER: &'static str = "matter";
    pub const VIRTUAL: &'static str = "virtual";

    /// Normalise and validate a tag.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyProtocol`] when `value` is blank.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(ValidationError::EmptyProtocol);
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Tag for one of the built-in constants ([`Self::ESPHOME`], …).
    #[must_use]
    pub fn from_static(tag: &'static str) -> Self {
        debug_assert!(!tag.trim().is_empty(), "protocol tag must not be empty");
        Self(tag.trim().to_ascii_lowercase())
    }

    /// Borrow the tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProtocolTag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProtocolTag {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProtocolTag> for String {
    fn from(tag: ProtocolTag) -> Self {
        tag.0
    }
}

impl PartialEq<str> for ProtocolTag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ProtocolTag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
