//! Shared primitives for the tenantgate isolation layer.
//!
//! Every guard crate speaks in terms of [`ProjectId`], [`CorrelationId`] and
//! [`GateError`], so the gateway boundary translates exactly one error type.

mod errors;
mod service;

pub use errors::{ErrorCategory, GateError, GateResult, PermissionDenial};
pub use service::ServiceName;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern compiles")
});

/// Returns true when `raw` is a hyphenated UUID in its canonical 8-4-4-4-12 layout.
pub fn is_strict_uuid(raw: &str) -> bool {
    UUID_PATTERN.is_match(raw)
}

/// Identity of one tenant project. The sole unit of isolation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ProjectId(Uuid);

impl ProjectId {
    /// Parses the strict hyphenated form. Braced, urn and simple forms are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        if !is_strict_uuid(raw) {
            return None;
        }
        Uuid::parse_str(raw).ok().map(Self)
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ProjectId {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(GateError::MissingProjectId)
    }
}

#[cfg(feature = "serde-full")]
impl serde::Serialize for ProjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde-full")]
impl<'de> serde::Deserialize<'de> for ProjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ProjectId::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid project id: {raw}")))
    }
}

/// Request correlation identifier. Client-supplied values are kept verbatim.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
