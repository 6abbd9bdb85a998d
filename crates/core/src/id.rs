//! Strongly-typed identifiers used across the domain.

use chrono::Utc;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Prefix marking identifiers minted locally while the remote system was
/// unreachable. Replaced by the remote-issued identifier after a successful
/// replay.
const LOCAL_PREFIX: &str = "local-";

/// Identifier of a domain record.
///
/// The remote system issues opaque identifiers (numeric or string), so this is
/// a string newtype rather than a UUID wrapper. Records created offline carry a
/// locally minted identifier (millisecond timestamp + random suffix) until the
/// remote system confirms them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mint a local identifier for a record created while unreachable.
    pub fn local() -> Self {
        let suffix = Uuid::now_v7().simple().to_string();
        Self(format!(
            "{}{}-{}",
            LOCAL_PREFIX,
            Utc::now().timestamp_millis(),
            &suffix[..8]
        ))
    }

    /// Placeholder for a record the caller has not identified yet (the sync
    /// engine mints a local identifier in its place).
    pub fn unassigned() -> Self {
        Self(String::new())
    }

    pub fn is_unassigned(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this identifier was minted locally and still awaits the
    /// remote-issued replacement.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a pending operation in the replay queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for OperationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for OperationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("OperationId: {}", e)))?;
        Ok(Self(uuid))
    }
}
