//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Engine-assigned item identity.
///
/// Always within `SystemId::MIN..=SystemId::MAX` (four digits on the printed
/// label). Never reused, even after the item is deleted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct SystemId(i32);

impl SystemId {
    pub const MIN: i32 = 1000;
    pub const MAX: i32 = 9999;

    /// Value the allocator starts counting from when no item was ever created.
    pub const SEED: i32 = Self::MIN - 1;

    pub fn new(value: i32) -> Result<Self, DomainError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(DomainError::invalid_id(format!(
                "SystemId: {value} outside {}..={}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for SystemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<i32> for SystemId {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SystemId> for i32 {
    fn from(value: SystemId) -> Self {
        value.0
    }
}

impl FromStr for SystemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i32>()
            .map_err(|e| DomainError::invalid_id(format!("SystemId: {e}")))?;
        Self::new(value)
    }
}

/// Identifier of an audit log entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEntryId(Uuid);

impl LogEntryId {
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

impl Default for LogEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for LogEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for LogEntryId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for LogEntryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s.trim())
            .map_err(|e| DomainError::invalid_id(format!("LogEntryId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_id_accepts_bounds() {
        assert_eq!(SystemId::new(1000).unwrap().get(), 1000);
        assert_eq!(SystemId::new(9999).unwrap().get(), 9999);
    }

    #[test]
    fn system_id_rejects_out_of_range() {
        assert!(matches!(SystemId::new(999), Err(DomainError::InvalidId(_))));
        assert!(matches!(SystemId::new(10000), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn system_id_parses_trimmed_text() {
        let id: SystemId = " 1042 ".parse().unwrap();
        assert_eq!(id.get(), 1042);
        assert!("abc".parse::<SystemId>().is_err());
    }

    #[test]
    fn log_entry_id_round_trips_through_text() {
        let id = LogEntryId::new();
        let parsed: LogEntryId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
