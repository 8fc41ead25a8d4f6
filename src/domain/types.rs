//! Shared domain enumerations aligned with persisted column values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a content item. Persisted as `SMALLINT`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum ContentStatus {
    #[default]
    Unknown = 0,
    Unpublished = 1,
    Published = 2,
    Private = 3,
}

impl ContentStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Self {
        match code {
            1 => ContentStatus::Unpublished,
            2 => ContentStatus::Published,
            3 => ContentStatus::Private,
            _ => ContentStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Unknown => "unknown",
            ContentStatus::Unpublished => "unpublished",
            ContentStatus::Published => "published",
            ContentStatus::Private => "private",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Soft-delete flag of a like/collect toggle row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum ToggleStatus {
    Inactive = 0,
    Active = 1,
}

impl ToggleStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Self {
        if code == 1 {
            ToggleStatus::Active
        } else {
            ToggleStatus::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, ToggleStatus::Active)
    }
}

/// How a publish propagates the draft into the published representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Draft and published rows share one transactional store.
    Transactional,
    /// Independent stores, draft first, no retry.
    Sequential,
    /// Independent stores, draft first, bounded retry of the published write.
    Retrying,
}

impl SyncStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStrategy::Transactional => "transactional",
            SyncStrategy::Sequential => "sequential",
            SyncStrategy::Retrying => "retrying",
        }
    }
}

impl TryFrom<&str> for SyncStrategy {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "transactional" | "s0" => Ok(SyncStrategy::Transactional),
            "sequential" | "s1" => Ok(SyncStrategy::Sequential),
            "retrying" | "s2" => Ok(SyncStrategy::Retrying),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_roundtrip() {
        for status in [
            ContentStatus::Unknown,
            ContentStatus::Unpublished,
            ContentStatus::Published,
            ContentStatus::Private,
        ] {
            assert_eq!(ContentStatus::from_code(status.code()), status);
        }
        assert_eq!(ContentStatus::from_code(42), ContentStatus::Unknown);
    }

    #[test]
    fn strategy_accepts_short_names() {
        assert_eq!(SyncStrategy::try_from("s0"), Ok(SyncStrategy::Transactional));
        assert_eq!(SyncStrategy::try_from("retrying"), Ok(SyncStrategy::Retrying));
        assert!(SyncStrategy::try_from("eventual").is_err());
    }
}
