//! Audit periods as seen by the reminder subsystem.
//!
//! Audits are created and closed by the host application's audit workflow.
//! The scheduler only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ValidationError;

/// Stable identifier of an audit period.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(String);

impl AuditId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AuditId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AuditId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an audit period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Open,
    Closed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Open => "OPEN",
            AuditStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OPEN" => Some(AuditStatus::Open),
            "CLOSED" => Some(AuditStatus::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded window during which a group's owners must review membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditPeriod {
    pub id: AuditId,
    pub group: String,
    pub owners: BTreeSet<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: AuditStatus,
}

impl AuditPeriod {
    /// Create a new open audit period with a generated id.
    ///
    /// # Errors
    /// Returns a `ValidationError` if the group name is blank, the owner set
    /// is empty, or `ends_at` is not after `starts_at`.
    pub fn new(
        group: impl Into<String>,
        owners: impl IntoIterator<Item = String>,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let audit = Self {
            id: AuditId::generate(),
            group: group.into(),
            owners: owners.into_iter().collect(),
            starts_at,
            ends_at,
            status: AuditStatus::Open,
        };
        audit.validate()?;
        Ok(audit)
    }

    /// Replace the generated id, e.g. with the host application's own key.
    pub fn with_id(mut self, id: impl Into<AuditId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "id".into(),
                message: "audit id must not be blank".into(),
            });
        }
        if self.group.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "group".into(),
                message: "group name must not be blank".into(),
            });
        }
        if self.owners.is_empty() {
            return Err(ValidationError::EmptyCollection("owners".into()));
        }
        if self.owners.iter().any(|owner| owner.trim().is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "owners".into(),
                message: "owner address must not be blank".into(),
            });
        }
        if self.ends_at <= self.starts_at {
            return Err(ValidationError::InvalidTimeRange {
                start: self.starts_at,
                end: self.ends_at,
            });
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.status == AuditStatus::Open
    }
}
