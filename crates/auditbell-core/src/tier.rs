//! Reminder escalation tiers.
//!
//! A tier is a named threshold measured in whole days before an audit ends.
//! The tier set is configuration: hosts may run a single reminder or a long
//! escalation ladder.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ValidationError;

/// Which template variant a tier is rendered with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// First notice of an audit (`audit_notice`).
    Standard,
    /// Follow-up carrying an explicit `days_left` count (`audit_notice_reminder`).
    Reminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Standard => "standard",
            NotificationKind::Reminder => "reminder",
        }
    }
}

/// Largest tier offset, and longest retention horizon, in days either side
/// of a deadline.
pub const MAX_OFFSET_DAYS: i64 = 36_500;

/// A single threshold in the escalation schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ReminderTier {
    /// Stable key persisted in dispatch records. Renaming a tier re-sends it.
    pub name: String,
    /// Reached once `days_left <= offset_days`. Zero or negative means
    /// on/after the deadline.
    pub offset_days: i64,
    pub kind: NotificationKind,
}

impl ReminderTier {
    pub fn new(name: impl Into<String>, offset_days: i64, kind: NotificationKind) -> Self {
        Self {
            name: name.into(),
            offset_days,
            kind,
        }
    }

    pub fn is_reached(&self, days_left: i64) -> bool {
        days_left <= self.offset_days
    }
}

/// Validated, ordered set of tiers.
///
/// Tiers are kept oldest-threshold-first (largest offset first), which is
/// the order a recipient would receive them in real time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSchedule {
    tiers: Vec<ReminderTier>,
}

impl TierSchedule {
    /// Build a schedule from tiers in any order.
    ///
    /// # Errors
    /// Returns a `ValidationError` if the set is empty, if an offset is
    /// beyond [`MAX_OFFSET_DAYS`], or if two tiers share a name or an offset.
    pub fn new(tiers: impl IntoIterator<Item = ReminderTier>) -> Result<Self, ValidationError> {
        let mut tiers: Vec<ReminderTier> = tiers.into_iter().collect();
        if tiers.is_empty() {
            return Err(ValidationError::EmptyCollection("tiers".into()));
        }

        let mut names = HashSet::new();
        let mut offsets = HashSet::new();
        for tier in &tiers {
            if tier.name.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "tiers.name".into(),
                    message: "tier name must not be blank".into(),
                });
            }
            if !names.insert(tier.name.as_str()) {
                return Err(ValidationError::Duplicate {
                    field: "tier name".into(),
                    value: tier.name.clone(),
                });
            }
            if !(-MAX_OFFSET_DAYS..=MAX_OFFSET_DAYS).contains(&tier.offset_days) {
                return Err(ValidationError::InvalidValue {
                    field: "tiers.offset_days".into(),
                    message: format!(
                        "tier '{}' offset {} is outside ±{MAX_OFFSET_DAYS} days",
                        tier.name, tier.offset_days
                    ),
                });
            }
            if !offsets.insert(tier.offset_days) {
                return Err(ValidationError::Duplicate {
                    field: "tier offset".into(),
                    value: tier.offset_days.to_string(),
                });
            }
        }

        tiers.sort_by(|a, b| b.offset_days.cmp(&a.offset_days));
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[ReminderTier] {
        &self.tiers
    }

}

impl Default for TierSchedule {
    /// 14 days out, 3 days out, and on/after the deadline.
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

pub fn default_tiers() -> Vec<ReminderTier> {
    vec![
        ReminderTier::new("14d", 14, NotificationKind::Standard),
        ReminderTier::new("3d", 3, NotificationKind::Reminder),
        ReminderTier::new("overdue", 0, NotificationKind::Reminder),
    ]
}
