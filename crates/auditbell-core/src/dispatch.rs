//! Values passed between the scheduler and its delivery collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::audit::{AuditId, AuditPeriod};
use crate::tier::{NotificationKind, ReminderTier};

/// Everything a renderer and sender need for one reminder. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchRequest {
    pub audit_id: AuditId,
    pub group: String,
    pub owners: BTreeSet<String>,
    pub ends_at: DateTime<Utc>,
    pub days_left: i64,
    pub tier: String,
    pub kind: NotificationKind,
}

impl DispatchRequest {
    pub fn new(audit: &AuditPeriod, tier: &ReminderTier, days_left: i64) -> Self {
        Self {
            audit_id: audit.id.clone(),
            group: audit.group.clone(),
            owners: audit.owners.clone(),
            ends_at: audit.ends_at,
            days_left,
            tier: tier.name.clone(),
            kind: tier.kind,
        }
    }
}

/// Lifecycle of one (audit, tier) pair.
///
///   PENDING ──> DUE ──> DISPATCHING ──> SENT
///                ^            |
///                |            v
///                +─────── FAILED
///
/// SENT is terminal. FAILED returns to DUE on the next run once the claim
/// has been released.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DispatchState {
    Pending,
    Due,
    Dispatching,
    Sent,
    Failed,
}

impl DispatchState {
    /// Check if a transition is valid.
    pub fn can_transition_to(&self, to: &DispatchState) -> bool {
        match self {
            DispatchState::Pending => matches!(to, DispatchState::Due),
            DispatchState::Due => matches!(to, DispatchState::Dispatching),
            DispatchState::Dispatching => {
                matches!(to, DispatchState::Sent | DispatchState::Failed)
            }
            DispatchState::Failed => matches!(to, DispatchState::Due),
            DispatchState::Sent => false, // Terminal state
        }
    }
}

/// Result of handling one due tier during a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    Sent,
    /// Another scheduler claimed the tier first.
    SkippedDuplicate,
    /// Render or delivery failed and the claim was released; the tier is due
    /// again next run.
    FailedRolledBack { reason: String },
    /// Delivery failed and releasing the claim failed too. The tier will not
    /// be retried until the dispatch record is removed by hand.
    FailedClaimRetained { reason: String },
}

impl DispatchStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchStatus::Sent => "SENT",
            DispatchStatus::SkippedDuplicate => "SKIPPED_DUPLICATE",
            DispatchStatus::FailedRolledBack { .. } => "FAILED_ROLLED_BACK",
            DispatchStatus::FailedClaimRetained { .. } => "FAILED_CLAIM_RETAINED",
        }
    }

    /// Lifecycle state the pair is left in after this run.
    ///
    /// A lost claim counts as SENT: the instance that won it owns delivery.
    pub fn state(&self) -> DispatchState {
        match self {
            DispatchStatus::Sent | DispatchStatus::SkippedDuplicate => DispatchState::Sent,
            DispatchStatus::FailedRolledBack { .. } => DispatchState::Due,
            DispatchStatus::FailedClaimRetained { .. } => DispatchState::Failed,
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub audit_id: AuditId,
    pub tier: String,
    #[serde(flatten)]
    pub status: DispatchStatus,
}
