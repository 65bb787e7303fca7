//! At-most-once bookkeeping for (audit, tier) reminders.
//!
//! The deduplicator holds no state of its own. Every answer comes from the
//! dispatch store, whose conditional insert is the only synchronization
//! between scheduler instances.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::audit::AuditId;
use crate::error::{DedupError, StoreError};
use crate::storage::DispatchStore;

pub struct NotificationDeduplicator<'a, S: DispatchStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DispatchStore + ?Sized> NotificationDeduplicator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn already_sent(&self, audit_id: &AuditId, tier: &str) -> Result<bool, StoreError> {
        Ok(self.store.list_sent_tiers(audit_id)?.contains(tier))
    }

    pub fn sent_tiers(&self, audit_id: &AuditId) -> Result<BTreeSet<String>, StoreError> {
        self.store.list_sent_tiers(audit_id)
    }

    /// Claim the pair. Exactly one caller per pair succeeds; the rest get
    /// `DedupError::AlreadyRecorded`.
    pub fn record_sent(
        &self,
        audit_id: &AuditId,
        tier: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DedupError> {
        if self.store.try_claim_tier(audit_id, tier, at)? {
            Ok(())
        } else {
            Err(DedupError::AlreadyRecorded {
                audit_id: audit_id.to_string(),
                tier: tier.to_string(),
            })
        }
    }

    /// Undo a claim whose delivery failed.
    pub fn release(&self, audit_id: &AuditId, tier: &str) -> Result<(), StoreError> {
        self.store.unclaim_tier(audit_id, tier)
    }
}
