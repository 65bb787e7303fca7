//! In-memory store for embedding hosts and tests.
//!
//! Claims are atomic within one process only. Use `SqliteStore` (or a host
//! database with an equivalent unique constraint) when more than one
//! scheduler process shares delivery state.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{AuditStore, DispatchRecord, DispatchStore};
use crate::audit::{AuditId, AuditPeriod, AuditStatus};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    audits: BTreeMap<AuditId, AuditPeriod>,
    dispatched: HashMap<(AuditId, String), DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    /// Insert or replace an audit.
    pub fn upsert_audit(&self, audit: AuditPeriod) -> crate::error::Result<()> {
        audit.validate()?;
        self.lock()?.audits.insert(audit.id.clone(), audit);
        Ok(())
    }

    /// Mark an audit closed and drop its dispatch records.
    pub fn close_audit(&self, id: &AuditId) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        inner.dispatched.retain(|(audit_id, _), _| audit_id != id);
        match inner.audits.get_mut(id) {
            Some(audit) => {
                audit.status = AuditStatus::Closed;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn list_dispatch_records(&self, id: &AuditId) -> Result<Vec<DispatchRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<DispatchRecord> = inner
            .dispatched
            .iter()
            .filter(|((audit_id, _), _)| audit_id == id)
            .map(|((audit_id, tier), sent_at)| DispatchRecord {
                audit_id: audit_id.clone(),
                tier: tier.clone(),
                sent_at: *sent_at,
            })
            .collect();
        records.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.tier.cmp(&b.tier)));
        Ok(records)
    }
}

impl AuditStore for MemoryStore {
    fn list_open_audits(&self) -> Result<Vec<AuditPeriod>, StoreError> {
        let inner = self.lock()?;
        let mut open: Vec<AuditPeriod> = inner
            .audits
            .values()
            .filter(|audit| audit.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.ends_at.cmp(&b.ends_at).then_with(|| a.id.cmp(&b.id)));
        Ok(open)
    }
}

impl DispatchStore for MemoryStore {
    fn list_sent_tiers(&self, audit_id: &AuditId) -> Result<BTreeSet<String>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .dispatched
            .keys()
            .filter(|(id, _)| id == audit_id)
            .map(|(_, tier)| tier.clone())
            .collect())
    }

    fn try_claim_tier(
        &self,
        audit_id: &AuditId,
        tier: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let key = (audit_id.clone(), tier.to_string());
        if inner.dispatched.contains_key(&key) {
            return Ok(false);
        }
        inner.dispatched.insert(key, at);
        Ok(true)
    }

    fn unclaim_tier(&self, audit_id: &AuditId, tier: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.dispatched.remove(&(audit_id.clone(), tier.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn only_open_audits_are_listed() {
        let store = MemoryStore::new();
        let audit = AuditPeriod::new("team-sre", vec!["gary@a.co".to_string()], jan(1), jan(15))
            .unwrap();
        let id = audit.id.clone();
        store.upsert_audit(audit).unwrap();
        assert_eq!(store.list_open_audits().unwrap().len(), 1);
        assert!(store.close_audit(&id).unwrap());
        assert!(store.list_open_audits().unwrap().is_empty());
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let id = AuditId::from("a1");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || store.try_claim_tier(&id, "3d", jan(12)).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.list_dispatch_records(&id).unwrap().len(), 1);
    }
}
