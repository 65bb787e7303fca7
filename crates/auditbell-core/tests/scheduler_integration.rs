//! Integration tests for the reminder scheduler against an on-disk SQLite store.
//!
//! Each scheduler instance opens its own connection, the way separate
//! service replicas would.

use auditbell_core::{
    AuditId, AuditPeriod, AuditStore, DeliveryError, DispatchStatus, DispatchStore, JsonlSender,
    NotificationSender, ReminderScheduler, SqliteStore, StoreError, TemplateRenderer,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Barrier;

fn jan(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

fn seed(path: &Path) -> AuditId {
    let store = SqliteStore::open(path).unwrap();
    let audit = AuditPeriod::new(
        "team-sre",
        vec!["zorkian@a.co".to_string(), "gary@a.co".to_string()],
        Utc.with_ymd_and_hms(2023, 12, 15, 0, 0, 0).unwrap(),
        jan(15),
    )
    .unwrap();
    store.insert_audit(&audit).unwrap();
    audit.id
}

struct DownSender;

impl NotificationSender for DownSender {
    fn send(&self, _: &BTreeSet<String>, _: &str, _: &str) -> Result<(), DeliveryError> {
        Err(DeliveryError::Transport("connection reset".into()))
    }
}

/// Holds every reader at a barrier after it has read the sent tiers, so
/// both schedulers decide a tier is due before either claims it.
struct LockstepDispatches<'a> {
    inner: &'a SqliteStore,
    barrier: &'a Barrier,
}

impl DispatchStore for LockstepDispatches<'_> {
    fn list_sent_tiers(&self, audit_id: &AuditId) -> Result<BTreeSet<String>, StoreError> {
        let sent = self.inner.list_sent_tiers(audit_id)?;
        self.barrier.wait();
        Ok(sent)
    }

    fn try_claim_tier(
        &self,
        audit_id: &AuditId,
        tier: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.try_claim_tier(audit_id, tier, at)
    }

    fn unclaim_tier(&self, audit_id: &AuditId, tier: &str) -> Result<(), StoreError> {
        self.inner.unclaim_tier(audit_id, tier)
    }
}

#[test]
fn test_escalation_scenario_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auditbell.db");
    let id = seed(&path);

    let store = SqliteStore::open(&path).unwrap();
    let renderer = TemplateRenderer::default();
    let sender = JsonlSender::new(Vec::new());
    let scheduler = ReminderScheduler::new(&store, &store, &renderer, &sender);

    let first = scheduler.run_once(jan(1)).unwrap();
    assert_eq!(first.sent(), 1);
    assert_eq!(first.outcomes[0].tier, "14d");

    let second = scheduler.run_once(jan(12)).unwrap();
    assert_eq!(second.sent(), 1);
    assert_eq!(second.outcomes[0].tier, "3d");

    let records = store.list_dispatch_records(&id).unwrap();
    let tiers: Vec<_> = records.iter().map(|r| r.tier.as_str()).collect();
    assert_eq!(tiers, vec!["14d", "3d"]);
    assert_eq!(records[0].sent_at, jan(1));

    drop(scheduler);
    let written = String::from_utf8(sender.into_inner()).unwrap();
    assert_eq!(written.lines().count(), 2);
    assert!(written.contains("(3 days left)"));
}

#[test]
fn test_restart_does_not_resend() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auditbell.db");
    seed(&path);
    let renderer = TemplateRenderer::default();

    {
        let store = SqliteStore::open(&path).unwrap();
        let sender = JsonlSender::new(Vec::new());
        let report = ReminderScheduler::new(&store, &store, &renderer, &sender)
            .run_once(jan(1))
            .unwrap();
        assert_eq!(report.sent(), 1);
    }

    let store = SqliteStore::open(&path).unwrap();
    let sender = JsonlSender::new(Vec::new());
    let report = ReminderScheduler::new(&store, &store, &renderer, &sender)
        .run_once(jan(1))
        .unwrap();
    assert!(report.outcomes.is_empty());
}

#[test]
fn test_failed_delivery_is_retried_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auditbell.db");
    let id = seed(&path);
    let renderer = TemplateRenderer::default();

    {
        let store = SqliteStore::open(&path).unwrap();
        let report = ReminderScheduler::new(&store, &store, &renderer, &DownSender)
            .run_once(jan(12))
            .unwrap();
        assert_eq!(report.failed(), 2);
        assert!(store.list_sent_tiers(&id).unwrap().is_empty());
    }

    let store = SqliteStore::open(&path).unwrap();
    let sender = JsonlSender::new(Vec::new());
    let report = ReminderScheduler::new(&store, &store, &renderer, &sender)
        .run_once(jan(12))
        .unwrap();
    let tiers: Vec<_> = report.outcomes.iter().map(|o| o.tier.as_str()).collect();
    assert_eq!(tiers, vec!["14d", "3d"]);
    assert_eq!(report.sent(), 2);
}

#[test]
fn test_concurrent_runs_send_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auditbell.db");
    seed(&path);
    let barrier = Barrier::new(2);

    let statuses: Vec<DispatchStatus> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = &path;
                let barrier = &barrier;
                scope.spawn(move || {
                    let store = SqliteStore::open(path).unwrap();
                    let dispatches = LockstepDispatches {
                        inner: &store,
                        barrier,
                    };
                    let renderer = TemplateRenderer::default();
                    let sender = JsonlSender::new(Vec::new());
                    let report = ReminderScheduler::new(&store, &dispatches, &renderer, &sender)
                        .run_once(jan(1))
                        .unwrap();
                    assert_eq!(report.outcomes.len(), 1);
                    report.outcomes[0].status.clone()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut labels: Vec<_> = statuses.iter().map(|s| s.label()).collect();
    labels.sort_unstable();
    assert_eq!(labels, vec!["SENT", "SKIPPED_DUPLICATE"]);
}

#[test]
fn test_closed_audit_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auditbell.db");
    let id = seed(&path);

    let store = SqliteStore::open(&path).unwrap();
    assert!(store.close_audit(&id).unwrap());
    assert!(store.list_open_audits().unwrap().is_empty());

    let renderer = TemplateRenderer::default();
    let sender = JsonlSender::new(Vec::new());
    let report = ReminderScheduler::new(&store, &store, &renderer, &sender)
        .run_once(jan(12))
        .unwrap();
    assert_eq!(report.audits_scanned, 0);
}
