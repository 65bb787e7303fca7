//! Reminder scheduler.
//!
//! One call to [`ReminderScheduler::run_once`] is one scan:
//! - Loads open audits still inside the retention horizon
//! - Asks the policy which tiers are due for each
//! - Claims each due tier before sending it
//! - Releases the claim if rendering or delivery fails
//!
//! The scheduler keeps no state between runs. Any number of instances may
//! run against the same dispatch store at once.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::audit::AuditPeriod;
use crate::clock::Clock;
use crate::dedup::NotificationDeduplicator;
use crate::dispatch::{DispatchOutcome, DispatchRequest, DispatchState, DispatchStatus};
use crate::error::{DedupError, SchedulerError};
use crate::policy::{days_left, ReminderPolicy};
use crate::render::NotificationRenderer;
use crate::sender::NotificationSender;
use crate::storage::{AuditStore, DispatchStore};
use crate::tier::ReminderTier;

/// Default number of days past its deadline an open audit keeps being scanned.
pub const DEFAULT_RETENTION_HORIZON_DAYS: i64 = 30;

/// Summary of one scheduler run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub ran_at: DateTime<Utc>,
    /// Open audits inside the retention horizon.
    pub audits_scanned: usize,
    /// Open audits skipped for being past the retention horizon.
    pub audits_expired: usize,
    pub outcomes: Vec<DispatchOutcome>,
}

impl RunReport {
    fn new(ran_at: DateTime<Utc>) -> Self {
        Self {
            ran_at,
            audits_scanned: 0,
            audits_expired: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn sent(&self) -> usize {
        self.count(|s| matches!(s, DispatchStatus::Sent))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, DispatchStatus::SkippedDuplicate))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| {
            matches!(
                s,
                DispatchStatus::FailedRolledBack { .. } | DispatchStatus::FailedClaimRetained { .. }
            )
        })
    }

    fn count(&self, pred: impl Fn(&DispatchStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Periodic reminder scan over open audits.
pub struct ReminderScheduler<'a> {
    audits: &'a dyn AuditStore,
    dispatches: &'a dyn DispatchStore,
    renderer: &'a dyn NotificationRenderer,
    sender: &'a dyn NotificationSender,
    policy: ReminderPolicy,
    retention_horizon: Duration,
}

impl<'a> ReminderScheduler<'a> {
    /// Create a scheduler with the default tier schedule and retention horizon.
    pub fn new(
        audits: &'a dyn AuditStore,
        dispatches: &'a dyn DispatchStore,
        renderer: &'a dyn NotificationRenderer,
        sender: &'a dyn NotificationSender,
    ) -> Self {
        Self {
            audits,
            dispatches,
            renderer,
            sender,
            policy: ReminderPolicy::default(),
            retention_horizon: Duration::days(DEFAULT_RETENTION_HORIZON_DAYS),
        }
    }

    pub fn with_policy(mut self, policy: ReminderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retention_horizon(mut self, horizon: Duration) -> Self {
        self.retention_horizon = horizon;
        self
    }

    pub fn policy(&self) -> &ReminderPolicy {
        &self.policy
    }

    /// Run once at the clock's current time.
    pub fn tick(&self, clock: &dyn Clock) -> Result<RunReport, SchedulerError> {
        self.run_once(clock.now())
    }

    /// Scan all open audits and dispatch every due, unclaimed tier.
    ///
    /// # Errors
    /// Returns `SchedulerError::StoreUnavailable` if reading audits, reading
    /// sent tiers, or claiming fails. Render and delivery failures never
    /// abort the run; they show up as outcomes.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<RunReport, SchedulerError> {
        info!(%now, "reminder run started");
        let mut report = RunReport::new(now);

        let audits = self.audits.list_open_audits().map_err(|e| {
            error!(error = %e, "failed to load open audits; aborting run");
            SchedulerError::from(e)
        })?;
        let dedup = NotificationDeduplicator::new(self.dispatches);

        for audit in audits.iter().filter(|audit| audit.is_open()) {
            // A horizon reaching past the end of representable time never expires.
            let expired = audit
                .ends_at
                .checked_add_signed(self.retention_horizon)
                .is_some_and(|expires_at| expires_at < now);
            if expired {
                debug!(audit_id = %audit.id, ends_at = %audit.ends_at, "audit past retention horizon");
                report.audits_expired += 1;
                continue;
            }
            report.audits_scanned += 1;

            let sent = dedup.sent_tiers(&audit.id).map_err(|e| {
                error!(audit_id = %audit.id, error = %e, "failed to load sent tiers; aborting run");
                SchedulerError::from(e)
            })?;
            let left = days_left(now, audit.ends_at);

            for tier in self.policy.tiers_due(now, audit.ends_at, &sent) {
                let status = self.dispatch(&dedup, audit, tier, left, now)?;
                report.outcomes.push(DispatchOutcome {
                    audit_id: audit.id.clone(),
                    tier: tier.name.clone(),
                    status,
                });
            }
        }

        info!(
            audits = report.audits_scanned,
            expired = report.audits_expired,
            sent = report.sent(),
            skipped = report.skipped(),
            failed = report.failed(),
            "reminder run finished"
        );
        Ok(report)
    }

    /// Claim, render, send; release the claim on failure.
    ///
    /// The pair enters as DUE. The returned status always agrees with the
    /// state the pair ends in here, except a lost claim, which stays DUE
    /// locally while the winner drives it to SENT.
    fn dispatch(
        &self,
        dedup: &NotificationDeduplicator<'_, dyn DispatchStore + 'a>,
        audit: &AuditPeriod,
        tier: &ReminderTier,
        days_left: i64,
        now: DateTime<Utc>,
    ) -> Result<DispatchStatus, SchedulerError> {
        let mut state = DispatchState::Pending;
        advance(&mut state, DispatchState::Due);

        match dedup.record_sent(&audit.id, &tier.name, now) {
            Ok(()) => advance(&mut state, DispatchState::Dispatching),
            Err(DedupError::AlreadyRecorded { .. }) => {
                debug!(audit_id = %audit.id, tier = %tier.name, "tier already claimed elsewhere");
                return Ok(DispatchStatus::SkippedDuplicate);
            }
            Err(DedupError::Store(e)) => {
                error!(audit_id = %audit.id, tier = %tier.name, error = %e, "claim failed; aborting run");
                return Err(e.into());
            }
        }

        let request = DispatchRequest::new(audit, tier, days_left);
        let delivered = self
            .renderer
            .render(&request)
            .map_err(|e| format!("render failed: {e}"))
            .and_then(|rendered| {
                self.sender
                    .send(&request.owners, &rendered.subject, &rendered.body)
                    .map_err(|e| format!("delivery failed: {e}"))
            });

        let reason = match delivered {
            Ok(()) => {
                advance(&mut state, DispatchState::Sent);
                info!(
                    audit_id = %audit.id,
                    group = %audit.group,
                    tier = %tier.name,
                    days_left,
                    recipients = request.owners.len(),
                    "reminder sent"
                );
                return Ok(settle(state, DispatchStatus::Sent));
            }
            Err(reason) => reason,
        };
        advance(&mut state, DispatchState::Failed);

        match dedup.release(&audit.id, &tier.name) {
            Ok(()) => {
                advance(&mut state, DispatchState::Due);
                warn!(audit_id = %audit.id, tier = %tier.name, %reason, "dispatch failed; claim released for retry");
                Ok(settle(state, DispatchStatus::FailedRolledBack { reason }))
            }
            Err(e) => {
                error!(
                    audit_id = %audit.id,
                    tier = %tier.name,
                    %reason,
                    release_error = %e,
                    "dispatch failed and claim could not be released; tier will not retry"
                );
                Ok(settle(
                    state,
                    DispatchStatus::FailedClaimRetained {
                        reason: format!("{reason}; release failed: {e}"),
                    },
                ))
            }
        }
    }
}

fn advance(state: &mut DispatchState, to: DispatchState) {
    debug_assert!(
        state.can_transition_to(&to),
        "illegal dispatch transition {state:?} -> {to:?}"
    );
    *state = to;
}

fn settle(state: DispatchState, status: DispatchStatus) -> DispatchStatus {
    debug_assert_eq!(state, status.state());
    status
}
