//! Reminder policy: which tiers are due for an audit at a given instant.
//!
//! Everything here is a pure function of its inputs.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::tier::{ReminderTier, TierSchedule};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Whole days left until `ends_at`, rounded up.
///
/// One millisecond before the deadline is still one day left; the deadline
/// itself is zero; anything past it is zero or negative.
pub fn days_left(now: DateTime<Utc>, ends_at: DateTime<Utc>) -> i64 {
    let millis = (ends_at - now).num_milliseconds();
    let whole = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) > 0 {
        whole + 1
    } else {
        whole
    }
}

/// The next tier that will become due, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingTier<'a> {
    pub tier: &'a ReminderTier,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReminderPolicy {
    schedule: TierSchedule,
}

impl ReminderPolicy {
    pub fn new(schedule: TierSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &TierSchedule {
        &self.schedule
    }

    /// All reached tiers not yet in `sent`, oldest threshold first.
    ///
    /// After downtime several thresholds may have passed at once; every one
    /// of them is returned so none is silently skipped, in the order a
    /// recipient would have received them in real time.
    pub fn tiers_due(
        &self,
        now: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        sent: &BTreeSet<String>,
    ) -> Vec<&ReminderTier> {
        let left = days_left(now, ends_at);
        self.schedule
            .tiers()
            .iter()
            .filter(|tier| tier.is_reached(left) && !sent.contains(&tier.name))
            .collect()
    }

    /// The earliest unsent tier that has not been reached yet.
    ///
    /// `None` also when that tier's due instant falls outside the range
    /// `DateTime<Utc>` can represent.
    pub fn next_tier(
        &self,
        now: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        sent: &BTreeSet<String>,
    ) -> Option<UpcomingTier<'_>> {
        let left = days_left(now, ends_at);
        let tier = self
            .schedule
            .tiers()
            .iter()
            .find(|tier| !tier.is_reached(left) && !sent.contains(&tier.name))?;
        let due_at = Duration::try_days(tier.offset_days)
            .and_then(|offset| ends_at.checked_sub_signed(offset))?;
        Some(UpcomingTier { tier, due_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::NotificationKind;
    use chrono::TimeZone;

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn names(tiers: &[&ReminderTier]) -> Vec<String> {
        tiers.iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn days_left_rounds_up() {
        let end = jan(15);
        assert_eq!(days_left(jan(1), end), 14);
        assert_eq!(days_left(end - Duration::milliseconds(1), end), 1);
        assert_eq!(days_left(end - Duration::hours(36), end), 2);
        assert_eq!(days_left(end, end), 0);
        assert_eq!(days_left(end + Duration::hours(12), end), 0);
        assert_eq!(days_left(end + Duration::hours(24), end), -1);
        assert_eq!(days_left(jan(20), end), -5);
    }

    #[test]
    fn escalation_scenario() {
        let policy = ReminderPolicy::default();
        let end = jan(15);
        let mut sent = BTreeSet::new();

        assert_eq!(names(&policy.tiers_due(jan(1), end, &sent)), vec!["14d"]);
        sent.insert("14d".to_string());

        assert!(policy.tiers_due(jan(2), end, &sent).is_empty());
        assert_eq!(names(&policy.tiers_due(jan(12), end, &sent)), vec!["3d"]);
    }

    #[test]
    fn catch_up_returns_every_missed_tier_in_order() {
        let policy = ReminderPolicy::default();
        let due = policy.tiers_due(jan(20), jan(15), &BTreeSet::new());
        assert_eq!(names(&due), vec!["14d", "3d", "overdue"]);
    }

    #[test]
    fn nothing_due_before_first_threshold() {
        let policy = ReminderPolicy::default();
        assert!(policy
            .tiers_due(jan(1) - Duration::days(5), jan(15), &BTreeSet::new())
            .is_empty());
    }

    #[test]
    fn next_tier_reports_due_instant() {
        let policy = ReminderPolicy::default();
        let mut sent = BTreeSet::new();
        sent.insert("14d".to_string());
        let next = policy.next_tier(jan(2), jan(15), &sent).unwrap();
        assert_eq!(next.tier.name, "3d");
        assert_eq!(next.due_at, jan(12));
    }

    #[test]
    fn next_tier_none_when_all_reached() {
        let policy = ReminderPolicy::default();
        assert!(policy.next_tier(jan(15), jan(15), &BTreeSet::new()).is_none());
    }

    #[test]
    fn custom_schedule_with_negative_offset() {
        let schedule = TierSchedule::new(vec![
            ReminderTier::new("notice", 7, NotificationKind::Standard),
            ReminderTier::new("late", -2, NotificationKind::Reminder),
        ])
        .unwrap();
        let policy = ReminderPolicy::new(schedule);
        let sent: BTreeSet<String> = ["notice".to_string()].into_iter().collect();
        assert!(policy.tiers_due(jan(16), jan(15), &sent).is_empty());
        assert_eq!(names(&policy.tiers_due(jan(17), jan(15), &sent)), vec!["late"]);
    }

    #[test]
    fn next_tier_past_representable_time_is_none() {
        let schedule = TierSchedule::new(vec![ReminderTier::new(
            "late",
            -5,
            NotificationKind::Reminder,
        )])
        .unwrap();
        let policy = ReminderPolicy::new(schedule);
        let ends_at = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let now = ends_at - Duration::days(10);
        assert!(policy.next_tier(now, ends_at, &BTreeSet::new()).is_none());
    }
}
