//! # Auditbell Core Library
//!
//! This library decides which group owners need an audit reminder, at which
//! escalation tier, and makes sure each tier goes out at most once per audit
//! even with several scheduler instances running against the same store.
//!
//! ## Architecture
//!
//! - **Policy**: pure mapping from (now, deadline, tiers already sent) to the
//!   tiers now due
//! - **Deduplicator**: claims (audit, tier) pairs through the store's atomic
//!   insert-if-absent
//! - **Scheduler**: scans open audits, claims, renders, sends, and releases
//!   claims whose delivery failed
//! - **Storage**: SQLite-backed audit and dispatch records, TOML configuration
//!
//! ## Key Components
//!
//! - [`ReminderScheduler`]: one scan per call to `run_once`
//! - [`ReminderPolicy`]: which tiers are due
//! - [`NotificationDeduplicator`]: at-most-once bookkeeping
//! - [`SqliteStore`]: durable store with a unique `(audit_id, tier)` key
//! - [`Config`]: application configuration management

pub mod audit;
pub mod clock;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod policy;
pub mod render;
pub mod scheduler;
pub mod sender;
pub mod storage;
pub mod tier;

pub use audit::{AuditId, AuditPeriod, AuditStatus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use dedup::NotificationDeduplicator;
pub use dispatch::{DispatchOutcome, DispatchRequest, DispatchState, DispatchStatus};
pub use error::{
    ConfigError, CoreError, DedupError, DeliveryError, RenderError, SchedulerError, StoreError,
    ValidationError,
};
pub use policy::{days_left, ReminderPolicy, UpcomingTier};
pub use render::{NotificationRenderer, RenderedNotification, TemplatePair, TemplateRenderer};
pub use scheduler::{ReminderScheduler, RunReport};
pub use sender::{JsonlSender, NotificationSender};
pub use storage::{
    AuditStore, Config, DispatchRecord, DispatchStore, MemoryStore, SqliteStore,
};
pub use tier::{NotificationKind, ReminderTier, TierSchedule};
