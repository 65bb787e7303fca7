mod config;
pub mod memory;
mod migrations;
pub mod sqlite;

pub use config::{Config, RenderConfig, SchedulerConfig};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::audit::{AuditId, AuditPeriod};
use crate::error::{ConfigError, StoreError};

/// Read access to audit periods owned by the host's audit workflow.
pub trait AuditStore {
    /// All audits whose status is OPEN.
    fn list_open_audits(&self) -> Result<Vec<AuditPeriod>, StoreError>;
}

/// Durable, uniquely-constrained record of dispatched (audit, tier) pairs.
///
/// `try_claim_tier` must be an atomic insert-if-absent at the storage layer:
/// of any number of concurrent callers for one pair, exactly one sees `true`.
pub trait DispatchStore {
    fn list_sent_tiers(&self, audit_id: &AuditId) -> Result<BTreeSet<String>, StoreError>;

    fn try_claim_tier(
        &self,
        audit_id: &AuditId,
        tier: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Remove a claim so the tier becomes due again. Removing an absent
    /// claim is not an error.
    fn unclaim_tier(&self, audit_id: &AuditId, tier: &str) -> Result<(), StoreError>;
}

/// One dispatched reminder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchRecord {
    pub audit_id: AuditId,
    pub tier: String,
    pub sent_at: DateTime<Utc>,
}

/// Returns the data directory.
///
/// `AUDITBELL_DATA_DIR` wins when set; otherwise `~/.config/auditbell[-dev]/`
/// based on `AUDITBELL_ENV`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("AUDITBELL_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("AUDITBELL_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("auditbell-dev")
            } else {
                base_dir.join("auditbell")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
