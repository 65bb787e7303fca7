//! SQLite-backed audit and dispatch storage.
//!
//! Each `SqliteStore` owns one connection. Scheduler instances in separate
//! processes (or threads) each open their own store on the same file; the
//! `(audit_id, tier)` primary key is what keeps them from double-sending.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::migrations;
use super::{AuditStore, DispatchRecord, DispatchStore};
use crate::audit::{AuditId, AuditPeriod, AuditStatus};
use crate::error::{Result, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timestamps are stored as fixed-width UTC RFC 3339 so text ordering is
/// chronological.
fn format_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(table: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            message: format!("bad timestamp '{raw}': {e}"),
        })
}

fn owners_to_json(owners: &BTreeSet<String>) -> Result<String, StoreError> {
    serde_json::to_string(owners).map_err(|e| StoreError::Corrupt {
        table: "audits",
        message: e.to_string(),
    })
}

fn owners_from_json(raw: &str) -> Result<BTreeSet<String>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        table: "audits",
        message: format!("bad owners '{raw}': {e}"),
    })
}

/// Raw `audits` row before decoding.
struct AuditRow {
    id: String,
    group_name: String,
    owners: String,
    starts_at: String,
    ends_at: String,
    status: String,
}

const AUDIT_COLUMNS: &str = "id, group_name, owners, starts_at, ends_at, status";

fn read_audit_row(row: &rusqlite::Row) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        id: row.get(0)?,
        group_name: row.get(1)?,
        owners: row.get(2)?,
        starts_at: row.get(3)?,
        ends_at: row.get(4)?,
        status: row.get(5)?,
    })
}

impl AuditRow {
    fn decode(self) -> Result<AuditPeriod, StoreError> {
        let status = AuditStatus::parse(&self.status).ok_or_else(|| StoreError::Corrupt {
            table: "audits",
            message: format!("bad status '{}'", self.status),
        })?;
        Ok(AuditPeriod {
            id: AuditId::from(self.id),
            group: self.group_name,
            owners: owners_from_json(&self.owners)?,
            starts_at: parse_datetime("audits", &self.starts_at)?,
            ends_at: parse_datetime("audits", &self.ends_at)?,
            status,
        })
    }
}

/// SQLite store for audits and dispatch records.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply migrations.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| StoreError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        let store = Self {
            conn,
            path: Some(path),
        };
        store.migrate()?;
        info!(path = %store.path_display(), "opened dispatch store");
        Ok(store)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, path: None };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        migrations::migrate(&self.conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))
    }

    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn path_display(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
    }

    /// Insert a new audit period.
    ///
    /// # Errors
    /// Returns a validation error for malformed audits, or a store error if
    /// the insert fails (including a duplicate id).
    pub fn insert_audit(&self, audit: &AuditPeriod) -> Result<()> {
        audit.validate()?;
        self.conn
            .execute(
                "INSERT INTO audits (id, group_name, owners, starts_at, ends_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    audit.id.as_str(),
                    audit.group,
                    owners_to_json(&audit.owners)?,
                    format_datetime(audit.starts_at),
                    format_datetime(audit.ends_at),
                    audit.status.as_str(),
                ],
            )
            .map_err(StoreError::from)?;
        info!(audit_id = %audit.id, group = %audit.group, "audit inserted");
        Ok(())
    }

    pub fn get_audit(&self, id: &AuditId) -> Result<Option<AuditPeriod>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {AUDIT_COLUMNS} FROM audits WHERE id = ?1"),
                params![id.as_str()],
                read_audit_row,
            )
            .optional()?;
        row.map(AuditRow::decode).transpose()
    }

    /// All audits regardless of status, soonest deadline first.
    pub fn list_audits(&self) -> Result<Vec<AuditPeriod>, StoreError> {
        self.query_audits(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audits ORDER BY ends_at, id"
        ))
    }

    fn query_audits(&self, sql: &str) -> Result<Vec<AuditPeriod>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([], read_audit_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(AuditRow::decode).collect()
    }

    /// Mark an audit closed and drop its dispatch records.
    ///
    /// Returns `false` if no audit has this id.
    pub fn close_audit(&self, id: &AuditId) -> Result<bool, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE audits SET status = 'CLOSED' WHERE id = ?1",
            params![id.as_str()],
        )?;
        let purged = tx.execute(
            "DELETE FROM dispatch_records WHERE audit_id = ?1",
            params![id.as_str()],
        )?;
        tx.commit()?;
        if updated > 0 {
            info!(audit_id = %id, purged_records = purged, "audit closed");
        }
        Ok(updated > 0)
    }

    pub fn list_dispatch_records(&self, id: &AuditId) -> Result<Vec<DispatchRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT tier, sent_at FROM dispatch_records WHERE audit_id = ?1 ORDER BY sent_at, tier",
        )?;
        let rows = stmt
            .query_map(params![id.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(tier, sent_at)| {
                Ok(DispatchRecord {
                    audit_id: id.clone(),
                    tier,
                    sent_at: parse_datetime("dispatch_records", &sent_at)?,
                })
            })
            .collect()
    }
}

impl AuditStore for SqliteStore {
    fn list_open_audits(&self) -> Result<Vec<AuditPeriod>, StoreError> {
        self.query_audits(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audits WHERE status = 'OPEN' ORDER BY ends_at, id"
        ))
    }
}

impl DispatchStore for SqliteStore {
    fn list_sent_tiers(&self, audit_id: &AuditId) -> Result<BTreeSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tier FROM dispatch_records WHERE audit_id = ?1")?;
        let tiers = stmt
            .query_map(params![audit_id.as_str()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(tiers)
    }

    fn try_claim_tier(
        &self,
        audit_id: &AuditId,
        tier: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT INTO dispatch_records (audit_id, tier, sent_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(audit_id, tier) DO NOTHING",
            params![audit_id.as_str(), tier, format_datetime(at)],
        )?;
        debug!(audit_id = %audit_id, tier, claimed = inserted == 1, "claim attempted");
        Ok(inserted == 1)
    }

    fn unclaim_tier(&self, audit_id: &AuditId, tier: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM dispatch_records WHERE audit_id = ?1 AND tier = ?2",
            params![audit_id.as_str(), tier],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn sample_audit() -> AuditPeriod {
        AuditPeriod::new(
            "team-sre",
            vec!["zorkian@a.co".to_string(), "gary@a.co".to_string()],
            jan(1),
            jan(15),
        )
        .unwrap()
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let audit = sample_audit();
        store.insert_audit(&audit).unwrap();
        assert_eq!(store.get_audit(&audit.id).unwrap(), Some(audit));
        assert_eq!(store.get_audit(&AuditId::from("missing")).unwrap(), None);
    }

    #[test]
    fn insert_rejects_invalid_audit() {
        let store = SqliteStore::open_memory().unwrap();
        let mut audit = sample_audit();
        audit.owners.clear();
        assert!(store.insert_audit(&audit).is_err());
        assert!(store.list_audits().unwrap().is_empty());
    }

    #[test]
    fn claim_is_insert_if_absent() {
        let store = SqliteStore::open_memory().unwrap();
        let id = AuditId::from("a1");
        assert!(store.try_claim_tier(&id, "14d", jan(1)).unwrap());
        assert!(!store.try_claim_tier(&id, "14d", jan(2)).unwrap());
        assert!(store.try_claim_tier(&id, "3d", jan(12)).unwrap());

        let sent = store.list_sent_tiers(&id).unwrap();
        assert_eq!(sent.into_iter().collect::<Vec<_>>(), vec!["14d", "3d"]);

        let records = store.list_dispatch_records(&id).unwrap();
        assert_eq!(records[0].sent_at, jan(1));
    }

    #[test]
    fn unclaim_makes_tier_claimable_again() {
        let store = SqliteStore::open_memory().unwrap();
        let id = AuditId::from("a1");
        assert!(store.try_claim_tier(&id, "3d", jan(12)).unwrap());
        store.unclaim_tier(&id, "3d").unwrap();
        assert!(store.list_sent_tiers(&id).unwrap().is_empty());
        assert!(store.try_claim_tier(&id, "3d", jan(13)).unwrap());
        store.unclaim_tier(&id, "never-claimed").unwrap();
    }

    #[test]
    fn close_audit_hides_it_and_purges_records() {
        let store = SqliteStore::open_memory().unwrap();
        let audit = sample_audit();
        store.insert_audit(&audit).unwrap();
        store.try_claim_tier(&audit.id, "14d", jan(1)).unwrap();

        assert!(store.close_audit(&audit.id).unwrap());
        assert!(store.list_open_audits().unwrap().is_empty());
        assert!(store.list_sent_tiers(&audit.id).unwrap().is_empty());
        assert_eq!(
            store.get_audit(&audit.id).unwrap().map(|a| a.status),
            Some(AuditStatus::Closed)
        );
        assert!(!store.close_audit(&AuditId::from("missing")).unwrap());
    }

    #[test]
    fn corrupt_timestamp_is_reported() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO audits (id, group_name, owners, starts_at, ends_at, status)
                 VALUES ('x', 'g', '[\"o@a.co\"]', 'yesterday', 'tomorrow', 'OPEN')",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.list_open_audits(),
            Err(StoreError::Corrupt { table: "audits", .. })
        ));
    }

    #[test]
    fn open_audits_sorted_by_deadline() {
        let store = SqliteStore::open_memory().unwrap();
        let later = sample_audit();
        let sooner = AuditPeriod::new("team-infra", vec!["oliver@a.co".to_string()], jan(1), jan(5))
            .unwrap();
        store.insert_audit(&later).unwrap();
        store.insert_audit(&sooner).unwrap();
        let groups: Vec<_> = store
            .list_open_audits()
            .unwrap()
            .into_iter()
            .map(|a| a.group)
            .collect();
        assert_eq!(groups, vec!["team-infra", "team-sre"]);
    }
}
