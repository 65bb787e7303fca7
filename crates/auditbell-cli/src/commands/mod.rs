pub mod audit;
pub mod config;
pub mod preview;
pub mod run;

use auditbell_core::{Config, SqliteStore};
use chrono::{DateTime, NaiveDate, Utc};

/// Parse an RFC 3339 timestamp, or a bare date taken as midnight UTC.
pub fn parse_time(input: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| format!("invalid time '{input}': expected RFC 3339 or YYYY-MM-DD"))
}

pub fn parse_now(input: Option<String>) -> Result<DateTime<Utc>, String> {
    input.as_deref().map_or_else(|| Ok(Utc::now()), parse_time)
}

pub fn open_store(config: &Config) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    Ok(SqliteStore::open(config.database_path()?)?)
}
