//! Audit period management commands for CLI.

use auditbell_core::{AuditId, AuditPeriod, Config};
use clap::Subcommand;

use super::{open_store, parse_time};

#[derive(Subcommand)]
pub enum AuditAction {
    /// Open a new audit period
    Add {
        /// Use this ID instead of a generated one (e.g. the host's ticket key)
        #[arg(long)]
        id: Option<String>,
        /// Group being audited
        #[arg(long)]
        group: String,
        /// Owner address to notify (repeatable)
        #[arg(long = "owner", required = true)]
        owners: Vec<String>,
        /// Start of the audit window (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        starts_at: String,
        /// Deadline (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        ends_at: String,
    },
    /// List audit periods
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one audit with its dispatch records
    Show {
        /// Audit ID
        id: String,
    },
    /// Close an audit and drop its dispatch records
    Close {
        /// Audit ID
        id: String,
    },
    /// List the tiers already sent for an audit
    Sent {
        /// Audit ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: AuditAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = open_store(&config)?;

    match action {
        AuditAction::Add {
            id,
            group,
            owners,
            starts_at,
            ends_at,
        } => {
            let mut audit =
                AuditPeriod::new(group, owners, parse_time(&starts_at)?, parse_time(&ends_at)?)?;
            if let Some(id) = id {
                audit = audit.with_id(id);
            }
            store.insert_audit(&audit)?;
            println!("Audit created: {}", audit.id);
            println!("{}", serde_json::to_string_pretty(&audit)?);
        }
        AuditAction::List { json } => {
            let audits = store.list_audits()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&audits)?);
            } else if audits.is_empty() {
                println!("No audits found.");
            } else {
                for audit in &audits {
                    println!(
                        "{}  {:<6}  {}  {}  {}",
                        audit.id,
                        audit.status.as_str(),
                        audit.ends_at.format("%Y-%m-%d %H:%M"),
                        audit.group,
                        audit.owners.iter().cloned().collect::<Vec<_>>().join(","),
                    );
                }
            }
        }
        AuditAction::Show { id } => {
            let id = AuditId::from(id);
            let audit = store
                .get_audit(&id)?
                .ok_or_else(|| format!("audit not found: {id}"))?;
            let dispatches = store.list_dispatch_records(&id)?;
            let out = serde_json::json!({
                "audit": audit,
                "dispatches": dispatches,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        AuditAction::Close { id } => {
            let id = AuditId::from(id);
            if !store.close_audit(&id)? {
                return Err(format!("audit not found: {id}").into());
            }
            println!("Audit closed: {id}");
        }
        AuditAction::Sent { id, json } => {
            let id = AuditId::from(id);
            let records = store.list_dispatch_records(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No reminders sent.");
            } else {
                for record in &records {
                    println!("{:<10} {}", record.tier, record.sent_at.to_rfc3339());
                }
            }
        }
    }
    Ok(())
}
