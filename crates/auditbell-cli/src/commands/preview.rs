use auditbell_core::{days_left, Config, ReminderPolicy};
use std::collections::BTreeSet;

use super::{parse_now, parse_time};

/// Show what a fresh audit with this deadline would receive right now.
pub fn run(ends_at: &str, now: Option<String>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let policy = ReminderPolicy::new(config.tier_schedule()?);
    let ends_at = parse_time(ends_at)?;
    let now = parse_now(now)?;
    let none = BTreeSet::new();

    let left = days_left(now, ends_at);
    let due = policy.tiers_due(now, ends_at, &none);
    let next = policy.next_tier(now, ends_at, &none);

    if json {
        let out = serde_json::json!({
            "now": now,
            "ends_at": ends_at,
            "days_left": left,
            "due": due,
            "next": next,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Days left: {left}");
    if due.is_empty() {
        println!("Due tiers: none");
    } else {
        let names: Vec<_> = due.iter().map(|t| t.name.as_str()).collect();
        println!("Due tiers: {}", names.join(", "));
    }
    match next {
        Some(next) => println!("Next tier: {} at {}", next.tier.name, next.due_at.to_rfc3339()),
        None => println!("Next tier: none"),
    }
    Ok(())
}
