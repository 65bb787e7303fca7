//! Scheduler commands: a single pass, or an interval loop.

use auditbell_core::{
    Config, JsonlSender, ReminderPolicy, ReminderScheduler, RunReport, SqliteStore, SystemClock,
    TemplateRenderer,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::{open_store, parse_now};

type Outbox = JsonlSender<Box<dyn Write>>;

fn open_outbox(path: Option<&Path>) -> Result<Outbox, Box<dyn std::error::Error>> {
    let out: Box<dyn Write> = match path {
        Some(path) => Box::new(OpenOptions::new().create(true).append(true).open(path)?),
        None => Box::new(std::io::stdout()),
    };
    Ok(JsonlSender::new(out))
}

fn scheduler<'a>(
    config: &Config,
    store: &'a SqliteStore,
    renderer: &'a TemplateRenderer,
    sender: &'a Outbox,
) -> Result<ReminderScheduler<'a>, Box<dyn std::error::Error>> {
    Ok(ReminderScheduler::new(store, store, renderer, sender)
        .with_policy(ReminderPolicy::new(config.tier_schedule()?))
        .with_retention_horizon(config.retention_horizon()))
}

fn print_summary(report: &RunReport) {
    println!(
        "{} audits scanned, {} sent, {} skipped, {} failed",
        report.audits_scanned,
        report.sent(),
        report.skipped(),
        report.failed()
    );
    for outcome in &report.outcomes {
        println!("  {}  {:<8} {}", outcome.audit_id, outcome.tier, outcome.status);
    }
}

/// One pass. Reminders go to stdout unless an outbox file is given, in
/// which case stdout carries the run report instead.
pub fn run(
    now: Option<String>,
    outbox: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let renderer = TemplateRenderer::from_config(&config.render)?;
    let sender = open_outbox(outbox.as_deref())?;
    let now = parse_now(now)?;

    let report = scheduler(&config, &store, &renderer, &sender)?.run_once(now)?;

    if outbox.is_some() {
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_summary(&report);
        }
    } else if json {
        eprintln!("{}", serde_json::to_string(&report)?);
    } else {
        eprintln!(
            "{} sent, {} skipped, {} failed",
            report.sent(),
            report.skipped(),
            report.failed()
        );
    }

    if report.failed() > 0 {
        return Err(format!("{} reminder(s) failed and will be retried", report.failed()).into());
    }
    Ok(())
}

/// Run passes on an interval until Ctrl-C. A pass that cannot reach the
/// store is logged and retried on the next tick.
pub fn watch(interval: Option<u64>, outbox: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let renderer = TemplateRenderer::from_config(&config.render)?;
    let sender = open_outbox(outbox.as_deref())?;
    let scheduler = scheduler(&config, &store, &renderer, &sender)?;

    let period = Duration::from_secs(interval.unwrap_or(config.scheduler.interval_secs).max(1));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(interval_secs = period.as_secs(), "watching for due reminders");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = scheduler.tick(&SystemClock) {
                        warn!(error = %e, "scheduler pass failed; retrying next tick");
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }
    });
    Ok(())
}
