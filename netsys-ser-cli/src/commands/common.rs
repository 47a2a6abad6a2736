//! Shared output and wait helpers for the simulation commands.

use std::time::Duration;

use netsys_ser::control::ControlSurface;
use netsys_ser::recovery::{CountersSnapshot, RecoveryOutcome, RecoveryReport};
use netsys_ser::service::ServiceConfig;
use tokio::sync::broadcast;

use crate::error::CliError;

/// Slack added to every computed wait.
const WAIT_SLACK: Duration = Duration::from_secs(1);

/// Upper bound on the wall time of one recovery run under `config`.
///
/// Both rendezvous phases may be retried once, and the offload engines are
/// waited on one after the other.
pub fn run_budget(config: &ServiceConfig) -> Duration {
    let recovery = &config.recovery;
    let rendezvous = (recovery.stop_timeout + recovery.resume_timeout)
        * (recovery.rendezvous_retry_limit + 1);

    rendezvous
        + recovery.drain_timeout
        + recovery.warm_reset_timeout
        + recovery.cold_reset_timeout
        + recovery.offload_idle_timeout * 2
        + WAIT_SLACK
}

/// Wait for the next recovery report, giving up after `budget`.
pub async fn await_report(
    reports: &mut broadcast::Receiver<RecoveryReport>,
    budget: Duration,
) -> Result<RecoveryReport, CliError> {
    match tokio::time::timeout(budget, reports.recv()).await {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => Err(CliError::Simulation(format!("report channel: {}", e))),
        Err(_) => Err(CliError::Simulation(format!(
            "no recovery report within {}ms",
            budget.as_millis()
        ))),
    }
}

/// Print a recovery report.
pub fn print_report(report: &RecoveryReport) {
    println!("Recovery Report");
    println!("===============");
    println!();
    println!("  Cause:          {}", report.request.cause);
    println!("  Requested:      {}", report.request.scope);
    println!("  Scope:          {}", report.scope);
    match report.reset_tier {
        Some(tier) => println!("  Reset tier:     {}", tier),
        None => println!("  Reset tier:     (none)"),
    }
    println!("  Duration:       {}ms", report.duration.as_millis());
    match &report.outcome {
        RecoveryOutcome::Succeeded => println!("  Outcome:        succeeded"),
        RecoveryOutcome::SucceededAfterEscalation {
            escalations,
            config_mismatch,
        } => {
            println!(
                "  Outcome:        succeeded after {} escalation(s)",
                escalations
            );
            if *config_mismatch {
                println!("                  restored configuration differs from snapshot");
            }
        }
        RecoveryOutcome::Failed(reason) => println!("  Outcome:        failed: {}", reason),
    }

    let stats = &report.stats;
    println!();
    println!("  Warm resets:    {}", stats.warm_reset_attempts);
    println!("  Cold escalations: {}", stats.cold_reset_escalations);
    println!(
        "  Rendezvous:     {} stop timeout(s), {} resume timeout(s), {} failure(s)",
        stats.stop_timeouts,
        stats.resume_timeouts,
        stats.stop_failures + stats.resume_failures
    );
    if stats.scope_upgraded {
        println!("  Scope upgraded during the run");
    }
    if stats.drain_timed_out {
        println!("  Output queues did not drain in time");
    }
    if stats.offload_idle_timeouts > 0 {
        println!(
            "  Offload engines still busy: {}",
            stats.offload_idle_timeouts
        );
    }
    println!();
}

/// Print every non-zero counter.
pub fn print_counters(counters: &CountersSnapshot) {
    println!("Counters");
    println!("========");
    println!();
    for (name, value) in counters.entries() {
        if value > 0 || name == "runs_total" {
            println!("  {:<24} {}", name, value);
        }
    }
    println!();
}

/// Print the operator-visible control state.
pub fn print_control(control: &ControlSurface) {
    println!("  Auto-recovery:  {}", control.auto_recovery());
    println!("  Diagnostics:    {}", control.verbosity().as_str());
}
