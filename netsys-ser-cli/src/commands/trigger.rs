//! Trigger command - apply an operator control level.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use netsys_ser::control::ControlCommand;
use netsys_ser::port::sim::SimulatedEngine;
use netsys_ser::recovery::Submission;
use netsys_ser::rendezvous::ResponderBehavior;
use tokio_util::sync::CancellationToken;

use super::common::{await_report, print_control, print_counters, print_report, run_budget};
use crate::error::CliError;
use crate::runner::{attach_accelerators, CliRunner};

/// Arguments for the trigger command.
#[derive(Debug, Args)]
pub struct TriggerArgs {
    /// Control level 0-7
    #[arg(long)]
    pub level: u8,

    /// Number of responsive accelerators to attach
    #[arg(long, default_value = "1")]
    pub accelerators: usize,
}

/// Run the trigger command.
pub async fn run(config_path: &Path, verbose: bool, args: TriggerArgs) -> Result<(), CliError> {
    let command = ControlCommand::from_level(args.level)?;

    let runner = CliRunner::new(config_path, verbose)?;
    runner.log_startup("trigger");

    let config = runner.service_config();
    let budget = run_budget(&config);
    let engine = Arc::new(SimulatedEngine::new());
    let handle = runner.start_service(engine, config)?;
    let mut reports = handle.subscribe_reports();

    let accelerators = CancellationToken::new();
    let behaviors = vec![
        ResponderBehavior::Ack {
            delay: Duration::ZERO
        };
        args.accelerators
    ];
    attach_accelerators(&handle, behaviors, &accelerators).await?;

    println!("Level {}: {:?}", args.level, command);
    println!();

    let submission = handle.apply_control(command);
    let result = match submission {
        Some(Submission::Queued) => await_report(&mut reports, budget).await.map(|report| {
            print_report(&report);
            print_counters(&handle.counters());
        }),
        Some(other) => {
            println!("  Request {:?}", other);
            Ok(())
        }
        None => Ok(()),
    };

    if result.is_ok() {
        println!("Controller");
        println!("==========");
        println!();
        print_control(&handle.control());
        println!("  State:          {}", handle.state());
        println!();
    }

    accelerators.cancel();
    handle.shutdown().await?;
    result
}
