//! Simulate command - inject a hang and watch the controller recover.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use netsys_ser::datapath::DatapathId;
use netsys_ser::port::sim::SimulatedEngine;
use netsys_ser::port::ResetTier;
use netsys_ser::rendezvous::ResponderBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{await_report, print_control, print_counters, print_report, run_budget};
use crate::error::CliError;
use crate::runner::{attach_accelerators, CliRunner};

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Datapath to hang (e.g. qdma_tx, gdm_rx)
    #[arg(long, value_name = "DATAPATH")]
    pub hang: DatapathId,

    /// Make the cold reset stall as well (with --warm-stuck the run aborts)
    #[arg(long)]
    pub cold: bool,

    /// Make the warm reset stall, forcing escalation to a cold reset
    #[arg(long)]
    pub warm_stuck: bool,

    /// Number of responsive accelerators to attach
    #[arg(long, default_value = "2")]
    pub accelerators: usize,

    /// Attach one more accelerator that never acknowledges
    #[arg(long)]
    pub silent_accelerator: bool,

    /// Stale ticks before a hang is confirmed (overrides the config file)
    #[arg(long, value_name = "N")]
    pub ticks: Option<u32>,
}

/// Run the simulate command.
pub async fn run(config_path: &Path, verbose: bool, args: SimulateArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(config_path, verbose)?;
    runner.log_startup("simulate");

    let mut config = runner.service_config();
    if let Some(ticks) = args.ticks {
        if ticks == 0 {
            return Err(CliError::Config("--ticks must be at least 1".to_string()));
        }
        config.monitor = config.monitor.with_hang_threshold(ticks);
    }
    if runner.config().monitor.disabled_datapaths.contains(&args.hang) {
        return Err(CliError::Config(format!(
            "datapath {} is disabled in the configuration file",
            args.hang
        )));
    }

    let engine = Arc::new(SimulatedEngine::new());
    if args.warm_stuck {
        engine.set_reset_stuck(ResetTier::Warm);
    }
    if args.cold {
        engine.set_reset_stuck(ResetTier::Cold);
    }

    // Detection needs one baseline sample plus `threshold` stale ones.
    let detection = config.monitor.tick_interval * (config.monitor.hang_threshold + 2);
    let budget = detection + run_budget(&config);

    let handle = runner.start_service(Arc::clone(&engine), config)?;
    let mut reports = handle.subscribe_reports();

    let mut behaviors = vec![
        ResponderBehavior::Ack {
            delay: Duration::ZERO
        };
        args.accelerators
    ];
    if args.silent_accelerator {
        behaviors.push(ResponderBehavior::Silent);
    }
    let accelerators = CancellationToken::new();
    attach_accelerators(&handle, behaviors, &accelerators).await?;

    println!(
        "Injecting hang on {} ({} accelerator(s) online)",
        args.hang,
        handle.accelerators_online().len()
    );
    println!();
    info!(datapath = %args.hang, "Injecting simulated hang");
    engine.inject_hang(args.hang);

    let result = await_report(&mut reports, budget).await;

    if let Ok(report) = &result {
        print_report(report);
        print_counters(&handle.counters());
        println!("Controller");
        println!("==========");
        println!();
        print_control(&handle.control());
        println!("  Engine hung:    {}", engine.is_hung(args.hang));
        println!("  State:          {}", handle.state());
        println!();
    }

    accelerators.cancel();
    handle.shutdown().await?;
    result.map(|_| ())
}
