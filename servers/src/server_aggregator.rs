//! # Aggregator Server
//!
//! Runs the DAQ aggregator against a directory of recorded flashlist
//! payloads. Each tick reads every payload concurrently, applies them as one
//! cycle and hands the completed graph to the snapshot exporter.
//!
//! ## Startup:
//! - **Configuration**: defaults, then `server_aggregator.conf`, then
//!   environment and command line.
//! - **Topology**: the JSON topology is loaded and validated; any error in it
//!   aborts startup.
//!
//! The loop stops on Ctrl-C, on SIGTERM, or after `--max-cycles` cycles.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use lib_aggregator::{Aggregator, SessionContext, TopologySpec, UidAllocator};
use tokio::signal;
use tokio::time::MissedTickBehavior;

mod aggregator_logic;
use aggregator_logic::{config, export, logger, source};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"));
    logger::setup_logging(&log_dir, config.log_level.as_deref().unwrap_or("info"))?;

    let topology_path = config.topology_path.clone().context("no topology path configured")?;
    let flashlist_dir = config.flashlist_dir.clone().context("no flashlist directory configured")?;
    let output_dir = config.output_dir.clone().context("no output directory configured")?;

    let topology = TopologySpec::load(&topology_path)
        .with_context(|| format!("cannot load topology {}", topology_path.display()))?;
    let mut uids = UidAllocator::new();
    let daq = topology.build(&mut uids).context("invalid topology")?;

    let mut session = SessionContext::new(config.l0_filter.clone().unwrap_or_default());
    session.tcds_pm_service = config.tcds_pm_service.clone();
    session.tcds_pm_context = config.tcds_pm_context.clone();
    if session.tcds().is_none() {
        log::warn!("No TCDS partition manager configured, TCDS flashlists will be skipped.");
    }

    let mut aggregator = Aggregator::new(daq, session);
    let reporter = aggregator.reporter();
    let exporter = tokio::spawn(export::run(aggregator.subscribe(), output_dir));

    let mut ticker = tokio::time::interval(Duration::from_millis(config.interval_ms.unwrap_or(3000)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    log::info!("Aggregating flashlists from {}", flashlist_dir.display());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let flashlists = match source::read_flashlists(&flashlist_dir).await {
                    Ok(flashlists) => flashlists,
                    Err(e) => {
                        log::error!("Cycle skipped: {:#}", e);
                        continue;
                    }
                };
                let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
                aggregator.run_cycle(flashlists, now);
                if config.max_cycles.is_some_and(|max| aggregator.cycles() >= max) {
                    log::info!("Reached {} cycles, stopping.", aggregator.cycles());
                    break;
                }
            }
        }
    }

    reporter.log_summary();
    // Dropping the aggregator closes the channel and lets the exporter finish.
    drop(aggregator);
    exporter.await.context("snapshot exporter panicked")?;

    log::info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }
}

async fn terminate() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        // On non-unix platforms, just wait forever.
        std::future::pending::<()>().await;
    }
}
