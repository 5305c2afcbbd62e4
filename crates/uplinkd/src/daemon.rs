//! Periodic monitoring loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use uplink_controller::FailoverController;

/// Run a cycle every `interval` until `shutdown` fires or a cycle reports
/// an error that retrying cannot fix.
pub async fn run(
    controller: &FailoverController,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!(interval_secs = interval.as_secs(), "failover daemon started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A cycle cut short here leaves nothing to clean up: the
                // next start re-reads the routing table.
                let report = tokio::select! {
                    report = controller.run_cycle() => report,
                    _ = shutdown.changed() => {
                        info!("shutdown requested during cycle");
                        break;
                    }
                };
                if report.is_process_fatal() {
                    error!(%report, "stopping failover daemon");
                    anyhow::bail!("{report}");
                }
            }
            _ = shutdown.changed() => {
                info!("failover daemon shutting down");
                break;
            }
        }
    }
    Ok(())
}
