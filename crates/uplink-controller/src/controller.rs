//! Failover controller: drives one monitoring cycle at a time.
//!
//! The routing state is never stored: every cycle reads it back from the
//! device's static route table, so a cycle that died halfway is repaired
//! by the next one.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use uplink_core::UplinkConfig;
use uplink_fdm::{
    DeployPolicy, FdmClient, FdmResult, RouteBuilder, RouteChange, RouteReconciler, RoutingState,
    Session, TargetRoute, Transport,
};
use uplink_health::{HealthMonitor, HealthVerdict, Prober};

use crate::report::CycleReport;

/// Which way to move the routing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Install the backup route.
    Failover,
    /// Withdraw the backup route.
    Restore,
}

impl From<HealthVerdict> for Direction {
    fn from(verdict: HealthVerdict) -> Self {
        match verdict {
            HealthVerdict::Healthy => Direction::Restore,
            HealthVerdict::Unhealthy => Direction::Failover,
        }
    }
}

/// Routing state as read from the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteStatus {
    pub state: String,
    /// Id of the installed backup route, if any.
    pub route_id: Option<String>,
}

/// Identifiers resolved by a connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCheck {
    pub virtual_router_id: String,
    pub interface_id: String,
    pub interface_name: String,
}

pub struct FailoverController {
    config: UplinkConfig,
    client: FdmClient,
    monitor: HealthMonitor,
    /// Held for the duration of a cycle.
    in_flight: Mutex<()>,
}

impl FailoverController {
    pub fn new(config: UplinkConfig, transport: Arc<dyn Transport>, prober: Arc<dyn Prober>) -> Self {
        let monitor = HealthMonitor::new(config.probe.clone(), prober);
        Self {
            config,
            client: FdmClient::new(transport),
            monitor,
            in_flight: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &UplinkConfig {
        &self.config
    }

    /// One monitoring cycle: probe, then move the routing state to match.
    pub async fn run_cycle(&self) -> CycleReport {
        self.exclusive(async {
            let (sample, verdict) = match self.monitor.check().await {
                Ok(checked) => checked,
                Err(e) => {
                    error!(error = %e, "health probe failed");
                    return CycleReport::from_probe_error(&e);
                }
            };
            debug!(%sample, ?verdict, "health sampled");
            self.apply(Direction::from(verdict)).await
        })
        .await
    }

    /// Move the routing state without probing.
    pub async fn force(&self, direction: Direction) -> CycleReport {
        info!(?direction, "operator override");
        self.exclusive(self.apply(direction)).await
    }

    /// Current routing state, read-only.
    pub async fn status(&self) -> FdmResult<RouteStatus> {
        let session = self.login().await?;
        let router = session.global_virtual_router().await?;
        let reconciler = self.reconciler(&session, router);
        let route = reconciler.find_route().await?;
        let state = RoutingState::from_route(route.as_ref());
        Ok(RouteStatus {
            state: state.to_string(),
            route_id: route.map(|r| r.id),
        })
    }

    /// Verify credentials and resolve the router and egress interface.
    pub async fn check(&self) -> FdmResult<DeviceCheck> {
        let session = self.login().await?;
        let virtual_router_id = session.global_virtual_router().await?;
        let iface = RouteBuilder::new(&session)
            .find_interface(&self.config.failover.interface)
            .await?;
        info!(router = %virtual_router_id, interface = %iface.id, "device check passed");
        Ok(DeviceCheck {
            virtual_router_id,
            interface_id: iface.id,
            interface_name: iface.name,
        })
    }

    /// Run `work` under the single-flight guard and the cycle timeout.
    async fn exclusive(&self, work: impl Future<Output = CycleReport>) -> CycleReport {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("previous cycle still running, skipping");
            return CycleReport::Skipped;
        };

        let limit = self.config.schedule.cycle_timeout();
        match tokio::time::timeout(limit, work).await {
            Ok(report) => report,
            Err(_) => {
                warn!(timeout = ?limit, "cycle timed out, device state unknown until next cycle");
                CycleReport::PartialFailure {
                    reason: format!("cycle did not finish within {limit:?}"),
                }
            }
        }
    }

    async fn apply(&self, direction: Direction) -> CycleReport {
        let change = match self.reconcile(direction).await {
            Ok(change) => change,
            Err(e) => {
                error!(error = %e, ?direction, "route reconciliation failed");
                return CycleReport::from_fdm_error(&e);
            }
        };

        let report = match (direction, change) {
            (Direction::Failover, RouteChange::Applied) => CycleReport::FailedOver,
            (Direction::Restore, RouteChange::Applied) => CycleReport::Restored,
            (Direction::Failover, RouteChange::AlreadyInPlace) => CycleReport::NoOpFailover,
            (Direction::Restore, RouteChange::AlreadyInPlace) => CycleReport::NoOpPrimary,
            (_, RouteChange::Unconfirmed(outcome)) => CycleReport::PartialFailure {
                reason: outcome.to_string(),
            },
        };
        info!(%report, "cycle finished");
        report
    }

    async fn reconcile(&self, direction: Direction) -> FdmResult<RouteChange> {
        let session = self.login().await?;
        let router = session.global_virtual_router().await?;
        let reconciler = self.reconciler(&session, router);
        match direction {
            Direction::Failover => reconciler.add_route().await,
            Direction::Restore => reconciler.delete_route().await,
        }
    }

    async fn login(&self) -> FdmResult<Session> {
        let firewall = &self.config.firewall;
        self.client.login(&firewall.username, &firewall.password).await
    }

    fn reconciler<'a>(&self, session: &'a Session, router: String) -> RouteReconciler<'a> {
        RouteReconciler::new(
            session,
            router,
            TargetRoute::from(&self.config.failover),
            DeployPolicy::from(&self.config.deploy),
        )
    }
}
