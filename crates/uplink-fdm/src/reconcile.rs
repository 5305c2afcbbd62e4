//! Route reconciler: keeps the backup static route present or absent.
//!
//! The device's routing table is the only state. Each call re-reads it,
//! decides whether the backup route is there, and writes only when the
//! table differs from what was asked for.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::deploy::{DeployOutcome, DeployPolicy, DeploymentWaiter};
use crate::error::FdmResult;
use crate::model::{ItemList, RouteDescriptor, StaticRouteEntry, VirtualRouterId};
use crate::objects::ObjectResolver;
use crate::route::{RouteBuilder, TargetRoute};
use crate::session::Session;

/// Whether the backup route is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingState {
    /// No backup route; traffic uses the primary uplink.
    Primary,
    /// Backup route present.
    Failover,
}

impl RoutingState {
    /// State implied by the result of [`RouteReconciler::find_route`].
    pub fn from_route(route: Option<&StaticRouteEntry>) -> Self {
        match route {
            Some(_) => RoutingState::Failover,
            None => RoutingState::Primary,
        }
    }
}

impl fmt::Display for RoutingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingState::Primary => write!(f, "PRIMARY"),
            RoutingState::Failover => write!(f, "FAILOVER"),
        }
    }
}

/// Result of an add or delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteChange {
    /// The table was changed and the change deployed.
    Applied,
    /// The table already matched; nothing was written.
    AlreadyInPlace,
    /// The table was changed but the deployment did not confirm it.
    Unconfirmed(DeployOutcome),
}

impl RouteChange {
    /// `true` only when a change was made and deployed.
    pub fn applied(&self) -> bool {
        matches!(self, RouteChange::Applied)
    }

    fn from_outcome(outcome: DeployOutcome) -> Self {
        if outcome.is_deployed() {
            RouteChange::Applied
        } else {
            RouteChange::Unconfirmed(outcome)
        }
    }
}

pub struct RouteReconciler<'a> {
    session: &'a Session,
    router: VirtualRouterId,
    target: TargetRoute,
    policy: DeployPolicy,
}

impl<'a> RouteReconciler<'a> {
    pub fn new(
        session: &'a Session,
        router: VirtualRouterId,
        target: TargetRoute,
        policy: DeployPolicy,
    ) -> Self {
        Self {
            session,
            router,
            target,
            policy,
        }
    }

    fn routes_path(&self) -> String {
        format!(
            "/devices/default/routing/virtualrouters/{}/staticrouteentries",
            self.router
        )
    }

    /// The installed route matching the target's network and gateway, if
    /// any.
    pub async fn find_route(&self) -> FdmResult<Option<StaticRouteEntry>> {
        let routes: ItemList<StaticRouteEntry> = self.session.get_json(&self.routes_path()).await?;
        let resolver = ObjectResolver::new(self.session);
        let mut values: HashMap<String, String> = HashMap::new();

        for route in routes.items {
            let (Some(gateway), Some(network)) = (&route.gateway, route.networks.first()) else {
                debug!(route = %route.id, "skipping route without gateway or network");
                continue;
            };

            let gateway_value = cached_value(&resolver, &mut values, &gateway.id).await?;
            let network_value = cached_value(&resolver, &mut values, &network.id).await?;

            if self.target.matches_values(&network_value, &gateway_value) {
                debug!(route = %route.id, name = %route.name, "found backup route");
                return Ok(Some(route));
            }
        }
        Ok(None)
    }

    pub async fn routing_state(&self) -> FdmResult<RoutingState> {
        let route = self.find_route().await?;
        Ok(RoutingState::from_route(route.as_ref()))
    }

    /// Install the backup route unless it is already there.
    pub async fn add_route(&self) -> FdmResult<RouteChange> {
        if let Some(existing) = self.find_route().await? {
            info!(route = %existing.id, "backup route already installed");
            return Ok(RouteChange::AlreadyInPlace);
        }

        let descriptor = RouteBuilder::new(self.session).build(&self.target).await?;
        let created: StaticRouteEntry = self
            .session
            .post_json::<RouteDescriptor, _>(&self.routes_path(), Some(&descriptor))
            .await?;
        info!(
            route = %created.id,
            network = %self.target.network,
            gateway = %self.target.gateway,
            interface = %self.target.interface,
            "backup route created"
        );

        self.deploy().await
    }

    /// Remove the backup route if it is installed.
    pub async fn delete_route(&self) -> FdmResult<RouteChange> {
        let Some(existing) = self.find_route().await? else {
            info!("no backup route installed");
            return Ok(RouteChange::AlreadyInPlace);
        };

        let path = format!("{}/{}", self.routes_path(), existing.id);
        self.session.delete(&path).await?;
        info!(route = %existing.id, "backup route deleted");

        self.deploy().await
    }

    async fn deploy(&self) -> FdmResult<RouteChange> {
        let outcome = DeploymentWaiter::new(self.session, self.policy)
            .deploy()
            .await?;
        if !outcome.is_deployed() {
            warn!(%outcome, "route change is staged but not confirmed active");
        }
        Ok(RouteChange::from_outcome(outcome))
    }
}

async fn cached_value(
    resolver: &ObjectResolver<'_>,
    cache: &mut HashMap<String, String>,
    id: &str,
) -> FdmResult<String> {
    if let Some(value) = cache.get(id) {
        return Ok(value.clone());
    }
    let value = resolver.object_value(id).await?;
    cache.insert(id.to_string(), value.clone());
    Ok(value)
}
