//! Static route assembly.

use std::net::Ipv4Addr;

use tracing::debug;

use uplink_core::{FailoverConfig, Ipv4Cidr};

use crate::error::{FdmError, FdmResult};
use crate::model::{
    Interface, ItemList, OBJECT_DESCRIPTION, ObjectRef, ROUTE_METRIC, ROUTE_NAME, RouteDescriptor,
};
use crate::objects::ObjectResolver;
use crate::session::Session;

const INTERFACES_PATH: &str = "/devices/default/interfaces";

/// The backup route this system manages.
///
/// Two routes are the same route when their destination network address
/// and gateway address match; ids and prefix lengths do not take part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRoute {
    pub network: Ipv4Cidr,
    pub gateway: Ipv4Addr,
    /// Hardware name of the egress port.
    pub interface: String,
}

impl From<&FailoverConfig> for TargetRoute {
    fn from(config: &FailoverConfig) -> Self {
        Self {
            network: config.route,
            gateway: config.gateway,
            interface: config.interface.clone(),
        }
    }
}

impl TargetRoute {
    /// Whether a remote route with these object values is this route.
    ///
    /// Values may carry a `/mask` suffix; only the address part counts.
    pub fn matches_values(&self, network_value: &str, gateway_value: &str) -> bool {
        let network = address_part(network_value);
        let gateway = address_part(gateway_value);
        network == Some(self.network.network()) && gateway == Some(self.gateway)
    }
}

fn address_part(value: &str) -> Option<Ipv4Addr> {
    value.split('/').next()?.trim().parse().ok()
}

/// Gathers the interface and objects a static route refers to.
pub struct RouteBuilder<'a> {
    session: &'a Session,
}

impl<'a> RouteBuilder<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Look up an interface by its hardware port name.
    pub async fn find_interface(&self, hardware_name: &str) -> FdmResult<Interface> {
        let interfaces: ItemList<Interface> = self.session.get_json(INTERFACES_PATH).await?;
        interfaces
            .items
            .into_iter()
            .find(|i| i.hardware_name == hardware_name)
            .ok_or_else(|| FdmError::InterfaceNotFound(hardware_name.to_string()))
    }

    /// Resolve every reference and return the creation body for `target`.
    ///
    /// The interface is resolved first so a misconfigured port name fails
    /// before any object is created.
    pub async fn build(&self, target: &TargetRoute) -> FdmResult<RouteDescriptor> {
        let iface = self.find_interface(&target.interface).await?;
        debug!(id = %iface.id, name = %iface.name, "resolved failover interface");

        let resolver = ObjectResolver::new(self.session);
        let network = resolver.ensure_network(&target.network).await?;
        let gateway = resolver.ensure_gateway(target.gateway).await?;

        Ok(RouteDescriptor {
            name: ROUTE_NAME.to_string(),
            description: OBJECT_DESCRIPTION.to_string(),
            iface: ObjectRef::new(iface.id, "physicalinterface", iface.name),
            networks: vec![ObjectRef::new(network.id, "networkobject", network.name)],
            gateway: ObjectRef::new(gateway.id, "networkobject", gateway.name),
            metric_value: ROUTE_METRIC,
            ip_type: "IPv4".to_string(),
            kind: "staticrouteentry".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fake::FakeFdm;
    use crate::session::FdmClient;

    fn target() -> TargetRoute {
        TargetRoute {
            network: Ipv4Cidr::parse("0.0.0.0/0").unwrap(),
            gateway: Ipv4Addr::new(203, 0, 113, 1),
            interface: "GigabitEthernet0/2".to_string(),
        }
    }

    #[test]
    fn matching_ignores_masks() {
        let target = target();
        assert!(target.matches_values("0.0.0.0/0.0.0.0", "203.0.113.1"));
        assert!(target.matches_values("0.0.0.0", "203.0.113.1/255.255.255.255"));
        assert!(!target.matches_values("0.0.0.0/0.0.0.0", "203.0.113.2"));
        assert!(!target.matches_values("10.0.0.0/255.0.0.0", "203.0.113.1"));
        assert!(!target.matches_values("garbage", "203.0.113.1"));
    }

    #[test]
    fn matching_uses_network_address_of_target() {
        let target = TargetRoute {
            network: Ipv4Cidr::parse("10.1.2.3/16").unwrap(),
            ..target()
        };
        assert!(target.matches_values("10.1.0.0/255.255.0.0", "203.0.113.1"));
    }

    #[tokio::test]
    async fn build_produces_complete_descriptor() {
        let fake = Arc::new(
            FakeFdm::new("admin", "pw").with_interface("if-7", "outside2", "GigabitEthernet0/2"),
        );
        let session = FdmClient::new(fake.clone()).login("admin", "pw").await.unwrap();

        let descriptor = RouteBuilder::new(&session).build(&target()).await.unwrap();

        assert_eq!(descriptor.name, "route_BACKUP");
        assert_eq!(descriptor.iface, ObjectRef::new("if-7", "physicalinterface", "outside2"));
        assert_eq!(descriptor.networks.len(), 1);
        assert_eq!(descriptor.networks[0].name, "network_0.0.0.0");
        assert_eq!(descriptor.gateway.name, "gateway_203.0.113.1");
        assert_eq!(descriptor.metric_value, 1);
        assert_eq!(descriptor.ip_type, "IPv4");
        assert_eq!(fake.objects().len(), 2);
    }

    #[tokio::test]
    async fn unknown_interface_fails_before_objects_are_created() {
        let fake = Arc::new(
            FakeFdm::new("admin", "pw").with_interface("if-1", "inside", "GigabitEthernet0/0"),
        );
        let session = FdmClient::new(fake.clone()).login("admin", "pw").await.unwrap();

        let err = RouteBuilder::new(&session).build(&target()).await.unwrap_err();
        assert!(matches!(err, FdmError::InterfaceNotFound(ref name) if name == "GigabitEthernet0/2"));
        assert!(fake.objects().is_empty());
    }
}
