//! Network object resolution.
//!
//! The route needs a network object for its destination and a host object
//! for its gateway. Objects are keyed by name: creation is attempted first,
//! and a name conflict means an earlier run (or an operator) already made
//! it, so the existing object's id is looked up and reused.

use std::net::Ipv4Addr;

use http::StatusCode;
use tracing::{debug, info, warn};

use uplink_core::Ipv4Cidr;

use crate::error::{FdmError, FdmResult};
use crate::model::{ErrorEnvelope, ItemList, NetworkObject, NewNetworkObject, ObjectKind};
use crate::session::{Session, api_error};
use crate::transport::ApiResponse;

const OBJECTS_PATH: &str = "/object/networks";

/// An object id together with the name it was created under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedObject {
    pub id: String,
    pub name: String,
}

pub struct ObjectResolver<'a> {
    session: &'a Session,
}

impl<'a> ObjectResolver<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Create the object, or return the id of the existing one with the
    /// same name.
    pub async fn ensure_object(&self, name: &str, kind: ObjectKind, value: &str) -> FdmResult<String> {
        let body = NewNetworkObject::new(name, kind, value);
        debug!(%name, %value, ?kind, "creating network object");

        let response = self.session.post(OBJECTS_PATH, Some(&body)).await?;
        if response.is_success() {
            let created: NetworkObject = response.json(OBJECTS_PATH)?;
            info!(id = %created.id, %name, %value, "network object created");
            return Ok(created.id);
        }

        if !is_duplicate_conflict(&response) {
            return Err(api_error("POST", OBJECTS_PATH, response));
        }

        let existing = self
            .find_by_name(name)
            .await?
            .ok_or_else(|| FdmError::ObjectLookup {
                name: name.to_string(),
            })?;
        if existing.value != value {
            warn!(
                id = %existing.id,
                %name,
                existing = %existing.value,
                wanted = %value,
                "reusing object whose value differs from the configured one"
            );
        }
        info!(id = %existing.id, %name, "reusing existing network object");
        Ok(existing.id)
    }

    /// Network object for the backup destination, in netmask notation.
    pub async fn ensure_network(&self, cidr: &Ipv4Cidr) -> FdmResult<ResolvedObject> {
        let name = network_object_name(cidr);
        let id = self
            .ensure_object(&name, ObjectKind::Network, &cidr.to_netmask_notation())
            .await?;
        Ok(ResolvedObject { id, name })
    }

    /// Host object for the backup next hop.
    pub async fn ensure_gateway(&self, address: Ipv4Addr) -> FdmResult<ResolvedObject> {
        let name = gateway_object_name(address);
        let id = self
            .ensure_object(&name, ObjectKind::Host, &address.to_string())
            .await?;
        Ok(ResolvedObject { id, name })
    }

    /// The object named exactly `name`. The device's name filter is a
    /// partial match, so `gateway_203.0.113.1` also returns
    /// `gateway_203.0.113.10`.
    pub async fn find_by_name(&self, name: &str) -> FdmResult<Option<NetworkObject>> {
        let path = format!("{OBJECTS_PATH}?filter=name%3A{name}");
        let found: ItemList<NetworkObject> = self.session.get_json(&path).await?;
        Ok(found.items.into_iter().find(|o| o.name == name))
    }

    pub async fn get(&self, id: &str) -> FdmResult<NetworkObject> {
        self.session.get_json(&format!("{OBJECTS_PATH}/{id}")).await
    }

    /// The address value stored in object `id`.
    pub async fn object_value(&self, id: &str) -> FdmResult<String> {
        Ok(self.get(id).await?.value)
    }
}

pub fn network_object_name(cidr: &Ipv4Cidr) -> String {
    sanitize_object_name(&format!("network_{}", cidr.network()))
}

pub fn gateway_object_name(address: Ipv4Addr) -> String {
    sanitize_object_name(&format!("gateway_{address}"))
}

/// Drop characters object names may not contain.
pub fn sanitize_object_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect()
}

/// Whether a failed create means "an object with this name exists".
///
/// This is the single duplicate rule for every create call: the status is
/// 409 or 422 and one of the error messages either carries the
/// `duplicateName` code or says the object already exists. Any other
/// 409/422 (validation failures) is a real error.
pub fn is_duplicate_conflict(response: &ApiResponse) -> bool {
    if !matches!(
        response.status,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
    ) {
        return false;
    }
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&response.body) else {
        return false;
    };
    envelope.error.messages.iter().any(|m| {
        m.code.eq_ignore_ascii_case("duplicateName")
            || says_already_exists(&m.code)
            || says_already_exists(&m.description)
    })
}

fn says_already_exists(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("already exists") || text.contains("alreadyexists")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fake::FakeFdm;
    use crate::session::FdmClient;

    async fn session(fake: Arc<FakeFdm>) -> Session {
        FdmClient::new(fake).login("admin", "pw").await.unwrap()
    }

    fn response(status: StatusCode, code: &str, description: &str) -> ApiResponse {
        ApiResponse::new(
            status,
            serde_json::json!({
                "error": {"severity": "ERROR", "messages": [{"code": code, "description": description}]}
            })
            .to_string(),
        )
    }

    #[test]
    fn names_strip_the_prefix_length() {
        let cidr = Ipv4Cidr::parse("10.20.30.40/16").unwrap();
        assert_eq!(network_object_name(&cidr), "network_10.20.0.0");
        assert_eq!(
            gateway_object_name(Ipv4Addr::new(203, 0, 113, 1)),
            "gateway_203.0.113.1"
        );
        assert_eq!(sanitize_object_name("net/24 x"), "net24x");
    }

    #[test]
    fn duplicate_detection_is_unified() {
        assert!(is_duplicate_conflict(&response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "duplicateName",
            ""
        )));
        assert!(is_duplicate_conflict(&response(
            StatusCode::CONFLICT,
            "conflict",
            "An object with this name already exists"
        )));
        assert!(is_duplicate_conflict(&response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "objectAlreadyExists",
            ""
        )));
        // Validation failure with the same status is not a duplicate.
        assert!(!is_duplicate_conflict(&response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalidNetwork",
            "bad value"
        )));
        // Wrong status even with the right code.
        assert!(!is_duplicate_conflict(&response(
            StatusCode::BAD_REQUEST,
            "duplicateName",
            ""
        )));
        assert!(!is_duplicate_conflict(&ApiResponse::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "<html>"
        )));
    }

    #[tokio::test]
    async fn ensure_object_creates_then_reuses() {
        let fake = Arc::new(FakeFdm::new("admin", "pw"));
        let session = session(fake.clone()).await;
        let resolver = ObjectResolver::new(&session);

        let first = resolver
            .ensure_gateway(Ipv4Addr::new(203, 0, 113, 1))
            .await
            .unwrap();
        let second = resolver
            .ensure_gateway(Ipv4Addr::new(203, 0, 113, 1))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(fake.objects().len(), 1);
        assert_eq!(fake.objects()[0].value, "203.0.113.1");
    }

    #[tokio::test]
    async fn ensure_network_submits_netmask_notation() {
        let fake = Arc::new(FakeFdm::new("admin", "pw"));
        let session = session(fake.clone()).await;
        let resolver = ObjectResolver::new(&session);

        let cidr = Ipv4Cidr::parse("10.20.30.40/24").unwrap();
        let network = resolver.ensure_network(&cidr).await.unwrap();

        assert_eq!(network.name, "network_10.20.30.0");
        let object = resolver.get(&network.id).await.unwrap();
        assert_eq!(object.value, "10.20.30.0/255.255.255.0");
        assert_eq!(object.sub_type, Some(ObjectKind::Network));
    }

    #[tokio::test]
    async fn reuses_object_left_by_earlier_run() {
        let fake = Arc::new(FakeFdm::new("admin", "pw"));
        let seeded = fake.seed_object("gateway_198.51.100.1", ObjectKind::Host, "198.51.100.1");
        let session = session(fake.clone()).await;

        let resolved = ObjectResolver::new(&session)
            .ensure_gateway(Ipv4Addr::new(198, 51, 100, 1))
            .await
            .unwrap();
        assert_eq!(resolved.id, seeded);
        assert_eq!(fake.objects().len(), 1);
    }

    #[tokio::test]
    async fn reuse_requires_an_exact_name_match() {
        let fake = Arc::new(FakeFdm::new("admin", "pw"));
        let longer = fake.seed_object("gateway_203.0.113.10", ObjectKind::Host, "203.0.113.10");
        let exact = fake.seed_object("gateway_203.0.113.1", ObjectKind::Host, "203.0.113.1");
        let session = session(fake.clone()).await;
        let resolver = ObjectResolver::new(&session);

        let listed: ItemList<NetworkObject> = session
            .get_json("/object/networks?filter=name%3Agateway_203.0.113.1")
            .await
            .unwrap();
        assert_eq!(listed.items.len(), 2);
        assert_eq!(listed.items[0].id, longer);

        let resolved = resolver
            .ensure_gateway(Ipv4Addr::new(203, 0, 113, 1))
            .await
            .unwrap();
        assert_eq!(resolved.id, exact);
        assert_eq!(fake.objects().len(), 2);
    }

    #[tokio::test]
    async fn partial_matches_alone_are_not_reused() {
        let fake = Arc::new(FakeFdm::new("admin", "pw"));
        fake.seed_object("gateway_203.0.113.10", ObjectKind::Host, "203.0.113.10");
        let session = session(fake.clone()).await;

        let resolved = ObjectResolver::new(&session)
            .ensure_gateway(Ipv4Addr::new(203, 0, 113, 1))
            .await
            .unwrap();
        assert_eq!(resolved.name, "gateway_203.0.113.1");
        assert_eq!(fake.objects().len(), 2);
    }

    #[tokio::test]
    async fn conflict_status_with_already_exists_message_is_recovered() {
        let fake = Arc::new(
            FakeFdm::new("admin", "pw")
                .with_duplicate_response(StatusCode::CONFLICT, "objectExists"),
        );
        let seeded = fake.seed_object("gateway_198.51.100.1", ObjectKind::Host, "198.51.100.1");
        let session = session(fake.clone()).await;

        let resolved = ObjectResolver::new(&session)
            .ensure_gateway(Ipv4Addr::new(198, 51, 100, 1))
            .await
            .unwrap();
        assert_eq!(resolved.id, seeded);
    }

    #[tokio::test]
    async fn other_create_failures_surface() {
        let fake = Arc::new(FakeFdm::new("admin", "pw"));
        let session = session(fake.clone()).await;
        fake.fail(http::Method::POST, "/object/networks", StatusCode::INTERNAL_SERVER_ERROR);

        let err = ObjectResolver::new(&session)
            .ensure_gateway(Ipv4Addr::new(198, 51, 100, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, FdmError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn failed_lookup_after_conflict_surfaces() {
        let fake = Arc::new(FakeFdm::new("admin", "pw"));
        fake.seed_object("gateway_198.51.100.1", ObjectKind::Host, "198.51.100.1");
        let session = session(fake.clone()).await;
        // Lookup fails to return the object the device claims exists.
        fake.fail(http::Method::GET, "/object/networks", StatusCode::NOT_FOUND);

        let err = ObjectResolver::new(&session)
            .ensure_gateway(Ipv4Addr::new(198, 51, 100, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, FdmError::Api { status: 404, .. }));
    }
}
