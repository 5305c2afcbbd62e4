//! In-memory FDM device for tests.
//!
//! `FakeFdm` implements [`Transport`] and answers the subset of the
//! management API uplink uses: token exchange, virtual routers, interfaces,
//! network objects (with name-conflict errors), static routes, and
//! deployments whose progress is scripted with [`DeployBehavior`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde_json::{Value, json};

use crate::error::FdmResult;
use crate::model::{
    DEPLOYED, Interface, NetworkObject, ObjectKind, ObjectRef, RouteDescriptor, StaticRouteEntry,
    VirtualRouter,
};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// How deployment tasks submitted to the fake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployBehavior {
    /// `PENDING` for this many polls, then `DEPLOYED`.
    Succeed { pending_polls: u32 },
    /// `PENDING` forever.
    Stuck,
    /// `PENDING` for this many polls, then gone from the task list.
    Vanish { after_polls: u32 },
    /// Never shows up in the task list.
    Unlisted,
    /// The submission response carries no task id.
    NoId,
}

impl Default for DeployBehavior {
    fn default() -> Self {
        DeployBehavior::Succeed { pending_polls: 0 }
    }
}

#[derive(Debug)]
struct FakeTask {
    id: String,
    polls: u32,
    behavior: DeployBehavior,
}

impl FakeTask {
    /// State after one more poll, or `None` if the task is not listed.
    fn poll(&mut self) -> Option<&'static str> {
        self.polls += 1;
        match self.behavior {
            DeployBehavior::Succeed { pending_polls } if self.polls <= pending_polls => {
                Some("PENDING")
            }
            DeployBehavior::Succeed { .. } => Some(DEPLOYED),
            DeployBehavior::Stuck => Some("PENDING"),
            DeployBehavior::Vanish { after_polls } if self.polls <= after_polls => Some("PENDING"),
            DeployBehavior::Vanish { .. } | DeployBehavior::Unlisted | DeployBehavior::NoId => None,
        }
    }
}

#[derive(Debug)]
struct InjectedFailure {
    method: Method,
    path_prefix: String,
    status: StatusCode,
}

#[derive(Debug)]
struct FakeState {
    username: String,
    password: String,
    token: Option<String>,
    next_id: u64,
    routers: Vec<VirtualRouter>,
    interfaces: Vec<Interface>,
    objects: Vec<NetworkObject>,
    routes: Vec<StaticRouteEntry>,
    tasks: Vec<FakeTask>,
    deploy_behavior: DeployBehavior,
    duplicate_status: StatusCode,
    duplicate_code: String,
    failures: Vec<InjectedFailure>,
    log: Vec<(Method, String)>,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

pub struct FakeFdm {
    state: Mutex<FakeState>,
}

impl FakeFdm {
    /// A device with a `Global` virtual router (`vr-global`) and no
    /// interfaces, objects or routes.
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                username: username.to_string(),
                password: password.to_string(),
                token: None,
                next_id: 0,
                routers: vec![VirtualRouter {
                    id: "vr-global".to_string(),
                    name: "Global".to_string(),
                }],
                interfaces: Vec::new(),
                objects: Vec::new(),
                routes: Vec::new(),
                tasks: Vec::new(),
                deploy_behavior: DeployBehavior::default(),
                duplicate_status: StatusCode::UNPROCESSABLE_ENTITY,
                duplicate_code: "duplicateName".to_string(),
                failures: Vec::new(),
                log: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_interface(self, id: &str, name: &str, hardware_name: &str) -> Self {
        self.state().interfaces.push(Interface {
            id: id.to_string(),
            name: name.to_string(),
            hardware_name: hardware_name.to_string(),
        });
        self
    }

    pub fn with_routers(self, routers: &[(&str, &str)]) -> Self {
        self.state().routers = routers
            .iter()
            .map(|(id, name)| VirtualRouter {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect();
        self
    }

    pub fn with_deploy_behavior(self, behavior: DeployBehavior) -> Self {
        self.set_deploy_behavior(behavior);
        self
    }

    /// Answer name conflicts with `status` and an error message `code`.
    pub fn with_duplicate_response(self, status: StatusCode, code: &str) -> Self {
        {
            let mut state = self.state();
            state.duplicate_status = status;
            state.duplicate_code = code.to_string();
        }
        self
    }

    /// Applies to deployments submitted from now on.
    pub fn set_deploy_behavior(&self, behavior: DeployBehavior) {
        self.state().deploy_behavior = behavior;
    }

    /// Answer every `method` request whose path starts with `path_prefix`
    /// with `status`.
    pub fn fail(&self, method: Method, path_prefix: &str, status: StatusCode) {
        self.state().failures.push(InjectedFailure {
            method,
            path_prefix: path_prefix.to_string(),
            status,
        });
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Create an object directly, as if made by an earlier run.
    pub fn seed_object(&self, name: &str, kind: ObjectKind, value: &str) -> String {
        let mut state = self.state();
        let id = state.next_id("obj");
        state.objects.push(NetworkObject {
            id: id.clone(),
            name: name.to_string(),
            sub_type: Some(kind),
            value: value.to_string(),
        });
        id
    }

    /// Create a route directly. The referenced objects must exist for the
    /// reconciler to resolve it.
    pub fn seed_route(&self, name: &str, network_id: &str, gateway_id: &str) -> String {
        let mut state = self.state();
        let id = state.next_id("route");
        state.routes.push(StaticRouteEntry {
            id: id.clone(),
            name: name.to_string(),
            iface: None,
            networks: vec![ObjectRef::new(network_id, "networkobject", "")],
            gateway: Some(ObjectRef::new(gateway_id, "networkobject", "")),
            metric_value: Some(1),
        });
        id
    }

    pub fn routes(&self) -> Vec<StaticRouteEntry> {
        self.state().routes.clone()
    }

    pub fn objects(&self) -> Vec<NetworkObject> {
        self.state().objects.clone()
    }

    /// Every request received, as (method, path).
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.state().log.clone()
    }

    /// Requests that can change device state (everything but GET and the
    /// token exchange).
    pub fn write_count(&self) -> usize {
        self.state()
            .log
            .iter()
            .filter(|(method, path)| *method != Method::GET && path != "/fdm/token")
            .count()
    }

    pub fn deployments_submitted(&self) -> usize {
        self.state().tasks.len()
    }

    fn handle(&self, request: ApiRequest) -> ApiResponse {
        let mut state = self.state();
        state.log.push((request.method.clone(), request.path.clone()));

        let (path, query) = match request.path.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (request.path.clone(), None),
        };

        if request.method == Method::POST && path == "/fdm/token" {
            return token_exchange(&mut state, request.body.as_ref());
        }

        if state.token.is_none() || request.bearer != state.token {
            return error_response(StatusCode::UNAUTHORIZED, "unauthorized", "invalid token");
        }

        if let Some(failure) = state
            .failures
            .iter()
            .find(|f| f.method == request.method && path.starts_with(&f.path_prefix))
        {
            return error_response(failure.status, "injected", "injected failure");
        }

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (&request.method, segments.as_slice()) {
            (&Method::GET, ["devices", "default", "routing", "virtualrouters"]) => {
                items(&state.routers)
            }
            (&Method::GET, ["devices", "default", "routing", "virtualrouters", vr, "staticrouteentries"]) => {
                if !state.routers.iter().any(|r| r.id == *vr) {
                    return not_found();
                }
                items(&state.routes)
            }
            (&Method::POST, ["devices", "default", "routing", "virtualrouters", vr, "staticrouteentries"]) => {
                if !state.routers.iter().any(|r| r.id == *vr) {
                    return not_found();
                }
                create_route(&mut state, request.body.as_ref())
            }
            (&Method::DELETE, ["devices", "default", "routing", "virtualrouters", _, "staticrouteentries", id]) => {
                let before = state.routes.len();
                state.routes.retain(|r| r.id != *id);
                if state.routes.len() == before {
                    return not_found();
                }
                ApiResponse::new(StatusCode::NO_CONTENT, "")
            }
            (&Method::GET, ["devices", "default", "interfaces"]) => items(&state.interfaces),
            (&Method::POST, ["object", "networks"]) => create_object(&mut state, request.body.as_ref()),
            (&Method::GET, ["object", "networks"]) => {
                let name = query.as_deref().and_then(name_filter);
                let matching: Vec<&NetworkObject> = state
                    .objects
                    .iter()
                    .filter(|o| name.as_deref().is_none_or(|n| o.name.contains(n)))
                    .collect();
                items(&matching)
            }
            (&Method::GET, ["object", "networks", id]) => {
                match state.objects.iter().find(|o| o.id == *id) {
                    Some(object) => json_response(StatusCode::OK, object),
                    None => not_found(),
                }
            }
            (&Method::POST, ["operational", "deploy"]) => submit_deployment(&mut state),
            (&Method::GET, ["operational", "deploy"]) => {
                let listed: Vec<Value> = state
                    .tasks
                    .iter_mut()
                    .filter_map(|task| {
                        task.poll()
                            .map(|s| json!({"id": task.id, "state": s, "type": "deployment"}))
                    })
                    .collect();
                items(&listed)
            }
            _ => not_found(),
        }
    }
}

#[async_trait]
impl Transport for FakeFdm {
    async fn send(&self, request: ApiRequest) -> FdmResult<ApiResponse> {
        Ok(self.handle(request))
    }
}

fn token_exchange(state: &mut FakeState, body: Option<&Value>) -> ApiResponse {
    let body = body.cloned().unwrap_or(Value::Null);
    let granted = body["grant_type"] == "password"
        && body["username"] == state.username.as_str()
        && body["password"] == state.password.as_str();
    if !granted {
        return error_response(StatusCode::BAD_REQUEST, "invalid_grant", "bad credentials");
    }
    let token = state.next_id("token");
    state.token = Some(token.clone());
    json_response(
        StatusCode::OK,
        &json!({"access_token": token, "token_type": "Bearer", "expires_in": 1800}),
    )
}

fn create_object(state: &mut FakeState, body: Option<&Value>) -> ApiResponse {
    let Some(body) = body else {
        return error_response(StatusCode::BAD_REQUEST, "missingBody", "no body");
    };
    let (Some(name), Some(value)) = (body["name"].as_str(), body["value"].as_str()) else {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "invalidObject", "name and value required");
    };
    if value.contains('/') && value.split('/').nth(1).is_some_and(|m| !m.contains('.')) {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalidNetwork",
            "prefix length notation is not accepted",
        );
    }
    if state.objects.iter().any(|o| o.name == name) {
        let status = state.duplicate_status;
        let code = state.duplicate_code.clone();
        return error_response(status, &code, &format!("object {name} already exists"));
    }
    let sub_type = serde_json::from_value::<ObjectKind>(body["subType"].clone()).ok();
    let object = NetworkObject {
        id: state.next_id("obj"),
        name: name.to_string(),
        sub_type,
        value: value.to_string(),
    };
    state.objects.push(object.clone());
    json_response(StatusCode::OK, &object)
}

fn create_route(state: &mut FakeState, body: Option<&Value>) -> ApiResponse {
    let Some(descriptor) = body
        .cloned()
        .and_then(|b| serde_json::from_value::<RouteDescriptor>(b).ok())
    else {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "invalidRoute", "malformed route");
    };

    let object_exists = |r: &ObjectRef| state.objects.iter().any(|o| o.id == r.id);
    let refs_ok = state.interfaces.iter().any(|i| i.id == descriptor.iface.id)
        && descriptor.networks.iter().all(object_exists)
        && object_exists(&descriptor.gateway);
    if !refs_ok {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "invalidReference", "unknown object");
    }

    let entry = StaticRouteEntry {
        id: state.next_id("route"),
        name: descriptor.name,
        iface: Some(descriptor.iface),
        networks: descriptor.networks,
        gateway: Some(descriptor.gateway),
        metric_value: Some(descriptor.metric_value),
    };
    state.routes.push(entry.clone());
    json_response(StatusCode::OK, &entry)
}

fn submit_deployment(state: &mut FakeState) -> ApiResponse {
    let behavior = state.deploy_behavior;
    if behavior == DeployBehavior::NoId {
        return json_response(StatusCode::OK, &json!({"state": "QUEUED"}));
    }
    let id = state.next_id("deploy");
    state.tasks.push(FakeTask {
        id: id.clone(),
        polls: 0,
        behavior,
    });
    json_response(StatusCode::OK, &json!({"id": id, "state": "QUEUED"}))
}

/// `filter=name%3A<name>` → `<name>`.
fn name_filter(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("filter="))
        .map(|f| f.replace("%3A", ":").replace("%3a", ":"))
        .and_then(|f| f.strip_prefix("name:").map(str::to_string))
}

fn items<T: serde::Serialize>(items: &[T]) -> ApiResponse {
    json_response(StatusCode::OK, &json!({ "items": items }))
}

fn json_response<T: serde::Serialize + ?Sized>(status: StatusCode, body: &T) -> ApiResponse {
    ApiResponse::new(
        status,
        serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string()),
    )
}

fn not_found() -> ApiResponse {
    error_response(StatusCode::NOT_FOUND, "notFound", "no such resource")
}

fn error_response(status: StatusCode, code: &str, description: &str) -> ApiResponse {
    json_response(
        status,
        &json!({
            "error": {
                "severity": "ERROR",
                "key": "Validation",
                "messages": [{"code": code, "description": description, "location": ""}]
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_requests_without_token() {
        let fake = FakeFdm::new("admin", "pw");
        let resp = fake
            .send(ApiRequest::get("/devices/default/interfaces"))
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn conflicting_names_get_duplicate_error() {
        let fake = FakeFdm::new("admin", "pw");
        let token = fake
            .send(ApiRequest::post(
                "/fdm/token",
                Some(json!({"grant_type": "password", "username": "admin", "password": "pw"})),
            ))
            .await
            .unwrap();
        let token: Value = serde_json::from_str(&token.body).unwrap();
        let token = token["access_token"].as_str().unwrap().to_string();

        let body = json!({"name": "gateway_1.1.1.1", "subType": "HOST", "value": "1.1.1.1"});
        let first = fake
            .send(ApiRequest::post("/object/networks", Some(body.clone())).with_bearer(&token))
            .await
            .unwrap();
        assert_eq!(first.status, StatusCode::OK);

        let second = fake
            .send(ApiRequest::post("/object/networks", Some(body)).with_bearer(&token))
            .await
            .unwrap();
        assert_eq!(second.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(second.body.contains("duplicateName"));
        assert_eq!(fake.objects().len(), 1);
    }

    #[test]
    fn name_filter_decodes_query() {
        assert_eq!(
            name_filter("filter=name%3Agateway_1.1.1.1").as_deref(),
            Some("gateway_1.1.1.1")
        );
        assert_eq!(name_filter("limit=10"), None);
    }

    #[test]
    fn scripted_tasks_progress_per_poll() {
        let mut task = FakeTask {
            id: "d".to_string(),
            polls: 0,
            behavior: DeployBehavior::Succeed { pending_polls: 2 },
        };
        assert_eq!(task.poll(), Some("PENDING"));
        assert_eq!(task.poll(), Some("PENDING"));
        assert_eq!(task.poll(), Some(DEPLOYED));

        let mut vanishing = FakeTask {
            id: "v".to_string(),
            polls: 0,
            behavior: DeployBehavior::Vanish { after_polls: 1 },
        };
        assert_eq!(vanishing.poll(), Some("PENDING"));
        assert_eq!(vanishing.poll(), None);
    }
}
