//! HttpTransport against a local HTTP server standing in for the device.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use uplink_fdm::{
    ApiRequest, DeployPolicy, DeploymentWaiter, FdmClient, FdmError, HttpTransport, RouteBuilder,
    Transport,
};

const TOKEN: &str = "tok-1";

async fn token(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["grant_type"] == "password" && body["username"] == "admin" && body["password"] == "pw" {
        (StatusCode::OK, Json(json!({"access_token": TOKEN, "expires_in": 1800})))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"messages": [{"code": "invalidCredentials", "description": "bad"}]}})),
        )
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer tok-1")
}

async fn interfaces(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({"items": [
            {"id": "if-0", "name": "inside", "hardwareName": "GigabitEthernet0/0", "type": "physicalinterface"},
            {"id": "if-1", "name": "outside2", "hardwareName": "GigabitEthernet0/1", "type": "physicalinterface"}
        ]})),
    )
}

async fn submit_deploy() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "deployment service down")
}

async fn serve() -> String {
    let router = Router::new()
        .route("/api/fdm/latest/fdm/token", post(token))
        .route("/api/fdm/latest/devices/default/interfaces", get(interfaces))
        .route("/api/fdm/latest/operational/deploy", post(submit_deploy));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/api/fdm/latest")
}

fn transport(base_url: String) -> Arc<HttpTransport> {
    Arc::new(HttpTransport::with_base_url(base_url, Duration::from_secs(5), false).unwrap())
}

#[tokio::test]
async fn login_then_authenticated_lookup() {
    let client = FdmClient::new(transport(serve().await));

    let session = client.login("admin", "pw").await.unwrap();
    assert_eq!(session.token(), TOKEN);

    let iface = RouteBuilder::new(&session)
        .find_interface("GigabitEthernet0/1")
        .await
        .unwrap();
    assert_eq!(iface.id, "if-1");
    assert_eq!(iface.name, "outside2");
}

#[tokio::test]
async fn rejected_credentials_are_auth_failure() {
    let client = FdmClient::new(transport(serve().await));

    let err = client.login("admin", "wrong").await.err().unwrap();
    assert!(err.is_auth_failure());
    assert!(matches!(err, FdmError::AuthFailure { status: 401, .. }));
}

#[tokio::test]
async fn error_statuses_come_back_as_responses() {
    let transport = transport(serve().await);

    let response = transport
        .send(ApiRequest::get("/devices/default/interfaces").with_bearer("stale"))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(!response.is_success());
}

#[tokio::test]
async fn unhandled_status_maps_to_api_error() {
    let client = FdmClient::new(transport(serve().await));
    let session = client.login("admin", "pw").await.unwrap();

    let err = DeploymentWaiter::new(&session, DeployPolicy::default())
        .deploy()
        .await
        .unwrap_err();
    match err {
        FdmError::Api {
            method,
            path,
            status,
            body,
        } => {
            assert_eq!(method, "POST");
            assert_eq!(path, "/operational/deploy");
            assert_eq!(status, 503);
            assert_eq!(body, "deployment service down");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_device_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = FdmClient::new(transport(format!("http://{addr}/api/fdm/latest")));
    let err = client.login("admin", "pw").await.err().unwrap();
    assert!(matches!(err, FdmError::Transport(_)));
}
