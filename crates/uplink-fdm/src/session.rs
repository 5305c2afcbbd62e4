//! Authenticated access to the management API.
//!
//! `FdmClient::login` performs the password-grant token exchange and
//! returns a `Session` that carries the bearer token. The session is the
//! only thing the resolver, builder, reconciler and waiter need; nothing is
//! stored on the client between runs.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{FdmError, FdmResult};
use crate::model::{GLOBAL_ROUTER, ItemList, PasswordGrant, TokenResponse, VirtualRouter, VirtualRouterId};
use crate::transport::{ApiRequest, ApiResponse, Transport};

const TOKEN_PATH: &str = "/fdm/token";
const VIRTUAL_ROUTERS_PATH: &str = "/devices/default/routing/virtualrouters";

/// Entry point: holds the transport, hands out sessions.
#[derive(Clone)]
pub struct FdmClient {
    transport: Arc<dyn Transport>,
}

impl FdmClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Exchange credentials for a bearer token.
    ///
    /// 400/401/403 from the token endpoint is an `AuthFailure`; any other
    /// non-2xx status is an ordinary API error.
    pub async fn login(&self, username: &str, password: &str) -> FdmResult<Session> {
        let grant = PasswordGrant {
            grant_type: "password",
            username,
            password,
        };
        let body = serde_json::to_value(&grant).map_err(|e| FdmError::Decode {
            path: TOKEN_PATH.to_string(),
            message: e.to_string(),
        })?;

        debug!(%username, "requesting access token");
        let response = self
            .transport
            .send(ApiRequest::post(TOKEN_PATH, Some(body)))
            .await?;

        if !response.is_success() {
            let status = response.status.as_u16();
            if matches!(status, 400 | 401 | 403) {
                warn!(status, "authentication rejected");
                return Err(FdmError::AuthFailure {
                    status,
                    body: response.body,
                });
            }
            return Err(api_error("POST", TOKEN_PATH, response));
        }

        let token: TokenResponse = response.json(TOKEN_PATH)?;
        info!("authenticated to management API");
        Ok(Session {
            transport: Arc::clone(&self.transport),
            token: token.access_token,
        })
    }
}

/// A transport plus the bearer token of one run.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn Transport>,
    token: String,
}

impl Session {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Send an authenticated request and return the raw response,
    /// whatever its status.
    pub async fn send(&self, request: ApiRequest) -> FdmResult<ApiResponse> {
        self.transport.send(request.with_bearer(&self.token)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> FdmResult<T> {
        let response = self.send(ApiRequest::get(path)).await?;
        if !response.is_success() {
            return Err(api_error("GET", path, response));
        }
        response.json(path)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: Option<&B>) -> FdmResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post(path, body).await?;
        if !response.is_success() {
            return Err(api_error("POST", path, response));
        }
        response.json(path)
    }

    /// POST without interpreting the status; callers that handle specific
    /// error statuses use this.
    pub async fn post<B>(&self, path: &str, body: Option<&B>) -> FdmResult<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| FdmError::Decode {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        self.send(ApiRequest::post(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> FdmResult<()> {
        let response = self.send(ApiRequest::delete(path)).await?;
        if !response.is_success() {
            return Err(api_error("DELETE", path, response));
        }
        Ok(())
    }

    /// Find the id of the `Global` virtual router.
    pub async fn global_virtual_router(&self) -> FdmResult<VirtualRouterId> {
        self.virtual_router(GLOBAL_ROUTER).await
    }

    pub async fn virtual_router(&self, name: &str) -> FdmResult<VirtualRouterId> {
        let routers: ItemList<VirtualRouter> = self.get_json(VIRTUAL_ROUTERS_PATH).await?;
        let router = routers
            .items
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| FdmError::VirtualRouterNotFound(name.to_string()))?;
        debug!(router = %router.id, %name, "resolved virtual router");
        Ok(router.id)
    }
}

pub(crate) fn api_error(method: &str, path: &str, response: ApiResponse) -> FdmError {
    FdmError::Api {
        method: method.to_string(),
        path: path.to_string(),
        status: response.status.as_u16(),
        body: response.body,
    }
}
