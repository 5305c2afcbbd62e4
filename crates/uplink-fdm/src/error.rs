//! Error types for the FDM client.

use thiserror::Error;

/// Result type alias for FDM operations.
pub type FdmResult<T> = Result<T, FdmError>;

/// Errors that can occur while talking to the management API.
///
/// A duplicate-name conflict on object creation never shows up here: the
/// object resolver turns it into a lookup of the existing object.
#[derive(Debug, Error)]
pub enum FdmError {
    /// The token exchange was rejected. Retrying with the same credentials
    /// will not help.
    #[error("authentication rejected (HTTP {status}): {body}")]
    AuthFailure { status: u16, body: String },

    /// A call returned a status the caller does not handle.
    #[error("{method} {path} failed with HTTP {status}: {body}")]
    Api {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },

    #[error("virtual router {0:?} not found")]
    VirtualRouterNotFound(String),

    #[error("no interface with hardware name {0:?}")]
    InterfaceNotFound(String),

    /// Creation reported a name conflict but the lookup by name came back
    /// empty.
    #[error("object {name:?} reported as duplicate but lookup returned nothing")]
    ObjectLookup { name: String },

    #[error("deployment submission returned no task id")]
    MissingDeploymentId,
}

impl FdmError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, FdmError::AuthFailure { .. })
    }
}
