//! uplink-fdm: the firewall side of ISP failover.
//!
//! Talks to the FDM management API to keep one backup static route
//! present or absent and to push the change live.
//!
//! # Architecture
//!
//! ```text
//! FdmClient::login → Session
//!   └── RouteReconciler (find / add / delete route_BACKUP)
//!       ├── RouteBuilder → interface lookup
//!       │   └── ObjectResolver (create-or-reuse network and gateway objects)
//!       └── DeploymentWaiter (submit, poll until DEPLOYED)
//! ```
//!
//! All requests go through the [`Transport`] trait: [`HttpTransport`] for
//! the real device, `fake::FakeFdm` in tests (`test-util` feature).

pub mod deploy;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod model;
pub mod objects;
pub mod reconcile;
pub mod route;
pub mod session;
pub mod transport;

pub use deploy::{DeployOutcome, DeployPolicy, DeploymentWaiter};
pub use error::{FdmError, FdmResult};
pub use objects::{ObjectResolver, ResolvedObject};
pub use reconcile::{RouteChange, RouteReconciler, RoutingState};
pub use route::{RouteBuilder, TargetRoute};
pub use session::{FdmClient, Session};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
