//! uplink failover controller: probe, decide, reconcile, deploy.
//!
//! Each monitoring cycle samples the primary uplink, derives the routing
//! state from the device, and installs or withdraws the backup route so
//! the two agree. Nothing is remembered between cycles.
//!
//! # Components
//!
//! - **`report`**: cycle outcomes (`CycleReport`) and how fatal they are
//! - **`controller`**: `FailoverController` (run_cycle, force, status, check)

pub mod controller;
pub mod report;

pub use controller::{DeviceCheck, Direction, FailoverController, RouteStatus};
pub use report::{CycleReport, FatalScope};
