//! uplink-health: is the primary uplink good enough to keep using?
//!
//! Sends a batch of ICMP echo requests toward a well-known target and
//! turns the replies into a loss/latency sample that is classified against
//! the configured thresholds.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── Prober (trait)
//!   │   ├── SystemPing → runs `ping`, parses reply lines
//!   │   └── ScriptedProber (tests)
//!   ├── HealthSample (avg latency, loss %)
//!   └── Thresholds → HealthVerdict
//! ```
//!
//! A probe that fails because the process may not open raw sockets is
//! reported as [`ProbeError::PermissionDenied`]; the caller should stop
//! rather than try again next cycle.

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod monitor;
pub mod probe;

pub use monitor::{HealthMonitor, HealthSample, HealthVerdict, Thresholds, is_unhealthy};
pub use probe::{PacketOutcome, ProbeBatch, ProbeError, Prober, SystemPing};
