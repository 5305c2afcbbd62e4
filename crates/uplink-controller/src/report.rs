//! Cycle outcomes.

use std::fmt;

use serde::Serialize;

use uplink_fdm::FdmError;
use uplink_health::ProbeError;

/// How far a fatal error reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalScope {
    /// This cycle is lost; the next one starts from scratch.
    Cycle,
    /// Retrying cannot help (bad credentials, no ICMP permission). The
    /// daemon stops.
    Process,
}

/// What one monitoring cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleReport {
    /// Healthy and no backup route: nothing to do.
    NoOpPrimary,
    /// Unhealthy and the backup route is already in place.
    NoOpFailover,
    /// Backup route installed and deployed.
    FailedOver,
    /// Backup route withdrawn and deployed.
    Restored,
    /// The device was changed but the change was not confirmed, or the
    /// cycle ran out of time.
    PartialFailure { reason: String },
    Fatal { reason: String, scope: FatalScope },
    /// Another cycle was still running.
    Skipped,
}

impl CycleReport {
    pub fn is_process_fatal(&self) -> bool {
        matches!(
            self,
            CycleReport::Fatal {
                scope: FatalScope::Process,
                ..
            }
        )
    }

    /// Exit status for one-shot commands: 0 done or nothing to do,
    /// 2 partial failure, 1 fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            CycleReport::PartialFailure { .. } => 2,
            CycleReport::Fatal { .. } => 1,
            _ => 0,
        }
    }

    pub(crate) fn from_fdm_error(error: &FdmError) -> Self {
        let scope = if error.is_auth_failure() {
            FatalScope::Process
        } else {
            FatalScope::Cycle
        };
        CycleReport::Fatal {
            reason: error.to_string(),
            scope,
        }
    }

    pub(crate) fn from_probe_error(error: &ProbeError) -> Self {
        let scope = if error.is_permission_denied() {
            FatalScope::Process
        } else {
            FatalScope::Cycle
        };
        CycleReport::Fatal {
            reason: error.to_string(),
            scope,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleReport::NoOpPrimary => write!(f, "primary path healthy, no backup route"),
            CycleReport::NoOpFailover => write!(f, "backup route already in place"),
            CycleReport::FailedOver => write!(f, "failed over to backup route"),
            CycleReport::Restored => write!(f, "restored primary path"),
            CycleReport::PartialFailure { reason } => write!(f, "partial failure: {reason}"),
            CycleReport::Fatal { reason, scope } => write!(f, "fatal ({scope:?}): {reason}"),
            CycleReport::Skipped => write!(f, "skipped, previous cycle still running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(CycleReport::NoOpPrimary.exit_code(), 0);
        assert_eq!(CycleReport::FailedOver.exit_code(), 0);
        assert_eq!(CycleReport::Skipped.exit_code(), 0);
        assert_eq!(
            CycleReport::PartialFailure {
                reason: "x".to_string()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            CycleReport::Fatal {
                reason: "x".to_string(),
                scope: FatalScope::Cycle
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn auth_failure_stops_the_process() {
        let report = CycleReport::from_fdm_error(&FdmError::AuthFailure {
            status: 401,
            body: String::new(),
        });
        assert!(report.is_process_fatal());

        let report = CycleReport::from_fdm_error(&FdmError::InterfaceNotFound("Gi0/9".to_string()));
        assert!(!report.is_process_fatal());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn probe_permission_stops_the_process() {
        let report =
            CycleReport::from_probe_error(&ProbeError::PermissionDenied("raw socket".to_string()));
        assert!(report.is_process_fatal());
        let report = CycleReport::from_probe_error(&ProbeError::Failed("unknown host".to_string()));
        assert!(!report.is_process_fatal());
    }
}
