//! Rollout and availability diagnostics derived from workload counters.

use std::fmt;

use crate::accessor::WorkloadStatus;
use crate::config::WorkloadKind;

/// Why a workload is not fully rolled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutDiagnostic {
    /// The controller has not reconciled the latest spec yet.
    NotStarted {
        generation: i64,
        observed_generation: i64,
    },
    /// Some replicas still run the previous version.
    InProgress { updated: i32, desired: i32 },
}

impl fmt::Display for RolloutDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted {
                generation,
                observed_generation,
            } => write!(
                f,
                "rollout has not started (generation {generation}, observed {observed_generation})"
            ),
            Self::InProgress { updated, desired } => write!(
                f,
                "is rolling out - {updated} out of {desired} pods updated"
            ),
        }
    }
}

impl RolloutDiagnostic {
    /// Message naming the workload, e.g. `DaemonSet cilium is rolling out - ...`.
    #[must_use]
    pub fn describe(&self, kind: WorkloadKind, name: &str) -> String {
        format!("{kind} {name} {self}")
    }
}

/// Rollout state of a workload, or `None` when it is fully rolled out.
///
/// Generation skew wins over update skew: a controller that has not seen
/// the new spec cannot have updated any replica yet.
#[must_use]
pub fn analyze(status: &WorkloadStatus) -> Option<RolloutDiagnostic> {
    if status.observed_generation < status.generation {
        return Some(RolloutDiagnostic::NotStarted {
            generation: status.generation,
            observed_generation: status.observed_generation,
        });
    }
    if status.updated < status.desired {
        return Some(RolloutDiagnostic::InProgress {
            updated: status.updated,
            desired: status.desired,
        });
    }
    None
}

/// Pods that are scheduled but not ready, and those unavailable beyond that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Availability {
    pub not_ready: i32,
    pub unavailable: i32,
}

impl Availability {
    #[must_use]
    pub fn of(status: &WorkloadStatus) -> Self {
        let not_ready = (status.desired - status.ready).max(0);
        let unavailable = (status.unavailable - not_ready).max(0);
        Self {
            not_ready,
            unavailable,
        }
    }

    /// Error message for pods that are not ready.
    pub fn not_ready_message(&self, kind: WorkloadKind, name: &str) -> Option<String> {
        (self.not_ready > 0)
            .then(|| format!("{} pods of {kind} {name} are not ready", self.not_ready))
    }

    /// Warning message for pods that are ready but not yet available.
    pub fn unavailable_message(&self, kind: WorkloadKind, name: &str) -> Option<String> {
        (self.unavailable > 0)
            .then(|| format!("{} pods of {kind} {name} are not available", self.unavailable))
    }
}
