//! Error types for the status collector and its collaborators.

use thiserror::Error;

use crate::config::WorkloadKind;

/// Errors returned by a [`ClusterAccessor`](crate::ClusterAccessor).
///
/// A missing object is not an error; accessors return `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Kubernetes API call failed.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors returned by an [`AgentProbe`](crate::AgentProbe).
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The status command ran but did not succeed.
    #[error("exec failed: {0}")]
    Exec(String),

    /// The agent replied with something that is not a status document.
    #[error("invalid status document: {0}")]
    Decode(#[from] serde_json::Error),

    /// The pod could not be reached at all.
    #[error("pod {0} is unreachable")]
    Unreachable(String),
}

/// Errors returned by one status pass.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The workload object could not be fetched. Aborts the pass.
    #[error("unable to get {kind} {namespace}/{name}: {source}")]
    Fetch {
        kind: WorkloadKind,
        namespace: String,
        name: String,
        #[source]
        source: AccessError,
    },

    /// The caller cancelled the pass.
    #[error("status collection cancelled")]
    Cancelled,

    /// Invalid collector parameters.
    #[error("invalid configuration: {0}")]
    Config(String),
}
