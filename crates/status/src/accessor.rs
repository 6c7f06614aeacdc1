//! The narrow slice of the Kubernetes API the collector needs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AccessError;

/// Rollout counters of a DaemonSet or Deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
    pub unavailable: i32,
    pub updated: i32,
    pub generation: i64,
    pub observed_generation: i64,
}

/// A container of a pod, as far as the report cares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
}

/// Simplified Pod representation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    /// Reported pod phase, e.g. `Running` or `Failed`.
    pub phase: String,
    pub host_network: bool,
    pub containers: Vec<ContainerInfo>,
}

impl PodInfo {
    /// Pod with the given phase and a single container image.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        phase: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            phase: phase.into(),
            host_network: false,
            containers: vec![ContainerInfo {
                name: String::new(),
                image: image.into(),
            }],
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == "Running"
    }
}

/// A Cilium endpoint, i.e. a pod whose networking the agent manages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub namespace: String,
    pub name: String,
}

/// Read-only access to the cluster objects the collector reports on.
///
/// `get_*` methods return `Ok(None)` when the object does not exist; an
/// `Err` always means the API could not answer.
#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    async fn get_daemon_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, AccessError>;

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, AccessError>;

    /// List pods matching a label selector. An empty namespace means all namespaces.
    async fn list_pods(&self, namespace: &str, selector: &str)
        -> Result<Vec<PodInfo>, AccessError>;

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, AccessError>;

    /// List Cilium endpoints. An empty namespace means all namespaces.
    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<EndpointInfo>, AccessError>;
}
