//! Collector parameters and the default set of monitored Cilium workloads.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::StatusError;

/// Namespace Cilium is installed into by default.
pub const DEFAULT_NAMESPACE: &str = "kube-system";

/// Name of the agent DaemonSet.
pub const AGENT_DAEMONSET_NAME: &str = "cilium";
/// Label selector matching agent pods.
pub const AGENT_POD_SELECTOR: &str = "k8s-app=cilium";
/// Container running the agent inside each agent pod.
pub const AGENT_CONTAINER_NAME: &str = "cilium-agent";

/// Name of the operator Deployment.
pub const OPERATOR_DEPLOYMENT_NAME: &str = "cilium-operator";
/// Label selector matching operator pods.
pub const OPERATOR_POD_SELECTOR: &str = "io.cilium/app=operator";

pub const RELAY_DEPLOYMENT_NAME: &str = "hubble-relay";
pub const RELAY_POD_SELECTOR: &str = "k8s-app=hubble-relay";

pub const CLUSTERMESH_DEPLOYMENT_NAME: &str = "clustermesh-apiserver";
pub const CLUSTERMESH_POD_SELECTOR: &str = "k8s-app=clustermesh-apiserver";

/// ConfigMap holding the agent configuration.
pub const CONFIG_MAP_NAME: &str = "cilium-config";

/// Kind of Kubernetes object backing a monitored workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    DaemonSet,
    Deployment,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DaemonSet => write!(f, "DaemonSet"),
            Self::Deployment => write!(f, "Deployment"),
        }
    }
}

/// A workload the collector reports on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Object kind.
    pub kind: WorkloadKind,
    /// Object name, also used as the report key.
    pub name: String,
    /// Label selector used to find the workload's pods.
    pub selector: String,
    /// Whether the pods run an agent that answers health probes.
    #[serde(default)]
    pub agent: bool,
}

impl WorkloadSpec {
    #[must_use]
    pub fn daemon_set(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            kind: WorkloadKind::DaemonSet,
            name: name.into(),
            selector: selector.into(),
            agent: false,
        }
    }

    #[must_use]
    pub fn deployment(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            kind: WorkloadKind::Deployment,
            name: name.into(),
            selector: selector.into(),
            agent: false,
        }
    }

    /// Mark the workload's pods as agents to be probed.
    #[must_use]
    pub fn with_agent(mut self) -> Self {
        self.agent = true;
        self
    }
}

/// Parameters of a [`StatusCollector`](crate::StatusCollector).
///
/// The collector only reads these; one set of parameters can serve any
/// number of concurrent passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatusParameters {
    /// Namespace the workloads live in.
    pub namespace: String,
    /// Workloads to report on, in report order.
    pub workloads: Vec<WorkloadSpec>,
    /// Maximum number of agent probes in flight per workload.
    pub worker_count: usize,
    /// Container tailed for error lines when a probe fails.
    pub agent_container: String,
    /// How far back log tailing looks, in seconds.
    pub log_window_secs: u64,
    /// ConfigMap read for the configuration section.
    pub config_map: String,
    /// Keys of the ConfigMap shown in the report.
    pub config_keys: Vec<String>,
    /// Count cluster pods managed by Cilium endpoints.
    pub count_managed_pods: bool,
}

impl Default for StatusParameters {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            workloads: default_workloads(),
            worker_count: 10,
            agent_container: AGENT_CONTAINER_NAME.to_string(),
            log_window_secs: 600,
            config_map: CONFIG_MAP_NAME.to_string(),
            config_keys: [
                "cluster-name",
                "cluster-id",
                "routing-mode",
                "kube-proxy-replacement",
                "enable-hubble",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            count_managed_pods: true,
        }
    }
}

/// Agent DaemonSet, operator, Hubble Relay and ClusterMesh API server.
#[must_use]
pub fn default_workloads() -> Vec<WorkloadSpec> {
    vec![
        WorkloadSpec::daemon_set(AGENT_DAEMONSET_NAME, AGENT_POD_SELECTOR).with_agent(),
        WorkloadSpec::deployment(OPERATOR_DEPLOYMENT_NAME, OPERATOR_POD_SELECTOR),
        WorkloadSpec::deployment(RELAY_DEPLOYMENT_NAME, RELAY_POD_SELECTOR),
        WorkloadSpec::deployment(CLUSTERMESH_DEPLOYMENT_NAME, CLUSTERMESH_POD_SELECTOR),
    ]
}

impl StatusParameters {
    /// Parameters for the given namespace with the default workloads.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_workloads(mut self, workloads: Vec<WorkloadSpec>) -> Self {
        self.workloads = workloads;
        self
    }

    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    #[must_use]
    pub fn with_agent_container(mut self, container: impl Into<String>) -> Self {
        self.agent_container = container.into();
        self
    }

    #[must_use]
    pub fn with_managed_pod_count(mut self, enabled: bool) -> Self {
        self.count_managed_pods = enabled;
        self
    }

    /// Load parameters from a YAML file. Missing fields take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, StatusError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StatusError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, StatusError> {
        let params: Self =
            serde_yaml::from_str(raw).map_err(|e| StatusError::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Reject parameters no pass could run with.
    pub fn validate(&self) -> Result<(), StatusError> {
        if self.namespace.is_empty() {
            return Err(StatusError::Config("namespace must not be empty".into()));
        }
        if self.worker_count == 0 {
            return Err(StatusError::Config("worker count must be at least 1".into()));
        }
        if self.worker_count > Semaphore::MAX_PERMITS {
            return Err(StatusError::Config(format!(
                "worker count must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        let mut seen = HashSet::new();
        for workload in &self.workloads {
            if !seen.insert(workload.name.as_str()) {
                return Err(StatusError::Config(format!(
                    "workload {} is listed more than once",
                    workload.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_monitor_agent_daemonset() {
        let params = StatusParameters::default();
        assert_eq!(params.namespace, "kube-system");
        assert!(params.validate().is_ok());

        let agent = &params.workloads[0];
        assert_eq!(agent.kind, WorkloadKind::DaemonSet);
        assert_eq!(agent.name, AGENT_DAEMONSET_NAME);
        assert_eq!(agent.selector, AGENT_POD_SELECTOR);
        assert!(agent.agent);
        assert!(params.workloads[1..].iter().all(|w| !w.agent));
    }

    #[test]
    fn test_yaml_overrides_keep_defaults() {
        let params = StatusParameters::from_yaml(
            "namespace: cilium\nworkerCount: 3\nworkloads:\n  - kind: DaemonSet\n    name: cilium\n    selector: k8s-app=cilium\n    agent: true\n",
        )
        .unwrap();
        assert_eq!(params.namespace, "cilium");
        assert_eq!(params.worker_count, 3);
        assert_eq!(params.workloads.len(), 1);
        assert_eq!(params.agent_container, AGENT_CONTAINER_NAME);
        assert_eq!(params.log_window_secs, 600);
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(StatusParameters::new("").validate().is_err());
        assert!(StatusParameters::default()
            .with_worker_count(0)
            .validate()
            .is_err());

        let err = StatusParameters::from_yaml("workerCount: 18446744073709551615\n").unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
        assert!(StatusParameters::default()
            .with_worker_count(Semaphore::MAX_PERMITS)
            .validate()
            .is_ok());

        let dup = StatusParameters::default().with_workloads(vec![
            WorkloadSpec::daemon_set("cilium", "a=b"),
            WorkloadSpec::deployment("cilium", "c=d"),
        ]);
        let err = dup.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_yaml_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.yaml");
        std::fs::write(&path, "namespace: cilium-system\n").unwrap();
        let params = StatusParameters::from_yaml_file(&path).unwrap();
        assert_eq!(params.namespace, "cilium-system");
        assert_eq!(params.workloads, default_workloads());

        assert!(StatusParameters::from_yaml_file(&dir.path().join("missing.yaml")).is_err());
    }
}
