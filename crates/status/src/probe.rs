//! Out-of-band agent health probing and the agent's status document.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// State and message of one agent subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemStatus {
    /// `Ok`, `Warning`, `Failure` or `Disabled`.
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub msg: String,
}

impl SubsystemStatus {
    #[must_use]
    pub fn new(state: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            msg: msg.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    #[serde(rename = "ciliumHealth", default)]
    pub cilium_health: Option<SubsystemStatus>,
}

/// Run statistics of one agent controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ControllerRunStatus {
    pub consecutive_failure_count: i64,
    pub failure_count: i64,
    pub success_count: i64,
    pub last_failure_msg: String,
    pub last_failure_timestamp: Option<DateTime<Utc>>,
    pub last_success_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub name: String,
    #[serde(default)]
    pub status: Option<ControllerRunStatus>,
}

impl ControllerStatus {
    /// Controller whose last `failures` runs failed with `msg`.
    #[must_use]
    pub fn failing(
        name: impl Into<String>,
        failures: i64,
        msg: impl Into<String>,
        since: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            status: Some(ControllerRunStatus {
                consecutive_failure_count: failures,
                failure_count: failures,
                last_failure_msg: msg.into(),
                last_failure_timestamp: Some(since),
                ..Default::default()
            }),
        }
    }
}

/// Self-reported health of one agent, as printed by `cilium-dbg status -o json`.
///
/// Only the fields the report inspects are modelled; the rest is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AgentHealth {
    pub cilium: Option<SubsystemStatus>,
    pub kubernetes: Option<SubsystemStatus>,
    pub kvstore: Option<SubsystemStatus>,
    pub container_runtime: Option<SubsystemStatus>,
    pub cluster: Option<ClusterHealth>,
    pub controllers: Vec<ControllerStatus>,
}

impl AgentHealth {
    /// Parse a status document. Blank input is an empty reply, not an error.
    pub fn from_json(raw: &str) -> Result<Option<Self>, ProbeError> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(raw)?))
    }

    /// Controllers with at least one consecutive failure.
    pub fn failing_controllers(&self) -> impl Iterator<Item = (&str, &ControllerRunStatus)> {
        self.controllers.iter().filter_map(|c| {
            c.status
                .as_ref()
                .filter(|s| s.consecutive_failure_count > 0)
                .map(|s| (c.name.as_str(), s))
        })
    }

    /// Subsystems in report order, paired with their display names.
    pub fn subsystems(&self) -> Vec<(&'static str, &SubsystemStatus)> {
        [
            ("Cilium", self.cilium.as_ref()),
            ("Kubernetes", self.kubernetes.as_ref()),
            ("KVStore", self.kvstore.as_ref()),
            ("ContainerRuntime", self.container_runtime.as_ref()),
            (
                "Health",
                self.cluster.as_ref().and_then(|c| c.cilium_health.as_ref()),
            ),
        ]
        .into_iter()
        .filter_map(|(name, status)| status.map(|s| (name, s)))
        .collect()
    }
}

/// Out-of-band access to a running agent.
#[async_trait]
pub trait AgentProbe: Send + Sync {
    /// Fetch the agent's status document. `Ok(None)` means the agent replied
    /// with empty content.
    async fn probe_agent(&self, namespace: &str, pod: &str)
        -> Result<Option<AgentHealth>, ProbeError>;

    /// Container log text written since `since`.
    async fn tail_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        since: DateTime<Utc>,
        previous: bool,
    ) -> Result<String, ProbeError>;
}
