//! kube-rs backed implementations of the cluster accessor and agent probe.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{
    Api, ApiResource, AttachParams, DynamicObject, GroupVersionKind, ListParams, LogParams,
};
use kube::Client;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::accessor::{ClusterAccessor, ContainerInfo, EndpointInfo, PodInfo, WorkloadStatus};
use crate::config::AGENT_CONTAINER_NAME;
use crate::error::{AccessError, ProbeError};
use crate::probe::{AgentHealth, AgentProbe};

/// Command printing the agent status document.
const STATUS_COMMAND: &[&str] = &["cilium-dbg", "status", "-o", "json"];

/// Map a 404 to `None`, any other API failure to an error.
fn found<T>(result: Result<T, kube::Error>) -> Result<Option<T>, AccessError> {
    match result {
        Ok(object) => Ok(Some(object)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn list_params(selector: &str) -> ListParams {
    if selector.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(selector)
    }
}

fn daemon_set_status(ds: &DaemonSet) -> WorkloadStatus {
    let status = ds.status.clone().unwrap_or_default();
    WorkloadStatus {
        desired: status.desired_number_scheduled,
        ready: status.number_ready,
        available: status.number_available.unwrap_or(0),
        unavailable: status.number_unavailable.unwrap_or(0),
        updated: status.updated_number_scheduled.unwrap_or(0),
        generation: ds.metadata.generation.unwrap_or(0),
        observed_generation: status.observed_generation.unwrap_or(0),
    }
}

fn deployment_status(deploy: &Deployment) -> WorkloadStatus {
    let status = deploy.status.clone().unwrap_or_default();
    WorkloadStatus {
        desired: status.replicas.unwrap_or(0),
        ready: status.ready_replicas.unwrap_or(0),
        available: status.available_replicas.unwrap_or(0),
        unavailable: status.unavailable_replicas.unwrap_or(0),
        updated: status.updated_replicas.unwrap_or(0),
        generation: deploy.metadata.generation.unwrap_or(0),
        observed_generation: status.observed_generation.unwrap_or(0),
    }
}

fn pod_info(pod: Pod) -> PodInfo {
    let spec = pod.spec.unwrap_or_default();
    PodInfo {
        name: pod.metadata.name.unwrap_or_default(),
        phase: pod.status.and_then(|s| s.phase).unwrap_or_default(),
        host_network: spec.host_network.unwrap_or(false),
        containers: spec
            .containers
            .into_iter()
            .map(|c| ContainerInfo {
                name: c.name,
                image: c.image.unwrap_or_default(),
            })
            .collect(),
    }
}

/// Cluster accessor talking to the Kubernetes API server.
#[derive(Clone)]
pub struct KubeClusterAccessor {
    client: Client,
}

impl KubeClusterAccessor {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }
}

#[async_trait]
impl ClusterAccessor for KubeClusterAccessor {
    async fn get_daemon_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, AccessError> {
        let api: Api<DaemonSet> = self.api(namespace);
        Ok(found(api.get(name).await)?.as_ref().map(daemon_set_status))
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, AccessError> {
        let api: Api<Deployment> = self.api(namespace);
        Ok(found(api.get(name).await)?.as_ref().map(deployment_status))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PodInfo>, AccessError> {
        let api: Api<Pod> = self.api(namespace);
        let pods = api.list(&list_params(selector)).await?;
        debug!(namespace, selector, count = pods.items.len(), "Listed pods");
        Ok(pods.items.into_iter().map(pod_info).collect())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, AccessError> {
        let api: Api<ConfigMap> = self.api(namespace);
        Ok(found(api.get(name).await)?.map(|cm| cm.data.unwrap_or_default()))
    }

    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<EndpointInfo>, AccessError> {
        let gvk = GroupVersionKind::gvk("cilium.io", "v2", "CiliumEndpoint");
        let resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = if namespace.is_empty() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        };

        // Without the CRD there are no endpoints to count.
        let Some(list) = found(api.list(&ListParams::default()).await)? else {
            return Ok(Vec::new());
        };
        Ok(list
            .items
            .into_iter()
            .map(|ep| EndpointInfo {
                namespace: ep.metadata.namespace.unwrap_or_default(),
                name: ep.metadata.name.unwrap_or_default(),
            })
            .collect())
    }
}

/// Agent probe exec'ing `cilium-dbg status` inside the agent container.
#[derive(Clone)]
pub struct ExecAgentProbe {
    client: Client,
    container: String,
}

impl ExecAgentProbe {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            container: AGENT_CONTAINER_NAME.to_string(),
        }
    }

    #[must_use]
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }
}

#[async_trait]
impl AgentProbe for ExecAgentProbe {
    async fn probe_agent(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Option<AgentHealth>, ProbeError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(self.container.clone())
            .stderr(false);

        let mut attached = match pods.exec(pod, STATUS_COMMAND.to_vec(), &params).await {
            Ok(attached) => attached,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                return Err(ProbeError::Unreachable(pod.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut stdout = attached
            .stdout()
            .ok_or_else(|| ProbeError::Exec("no stdout stream attached".into()))?;
        let exit = attached.take_status();

        let mut raw = String::new();
        stdout
            .read_to_string(&mut raw)
            .await
            .map_err(|e| ProbeError::Exec(e.to_string()))?;

        if let Some(exit) = exit {
            if let Some(status) = exit.await {
                if status.status.as_deref() == Some("Failure") {
                    return Err(ProbeError::Exec(status.message.unwrap_or_default()));
                }
            }
        }
        attached
            .join()
            .await
            .map_err(|e| ProbeError::Exec(e.to_string()))?;

        AgentHealth::from_json(&raw)
    }

    async fn tail_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        since: DateTime<Utc>,
        previous: bool,
    ) -> Result<String, ProbeError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            previous,
            since_seconds: Some((Utc::now() - since).num_seconds().max(1)),
            ..LogParams::default()
        };
        Ok(pods.logs(pod, &params).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DaemonSetStatus, DeploymentStatus};
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_daemon_set_counters() {
        let ds = DaemonSet {
            metadata: ObjectMeta {
                name: Some("cilium".into()),
                generation: Some(3),
                ..Default::default()
            },
            status: Some(DaemonSetStatus {
                desired_number_scheduled: 10,
                number_ready: 5,
                number_available: Some(5),
                number_unavailable: Some(5),
                updated_number_scheduled: Some(10),
                observed_generation: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let status = daemon_set_status(&ds);
        assert_eq!(status.desired, 10);
        assert_eq!(status.unavailable, 5);
        assert_eq!(status.generation, 3);
        assert_eq!(status.observed_generation, 2);
    }

    #[test]
    fn test_deployment_without_status() {
        let status = deployment_status(&Deployment::default());
        assert_eq!(status, WorkloadStatus::default());

        let deploy = Deployment {
            status: Some(DeploymentStatus {
                replicas: Some(2),
                ready_replicas: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        let status = deployment_status(&deploy);
        assert_eq!((status.desired, status.ready, status.available), (2, 1, 0));
    }

    #[test]
    fn test_pod_info_from_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("cilium-0".into()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                host_network: Some(true),
                containers: vec![Container {
                    name: "cilium-agent".into(),
                    image: Some("quay.io/cilium/cilium:v1.16.4".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".into()),
                ..Default::default()
            }),
        };
        let info = pod_info(pod);
        assert_eq!(info.name, "cilium-0");
        assert!(info.is_running());
        assert!(info.host_network);
        assert_eq!(info.containers[0].image, "quay.io/cilium/cilium:v1.16.4");
    }
}
