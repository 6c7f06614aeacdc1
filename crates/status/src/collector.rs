//! One-shot status collection across the monitored workloads.
//!
//! Each pass fetches every workload, lists its pods, probes agent pods
//! through a bounded worker pool and merges everything into a [`Report`].
//! Only a failure to fetch a workload object aborts a pass; everything else
//! ends up in the report.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::accessor::{ClusterAccessor, PodInfo, WorkloadStatus};
use crate::classify::{self, Finding};
use crate::config::{StatusParameters, WorkloadKind, WorkloadSpec};
use crate::error::StatusError;
use crate::probe::{AgentHealth, AgentProbe};
use crate::report::{FindingKind, PodsCount, Report, WorkloadSnapshot};
use crate::rollout::{self, Availability};

/// Upper bound for the log window, so the `since` timestamp stays representable.
const MAX_LOG_WINDOW_SECS: u64 = 7 * 24 * 3600;

/// Collects [`Report`]s for a fixed set of workloads.
///
/// The collector holds no per-pass state; clones share the same
/// collaborators and passes may run concurrently.
#[derive(Clone)]
pub struct StatusCollector {
    cluster: Arc<dyn ClusterAccessor>,
    probe: Arc<dyn AgentProbe>,
    params: Arc<StatusParameters>,
}

/// Result of probing one pod.
struct PodProbe {
    pod: String,
    result: Result<Option<AgentHealth>, Finding>,
}

/// Everything collected for one workload, merged into the report afterwards.
struct WorkloadOutcome<'a> {
    spec: &'a WorkloadSpec,
    status: Option<WorkloadStatus>,
    phases: BTreeMap<String, usize>,
    images: BTreeMap<String, usize>,
    probes: Vec<PodProbe>,
    collection_errors: Vec<String>,
}

impl StatusCollector {
    /// Create a collector after validating its parameters.
    pub fn new(
        cluster: Arc<dyn ClusterAccessor>,
        probe: Arc<dyn AgentProbe>,
        params: StatusParameters,
    ) -> Result<Self, StatusError> {
        params.validate()?;
        Ok(Self {
            cluster,
            probe,
            params: Arc::new(params),
        })
    }

    /// Run one status pass.
    ///
    /// Cancelling `cancel` drops all in-flight fetches and probes and returns
    /// [`StatusError::Cancelled`] instead of a partial report.
    pub async fn status(&self, cancel: &CancellationToken) -> Result<Report, StatusError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("Status collection cancelled");
                Err(StatusError::Cancelled)
            }
            result = self.collect() => result,
        }
    }

    async fn collect(&self) -> Result<Report, StatusError> {
        info!(
            namespace = %self.params.namespace,
            workloads = self.params.workloads.len(),
            "Collecting Cilium status"
        );

        let workloads = try_join_all(
            self.params
                .workloads
                .iter()
                .map(|spec| self.collect_workload(spec)),
        );
        let (outcomes, config, pods_count) =
            tokio::join!(workloads, self.collect_config(), self.collect_pods_count());

        let mut report = Report::default();
        for outcome in outcomes? {
            outcome.merge_into(&mut report);
        }
        match config {
            Ok(config) => report.config = config,
            Err(e) => report.collection_errors.push(e),
        }
        match pods_count {
            Ok(count) => report.pods_count = count,
            Err(e) => report.collection_errors.push(e),
        }
        report.collection_errors.sort();

        info!(
            errors = report.error_count(),
            warnings = report.warning_count(),
            collection_errors = report.collection_errors.len(),
            "Status collection complete"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(kind = %spec.kind, workload = %spec.name))]
    async fn collect_workload<'a>(
        &self,
        spec: &'a WorkloadSpec,
    ) -> Result<WorkloadOutcome<'a>, StatusError> {
        let namespace = self.params.namespace.as_str();
        let fetched = match spec.kind {
            WorkloadKind::DaemonSet => self.cluster.get_daemon_set(namespace, &spec.name).await,
            WorkloadKind::Deployment => self.cluster.get_deployment(namespace, &spec.name).await,
        };
        let status = fetched.map_err(|source| StatusError::Fetch {
            kind: spec.kind,
            namespace: namespace.to_string(),
            name: spec.name.clone(),
            source,
        })?;
        if status.is_none() {
            debug!("Workload not found");
        }

        let mut outcome = WorkloadOutcome {
            spec,
            status,
            phases: BTreeMap::new(),
            images: BTreeMap::new(),
            probes: Vec::new(),
            collection_errors: Vec::new(),
        };

        let pods = match self.cluster.list_pods(namespace, &spec.selector).await {
            Ok(pods) => pods,
            Err(e) => {
                warn!(error = %e, "Failed to list pods");
                outcome
                    .collection_errors
                    .push(format!("unable to list pods of {}: {e}", spec.name));
                Vec::new()
            }
        };
        debug!(pods = pods.len(), "Listed pods");

        for pod in &pods {
            *outcome.phases.entry(pod.phase.clone()).or_default() += 1;
            for container in &pod.containers {
                *outcome.images.entry(container.image.clone()).or_default() += 1;
            }
        }

        // Leftover pods of a missing workload are counted but not probed.
        if spec.agent && outcome.status.is_some() && !pods.is_empty() {
            let (probes, failures) = self.probe_pods(&pods).await;
            outcome.probes = probes;
            outcome.collection_errors.extend(failures);
        }

        Ok(outcome)
    }

    /// Probe every pod with at most `worker_count` probes in flight.
    async fn probe_pods(&self, pods: &[PodInfo]) -> (Vec<PodProbe>, Vec<String>) {
        let semaphore = Arc::new(Semaphore::new(self.params.worker_count));
        let mut tasks = JoinSet::new();

        for pod in pods {
            let probe = Arc::clone(&self.probe);
            let params = Arc::clone(&self.params);
            let semaphore = Arc::clone(&semaphore);
            let pod = pod.name.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = probe_pod(probe.as_ref(), &params, &pod).await;
                PodProbe { pod, result }
            });
        }

        let mut probes = Vec::with_capacity(pods.len());
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(probe) => probes.push(probe),
                Err(e) => failures.push(format!("agent probe task failed: {e}")),
            }
        }
        probes.sort_by(|a, b| a.pod.cmp(&b.pod));
        (probes, failures)
    }

    async fn collect_config(&self) -> Result<BTreeMap<String, String>, String> {
        if self.params.config_keys.is_empty() {
            return Ok(BTreeMap::new());
        }
        let name = &self.params.config_map;
        match self
            .cluster
            .get_config_map(&self.params.namespace, name)
            .await
        {
            Ok(Some(data)) => Ok(data
                .into_iter()
                .filter(|(key, _)| self.params.config_keys.contains(key))
                .collect()),
            Ok(None) => Err(format!("ConfigMap {name} not found")),
            Err(e) => Err(format!("unable to get ConfigMap {name}: {e}")),
        }
    }

    async fn collect_pods_count(&self) -> Result<Option<PodsCount>, String> {
        if !self.params.count_managed_pods {
            return Ok(None);
        }
        let (pods, endpoints) = tokio::join!(
            self.cluster.list_pods("", ""),
            self.cluster.list_endpoints("")
        );
        let pods = pods.map_err(|e| format!("unable to list pods: {e}"))?;
        let endpoints = endpoints.map_err(|e| format!("unable to list Cilium endpoints: {e}"))?;

        let all = pods
            .iter()
            .filter(|p| p.is_running() && !p.host_network)
            .count();
        Ok(Some(PodsCount {
            all,
            managed: endpoints.len(),
        }))
    }
}

/// Probe one agent; on failure, look for a hint in its recent logs.
async fn probe_pod(
    probe: &dyn AgentProbe,
    params: &StatusParameters,
    pod: &str,
) -> Result<Option<AgentHealth>, Finding> {
    let namespace = params.namespace.as_str();
    match probe.probe_agent(namespace, pod).await {
        Ok(health) => {
            debug!(pod, "Agent probe succeeded");
            Ok(health)
        }
        Err(err) => {
            warn!(pod, error = %err, "Agent probe failed");
            let window = params.log_window_secs.min(MAX_LOG_WINDOW_SECS) as i64;
            let since = Utc::now() - chrono::Duration::seconds(window);
            let logs = probe
                .tail_logs(namespace, pod, &params.agent_container, since, false)
                .await
                .ok();
            let hint = logs.as_deref().and_then(classify::last_error_line);
            Err(classify::probe_failure(&err, hint))
        }
    }
}

impl WorkloadOutcome<'_> {
    fn merge_into(self, report: &mut Report) {
        let name = self.spec.name.as_str();
        let kind = self.spec.kind;

        match self.status {
            Some(status) => {
                report.pod_state.insert(
                    name.to_string(),
                    WorkloadSnapshot {
                        kind,
                        desired: status.desired,
                        ready: status.ready,
                        available: status.available,
                        unavailable: status.unavailable,
                    },
                );
                if let Some(diagnostic) = rollout::analyze(&status) {
                    let message = diagnostic.describe(kind, name);
                    report.add_error(name, name, FindingKind::Rollout, message);
                }
                let availability = Availability::of(&status);
                if let Some(message) = availability.not_ready_message(kind, name) {
                    report.add_error(name, name, FindingKind::Availability, message);
                }
                if let Some(message) = availability.unavailable_message(kind, name) {
                    report.add_warning(name, name, FindingKind::Availability, message);
                }
                report.phase_count.insert(name.to_string(), self.phases);
            }
            None => {
                report.disabled.insert(name.to_string());
                if !self.phases.is_empty() {
                    report.phase_count.insert(name.to_string(), self.phases);
                }
            }
        }

        if !self.images.is_empty() {
            report.image_count.insert(name.to_string(), self.images);
        }

        for PodProbe { pod, result } in self.probes {
            match result {
                Ok(health) => {
                    if let Some(doc) = &health {
                        for finding in classify::classify_agent_health(doc) {
                            report.record(name, &pod, finding);
                        }
                    }
                    report.agent_status.insert(pod, health);
                }
                Err(finding) => report.record(name, &pod, finding),
            }
        }

        report.collection_errors.extend(self.collection_errors);
    }
}
