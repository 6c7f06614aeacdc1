//! The snapshot produced by one status pass and its text rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::classify::{Finding, Severity};
use crate::config::WorkloadKind;
use crate::probe::AgentHealth;

const LABEL_WIDTH: usize = 19;
const NAME_WIDTH: usize = 24;

/// Pod counters of one workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkloadSnapshot {
    pub kind: WorkloadKind,
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
    pub unavailable: i32,
}

/// Where a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Rollout,
    Availability,
    Probe,
    Subsystem,
    Controller,
}

/// One classified problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub kind: FindingKind,
    pub message: String,
}

impl ErrorEntry {
    #[must_use]
    pub fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors and warnings of one subcomponent, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorGroup {
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<ErrorEntry>,
}

/// Pods in the cluster versus pods with a Cilium endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PodsCount {
    pub all: usize,
    pub managed: usize,
}

/// Point-in-time status of the monitored workloads.
///
/// All maps are ordered, so equal reports render identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Workload name → pod counters. Absent for workloads that do not exist.
    pub pod_state: BTreeMap<String, WorkloadSnapshot>,
    /// Workload name → pod phase → number of pods.
    pub phase_count: BTreeMap<String, BTreeMap<String, usize>>,
    /// Workload name → container image → number of containers.
    pub image_count: BTreeMap<String, BTreeMap<String, usize>>,
    /// Pod name → agent status document. A pod whose probe failed has no key.
    pub agent_status: BTreeMap<String, Option<AgentHealth>>,
    /// Component → subcomponent → findings.
    pub errors: BTreeMap<String, BTreeMap<String, ErrorGroup>>,
    /// Monitored workloads that were not found.
    pub disabled: BTreeSet<String>,
    pub pods_count: Option<PodsCount>,
    /// Selected agent configuration keys.
    pub config: BTreeMap<String, String>,
    /// Failures that only cost part of the data.
    pub collection_errors: Vec<String>,
}

impl Report {
    pub fn add_error(
        &mut self,
        component: &str,
        subcomponent: &str,
        kind: FindingKind,
        message: impl Into<String>,
    ) {
        self.group_mut(component, subcomponent)
            .errors
            .push(ErrorEntry::new(kind, message));
    }

    pub fn add_warning(
        &mut self,
        component: &str,
        subcomponent: &str,
        kind: FindingKind,
        message: impl Into<String>,
    ) {
        self.group_mut(component, subcomponent)
            .warnings
            .push(ErrorEntry::new(kind, message));
    }

    /// File a classified finding under a component/subcomponent pair.
    pub fn record(&mut self, component: &str, subcomponent: &str, finding: Finding) {
        let group = self.group_mut(component, subcomponent);
        let entry = ErrorEntry::new(finding.kind, finding.message);
        match finding.severity {
            Severity::Error => group.errors.push(entry),
            Severity::Warning => group.warnings.push(entry),
        }
    }

    fn group_mut(&mut self, component: &str, subcomponent: &str) -> &mut ErrorGroup {
        self.errors
            .entry(component.to_string())
            .or_default()
            .entry(subcomponent.to_string())
            .or_default()
    }

    /// Findings recorded for a component/subcomponent pair.
    pub fn group(&self, component: &str, subcomponent: &str) -> Option<&ErrorGroup> {
        self.errors.get(component)?.get(subcomponent)
    }

    /// Number of pods of `workload` in `phase`, zero if none were seen.
    pub fn phase(&self, workload: &str, phase: &str) -> usize {
        self.phase_count
            .get(workload)
            .and_then(|phases| phases.get(phase))
            .copied()
            .unwrap_or(0)
    }

    pub fn error_count(&self) -> usize {
        self.groups().map(|g| g.errors.len()).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.groups().map(|g| g.warnings.len()).sum()
    }

    /// True when nothing went wrong, warnings included.
    pub fn is_healthy(&self) -> bool {
        self.error_count() == 0 && self.warning_count() == 0 && self.collection_errors.is_empty()
    }

    fn groups(&self) -> impl Iterator<Item = &ErrorGroup> {
        self.errors.values().flat_map(BTreeMap::values)
    }

    /// Render the report as text. Always ends with a newline.
    pub fn format(&self) -> String {
        self.to_string()
    }

    fn components(&self) -> BTreeSet<&str> {
        self.pod_state
            .keys()
            .chain(self.disabled.iter())
            .chain(self.errors.keys())
            .map(String::as_str)
            .collect()
    }

    fn component_summary(&self, component: &str) -> String {
        if self.disabled.contains(component) {
            return "disabled".to_string();
        }
        let (errors, warnings) = self.errors.get(component).map_or((0, 0), |subs| {
            subs.values()
                .fold((0, 0), |(e, w), g| (e + g.errors.len(), w + g.warnings.len()))
        });
        counts_summary(errors, warnings)
    }
}

/// Render an optional report; no report renders as nothing.
pub fn format_report(report: Option<&Report>) -> String {
    report.map(Report::format).unwrap_or_default()
}

fn counts_summary(errors: usize, warnings: usize) -> String {
    match (errors, warnings) {
        (0, 0) => "OK".to_string(),
        (e, 0) => format!("{e} errors"),
        (0, w) => format!("{w} warnings"),
        (e, w) => format!("{e} errors, {w} warnings"),
    }
}

fn agent_summary(health: Option<&AgentHealth>) -> String {
    let Some(health) = health else {
        return "empty status reply".to_string();
    };
    let mut parts: Vec<String> = health
        .subsystems()
        .into_iter()
        .filter(|(_, s)| {
            !s.state.eq_ignore_ascii_case("ok") && !s.state.eq_ignore_ascii_case("disabled")
        })
        .map(|(name, s)| format!("{name}: {}", s.state))
        .collect();
    match health.failing_controllers().count() {
        0 => {}
        1 => parts.push("1 controller failing".to_string()),
        n => parts.push(format!("{n} controllers failing")),
    }
    if parts.is_empty() {
        "OK".to_string()
    } else {
        parts.join(", ")
    }
}

/// Writes rows under a label that is only printed on the first row.
fn section(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    rows: impl IntoIterator<Item = String>,
) -> fmt::Result {
    let mut label = label;
    for row in rows {
        writeln!(f, "{label:<LABEL_WIDTH$}{row}")?;
        label = "";
    }
    Ok(())
}

fn finding_rows(
    report: &Report,
    pick: fn(&ErrorGroup) -> &[ErrorEntry],
) -> impl Iterator<Item = String> + '_ {
    report.errors.iter().flat_map(move |(component, subs)| {
        subs.iter().flat_map(move |(sub, group)| {
            pick(group)
                .iter()
                .map(move |entry| format!("{component:<NAME_WIDTH$}{sub:<NAME_WIDTH$}{entry}"))
        })
    })
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(
            f,
            "Components:",
            self.components()
                .into_iter()
                .map(|c| format!("{c:<NAME_WIDTH$}{}", self.component_summary(c))),
        )?;

        for (name, state) in &self.pod_state {
            let mut line = format!(
                "{name:<NAME_WIDTH$}Desired: {}, Ready: {}/{}, Available: {}/{}",
                state.desired, state.ready, state.desired, state.available, state.desired
            );
            if state.unavailable > 0 {
                line.push_str(&format!(", Unavailable: {}/{}", state.unavailable, state.desired));
            }
            section(f, &state.kind.to_string(), [line])?;
        }

        section(
            f,
            "Containers:",
            self.phase_count.iter().map(|(name, phases)| {
                let counts: Vec<String> =
                    phases.iter().map(|(phase, n)| format!("{phase}: {n}")).collect();
                format!("{name:<NAME_WIDTH$}{}", counts.join(", "))
            }),
        )?;

        section(
            f,
            "Image versions:",
            self.image_count.iter().flat_map(|(name, images)| {
                images.iter().enumerate().map(move |(i, (image, n))| {
                    let name = if i == 0 { name.as_str() } else { "" };
                    format!("{name:<NAME_WIDTH$}{image}: {n}")
                })
            }),
        )?;

        if let Some(count) = self.pods_count {
            section(
                f,
                "Cluster Pods:",
                [format!("{}/{} managed by Cilium", count.managed, count.all)],
            )?;
        }

        section(
            f,
            "Configuration:",
            self.config.iter().map(|(k, v)| format!("{k}={v}")),
        )?;

        section(
            f,
            "Agent health:",
            self.agent_status.iter().map(|(pod, health)| {
                format!("{pod:<NAME_WIDTH$}{}", agent_summary(health.as_ref()))
            }),
        )?;

        section(f, "Errors:", finding_rows(self, |g| g.errors.as_slice()))?;
        section(f, "Warnings:", finding_rows(self, |g| g.warnings.as_slice()))?;
        section(f, "Collection errors:", self.collection_errors.iter().cloned())?;

        let status = if self.collection_errors.is_empty() {
            counts_summary(self.error_count(), self.warning_count())
        } else {
            format!(
                "{}, {} collection errors",
                counts_summary(self.error_count(), self.warning_count()),
                self.collection_errors.len()
            )
        };
        writeln!(f, "{:<LABEL_WIDTH$}{status}", "Status:")
    }
}
