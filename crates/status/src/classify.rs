//! Turns agent status documents and probe failures into report findings.

use chrono::SecondsFormat;

use crate::error::ProbeError;
use crate::probe::AgentHealth;
use crate::report::FindingKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A problem not yet filed under a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub kind: FindingKind,
    pub message: String,
}

impl Finding {
    pub fn error(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
        }
    }

    pub fn warning(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message: message.into(),
        }
    }
}

/// Findings embedded in an agent's own status document.
///
/// Subsystems in `Warning` state become warnings and those in `Failure`
/// become errors; every controller with consecutive failures is an error.
pub fn classify_agent_health(health: &AgentHealth) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (name, subsystem) in health.subsystems() {
        let message = format!("{name}: {}", subsystem.msg);
        match subsystem.state.to_ascii_lowercase().as_str() {
            "warning" => findings.push(Finding::warning(FindingKind::Subsystem, message)),
            "failure" => findings.push(Finding::error(FindingKind::Subsystem, message)),
            _ => {}
        }
    }

    for (name, status) in health.failing_controllers() {
        let since = status
            .last_failure_timestamp
            .map(|ts| format!(" since {}", ts.to_rfc3339_opts(SecondsFormat::Secs, true)))
            .unwrap_or_default();
        findings.push(Finding::error(
            FindingKind::Controller,
            format!(
                "controller {name} is failing{since} ({}x): {}",
                status.consecutive_failure_count, status.last_failure_msg
            ),
        ));
    }

    findings
}

/// Last line of `logs` that looks like an error, if any.
pub fn last_error_line(logs: &str) -> Option<&str> {
    logs.lines()
        .rev()
        .map(str::trim)
        .find(|line| line.contains("level=error") || line.contains("[error]"))
}

/// Error finding for a pod whose agent could not be probed.
pub fn probe_failure(err: &ProbeError, log_hint: Option<&str>) -> Finding {
    let message = match log_hint {
        Some(line) => format!("unable to retrieve agent status: {err} (last log error: {line})"),
        None => format!("unable to retrieve agent status: {err}"),
    };
    Finding::error(FindingKind::Probe, message)
}
