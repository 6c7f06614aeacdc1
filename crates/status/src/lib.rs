//! Point-in-time health status of a Cilium installation.
//!
//! A [`StatusCollector`] reads the agent DaemonSet and the control plane
//! Deployments through a [`ClusterAccessor`], probes every agent pod for its
//! self-reported health through an [`AgentProbe`], and returns a [`Report`]
//! that renders deterministically as text.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cilium_status::{ExecAgentProbe, KubeClusterAccessor, StatusCollector, StatusParameters};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = kube::Client::try_default().await?;
//!     let collector = StatusCollector::new(
//!         Arc::new(KubeClusterAccessor::new(client.clone())),
//!         Arc::new(ExecAgentProbe::new(client)),
//!         StatusParameters::default(),
//!     )?;
//!
//!     let report = collector.status(&CancellationToken::new()).await?;
//!     print!("{}", report.format());
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod accessor;
pub mod classify;
pub mod collector;
pub mod config;
pub mod error;
pub mod k8s;
pub mod probe;
pub mod report;
pub mod rollout;

pub use accessor::{ClusterAccessor, ContainerInfo, EndpointInfo, PodInfo, WorkloadStatus};
pub use collector::StatusCollector;
pub use config::{StatusParameters, WorkloadKind, WorkloadSpec};
pub use error::{AccessError, ProbeError, StatusError};
pub use k8s::{ExecAgentProbe, KubeClusterAccessor};
pub use probe::{AgentHealth, AgentProbe, ControllerStatus, SubsystemStatus};
pub use report::{format_report, ErrorEntry, ErrorGroup, FindingKind, Report, WorkloadSnapshot};
pub use rollout::{analyze, RolloutDiagnostic};
