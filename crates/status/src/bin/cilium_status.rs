//! cilium-status - one-shot health report of a Cilium installation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cilium_status::{ExecAgentProbe, KubeClusterAccessor, StatusCollector, StatusParameters};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    Text,
    Json,
}

/// Report rollout state and agent health of a Cilium installation.
#[derive(Parser)]
#[command(name = "cilium-status")]
#[command(about = "Report rollout state and agent health of a Cilium installation")]
struct Cli {
    /// Parameters file (YAML). Flags override its values.
    #[arg(long, env = "CILIUM_STATUS_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace Cilium is installed in.
    #[arg(short, long, env = "CILIUM_NAMESPACE")]
    namespace: Option<String>,

    /// Maximum number of agent probes in flight.
    #[arg(long)]
    workers: Option<usize>,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "text")]
    output: Output,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn parameters(&self) -> Result<StatusParameters> {
        let mut params = match &self.config {
            Some(path) => StatusParameters::from_yaml_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => StatusParameters::default(),
        };
        if let Some(namespace) = &self.namespace {
            params.namespace.clone_from(namespace);
        }
        if let Some(workers) = self.workers {
            params.worker_count = workers;
        }
        Ok(params)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("cilium_status=debug,warn")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cilium_status=info,warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let params = cli.parameters()?;
    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let probe = ExecAgentProbe::new(client.clone()).with_container(params.agent_container.clone());
    let collector = StatusCollector::new(
        Arc::new(KubeClusterAccessor::new(client)),
        Arc::new(probe),
        params,
    )?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling status collection");
            on_signal.cancel();
        }
    });

    let report = collector.status(&cancel).await?;
    match cli.output {
        Output::Text => print!("{}", report.format()),
        Output::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        ),
    }

    if !report.is_healthy() {
        info!(
            errors = report.error_count(),
            warnings = report.warning_count(),
            "Cilium is not healthy"
        );
        std::process::exit(1);
    }
    Ok(())
}
