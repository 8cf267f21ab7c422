//! Deploy command - install or update a release from a chart directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use berth_core::{DeploymentContext, Workspace};
use berth_kube::{
    Interrupt, JobContext, KubeConnector, ReconcileOutcome, Reconciler, ServiceConfig,
    StoreCredentialResolver,
};
use clap::Args;
use console::style;

use super::{credentials, parse_duration};
use crate::display::{ConsoleSink, status_style};
use crate::error::{CliError, Result};

#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Release name
    pub release: Option<String>,

    /// Chart directory, relative to the workspace
    #[arg(short, long)]
    pub chart: Option<String>,

    /// Namespace the release is installed into
    #[arg(short, long, env = "BERTH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Namespace where the release service keeps its records
    #[arg(long, env = "BERTH_SERVICE_NAMESPACE")]
    pub service_namespace: Option<String>,

    /// Wait for Deployments and StatefulSets to become ready
    #[arg(long)]
    pub wait: bool,

    /// Install/update timeout (e.g. 90s, 5m)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Stored kubeconfig credential; ambient credentials when absent
    #[arg(long = "kubeconfig-id", env = "BERTH_KUBECONFIG_ID")]
    pub credential_id: Option<String>,

    /// Deployment file (YAML); flags override its fields
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Directory chart locations are resolved against (default: current directory)
    #[arg(short, long, env = "BERTH_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Owner whose credentials may be used
    #[arg(long, env = "BERTH_OWNER", default_value = "default")]
    pub owner: String,
}

/// Merge the deployment file (if any) with command line flags
pub fn build_context(args: &DeployArgs) -> Result<DeploymentContext> {
    let mut ctx = match &args.file {
        Some(path) => DeploymentContext::from_file(path)?,
        None => DeploymentContext::new(
            required(&args.chart, "--chart")?,
            required(&args.namespace, "--namespace")?,
            required(&args.release, "<RELEASE>")?,
        ),
    };

    if let Some(chart) = &args.chart {
        ctx.chart_location = chart.clone();
    }
    if let Some(namespace) = &args.namespace {
        ctx.target_namespace = namespace.clone();
    }
    if let Some(release) = &args.release {
        ctx.release_name = release.clone();
    }
    if let Some(namespace) = &args.service_namespace {
        ctx.service_namespace = namespace.clone();
    }
    if let Some(timeout) = args.timeout {
        ctx.timeout = timeout;
    }
    if let Some(id) = &args.credential_id {
        ctx.credential_id = Some(id.clone());
    }
    if args.wait {
        ctx.wait = true;
    }

    ctx.validate()?;
    Ok(ctx)
}

fn required(value: &Option<String>, flag: &str) -> Result<String> {
    value.clone().ok_or_else(|| {
        CliError::input_with_help(
            format!("{} is required", flag),
            "pass it on the command line or provide a deployment file with --file",
        )
    })
}

/// Run the deploy command
pub async fn run(args: &DeployArgs, credentials_file: Option<&Path>) -> Result<()> {
    let ctx = build_context(args)?;
    let workspace = match &args.workspace {
        Some(root) => Workspace::new(root),
        None => Workspace::current()?,
    };
    let job = JobContext::new(workspace, &args.owner);

    println!(
        "{} Reconciling release {} in namespace {}",
        style("→").blue().bold(),
        style(&ctx.release_name).cyan(),
        style(&ctx.target_namespace).yellow()
    );

    let (handle, interrupt) = Interrupt::pair();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received");
            handle.trigger();
        }
    });

    let sink = ConsoleSink::new();
    let reconciler = Reconciler::new(
        StoreCredentialResolver::new(credentials::store_file(credentials_file)),
        KubeConnector::new(ServiceConfig::default()),
        &sink,
    )
    .with_interrupt(interrupt);

    let outcome = reconciler.reconcile(&ctx, &job).await;
    ctrl_c.abort();
    tracing::debug!(state = ?sink.command_state(), "deploy finished");

    let (verb, release) = match outcome {
        ReconcileOutcome::Installed(release) => ("installed", release),
        ReconcileOutcome::Updated(release) => ("updated", release),
        ReconcileOutcome::Failed(err) => return Err(CliError::from(err).reported()),
    };

    println!(
        "{} Successfully {} {} (revision {}, {}) in namespace {}",
        style("✓").green().bold(),
        verb,
        style(&release.name).cyan(),
        style(release.version).yellow(),
        status_style(release.status),
        style(&release.namespace).yellow()
    );
    Ok(())
}
