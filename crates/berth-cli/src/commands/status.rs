//! Status command - read-only query of one release

use std::path::Path;

use berth_core::context::DEFAULT_SERVICE_NAMESPACE;
use berth_kube::{
    ClusterSession, ConnectionError, CredentialResolver, KubeConnector, Principal, ReleaseQuery,
    ServiceConfig, StoreCredentialResolver, query_release,
};
use clap::Args;
use console::style;

use super::credentials;
use crate::display::status_style;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Release name
    pub release: String,

    /// Namespace the release is expected in
    #[arg(short, long, env = "BERTH_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Namespace where the release service keeps its records
    #[arg(long, env = "BERTH_SERVICE_NAMESPACE", default_value = DEFAULT_SERVICE_NAMESPACE)]
    pub service_namespace: String,

    /// Stored kubeconfig credential; ambient credentials when absent
    #[arg(long = "kubeconfig-id", env = "BERTH_KUBECONFIG_ID")]
    pub credential_id: Option<String>,

    /// Owner whose credentials may be used
    #[arg(long, env = "BERTH_OWNER", default_value = "default")]
    pub owner: String,
}

/// Run the status command
pub async fn run(args: &StatusArgs, credentials_file: Option<&Path>) -> Result<()> {
    let credential_id = args
        .credential_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let resolver = StoreCredentialResolver::new(credentials::store_file(credentials_file));
    let connection = resolver.resolve(credential_id, &args.owner, &Principal::System)?;

    let connector = KubeConnector::new(ServiceConfig::default());
    let session = ClusterSession::open(&connector, &connection, &args.service_namespace).await?;
    let query = query_release(session.manager().as_ref(), &args.release, &args.namespace)
        .await
        .map_err(ConnectionError::Query)?;
    drop(session);

    print_query(&args.release, &query);
    Ok(())
}

fn print_query(name: &str, query: &ReleaseQuery) {
    let Some(release) = &query.release else {
        println!(
            "{} Release {} not found",
            style("→").blue().bold(),
            style(name).cyan()
        );
        return;
    };

    println!("{}", style("RELEASE").bold().underlined());
    println!("  Name:       {}", style(&release.name).cyan());
    println!("  Namespace:  {}", style(&release.namespace).yellow());
    println!("  Revision:   {}", style(release.version).yellow());
    println!("  Status:     {}", status_style(release.status));
    println!(
        "  Chart:      {} {}",
        release.chart.name, release.chart.version
    );
    println!(
        "  Updated:    {}",
        release.last_deployed.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(description) = &release.description {
        println!("  Note:       {}", description);
    }

    if let Some(collision) = &query.collision {
        eprintln!("{} {}", style("⚠").yellow(), collision);
    }
}
