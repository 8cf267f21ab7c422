//! Kubernetes-backed release service
//!
//! - [`KubeConnector`] builds clients from a kubeconfig or the ambient config
//! - [`ReleaseTunnel`] binds a session to the release service namespace
//! - [`SecretsReleaseManager`] keeps release records as Secrets and applies
//!   rendered charts with Server-Side Apply

pub mod apply;
pub mod render;
pub mod store;
pub mod wait;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};

use berth_core::{Release, StatusCode};

use crate::actions::{
    InstallReleaseRequest, InstallReleaseResponse, ListReleasesRequest, ListReleasesResponse,
    UpdateReleaseRequest, UpdateReleaseResponse,
};
use crate::credentials::ClusterConnection;
use crate::error::{KubeError, Result};
use crate::manager::ReleaseManager;
use crate::session::ClusterConnector;

pub use apply::{AppliedResource, ApplySummary, FIELD_MANAGER, ResourceApplier};
pub use render::{ReleaseInfo, render_manifest};
pub use store::ReleaseStore;

/// Tuning for the release service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How often workload readiness is polled while waiting
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Opens sessions against real clusters
#[derive(Debug, Clone, Default)]
pub struct KubeConnector {
    config: ServiceConfig,
}

impl KubeConnector {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    type Client = Client;
    type Tunnel = ReleaseTunnel;
    type Manager = SecretsReleaseManager;

    async fn connect(&self, connection: &ClusterConnection) -> Result<Client> {
        match connection {
            ClusterConnection::Ambient => Ok(Client::try_default().await?),
            ClusterConnection::Kubeconfig(content) => {
                let kubeconfig = Kubeconfig::from_yaml(content.expose())
                    .map_err(|e| KubeError::Kubeconfig(e.to_string()))?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| KubeError::Kubeconfig(e.to_string()))?;
                Ok(Client::try_from(config)?)
            }
        }
    }

    async fn open_tunnel(&self, client: &Client, service_namespace: &str) -> Result<ReleaseTunnel> {
        ReleaseTunnel::open(client.clone(), service_namespace).await
    }

    async fn release_manager(
        &self,
        client: &Client,
        tunnel: &ReleaseTunnel,
    ) -> Result<SecretsReleaseManager> {
        SecretsReleaseManager::new(client.clone(), tunnel, self.config.clone()).await
    }
}

/// Access to the release service namespace
pub struct ReleaseTunnel {
    namespace: String,
    secrets: Api<Secret>,
}

impl ReleaseTunnel {
    /// Verify the namespace exists and the API server answers
    pub async fn open(client: Client, namespace: &str) -> Result<Self> {
        let namespaces: Api<Namespace> = Api::all(client.clone());
        if namespaces.get_opt(namespace).await?.is_none() {
            return Err(KubeError::ServiceUnavailable(format!(
                "namespace '{}' does not exist",
                namespace
            )));
        }

        tracing::debug!(namespace = %namespace, "release service tunnel open");
        Ok(Self {
            namespace: namespace.to_string(),
            secrets: Api::namespaced(client, namespace),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Drop for ReleaseTunnel {
    fn drop(&mut self) {
        tracing::debug!(namespace = %self.namespace, "release service tunnel closed");
    }
}

/// Release service storing records as Secrets
pub struct SecretsReleaseManager {
    client: Client,
    store: ReleaseStore,
    applier: ResourceApplier,
    config: ServiceConfig,
}

struct Rollout {
    timeout: Duration,
    wait: bool,
    force: bool,
    recreate: bool,
}

impl SecretsReleaseManager {
    pub async fn new(client: Client, tunnel: &ReleaseTunnel, config: ServiceConfig) -> Result<Self> {
        let applier = ResourceApplier::new(client.clone()).await?;
        Ok(Self {
            client,
            store: ReleaseStore::new(tunnel.secrets.clone(), tunnel.namespace()),
            applier,
            config,
        })
    }

    /// Apply the release's manifest, then wait for workloads if asked to
    ///
    /// Only the wait is bounded by the rollout timeout.
    async fn roll_out(&self, release: &Release, rollout: &Rollout) -> Result<()> {
        let applied = self
            .applier
            .apply_manifest(&release.namespace, &release.manifest, rollout.force)
            .await?
            .into_result()?;
        tracing::info!(
            release = %release.name,
            resources = applied.len(),
            "manifest applied"
        );

        if rollout.recreate {
            self.applier.restart_workloads(&applied).await?;
        }
        if rollout.wait {
            let waiting = wait::wait_for_workloads(&self.client, &applied, self.config.poll_interval);
            bounded(rollout.timeout, waiting).await?;
        }
        Ok(())
    }

    /// Store the final state of a rollout and hand back the release or the error
    async fn settle(
        &self,
        mut release: Release,
        result: Result<()>,
        description: &str,
    ) -> Result<Release> {
        match result {
            Ok(()) => {
                release.mark_deployed(description);
                self.store.update(&release).await?;
                Ok(release)
            }
            Err(err) => {
                release.mark_failed(err.to_string());
                if let Err(store_err) = self.store.update(&release).await {
                    tracing::warn!(
                        release = %release.name,
                        error = %store_err,
                        "could not record failed release"
                    );
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ReleaseManager for SecretsReleaseManager {
    async fn list(&self, request: &ListReleasesRequest) -> Result<ListReleasesResponse> {
        let records = self.store.list(request.filter.as_deref()).await?;
        Ok(select_releases(records, request))
    }

    async fn install(&self, request: InstallReleaseRequest) -> Result<InstallReleaseResponse> {
        let existing = self.store.latest(&request.name).await?;
        if let Some(existing) = &existing {
            if existing.status != StatusCode::Deleted {
                return Err(KubeError::ReleaseAlreadyExists {
                    name: existing.name.clone(),
                    namespace: existing.namespace.clone(),
                });
            }
        }

        let version = existing.map(|r| r.version + 1).unwrap_or(1);
        let mut info = ReleaseInfo::install(&request.name, &request.namespace);
        info.revision = version;
        let manifest = render_manifest(&request.chart, &info)?;

        let mut release = Release::for_install(
            &request.name,
            &request.namespace,
            request.chart.metadata.clone(),
            manifest,
        );
        release.version = version;
        self.store.create(&release).await?;
        tracing::info!(release = %release.name, version, "installing");

        let rollout = Rollout {
            timeout: request.timeout,
            wait: request.wait,
            force: false,
            recreate: false,
        };
        let result = self.roll_out(&release, &rollout).await;
        let release = self.settle(release, result, "Install complete").await?;
        Ok(InstallReleaseResponse { release })
    }

    async fn update(&self, request: UpdateReleaseRequest) -> Result<UpdateReleaseResponse> {
        let records = self.store.list(Some(&request.name)).await?;
        let next_version = records.iter().map(|r| r.version).max().unwrap_or(0) + 1;
        let mut previous = records
            .into_iter()
            .filter(|r| r.status.is_active())
            .max_by_key(|r| r.version)
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: request.name.clone(),
            })?;

        let info = ReleaseInfo::upgrade(&request.name, &previous.namespace, next_version);
        let manifest = render_manifest(&request.chart, &info)?;

        let mut release = Release::for_update(&previous, request.chart.metadata.clone(), manifest);
        release.version = next_version;
        self.store.create(&release).await?;
        tracing::info!(release = %release.name, version = next_version, "updating");

        let rollout = Rollout {
            timeout: request.timeout,
            wait: request.wait,
            force: request.force,
            recreate: request.recreate,
        };
        let result = self.roll_out(&release, &rollout).await;
        let release = self.settle(release, result, "Upgrade complete").await?;

        previous.mark_superseded();
        self.store.update(&previous).await?;
        Ok(UpdateReleaseResponse { release })
    }
}

/// Latest revision per release, filtered by status, newest first, paginated
pub fn select_releases(records: Vec<Release>, request: &ListReleasesRequest) -> ListReleasesResponse {
    let codes = request.effective_status_codes();

    let mut latest: BTreeMap<String, Release> = BTreeMap::new();
    for record in records {
        if request.filter.as_ref().is_some_and(|name| *name != record.name) {
            continue;
        }
        match latest.get(&record.name) {
            Some(current) if current.version >= record.version => {}
            _ => {
                latest.insert(record.name.clone(), record);
            }
        }
    }

    let mut releases: Vec<Release> = latest
        .into_values()
        .filter(|r| codes.contains(&r.status))
        .collect();
    releases.sort_by(|a, b| {
        b.last_deployed
            .cmp(&a.last_deployed)
            .then_with(|| a.name.cmp(&b.name))
    });
    let total = releases.len();

    if let Some(offset) = &request.offset {
        let start = releases
            .iter()
            .position(|r| &r.name == offset)
            .unwrap_or(releases.len());
        releases.drain(..start);
    }

    let mut next = None;
    if let Some(limit) = request.limit {
        if releases.len() > limit {
            next = Some(releases[limit].name.clone());
            releases.truncate(limit);
        }
    }

    ListReleasesResponse {
        releases,
        next,
        total,
    }
}

/// Run `work` for at most `limit`; a zero limit means no bound
async fn bounded<T>(limit: Duration, work: impl Future<Output = Result<T>>) -> Result<T> {
    if limit.is_zero() {
        return work.await;
    }
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(KubeError::Timeout(format!("{:?}", limit))),
    }
}
