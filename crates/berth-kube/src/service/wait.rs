//! Waiting for applied workloads to become ready

use std::time::Duration;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::{Api, Client};

use super::apply::AppliedResource;
use crate::error::{KubeError, Result};

/// Readiness of one workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    pub message: String,
}

/// A Deployment is ready when every desired replica is updated, ready and available
pub fn deployment_readiness(deployment: &Deployment) -> Readiness {
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = deployment.status.as_ref();
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let updated = status.and_then(|s| s.updated_replicas).unwrap_or(0);
    let available = status.and_then(|s| s.available_replicas).unwrap_or(0);

    let generation = deployment.metadata.generation.unwrap_or(0);
    let observed = status.and_then(|s| s.observed_generation).unwrap_or(0);

    Readiness {
        ready: observed >= generation
            && ready >= desired
            && updated >= desired
            && available >= desired,
        message: format!(
            "{}/{} ready, {}/{} updated, {}/{} available",
            ready, desired, updated, desired, available, desired
        ),
    }
}

/// A StatefulSet is ready when all replicas are ready on the update revision
pub fn statefulset_readiness(statefulset: &StatefulSet) -> Readiness {
    let desired = statefulset.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = statefulset.status.as_ref();
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let current_revision = status.and_then(|s| s.current_revision.as_deref());
    let update_revision = status.and_then(|s| s.update_revision.as_deref());
    let rolled_out = current_revision.is_some() && current_revision == update_revision;

    Readiness {
        ready: ready >= desired && rolled_out,
        message: format!(
            "{}/{} ready, revision {}",
            ready,
            desired,
            update_revision.unwrap_or("unknown")
        ),
    }
}

/// Poll until every Deployment and StatefulSet in `resources` is ready
///
/// Never returns on its own while something stays unready; callers bound it
/// with a timeout.
pub async fn wait_for_workloads(
    client: &Client,
    resources: &[AppliedResource],
    poll_interval: Duration,
) -> Result<()> {
    loop {
        let checks = resources.iter().map(|resource| check(client, resource));
        let pending: Vec<String> = futures::future::try_join_all(checks)
            .await?
            .into_iter()
            .flatten()
            .collect();

        if pending.is_empty() {
            return Ok(());
        }
        tracing::debug!(pending = %pending.join(", "), "waiting for workloads");
        tokio::time::sleep(poll_interval).await;
    }
}

/// Description of `resource` if it is a workload that is not ready yet
async fn check(client: &Client, resource: &AppliedResource) -> Result<Option<String>> {
    let Some(namespace) = resource.namespace.as_deref() else {
        return Ok(None);
    };
    let readiness = match resource.kind.as_str() {
        "Deployment" => {
            let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
            api.get_opt(&resource.name)
                .await?
                .map(|d| deployment_readiness(&d))
        }
        "StatefulSet" => {
            let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
            api.get_opt(&resource.name)
                .await?
                .map(|s| statefulset_readiness(&s))
        }
        _ => return Ok(None),
    };

    match readiness {
        Some(r) if r.ready => Ok(None),
        Some(r) => Ok(Some(format!("{} ({})", resource, r.message))),
        None => Err(KubeError::ApplyFailed(format!(
            "{} disappeared while waiting for it",
            resource
        ))),
    }
}
