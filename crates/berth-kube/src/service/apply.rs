//! Applying rendered manifests with Server-Side Apply
//!
//! Documents are parsed into dynamic objects, resolved through API discovery,
//! ordered so that dependencies come first and applied one by one under the
//! `berth` field manager.

use kube::{
    Client,
    api::{Api, DynamicObject, Patch, PatchParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};

use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "berth";

/// Pod template annotation bumped to restart workloads
pub const RESTARTED_AT_ANNOTATION: &str = "berth.io/restartedAt";

/// Kinds in the order they are applied; anything else goes last
const APPLY_ORDER: &[&str] = &[
    "Namespace",
    "NetworkPolicy",
    "ResourceQuota",
    "LimitRange",
    "PodDisruptionBudget",
    "ServiceAccount",
    "Secret",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "Role",
    "RoleBinding",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "HorizontalPodAutoscaler",
    "StatefulSet",
    "Job",
    "CronJob",
    "IngressClass",
    "Ingress",
    "APIService",
];

/// Kinds whose pods can be restarted through their pod template
const RESTARTABLE_KINDS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet"];

/// A resource that was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedResource {
    pub kind: String,
    pub name: String,
    /// None for cluster-scoped resources
    pub namespace: Option<String>,
}

impl std::fmt::Display for AppliedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Outcome of applying one manifest
#[derive(Debug, Clone, Default)]
pub struct ApplySummary {
    pub applied: Vec<AppliedResource>,
    /// Resources that failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl ApplySummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn any failure into an error naming every failed resource
    pub fn into_result(self) -> Result<Vec<AppliedResource>> {
        if self.is_success() {
            return Ok(self.applied);
        }
        let details = self
            .failed
            .iter()
            .map(|(name, reason)| format!("{}: {}", name, reason))
            .collect::<Vec<_>>()
            .join("; ");
        Err(KubeError::ApplyFailed(details))
    }
}

/// One document of a manifest, before discovery
#[derive(Debug, Clone)]
pub struct ManifestObject {
    pub obj: DynamicObject,
    pub gvk: GroupVersionKind,
}

impl ManifestObject {
    fn name(&self) -> Result<&str> {
        self.obj.metadata.name.as_deref().ok_or_else(|| {
            KubeError::InvalidManifest(format!("{} is missing metadata.name", self.gvk.kind))
        })
    }
}

/// Split a multi-document manifest into typed objects, in apply order
pub fn parse_manifest(manifest: &str) -> Result<Vec<ManifestObject>> {
    let mut objects = Vec::new();

    for (index, doc) in manifest.split("\n---").enumerate() {
        let doc = doc.trim().trim_start_matches("---");
        if doc
            .lines()
            .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
        {
            continue;
        }

        let obj: DynamicObject = serde_yaml::from_str(doc).map_err(|e| {
            KubeError::InvalidManifest(format!("document {}: {}", index, e))
        })?;
        let types = obj.types.as_ref().ok_or_else(|| {
            KubeError::InvalidManifest(format!("document {} is missing apiVersion or kind", index))
        })?;
        let gvk = gvk_from_type_meta(types);

        objects.push(ManifestObject { obj, gvk });
    }

    objects.sort_by_key(|o| apply_rank(&o.gvk.kind));
    Ok(objects)
}

fn apply_rank(kind: &str) -> usize {
    APPLY_ORDER
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(APPLY_ORDER.len())
}

/// "apps/v1" -> ("apps", "v1"), "v1" -> ("", "v1")
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}

/// Applies manifests using cached discovery information
pub struct ResourceApplier {
    client: Client,
    discovery: Discovery,
}

impl ResourceApplier {
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self { client, discovery })
    }

    /// Apply every document of `manifest`, defaulting namespaced objects to `namespace`
    ///
    /// `force` takes ownership of fields held by other field managers.
    pub async fn apply_manifest(
        &self,
        namespace: &str,
        manifest: &str,
        force: bool,
    ) -> Result<ApplySummary> {
        let objects = parse_manifest(manifest)?;
        let mut summary = ApplySummary::default();

        for object in objects {
            let (api_resource, capabilities) = self.resolve(&object)?;
            let mut obj = object.obj.clone();
            if capabilities.scope == Scope::Namespaced && obj.metadata.namespace.is_none() {
                obj.metadata.namespace = Some(namespace.to_string());
            }

            let applied = AppliedResource {
                kind: object.gvk.kind.clone(),
                name: object.name()?.to_string(),
                namespace: obj.metadata.namespace.clone(),
            };

            let api = self.api_for(&api_resource, &capabilities, applied.namespace.as_deref());
            let mut params = PatchParams::apply(FIELD_MANAGER);
            params.force = force;

            match api.patch(&applied.name, &params, &Patch::Apply(&obj)).await {
                Ok(_) => {
                    tracing::debug!(resource = %applied, "applied");
                    summary.applied.push(applied);
                }
                Err(e) => {
                    tracing::warn!(resource = %applied, error = %e, "apply failed");
                    summary.failed.push((applied.to_string(), e.to_string()));
                }
            }
        }

        Ok(summary)
    }

    /// Bump the restart annotation on every restartable workload
    pub async fn restart_workloads(&self, resources: &[AppliedResource]) -> Result<()> {
        let stamp = chrono::Utc::now().to_rfc3339();
        let mut annotations = serde_json::Map::new();
        annotations.insert(RESTARTED_AT_ANNOTATION.to_string(), stamp.into());
        let patch = serde_json::json!({
            "spec": {"template": {"metadata": {"annotations": annotations}}}
        });

        for resource in resources
            .iter()
            .filter(|r| RESTARTABLE_KINDS.contains(&r.kind.as_str()))
        {
            let gvk = GroupVersionKind::gvk("apps", "v1", &resource.kind);
            let (api_resource, capabilities) = self.discovery.resolve_gvk(&gvk).ok_or_else(|| {
                KubeError::InvalidManifest(format!("unknown resource type apps/v1/{}", resource.kind))
            })?;
            let api = self.api_for(&api_resource, &capabilities, resource.namespace.as_deref());
            api.patch(&resource.name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            tracing::debug!(resource = %resource, "restarted");
        }
        Ok(())
    }

    fn resolve(&self, object: &ManifestObject) -> Result<(ApiResource, ApiCapabilities)> {
        self.discovery.resolve_gvk(&object.gvk).ok_or_else(|| {
            KubeError::InvalidManifest(format!(
                "unknown resource type {}/{}",
                object.gvk.api_version(),
                object.gvk.kind
            ))
        })
    }

    fn api_for(
        &self,
        api_resource: &ApiResource,
        capabilities: &ApiCapabilities,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        match (capabilities.scope == Scope::Namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, api_resource),
            (true, None) => Api::default_namespaced_with(self.client.clone(), api_resource),
            (false, _) => Api::all_with(self.client.clone(), api_resource),
        }
    }
}
