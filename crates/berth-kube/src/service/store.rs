//! Release records kept as Secrets in the release service namespace
//!
//! Each revision is one Secret named `berth.release.v1.<name>.v<version>`.
//! The payload is the JSON release, gzip compressed and base64 encoded.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::Engine as _;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, PostParams};

use berth_core::Release;

use crate::error::{KubeError, Result};

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "berth";
pub const NAME_LABEL: &str = "berth.io/release-name";
pub const VERSION_LABEL: &str = "berth.io/release-version";
pub const STATUS_LABEL: &str = "berth.io/release-status";

/// Secret type of release records
pub const SECRET_TYPE: &str = "berth.io/release.v1";

const PAYLOAD_KEY: &str = "release";

/// Name of the Secret holding one revision
pub fn storage_key(name: &str, version: u32) -> String {
    format!("berth.release.v1.{}.v{}", name, version)
}

/// Labels every record carries
pub fn storage_labels(release: &Release) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
        (NAME_LABEL.to_string(), release.name.clone()),
        (VERSION_LABEL.to_string(), release.version.to_string()),
        (STATUS_LABEL.to_string(), release.status.to_string()),
    ])
}

/// Serialize, compress and base64 encode a release
pub fn encode_release(release: &Release) -> Result<String> {
    let json = serde_json::to_vec(release).map_err(|e| KubeError::Serialization(e.to_string()))?;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| KubeError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| KubeError::Compression(e.to_string()))?;

    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Reverse of [`encode_release`]
pub fn decode_release(data: &[u8]) -> Result<Release> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| KubeError::Serialization(format!("base64 decode error: {}", e)))?;

    let mut json = Vec::new();
    flate2::read::GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| KubeError::Compression(e.to_string()))?;

    serde_json::from_slice(&json).map_err(|e| KubeError::Serialization(e.to_string()))
}

/// Build the Secret for a release record
pub fn build_secret(release: &Release, namespace: &str) -> Result<Secret> {
    let encoded = encode_release(release)?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(storage_key(&release.name, release.version)),
            namespace: Some(namespace.to_string()),
            labels: Some(storage_labels(release)),
            ..Default::default()
        },
        type_: Some(SECRET_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            PAYLOAD_KEY.to_string(),
            ByteString(encoded.into_bytes()),
        )])),
        ..Default::default()
    })
}

/// Decode the release held by a record Secret
pub fn parse_secret(secret: &Secret) -> Result<Release> {
    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(PAYLOAD_KEY))
        .ok_or_else(|| KubeError::Storage("secret missing 'release' data".to_string()))?;
    decode_release(&data.0)
}

/// Release records in one namespace
#[derive(Clone)]
pub struct ReleaseStore {
    secrets: Api<Secret>,
    namespace: String,
}

impl ReleaseStore {
    pub fn new(secrets: Api<Secret>, namespace: impl Into<String>) -> Self {
        Self {
            secrets,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Every stored revision, optionally for one release name
    pub async fn list(&self, name: Option<&str>) -> Result<Vec<Release>> {
        let mut selector = format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY);
        if let Some(name) = name {
            selector.push_str(&format!(",{}={}", NAME_LABEL, name));
        }

        let secrets = self.secrets.list(&ListParams::default().labels(&selector)).await?;

        let mut releases = Vec::with_capacity(secrets.items.len());
        for secret in &secrets.items {
            match parse_secret(secret) {
                Ok(release) => releases.push(release),
                Err(e) => tracing::warn!(
                    secret = secret.metadata.name.as_deref().unwrap_or("unnamed"),
                    error = %e,
                    "skipping unreadable release record"
                ),
            }
        }
        Ok(releases)
    }

    /// Highest revision of `name`
    pub async fn latest(&self, name: &str) -> Result<Option<Release>> {
        Ok(self
            .list(Some(name))
            .await?
            .into_iter()
            .max_by_key(|r| r.version))
    }

    pub async fn create(&self, release: &Release) -> Result<()> {
        let secret = build_secret(release, &self.namespace)?;
        match self.secrets.create(&PostParams::default(), &secret).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(KubeError::ReleaseAlreadyExists {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update(&self, release: &Release) -> Result<()> {
        let secret = build_secret(release, &self.namespace)?;
        let key = storage_key(&release.name, release.version);
        self.secrets
            .replace(&key, &PostParams::default(), &secret)
            .await?;
        Ok(())
    }
}
