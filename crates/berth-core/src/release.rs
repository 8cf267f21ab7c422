//! Release descriptors exchanged with the release service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chart::ChartMetadata;

/// Status codes a release can report
///
/// Note: This enum is non-exhaustive - new variants may be added in future versions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum StatusCode {
    #[default]
    Unknown,
    Deployed,
    Deleted,
    Superseded,
    Failed,
    Deleting,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

/// Statuses under which a release counts as existing for reconciliation
pub const ACTIVE_STATUS_CODES: [StatusCode; 2] = [StatusCode::Failed, StatusCode::Deployed];

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Deleted => "deleted",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
        }
    }

    /// Deployed or failed
    #[inline]
    pub fn is_active(&self) -> bool {
        ACTIVE_STATUS_CODES.contains(self)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatusCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "deployed" => Ok(Self::Deployed),
            "deleted" => Ok(Self::Deleted),
            "superseded" => Ok(Self::Superseded),
            "failed" => Ok(Self::Failed),
            "deleting" => Ok(Self::Deleting),
            "pending-install" => Ok(Self::PendingInstall),
            "pending-upgrade" => Ok(Self::PendingUpgrade),
            "pending-rollback" => Ok(Self::PendingRollback),
            _ => Err(format!("unknown release status: {}", s)),
        }
    }
}

/// A release as reported by the release service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release name
    pub name: String,

    /// Namespace the release's resources live in
    pub namespace: String,

    /// Revision number (1-indexed, increments with each update)
    pub version: u32,

    /// Current status
    pub status: StatusCode,

    /// Chart metadata at deploy time
    pub chart: ChartMetadata,

    /// Rendered manifest
    #[serde(default)]
    pub manifest: String,

    /// Human-readable description of the last operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub first_deployed: DateTime<Utc>,

    pub last_deployed: DateTime<Utc>,
}

impl Release {
    /// A first revision of a release, pending installation
    pub fn for_install(
        name: impl Into<String>,
        namespace: impl Into<String>,
        chart: ChartMetadata,
        manifest: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            namespace: namespace.into(),
            version: 1,
            status: StatusCode::PendingInstall,
            chart,
            manifest,
            description: None,
            first_deployed: now,
            last_deployed: now,
        }
    }

    /// The next revision of `previous`, pending update
    pub fn for_update(previous: &Release, chart: ChartMetadata, manifest: String) -> Self {
        Self {
            name: previous.name.clone(),
            namespace: previous.namespace.clone(),
            version: previous.version + 1,
            status: StatusCode::PendingUpgrade,
            chart,
            manifest,
            description: None,
            first_deployed: previous.first_deployed,
            last_deployed: Utc::now(),
        }
    }

    pub fn mark_deployed(&mut self, description: impl Into<String>) {
        self.status = StatusCode::Deployed;
        self.description = Some(description.into());
        self.last_deployed = Utc::now();
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = StatusCode::Failed;
        self.description = Some(reason.into());
        self.last_deployed = Utc::now();
    }

    pub fn mark_superseded(&mut self) {
        self.status = StatusCode::Superseded;
    }
}
