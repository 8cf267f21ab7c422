//! Release query: does a named release exist in an active state?

use berth_core::{Release, StatusCode};

use crate::actions::ListReleasesRequest;
use crate::error::Result;
use crate::manager::ReleaseManager;

/// State of a named release as seen by the release service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    NotFound,
    Deployed,
    Failed,
    /// Reported with a status outside the requested allow-list
    Other(StatusCode),
}

impl ReleaseStatus {
    fn from_code(code: StatusCode) -> Self {
        match code {
            StatusCode::Deployed => Self::Deployed,
            StatusCode::Failed => Self::Failed,
            other => Self::Other(other),
        }
    }

    /// Only deployed and failed releases count as existing
    pub fn exists(&self) -> bool {
        matches!(self, Self::Deployed | Self::Failed)
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Deployed => f.write_str("deployed"),
            Self::Failed => f.write_str("failed"),
            Self::Other(code) => write!(f, "other ({})", code),
        }
    }
}

/// The release was found, but not in the namespace we expected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceCollision {
    pub release: String,
    pub expected_namespace: String,
    pub reported_namespace: String,
}

impl std::fmt::Display for NamespaceCollision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "release '{}' exists in namespace '{}', not in target namespace '{}'",
            self.release, self.reported_namespace, self.expected_namespace
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseQuery {
    pub status: ReleaseStatus,

    /// The first matching release, if any
    pub release: Option<Release>,

    /// Non-fatal; never changes `status`
    pub collision: Option<NamespaceCollision>,
}

/// Ask the release service about `name`
///
/// Lists releases filtered by name with the `{Failed, Deployed}` allow-list
/// and looks at the first result of the first page only.
pub async fn query_release<M>(
    manager: &M,
    name: &str,
    expected_namespace: &str,
) -> Result<ReleaseQuery>
where
    M: ReleaseManager + ?Sized,
{
    let response = manager.list(&ListReleasesRequest::active(name)).await?;

    let Some(first) = response.releases.into_iter().next() else {
        tracing::debug!(release = %name, "release not found");
        return Ok(ReleaseQuery {
            status: ReleaseStatus::NotFound,
            release: None,
            collision: None,
        });
    };

    let status = ReleaseStatus::from_code(first.status);
    let collision = (first.namespace != expected_namespace).then(|| NamespaceCollision {
        release: name.to_string(),
        expected_namespace: expected_namespace.to_string(),
        reported_namespace: first.namespace.clone(),
    });

    tracing::debug!(
        release = %name,
        status = %status,
        namespace = %first.namespace,
        version = first.version,
        "release found"
    );

    Ok(ReleaseQuery {
        status,
        release: Some(first),
        collision,
    })
}
