//! Requests and responses exchanged with the release service

use std::time::Duration;

use berth_core::{ACTIVE_STATUS_CODES, ChartArtifact, Release, StatusCode};

/// Query the release service for releases
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListReleasesRequest {
    /// Only releases with exactly this name
    pub filter: Option<String>,

    /// Only releases whose latest revision has one of these statuses.
    /// Empty means deployed releases only.
    pub status_codes: Vec<StatusCode>,

    /// Maximum number of releases to return
    pub limit: Option<usize>,

    /// Name of the release to start listing from
    pub offset: Option<String>,
}

impl ListReleasesRequest {
    /// Releases named `name` that are deployed or failed
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            filter: Some(name.into()),
            status_codes: ACTIVE_STATUS_CODES.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: impl Into<String>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    /// Status codes this request selects, with the empty default expanded
    pub fn effective_status_codes(&self) -> Vec<StatusCode> {
        if self.status_codes.is_empty() {
            vec![StatusCode::Deployed]
        } else {
            self.status_codes.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListReleasesResponse {
    /// Matching releases, at most one entry per release name
    pub releases: Vec<Release>,

    /// Offset to pass to fetch the next page, if any
    pub next: Option<String>,

    /// Total number of matches before pagination
    pub total: usize,
}

/// Install a chart as a new release
#[derive(Debug, Clone)]
pub struct InstallReleaseRequest {
    pub name: String,

    /// Namespace the release's resources are created in
    pub namespace: String,

    /// Upper bound on the whole operation
    pub timeout: Duration,

    /// Wait for workloads to become ready before reporting success
    pub wait: bool,

    pub chart: ChartArtifact,
}

impl InstallReleaseRequest {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        chart: ChartArtifact,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            timeout: berth_core::context::DEFAULT_TIMEOUT,
            wait: false,
            chart,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallReleaseResponse {
    pub release: Release,
}

/// Upgrade an existing release to a new chart
#[derive(Debug, Clone)]
pub struct UpdateReleaseRequest {
    pub name: String,

    pub timeout: Duration,

    pub wait: bool,

    /// Restart workloads after applying
    pub recreate: bool,

    /// Take ownership of fields managed by other appliers
    pub force: bool,

    pub chart: ChartArtifact,
}

impl UpdateReleaseRequest {
    pub fn new(name: impl Into<String>, chart: ChartArtifact) -> Self {
        Self {
            name: name.into(),
            timeout: berth_core::context::DEFAULT_TIMEOUT,
            wait: false,
            recreate: false,
            force: false,
            chart,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_recreate(mut self, recreate: bool) -> Self {
        self.recreate = recreate;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReleaseResponse {
    pub release: Release,
}
