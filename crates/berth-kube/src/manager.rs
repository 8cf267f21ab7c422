//! Release manager abstraction

use async_trait::async_trait;

use crate::actions::{
    InstallReleaseRequest, InstallReleaseResponse, ListReleasesRequest, ListReleasesResponse,
    UpdateReleaseRequest, UpdateReleaseResponse,
};
use crate::error::Result;

/// Client-side handle to the release service
///
/// Implementations must be shareable across tasks: install and update
/// run on a spawned task holding a clone of the session's handle.
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    /// List releases matching the request
    async fn list(&self, request: &ListReleasesRequest) -> Result<ListReleasesResponse>;

    /// Install a new release
    async fn install(&self, request: InstallReleaseRequest) -> Result<InstallReleaseResponse>;

    /// Upgrade an existing release
    async fn update(&self, request: UpdateReleaseRequest) -> Result<UpdateReleaseResponse>;
}
