//! Scoped cluster session: client, tunnel and release manager as one unit

use async_trait::async_trait;
use std::sync::Arc;

use crate::credentials::ClusterConnection;
use crate::error::{ConnectionError, Result};
use crate::manager::ReleaseManager;

/// Factory for the three resources a session holds
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    type Client: Send + Sync;
    type Tunnel: Send + Sync;
    type Manager: ReleaseManager + 'static;

    /// Create a cluster client from the resolved connection
    async fn connect(&self, connection: &ClusterConnection) -> Result<Self::Client>;

    /// Open a tunnel to the release service in `service_namespace`
    async fn open_tunnel(
        &self,
        client: &Self::Client,
        service_namespace: &str,
    ) -> Result<Self::Tunnel>;

    /// Create a release manager bound to the tunnel
    async fn release_manager(
        &self,
        client: &Self::Client,
        tunnel: &Self::Tunnel,
    ) -> Result<Self::Manager>;
}

/// An open session against one cluster
///
/// Dropping the session releases the manager, then the tunnel, then the
/// client. Only the manager is reachable from outside.
pub struct ClusterSession<C: ClusterConnector> {
    // Field order is drop order.
    manager: Arc<C::Manager>,
    _tunnel: C::Tunnel,
    _client: C::Client,
    service_namespace: String,
}

impl<C: ClusterConnector> ClusterSession<C> {
    /// Acquire client, tunnel and manager in that order
    ///
    /// If a later step fails, whatever was already acquired is dropped in
    /// reverse order before the error is returned.
    pub async fn open(
        connector: &C,
        connection: &ClusterConnection,
        service_namespace: &str,
    ) -> std::result::Result<Self, ConnectionError> {
        let client = connector
            .connect(connection)
            .await
            .map_err(ConnectionError::Client)?;

        let tunnel = connector
            .open_tunnel(&client, service_namespace)
            .await
            .map_err(ConnectionError::Tunnel)?;

        let manager = connector
            .release_manager(&client, &tunnel)
            .await
            .map_err(ConnectionError::Manager)?;

        tracing::debug!(namespace = %service_namespace, "cluster session open");

        Ok(Self {
            manager: Arc::new(manager),
            _tunnel: tunnel,
            _client: client,
            service_namespace: service_namespace.to_string(),
        })
    }

    pub fn manager(&self) -> &Arc<C::Manager> {
        &self.manager
    }

    pub fn service_namespace(&self) -> &str {
        &self.service_namespace
    }
}

impl<C: ClusterConnector> Drop for ClusterSession<C> {
    fn drop(&mut self) {
        tracing::debug!(namespace = %self.service_namespace, "closing cluster session");
    }
}
