//! Berth Kube - the cluster side of Berth
//!
//! This crate provides:
//! - **Credentials**: kubeconfig credential store and resolution to cluster connections
//! - **Cluster Sessions**: client, tunnel and release manager acquired and released as one
//! - **Release Query**: does a release exist in an active state?
//! - **Reconciler**: install or update a release and report exactly one outcome
//! - **Release Service**: a Kubernetes implementation keeping release records in Secrets
//! - **Testing**: in-memory fakes for driving the reconciler without a cluster

pub mod actions;
pub mod credentials;
pub mod error;
pub mod interrupt;
pub mod manager;
pub mod query;
pub mod reconciler;
pub mod service;
pub mod session;
pub mod sink;
pub mod testing;

pub use actions::{
    InstallReleaseRequest, InstallReleaseResponse, ListReleasesRequest, ListReleasesResponse,
    UpdateReleaseRequest, UpdateReleaseResponse,
};
pub use credentials::{
    ClusterConnection, CredentialFile, CredentialResolver, CredentialStore, FileCredentialStore,
    KubeconfigContent, KubeconfigCredential, KubeconfigSource, Principal, StoreCredentialResolver,
};
pub use error::{ConnectionError, KubeError, ReconcileError, Result};
pub use interrupt::{Interrupt, InterruptHandle};
pub use manager::ReleaseManager;
pub use query::{NamespaceCollision, ReleaseQuery, ReleaseStatus, query_release};
pub use reconciler::{JobContext, ReconcileOutcome, ReconcileState, Reconciler};
pub use service::{KubeConnector, ReleaseTunnel, SecretsReleaseManager, ServiceConfig};
pub use session::{ClusterConnector, ClusterSession};
pub use sink::{CommandState, StatusSink};
