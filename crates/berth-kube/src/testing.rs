//! In-memory fakes for exercising the reconciler without a cluster
//!
//! `FakeCluster` implements [`ClusterConnector`] and records when each session
//! resource is acquired and released. `FakeReleaseManager` keeps releases in
//! memory and records every request it receives.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use berth_core::{ChartMetadata, Release, StatusCode};

use crate::actions::{
    InstallReleaseRequest, InstallReleaseResponse, ListReleasesRequest, ListReleasesResponse,
    UpdateReleaseRequest, UpdateReleaseResponse,
};
use crate::credentials::{
    ClusterConnection, CredentialResolver, CredentialStore, FileCredentialStore, Principal,
    StoreCredentialResolver,
};
use crate::error::{ConnectionError, KubeError, Result};
use crate::manager::ReleaseManager;
use crate::session::ClusterConnector;
use crate::sink::{CommandState, StatusSink};

/// Chart metadata for a `demo` chart at the given version
pub fn chart_metadata(name: &str, version: &str) -> ChartMetadata {
    ChartMetadata {
        api_version: "v2".to_string(),
        name: name.to_string(),
        version: semver::Version::parse(version).unwrap_or_else(|_| semver::Version::new(0, 1, 0)),
        description: None,
        app_version: None,
        kube_version: None,
        chart_type: None,
        home: None,
        sources: vec![],
        keywords: vec![],
        maintainers: vec![],
        annotations: Default::default(),
    }
}

/// A first-revision release with the given status
pub fn release(name: &str, namespace: &str, status: StatusCode) -> Release {
    let mut release = Release::for_install(name, namespace, chart_metadata("demo", "1.0.0"), String::new());
    release.status = status;
    release
}

/// Write a minimal chart directory under `root` and return its path
pub fn write_chart(root: &Path, name: &str, version: &str) -> std::io::Result<PathBuf> {
    let chart = root.join(name);
    std::fs::create_dir_all(chart.join("templates"))?;
    std::fs::write(
        chart.join("Chart.yaml"),
        format!("apiVersion: v2\nname: {}\nversion: {}\n", name, version),
    )?;
    std::fs::write(chart.join("values.yaml"), "replicaCount: 1\n")?;
    std::fs::write(
        chart.join("templates").join("configmap.yaml"),
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ release.name }}\n",
    )?;
    Ok(chart)
}

/// Counts of release-service calls, for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub lists: usize,
    pub installs: usize,
    pub updates: usize,
}

/// What an install or update request carried, minus the chart payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub name: String,
    /// Install only
    pub namespace: Option<String>,
    pub timeout: Duration,
    pub wait: bool,
    pub recreate: bool,
    pub force: bool,
    pub chart_name: String,
    pub chart_version: String,
}

#[derive(Debug, Default)]
struct ManagerState {
    releases: Vec<Release>,
    list_requests: Vec<ListReleasesRequest>,
    install_requests: Vec<RecordedRequest>,
    update_requests: Vec<RecordedRequest>,
    counts: OperationCounts,
}

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    Panic(String),
    Hang,
}

/// In-memory release service
#[derive(Debug, Clone)]
pub struct FakeReleaseManager {
    state: Arc<Mutex<ManagerState>>,
    list_error: Option<String>,
    hang_list: bool,
    install: Behavior,
    update: Behavior,
    ignore_status_filter: bool,
    delay: Option<Duration>,
}

impl FakeReleaseManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState::default())),
            list_error: None,
            hang_list: false,
            install: Behavior::Succeed,
            update: Behavior::Succeed,
            ignore_status_filter: false,
            delay: None,
        }
    }

    pub fn with_releases(releases: Vec<Release>) -> Self {
        let manager = Self::new();
        manager.lock().releases = releases;
        manager
    }

    pub fn fail_list(mut self, message: impl Into<String>) -> Self {
        self.list_error = Some(message.into());
        self
    }

    pub fn fail_install(mut self, message: impl Into<String>) -> Self {
        self.install = Behavior::Fail(message.into());
        self
    }

    pub fn fail_update(mut self, message: impl Into<String>) -> Self {
        self.update = Behavior::Fail(message.into());
        self
    }

    /// Panic inside the install task
    pub fn panic_on_install(mut self, message: impl Into<String>) -> Self {
        self.install = Behavior::Panic(message.into());
        self
    }

    /// Never answer release listings
    pub fn hang_list(mut self) -> Self {
        self.hang_list = true;
        self
    }

    /// Never complete installs or updates
    pub fn hang(mut self) -> Self {
        self.install = Behavior::Hang;
        self.update = Behavior::Hang;
        self
    }

    /// Sleep before completing installs or updates
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return releases regardless of the requested status codes
    pub fn ignore_status_filter(mut self) -> Self {
        self.ignore_status_filter = true;
        self
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.lock().counts.clone()
    }

    pub fn list_requests(&self) -> Vec<ListReleasesRequest> {
        self.lock().list_requests.clone()
    }

    pub fn install_requests(&self) -> Vec<RecordedRequest> {
        self.lock().install_requests.clone()
    }

    pub fn update_requests(&self) -> Vec<RecordedRequest> {
        self.lock().update_requests.clone()
    }

    pub fn all_releases(&self) -> Vec<Release> {
        self.lock().releases.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn behave(&self, behavior: &Behavior) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(message) => Err(KubeError::ServiceUnavailable(message.clone())),
            Behavior::Panic(message) => panic!("{}", message),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

impl Default for FakeReleaseManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReleaseManager for FakeReleaseManager {
    async fn list(&self, request: &ListReleasesRequest) -> Result<ListReleasesResponse> {
        {
            let mut state = self.lock();
            state.counts.lists += 1;
            state.list_requests.push(request.clone());
        }

        if self.hang_list {
            std::future::pending::<()>().await;
        }
        if let Some(message) = &self.list_error {
            return Err(KubeError::ServiceUnavailable(message.clone()));
        }

        let state = self.lock();

        let codes = request.effective_status_codes();
        let mut latest: Vec<Release> = Vec::new();
        for release in &state.releases {
            if request.filter.as_ref().is_some_and(|name| *name != release.name) {
                continue;
            }
            match latest.iter_mut().find(|r| r.name == release.name) {
                Some(existing) if existing.version < release.version => *existing = release.clone(),
                Some(_) => {}
                None => latest.push(release.clone()),
            }
        }
        latest.retain(|r| self.ignore_status_filter || codes.contains(&r.status));

        let total = latest.len();
        if let Some(limit) = request.limit {
            latest.truncate(limit);
        }
        Ok(ListReleasesResponse {
            releases: latest,
            next: None,
            total,
        })
    }

    async fn install(&self, request: InstallReleaseRequest) -> Result<InstallReleaseResponse> {
        {
            let mut state = self.lock();
            state.counts.installs += 1;
            state.install_requests.push(RecordedRequest {
                name: request.name.clone(),
                namespace: Some(request.namespace.clone()),
                timeout: request.timeout,
                wait: request.wait,
                recreate: false,
                force: false,
                chart_name: request.chart.name().to_string(),
                chart_version: request.chart.version().to_string(),
            });
        }

        self.behave(&self.install).await?;

        let mut release = Release::for_install(
            &request.name,
            &request.namespace,
            request.chart.metadata.clone(),
            String::new(),
        );
        release.mark_deployed("Install complete");
        self.lock().releases.push(release.clone());
        Ok(InstallReleaseResponse { release })
    }

    async fn update(&self, request: UpdateReleaseRequest) -> Result<UpdateReleaseResponse> {
        {
            let mut state = self.lock();
            state.counts.updates += 1;
            state.update_requests.push(RecordedRequest {
                name: request.name.clone(),
                namespace: None,
                timeout: request.timeout,
                wait: request.wait,
                recreate: request.recreate,
                force: request.force,
                chart_name: request.chart.name().to_string(),
                chart_version: request.chart.version().to_string(),
            });
        }

        self.behave(&self.update).await?;

        let mut state = self.lock();
        let previous = state
            .releases
            .iter_mut()
            .filter(|r| r.name == request.name)
            .max_by_key(|r| r.version)
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: request.name.clone(),
            })?;

        let mut release = Release::for_update(previous, request.chart.metadata.clone(), String::new());
        previous.mark_superseded();
        release.mark_deployed("Upgrade complete");
        state.releases.push(release.clone());
        Ok(UpdateReleaseResponse { release })
    }
}

/// Acquisition and release of session resources, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ClientAcquired,
    TunnelOpened(String),
    ManagerCreated,
    ManagerReleased,
    TunnelClosed,
    ClientReleased,
}

type EventLog = Arc<Mutex<Vec<SessionEvent>>>;

fn record(log: &EventLog, event: SessionEvent) {
    log.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(event);
}

pub struct FakeClient {
    events: EventLog,
}

impl Drop for FakeClient {
    fn drop(&mut self) {
        record(&self.events, SessionEvent::ClientReleased);
    }
}

pub struct FakeTunnel {
    events: EventLog,
}

impl Drop for FakeTunnel {
    fn drop(&mut self) {
        record(&self.events, SessionEvent::TunnelClosed);
    }
}

/// The session's view of a [`FakeReleaseManager`]
pub struct FakeManagerHandle {
    inner: FakeReleaseManager,
    events: EventLog,
}

impl Drop for FakeManagerHandle {
    fn drop(&mut self) {
        record(&self.events, SessionEvent::ManagerReleased);
    }
}

#[async_trait]
impl ReleaseManager for FakeManagerHandle {
    async fn list(&self, request: &ListReleasesRequest) -> Result<ListReleasesResponse> {
        self.inner.list(request).await
    }

    async fn install(&self, request: InstallReleaseRequest) -> Result<InstallReleaseResponse> {
        self.inner.install(request).await
    }

    async fn update(&self, request: UpdateReleaseRequest) -> Result<UpdateReleaseResponse> {
        self.inner.update(request).await
    }
}

/// A cluster whose release service is a [`FakeReleaseManager`]
#[derive(Clone)]
pub struct FakeCluster {
    manager: FakeReleaseManager,
    events: EventLog,
    connections: Arc<Mutex<Vec<ClusterConnection>>>,
    client_error: Option<String>,
    hang_client: bool,
    tunnel_error: Option<String>,
    manager_error: Option<String>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::with_manager(FakeReleaseManager::new())
    }

    pub fn with_manager(manager: FakeReleaseManager) -> Self {
        Self {
            manager,
            events: Arc::new(Mutex::new(Vec::new())),
            connections: Arc::new(Mutex::new(Vec::new())),
            client_error: None,
            hang_client: false,
            tunnel_error: None,
            manager_error: None,
        }
    }

    pub fn fail_client(mut self, message: impl Into<String>) -> Self {
        self.client_error = Some(message.into());
        self
    }

    /// Accept connection attempts but never produce a client
    pub fn hang_client(mut self) -> Self {
        self.hang_client = true;
        self
    }

    pub fn fail_tunnel(mut self, message: impl Into<String>) -> Self {
        self.tunnel_error = Some(message.into());
        self
    }

    pub fn fail_manager(mut self, message: impl Into<String>) -> Self {
        self.manager_error = Some(message.into());
        self
    }

    pub fn manager(&self) -> &FakeReleaseManager {
        &self.manager
    }

    pub fn session_events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Connections clients were created from
    pub fn connections(&self) -> Vec<ClusterConnection> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether anything ever tried to reach this cluster
    pub fn contacted(&self) -> bool {
        !self.connections().is_empty()
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterConnector for FakeCluster {
    type Client = FakeClient;
    type Tunnel = FakeTunnel;
    type Manager = FakeManagerHandle;

    async fn connect(&self, connection: &ClusterConnection) -> Result<FakeClient> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(connection.clone());
        if self.hang_client {
            std::future::pending::<()>().await;
        }
        if let Some(message) = &self.client_error {
            return Err(KubeError::Kubeconfig(message.clone()));
        }
        record(&self.events, SessionEvent::ClientAcquired);
        Ok(FakeClient {
            events: self.events.clone(),
        })
    }

    async fn open_tunnel(&self, _client: &FakeClient, service_namespace: &str) -> Result<FakeTunnel> {
        if let Some(message) = &self.tunnel_error {
            return Err(KubeError::ServiceUnavailable(message.clone()));
        }
        record(
            &self.events,
            SessionEvent::TunnelOpened(service_namespace.to_string()),
        );
        Ok(FakeTunnel {
            events: self.events.clone(),
        })
    }

    async fn release_manager(
        &self,
        _client: &FakeClient,
        _tunnel: &FakeTunnel,
    ) -> Result<FakeManagerHandle> {
        if let Some(message) = &self.manager_error {
            return Err(KubeError::ServiceUnavailable(message.clone()));
        }
        record(&self.events, SessionEvent::ManagerCreated);
        Ok(FakeManagerHandle {
            inner: self.manager.clone(),
            events: self.events.clone(),
        })
    }
}

/// Store-backed resolver that counts how often it is asked
#[derive(Clone)]
pub struct FakeResolver {
    inner: Arc<StoreCredentialResolver<FileCredentialStore>>,
    calls: Arc<AtomicUsize>,
}

impl FakeResolver {
    pub fn new(store: FileCredentialStore) -> Self {
        Self {
            inner: Arc::new(StoreCredentialResolver::new(store)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self::new(FileCredentialStore::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialResolver for FakeResolver {
    fn resolve(
        &self,
        id: Option<&str>,
        owner: &str,
        principal: &Principal,
    ) -> std::result::Result<ClusterConnection, ConnectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(id, owner, principal)
    }
}

/// A credential store that cannot be read
pub struct BrokenStore;

impl CredentialStore for BrokenStore {
    fn lookup(
        &self,
        _owner: &str,
        _principal: &Principal,
    ) -> std::result::Result<Vec<crate::credentials::KubeconfigCredential>, ConnectionError> {
        Err(ConnectionError::Store("store is unreadable".to_string()))
    }
}

/// Something the reconciler reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Status(String),
    Warning(String),
    Error(String),
    State(CommandState),
}

/// Sink that keeps everything it is told
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.filter(|e| match e {
            SinkEvent::Status(m) => Some(m.clone()),
            _ => None,
        })
    }

    pub fn warnings(&self) -> Vec<String> {
        self.filter(|e| match e {
            SinkEvent::Warning(m) => Some(m.clone()),
            _ => None,
        })
    }

    pub fn errors(&self) -> Vec<String> {
        self.filter(|e| match e {
            SinkEvent::Error(m) => Some(m.clone()),
            _ => None,
        })
    }

    pub fn command_states(&self) -> Vec<CommandState> {
        self.filter(|e| match e {
            SinkEvent::State(s) => Some(*s),
            _ => None,
        })
    }

    fn filter<T>(&self, pick: impl Fn(&SinkEvent) -> Option<T>) -> Vec<T> {
        self.events().iter().filter_map(pick).collect()
    }

    fn push(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl StatusSink for RecordingSink {
    fn log_status(&self, message: &str) {
        self.push(SinkEvent::Status(message.to_string()));
    }

    fn log_error(&self, message: &str) {
        self.push(SinkEvent::Error(message.to_string()));
    }

    fn log_warning(&self, message: &str) {
        self.push(SinkEvent::Warning(message.to_string()));
    }

    fn set_command_state(&self, state: CommandState) {
        self.push(SinkEvent::State(state));
    }
}
