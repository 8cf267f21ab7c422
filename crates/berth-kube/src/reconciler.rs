//! Release reconciliation: install the release if it is absent, update it otherwise
//!
//! One call to [`Reconciler::reconcile`] walks
//! `Start → ChartLoaded → ConnectionResolved → SessionOpen → Installing | Updating`
//! and ends in exactly one [`ReconcileOutcome`]. Nothing is retried.

use std::future::Future;
use std::path::Path;

use berth_core::{ChartArtifact, DeploymentContext, DirectoryChartLoader, Release, Workspace};

use crate::actions::{InstallReleaseRequest, UpdateReleaseRequest};
use crate::credentials::{CredentialResolver, Principal};
use crate::error::{ConnectionError, KubeError, ReconcileError};
use crate::interrupt::Interrupt;
use crate::manager::ReleaseManager;
use crate::query::{ReleaseStatus, query_release};
use crate::session::{ClusterConnector, ClusterSession};
use crate::sink::{CommandState, StatusSink};

/// The job a reconciliation runs on behalf of
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Chart locations are resolved against this
    pub workspace: Workspace,

    /// Owner whose credentials may be used
    pub owner: String,
}

impl JobContext {
    pub fn new(workspace: Workspace, owner: impl Into<String>) -> Self {
        Self {
            workspace,
            owner: owner.into(),
        }
    }
}

/// Where a reconciliation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Start,
    ChartLoaded,
    ConnectionResolved,
    SessionOpen,
    Installing,
    Updating,
    Succeeded,
    Failed,
}

impl std::fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::ChartLoaded => "chart-loaded",
            Self::ConnectionResolved => "connection-resolved",
            Self::SessionOpen => "session-open",
            Self::Installing => "installing",
            Self::Updating => "updating",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal result of one reconciliation
#[derive(Debug)]
pub enum ReconcileOutcome {
    Installed(Release),
    Updated(Release),
    Failed(ReconcileError),
}

impl ReconcileOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn release(&self) -> Option<&Release> {
        match self {
            Self::Installed(release) | Self::Updated(release) => Some(release),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ReconcileError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Why a submitted install or update did not produce a release
#[derive(Debug)]
enum SubmitFailure {
    Service(KubeError),
    Interrupted,
    Fault(String),
}

impl std::fmt::Display for SubmitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Service(err) => write!(f, "{}", err),
            Self::Interrupted => f.write_str("interrupted while waiting for the release service"),
            Self::Fault(message) => write!(f, "execution fault: {}", message),
        }
    }
}

fn interrupted(during: &str) -> ReconcileError {
    ReconcileError::Connection(format!("interrupted while {}", during))
}

/// Drives one deployment context to an installed or updated release
pub struct Reconciler<R, C, S> {
    resolver: R,
    connector: C,
    sink: S,
    loader: DirectoryChartLoader,
    principal: Principal,
    interrupt: Interrupt,
}

impl<R, C, S> Reconciler<R, C, S>
where
    R: CredentialResolver,
    C: ClusterConnector,
    S: StatusSink,
{
    pub fn new(resolver: R, connector: C, sink: S) -> Self {
        Self {
            resolver,
            connector,
            sink,
            loader: DirectoryChartLoader::new(),
            principal: Principal::System,
            interrupt: Interrupt::never(),
        }
    }

    /// Look credentials up as this principal instead of the system identity
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = principal;
        self
    }

    /// Abort install/update waits when this fires
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Reconcile one deployment
    ///
    /// Always returns an outcome; failures are logged to the sink where they
    /// happen. The command state is set exactly once, after the cluster
    /// session has been released.
    pub async fn reconcile(&self, ctx: &DeploymentContext, job: &JobContext) -> ReconcileOutcome {
        let outcome = self.run(ctx, job).await;

        match &outcome {
            ReconcileOutcome::Installed(release) | ReconcileOutcome::Updated(release) => {
                tracing::info!(
                    release = %release.name,
                    version = release.version,
                    state = %ReconcileState::Succeeded,
                    "reconciliation finished"
                );
                self.sink.set_command_state(CommandState::Success);
            }
            ReconcileOutcome::Failed(_) => {
                self.sink.set_command_state(CommandState::HasError);
            }
        }
        outcome
    }

    async fn run(&self, ctx: &DeploymentContext, job: &JobContext) -> ReconcileOutcome {
        let mut state = ReconcileState::Start;

        let chart_path = job.workspace.resolve(&ctx.chart_location);
        let chart = match self.load_chart(&chart_path) {
            Ok(chart) => chart,
            Err(err) => return self.fail(state, err),
        };
        state = self.advance(state, ReconcileState::ChartLoaded, ctx);

        let resolved = self
            .resolver
            .resolve(ctx.credential_id(), &job.owner, &self.principal);
        let connection = match resolved {
            Ok(connection) => connection,
            Err(err) => return self.fail(state, err.into()),
        };
        state = self.advance(state, ReconcileState::ConnectionResolved, ctx);

        let opened = self
            .interruptible(ClusterSession::open(
                &self.connector,
                &connection,
                &ctx.service_namespace,
            ))
            .await;
        let session = match opened {
            Some(Ok(session)) => session,
            Some(Err(err)) => return self.fail(state, err.into()),
            None => return self.fail(state, interrupted("opening the cluster session")),
        };
        drop(connection);
        state = self.advance(state, ReconcileState::SessionOpen, ctx);

        self.sink.log_status(&format!(
            "Deploying chart {} ({}) from {}",
            chart.name(),
            chart.version(),
            chart_path.display()
        ));

        let manager = session.manager().as_ref();
        let queried = self
            .interruptible(query_release(
                manager,
                &ctx.release_name,
                &ctx.target_namespace,
            ))
            .await;
        let query = match queried {
            Some(Ok(query)) => query,
            Some(Err(err)) => return self.fail(state, ConnectionError::Query(err).into()),
            None => return self.fail(state, interrupted("querying the release")),
        };

        if let Some(collision) = &query.collision {
            self.sink.log_warning(&collision.to_string());
        }

        let outcome = match query.status {
            ReleaseStatus::Deployed | ReleaseStatus::Failed => {
                state = self.advance(state, ReconcileState::Updating, ctx);
                self.sink.log_status(&format!(
                    "Release {} is {}, updating",
                    ctx.release_name, query.status
                ));
                self.update(&session, ctx, chart).await
            }
            ReleaseStatus::NotFound | ReleaseStatus::Other(_) => {
                if let ReleaseStatus::Other(code) = query.status {
                    self.sink.log_warning(&format!(
                        "Release {} reported status {}, which does not count as existing",
                        ctx.release_name, code
                    ));
                }
                state = self.advance(state, ReconcileState::Installing, ctx);
                self.sink.log_status(&format!(
                    "Release {} not found, installing into {}",
                    ctx.release_name, ctx.target_namespace
                ));
                self.install(&session, ctx, chart).await
            }
        };

        drop(session);

        match outcome {
            Ok(outcome) => outcome,
            Err(err) => self.fail(state, err),
        }
    }

    fn load_chart(&self, path: &Path) -> Result<ChartArtifact, ReconcileError> {
        let chart = self.loader.load(path)?;
        tracing::debug!(
            chart = %chart.name(),
            version = %chart.version(),
            templates = chart.templates.len(),
            "chart loaded"
        );
        Ok(chart)
    }

    async fn install(
        &self,
        session: &ClusterSession<C>,
        ctx: &DeploymentContext,
        chart: ChartArtifact,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let request = InstallReleaseRequest::new(&ctx.release_name, &ctx.target_namespace, chart)
            .with_timeout(ctx.timeout)
            .with_wait(ctx.wait);

        let manager = session.manager().clone();
        let response = self
            .submit(async move { manager.install(request).await })
            .await
            .map_err(|failure| ReconcileError::Install {
                name: ctx.release_name.clone(),
                message: failure.to_string(),
            })?;

        let release = response.release;
        self.sink.log_status(&format!(
            "Installed release {} (version {}, status {})",
            release.name, release.version, release.status
        ));
        Ok(ReconcileOutcome::Installed(release))
    }

    async fn update(
        &self,
        session: &ClusterSession<C>,
        ctx: &DeploymentContext,
        chart: ChartArtifact,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let request = UpdateReleaseRequest::new(&ctx.release_name, chart)
            .with_timeout(ctx.timeout)
            .with_wait(ctx.wait);

        let manager = session.manager().clone();
        let response = self
            .submit(async move { manager.update(request).await })
            .await
            .map_err(|failure| ReconcileError::Update {
                name: ctx.release_name.clone(),
                message: failure.to_string(),
            })?;

        let release = response.release;
        self.sink.log_status(&format!(
            "Updated release {} (version {}, status {})",
            release.name, release.version, release.status
        ));
        Ok(ReconcileOutcome::Updated(release))
    }

    /// Await `work` unless the interrupt fires first, in which case `work` is dropped
    async fn interruptible<F: Future>(&self, work: F) -> Option<F::Output> {
        let mut interrupt = self.interrupt.clone();

        tokio::select! {
            biased;

            _ = interrupt.triggered() => {
                tracing::warn!("reconciliation interrupted");
                None
            }
            output = work => Some(output),
        }
    }

    /// Run cluster-side work on its own task and wait for it or the interrupt
    async fn submit<T, F>(&self, work: F) -> Result<T, SubmitFailure>
    where
        F: Future<Output = crate::error::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.interrupt.is_triggered() {
            return Err(SubmitFailure::Interrupted);
        }
        let mut handle = tokio::spawn(work);
        let mut interrupt = self.interrupt.clone();

        tokio::select! {
            biased;

            joined = &mut handle => match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(SubmitFailure::Service(err)),
                Err(err) => Err(SubmitFailure::Fault(err.to_string())),
            },
            _ = interrupt.triggered() => {
                handle.abort();
                // The task owns a manager handle; it must be gone before the session closes.
                let _ = handle.await;
                tracing::warn!("release operation interrupted");
                Err(SubmitFailure::Interrupted)
            }
        }
    }

    fn advance(
        &self,
        from: ReconcileState,
        to: ReconcileState,
        ctx: &DeploymentContext,
    ) -> ReconcileState {
        tracing::debug!(release = %ctx.release_name, %from, %to, "reconcile state");
        to
    }

    fn fail(&self, state: ReconcileState, err: ReconcileError) -> ReconcileOutcome {
        tracing::debug!(%state, error = %err, "reconciliation failed");
        self.sink.log_error(&err.to_string());
        ReconcileOutcome::Failed(err)
    }
}
