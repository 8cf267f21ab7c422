//! Reconciler behaviour against in-memory clusters

use std::time::Duration;

use berth_core::{ChartError, DeploymentContext, StatusCode, Workspace};
use berth_kube::testing::{
    BrokenStore, FakeCluster, FakeReleaseManager, FakeResolver, RecordingSink, SessionEvent,
    release, write_chart,
};
use berth_kube::{
    ClusterConnection, CommandState, FileCredentialStore, Interrupt, JobContext,
    KubeconfigContent, KubeconfigCredential, ReconcileError, ReconcileOutcome, Reconciler,
    StoreCredentialResolver,
};
use tempfile::TempDir;

const FULL_SESSION: [SessionEvent; 6] = [
    SessionEvent::ClientAcquired,
    SessionEvent::TunnelOpened(String::new()),
    SessionEvent::ManagerCreated,
    SessionEvent::ManagerReleased,
    SessionEvent::TunnelClosed,
    SessionEvent::ClientReleased,
];

struct Harness {
    _dir: TempDir,
    job: JobContext,
    cluster: FakeCluster,
    resolver: FakeResolver,
    sink: RecordingSink,
}

impl Harness {
    fn new(manager: FakeReleaseManager) -> Self {
        Self::with(FakeCluster::with_manager(manager), FakeResolver::empty())
    }

    fn with(cluster: FakeCluster, resolver: FakeResolver) -> Self {
        let dir = TempDir::new().unwrap();
        write_chart(dir.path(), "app", "1.0.0").unwrap();
        Self {
            job: JobContext::new(Workspace::new(dir.path()), "team-a"),
            _dir: dir,
            cluster,
            resolver,
            sink: RecordingSink::new(),
        }
    }

    fn reconciler(&self) -> Reconciler<FakeResolver, FakeCluster, RecordingSink> {
        Reconciler::new(
            self.resolver.clone(),
            self.cluster.clone(),
            self.sink.clone(),
        )
    }

    async fn run(&self, ctx: &DeploymentContext) -> ReconcileOutcome {
        self.reconciler().reconcile(ctx, &self.job).await
    }

    fn manager(&self) -> &FakeReleaseManager {
        self.cluster.manager()
    }

    /// Session events with the tunnel namespace blanked out
    fn session_events(&self) -> Vec<SessionEvent> {
        self.cluster
            .session_events()
            .into_iter()
            .map(|e| match e {
                SessionEvent::TunnelOpened(_) => SessionEvent::TunnelOpened(String::new()),
                other => other,
            })
            .collect()
    }
}

fn demo() -> DeploymentContext {
    DeploymentContext::new("app", "prod", "demo")
}

#[tokio::test]
async fn test_fresh_release_is_installed() {
    let h = Harness::new(FakeReleaseManager::new());

    let outcome = h.run(&demo()).await;

    let ReconcileOutcome::Installed(release) = outcome else {
        panic!("expected install, got {outcome:?}");
    };
    assert_eq!(release.name, "demo");
    assert_eq!(release.namespace, "prod");
    assert_eq!(release.status, StatusCode::Deployed);

    let installs = h.manager().install_requests();
    assert_eq!(installs.len(), 1);
    assert_eq!(installs[0].name, "demo");
    assert_eq!(installs[0].namespace.as_deref(), Some("prod"));
    assert_eq!(installs[0].chart_name, "app");
    assert!(h.manager().update_requests().is_empty());

    assert_eq!(h.sink.command_states(), vec![CommandState::Success]);
    assert!(h.sink.errors().is_empty());
    assert_eq!(h.session_events(), FULL_SESSION.to_vec());
}

#[tokio::test]
async fn test_deployed_release_is_updated() {
    let h = Harness::new(FakeReleaseManager::with_releases(vec![release(
        "demo",
        "prod",
        StatusCode::Deployed,
    )]));

    let outcome = h.run(&demo()).await;

    let ReconcileOutcome::Updated(release) = outcome else {
        panic!("expected update, got {outcome:?}");
    };
    assert_eq!(release.version, 2);

    let updates = h.manager().update_requests();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].name, "demo");
    assert!(updates[0].namespace.is_none());
    assert!(!updates[0].recreate);
    assert!(!updates[0].force);
    assert_eq!(h.manager().operation_counts().installs, 0);

    assert_eq!(h.sink.command_states(), vec![CommandState::Success]);
    assert_eq!(h.session_events(), FULL_SESSION.to_vec());
}

#[tokio::test]
async fn test_failed_release_is_updated() {
    let h = Harness::new(FakeReleaseManager::with_releases(vec![release(
        "demo",
        "prod",
        StatusCode::Failed,
    )]));

    let outcome = h.run(&demo()).await;

    assert!(matches!(outcome, ReconcileOutcome::Updated(_)));
    assert_eq!(h.manager().operation_counts().installs, 0);
    assert_eq!(h.manager().operation_counts().updates, 1);
}

#[tokio::test]
async fn test_second_run_updates_what_the_first_installed() {
    let h = Harness::new(FakeReleaseManager::new());

    let first = h.run(&demo()).await;
    let second = h.run(&demo()).await;

    assert!(matches!(first, ReconcileOutcome::Installed(_)));
    let ReconcileOutcome::Updated(release) = second else {
        panic!("expected update, got {second:?}");
    };
    assert_eq!(release.version, 2);
    assert_eq!(
        h.sink.command_states(),
        vec![CommandState::Success, CommandState::Success]
    );
}

#[tokio::test]
async fn test_namespace_collision_warns_and_updates() {
    let h = Harness::new(FakeReleaseManager::with_releases(vec![release(
        "demo",
        "staging",
        StatusCode::Deployed,
    )]));

    let outcome = h.run(&demo()).await;

    assert!(matches!(outcome, ReconcileOutcome::Updated(_)));
    let warnings = h.sink.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("'staging'"));
    assert!(warnings[0].contains("'prod'"));
    assert_eq!(h.sink.command_states(), vec![CommandState::Success]);
}

#[tokio::test]
async fn test_release_outside_allow_list_is_not_existing() {
    let manager = FakeReleaseManager::with_releases(vec![release(
        "demo",
        "prod",
        StatusCode::PendingUpgrade,
    )])
    .ignore_status_filter();
    let h = Harness::new(manager);

    let outcome = h.run(&demo()).await;

    assert!(matches!(outcome, ReconcileOutcome::Installed(_)));
    assert_eq!(h.manager().operation_counts().updates, 0);
    assert!(h.sink.warnings()[0].contains("pending-upgrade"));
}

#[tokio::test]
async fn test_timeout_and_wait_pass_through() {
    let h = Harness::new(FakeReleaseManager::new());
    let ctx = demo()
        .with_wait(true)
        .with_timeout(Duration::from_secs(42));

    h.run(&ctx).await;

    let installs = h.manager().install_requests();
    assert_eq!(installs[0].timeout, Duration::from_secs(42));
    assert!(installs[0].wait);
}

#[tokio::test]
async fn test_missing_chart_touches_nothing() {
    let h = Harness::new(FakeReleaseManager::new());
    let ctx = DeploymentContext::new("no-such-chart", "prod", "demo");

    let outcome = h.run(&ctx).await;

    assert!(matches!(
        outcome,
        ReconcileOutcome::Failed(ReconcileError::Chart(ChartError::NotFound { .. }))
    ));
    assert_eq!(h.resolver.calls(), 0);
    assert!(!h.cluster.contacted());
    assert!(h.session_events().is_empty());
    assert_eq!(h.sink.errors().len(), 1);
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
}

#[tokio::test]
async fn test_unknown_credential_fails_before_session() {
    let h = Harness::new(FakeReleaseManager::new());
    let ctx = demo().with_credential_id("prod-cluster");

    let outcome = h.run(&ctx).await;

    match outcome {
        ReconcileOutcome::Failed(ReconcileError::CredentialNotFound { id }) => {
            assert_eq!(id, "prod-cluster")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.resolver.calls(), 1);
    assert!(!h.cluster.contacted());
    assert!(h.sink.errors()[0].contains("prod-cluster"));
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
}

#[tokio::test]
async fn test_stored_kubeconfig_reaches_the_connector() {
    let store = FileCredentialStore::new(vec![
        KubeconfigCredential::inline("prod-cluster", "apiVersion: v1\nkind: Config\n")
            .with_owner("team-a"),
    ]);
    let h = Harness::with(FakeCluster::new(), FakeResolver::new(store));

    let outcome = h.run(&demo().with_credential_id("prod-cluster")).await;

    assert!(outcome.is_success());
    assert_eq!(
        h.cluster.connections(),
        vec![ClusterConnection::Kubeconfig(KubeconfigContent::new(
            "apiVersion: v1\nkind: Config\n"
        ))]
    );
}

#[tokio::test]
async fn test_unreadable_credential_store_is_a_connection_error() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path(), "app", "1.0.0").unwrap();
    let job = JobContext::new(Workspace::new(dir.path()), "team-a");
    let cluster = FakeCluster::new();
    let sink = RecordingSink::new();

    let reconciler = Reconciler::new(
        StoreCredentialResolver::new(BrokenStore),
        cluster.clone(),
        sink.clone(),
    );
    let outcome = reconciler
        .reconcile(&demo().with_credential_id("prod"), &job)
        .await;

    assert!(matches!(
        outcome,
        ReconcileOutcome::Failed(ReconcileError::Connection(_))
    ));
    assert!(!cluster.contacted());
    assert_eq!(sink.command_states(), vec![CommandState::HasError]);
}

#[tokio::test]
async fn test_session_failure_releases_what_was_acquired() {
    let h = Harness::with(
        FakeCluster::new().fail_tunnel("release service not running"),
        FakeResolver::empty(),
    );

    let outcome = h.run(&demo()).await;

    match outcome {
        ReconcileOutcome::Failed(ReconcileError::Connection(message)) => {
            assert!(message.contains("release service not running"))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        h.session_events(),
        vec![SessionEvent::ClientAcquired, SessionEvent::ClientReleased]
    );
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
}

#[tokio::test]
async fn test_query_failure_is_a_connection_error() {
    let h = Harness::new(FakeReleaseManager::new().fail_list("etcd unavailable"));

    let outcome = h.run(&demo()).await;

    match outcome {
        ReconcileOutcome::Failed(ReconcileError::Connection(message)) => {
            assert!(message.contains("etcd unavailable"))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.manager().operation_counts().installs, 0);
    assert_eq!(h.session_events(), FULL_SESSION.to_vec());
}

#[tokio::test]
async fn test_install_service_error() {
    let h = Harness::new(FakeReleaseManager::new().fail_install("quota exceeded"));

    let outcome = h.run(&demo()).await;

    match outcome {
        ReconcileOutcome::Failed(ReconcileError::Install { name, message }) => {
            assert_eq!(name, "demo");
            assert!(message.contains("quota exceeded"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
    assert_eq!(h.session_events(), FULL_SESSION.to_vec());
}

#[tokio::test]
async fn test_update_service_error() {
    let manager = FakeReleaseManager::with_releases(vec![release(
        "demo",
        "prod",
        StatusCode::Deployed,
    )])
    .fail_update("admission webhook denied");
    let h = Harness::new(manager);

    let outcome = h.run(&demo()).await;

    assert!(matches!(
        outcome,
        ReconcileOutcome::Failed(ReconcileError::Update { .. })
    ));
    assert_eq!(h.manager().operation_counts().installs, 0);
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
}

#[tokio::test]
async fn test_install_fault_releases_session() {
    let h = Harness::new(FakeReleaseManager::new().panic_on_install("boom"));

    let outcome = h.run(&demo()).await;

    match outcome {
        ReconcileOutcome::Failed(ReconcileError::Install { message, .. }) => {
            assert!(message.contains("execution fault"))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
    assert_eq!(h.session_events(), FULL_SESSION.to_vec());
}

#[tokio::test]
async fn test_interrupt_while_waiting_fails_and_releases_session() {
    let h = Harness::new(FakeReleaseManager::new().hang());
    let (handle, interrupt) = Interrupt::pair();
    let reconciler = h.reconciler().with_interrupt(interrupt);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.trigger();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        reconciler.reconcile(&demo(), &h.job),
    )
    .await
    .expect("reconcile should return after the interrupt");

    match outcome {
        ReconcileOutcome::Failed(ReconcileError::Install { message, .. }) => {
            assert!(message.contains("interrupted"))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.manager().install_requests().len(), 1);
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
    // The aborted task let go of its manager handle before the session closed
    assert_eq!(h.session_events(), FULL_SESSION.to_vec());
}

#[tokio::test]
async fn test_interrupt_before_run_skips_the_cluster() {
    let h = Harness::new(FakeReleaseManager::new());
    let (handle, interrupt) = Interrupt::pair();
    handle.trigger();

    let outcome = h.reconciler().with_interrupt(interrupt).reconcile(&demo(), &h.job).await;

    match outcome {
        ReconcileOutcome::Failed(ReconcileError::Connection(message)) => {
            assert!(message.contains("interrupted"))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!h.cluster.contacted());
    assert!(h.manager().list_requests().is_empty());
    assert!(h.session_events().is_empty());
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
}

#[tokio::test]
async fn test_interrupt_while_connecting() {
    let h = Harness::with(FakeCluster::new().hang_client(), FakeResolver::empty());
    let (handle, interrupt) = Interrupt::pair();
    let reconciler = h.reconciler().with_interrupt(interrupt);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.trigger();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        reconciler.reconcile(&demo(), &h.job),
    )
    .await
    .expect("reconcile should return after the interrupt");

    match outcome {
        ReconcileOutcome::Failed(ReconcileError::Connection(message)) => {
            assert!(message.contains("opening the cluster session"))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(h.cluster.contacted());
    assert!(h.session_events().is_empty());
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
}

#[tokio::test]
async fn test_interrupt_while_querying_releases_session() {
    let h = Harness::new(FakeReleaseManager::new().hang_list());
    let (handle, interrupt) = Interrupt::pair();
    let reconciler = h.reconciler().with_interrupt(interrupt);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.trigger();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        reconciler.reconcile(&demo(), &h.job),
    )
    .await
    .expect("reconcile should return after the interrupt");

    match outcome {
        ReconcileOutcome::Failed(ReconcileError::Connection(message)) => {
            assert!(message.contains("querying the release"))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.manager().list_requests().len(), 1);
    assert_eq!(h.manager().operation_counts().installs, 0);
    assert_eq!(h.session_events(), FULL_SESSION.to_vec());
    assert_eq!(h.sink.command_states(), vec![CommandState::HasError]);
}

#[tokio::test]
async fn test_delayed_install_completes_without_interrupt() {
    let h = Harness::new(FakeReleaseManager::new().with_delay(Duration::from_millis(20)));
    let (_handle, interrupt) = Interrupt::pair();
    let reconciler = h.reconciler().with_interrupt(interrupt);

    let outcome = reconciler.reconcile(&demo(), &h.job).await;

    assert!(matches!(outcome, ReconcileOutcome::Installed(_)));
}
