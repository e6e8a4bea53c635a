//! End-to-end behaviors of the reconciler and the install bootstrap against
//! an in-memory supervisor and mocked HTTP endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dgraph_core::CharmConfig;
use dgraph_pebble::{InMemorySupervisor, Supervisor, SupervisorCall};
use dgraph_reconciler::bootstrap::{DATA_FILE, SCHEMA_FILE};
use dgraph_reconciler::layer::{ALPHA, ZERO};
use dgraph_reconciler::{
    Bootstrap, BootstrapConfig, BootstrapState, Error, HttpReadinessProbe, ReconcileAction,
    Reconciler, ReconcilerConfig, RecordingStatusReporter, RetryPolicy, StatusReporter, UnitStatus,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const FAST: RetryPolicy = RetryPolicy::new(Duration::from_millis(10), Some(3));

/// Reporter whose `status-set` fails for one particular status.
struct FlakyReporter {
    fails_on: UnitStatus,
    inner: RecordingStatusReporter,
}

#[async_trait]
impl StatusReporter for FlakyReporter {
    async fn report(&self, status: &UnitStatus) -> dgraph_reconciler::Result<()> {
        if *status == self.fails_on {
            return Err(Error::status_failed("status-set timed out"));
        }
        self.inner.report(status).await
    }
}

struct Harness {
    supervisor: InMemorySupervisor,
    reconciler: Arc<Reconciler>,
    reporter: RecordingStatusReporter,
    bootstrap: Bootstrap,
    server: MockServer,
    dir: tempfile::TempDir,
}

impl Harness {
    async fn new(supervisor: InMemorySupervisor) -> Result<Self, Box<dyn std::error::Error>> {
        let reporter = RecordingStatusReporter::new();
        Self::with_reporter(supervisor, reporter.clone(), Arc::new(reporter)).await
    }

    async fn with_reporter(
        supervisor: InMemorySupervisor,
        reporter: RecordingStatusReporter,
        publish: Arc<dyn StatusReporter>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir()?;
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(supervisor.clone()),
            ReconcilerConfig::default(),
        ));
        let probe = HttpReadinessProbe::new(format!("{}/state", server.uri()), Duration::from_secs(2))?;
        let config = BootstrapConfig {
            schema_url: format!("{}/data/{SCHEMA_FILE}", server.uri()),
            data_url: format!("{}/data/{DATA_FILE}", server.uri()),
            import_dir: dir.path().join("import"),
            retry: FAST,
            exec_timeout: Duration::from_secs(60),
        };
        let bootstrap = Bootstrap::new(
            reconciler.clone(),
            Arc::new(probe),
            publish,
            reqwest::Client::new(),
            config,
        );

        Ok(Self {
            supervisor,
            reconciler,
            reporter,
            bootstrap,
            server,
            dir,
        })
    }

    async fn serve_documents(&self) {
        Mock::given(method("GET"))
            .and(path(format!("/data/{SCHEMA_FILE}")))
            .respond_with(ResponseTemplate::new(200).set_body_string("name: string @index(term) .\n"))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/data/{DATA_FILE}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x1f, 0x8b, 0x08, 0x00]))
            .mount(&self.server)
            .await;
    }

    async fn serve_state(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/state"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    async fn imports(&self) -> usize {
        self.supervisor
            .calls()
            .await
            .iter()
            .filter(|call| matches!(call, SupervisorCall::Exec { .. }))
            .count()
    }
}

async fn alpha_command(supervisor: &InMemorySupervisor) -> String {
    supervisor
        .plan()
        .await
        .services
        .get(ALPHA)
        .map(|s| s.command.clone())
        .unwrap_or_default()
}

// ============================================================================
// Config changed
// ============================================================================

#[tokio::test]
async fn given_unreachable_supervisor_when_reconciling_then_waits_without_mutations() -> TestResult {
    let supervisor = InMemorySupervisor::unreachable();
    let reconciler = Reconciler::new(Arc::new(supervisor.clone()), ReconcilerConfig::default());

    let outcome = reconciler.reconcile(&CharmConfig::default()).await?;

    assert_eq!(
        outcome.status,
        UnitStatus::waiting("waiting for Pebble in workload container")
    );
    assert!(supervisor.mutations().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn given_empty_plan_when_reconciling_then_layer_applied_and_both_running() -> TestResult {
    let supervisor = InMemorySupervisor::new();
    let reconciler = Reconciler::new(Arc::new(supervisor.clone()), ReconcilerConfig::default());
    let charm = CharmConfig::default();

    let outcome = reconciler.reconcile(&charm).await?;

    assert_eq!(outcome.status, UnitStatus::Active);
    assert!(supervisor.plan().await.services_match(&reconciler.desired_layer(&charm)));
    assert!(supervisor.is_running(ZERO).await);
    assert!(supervisor.is_running(ALPHA).await);

    let services = supervisor.services(&[ZERO, ALPHA]).await?;
    assert!(services.iter().all(dgraph_pebble::ServiceInfo::is_running));
    Ok(())
}

#[tokio::test]
async fn given_unchanged_config_when_reconciling_again_then_nothing_restarts() -> TestResult {
    let supervisor = InMemorySupervisor::new();
    let reconciler = Reconciler::new(Arc::new(supervisor.clone()), ReconcilerConfig::default());
    let charm = CharmConfig::with_whitelist("10.0.0.0/8");
    reconciler.reconcile(&charm).await?;
    supervisor.clear_calls().await;

    let outcome = reconciler.reconcile(&charm).await?;

    assert!(outcome.converged);
    assert_eq!(outcome.status, UnitStatus::Active);
    assert!(supervisor.mutations().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn given_whitelist_change_when_reconciling_then_each_service_restarts_once() -> TestResult {
    let supervisor = InMemorySupervisor::new();
    let reconciler = Reconciler::new(Arc::new(supervisor.clone()), ReconcilerConfig::default());
    reconciler.reconcile(&CharmConfig::with_whitelist("10.0.0.0/8")).await?;
    supervisor.clear_calls().await;

    let outcome = reconciler
        .reconcile(&CharmConfig::with_whitelist("192.168.1.16"))
        .await?;

    assert_eq!(outcome.restarts_of(ZERO), 1);
    assert_eq!(outcome.restarts_of(ALPHA), 1);
    assert_eq!(supervisor.restarts().await, vec![ZERO, ALPHA]);
    assert!(alpha_command(&supervisor)
        .await
        .ends_with("--security whitelist=192.168.1.16"));
    Ok(())
}

#[tokio::test]
async fn given_hostile_whitelist_when_reconciling_then_value_stays_quoted_after_script() -> TestResult {
    let supervisor = InMemorySupervisor::new();
    let reconciler = Reconciler::new(Arc::new(supervisor.clone()), ReconcilerConfig::default());

    reconciler
        .reconcile(&CharmConfig::with_whitelist("1.2.3.4'; touch /tmp/pwned; echo '"))
        .await?;

    let command = alpha_command(&supervisor).await;
    let script_end = command.find(r#""$@"'"#).ok_or("script argument missing")?;
    let whitelist_at = command.find("whitelist=").ok_or("whitelist missing")?;
    assert!(whitelist_at > script_end);
    assert!(command.ends_with(r"'whitelist=1.2.3.4'\''; touch /tmp/pwned; echo '\'''"));
    Ok(())
}

// ============================================================================
// Install
// ============================================================================

#[tokio::test]
async fn given_fresh_unit_when_installing_then_statuses_follow_bootstrap_order() -> TestResult {
    let harness = Harness::new(InMemorySupervisor::new()).await?;
    harness.serve_documents().await;
    harness.serve_state(200).await;

    let outcome = harness.bootstrap.run(&CharmConfig::default()).await?;

    assert_eq!(outcome.status, UnitStatus::Active);
    assert_eq!(
        harness.reporter.history().await,
        vec![
            UnitStatus::maintenance("Fetching data"),
            UnitStatus::Active,
            UnitStatus::waiting("waiting for db initialization"),
        ]
    );
    assert_eq!(harness.imports().await, 1);
    assert!(matches!(
        outcome.actions_taken.last(),
        Some(ReconcileAction::Import { .. })
    ));

    let import_dir = harness.dir.path().join("import");
    assert!(import_dir.join(SCHEMA_FILE).exists());
    assert!(import_dir.join(DATA_FILE).exists());
    let state = BootstrapState::load(&import_dir).await?;
    assert!(state.imported);
    assert!(state.imported_at.is_some());
    Ok(())
}

#[tokio::test]
async fn given_imported_unit_when_installing_again_then_import_not_repeated() -> TestResult {
    let harness = Harness::new(InMemorySupervisor::new()).await?;
    harness.serve_documents().await;
    harness.serve_state(200).await;
    harness.bootstrap.run(&CharmConfig::default()).await?;

    let outcome = harness.bootstrap.run(&CharmConfig::default()).await?;

    assert_eq!(outcome.status, UnitStatus::Active);
    assert_eq!(harness.imports().await, 1);
    Ok(())
}

#[tokio::test]
async fn given_flaky_import_when_installing_then_import_retried_until_success() -> TestResult {
    let harness = Harness::new(InMemorySupervisor::new()).await?;
    harness.serve_documents().await;
    harness.serve_state(200).await;
    harness.supervisor.fail_next_execs(2, "alpha not serving yet").await;

    let outcome = harness.bootstrap.run(&CharmConfig::default()).await?;

    assert_eq!(outcome.status, UnitStatus::Active);
    assert_eq!(harness.imports().await, 3);
    Ok(())
}

#[tokio::test]
async fn given_failing_import_when_retries_run_out_then_blocked() -> TestResult {
    let harness = Harness::new(InMemorySupervisor::new()).await?;
    harness.serve_documents().await;
    harness.serve_state(200).await;
    harness.supervisor.fail_next_execs(3, "exit status 1").await;

    let outcome = harness.bootstrap.run(&CharmConfig::default()).await?;

    assert_eq!(
        outcome.status,
        UnitStatus::blocked("data import failed after 3 attempts")
    );
    let state = BootstrapState::load(&harness.dir.path().join("import")).await?;
    assert!(state.is_pending());
    Ok(())
}

#[tokio::test]
async fn given_database_never_ready_when_installing_then_blocked_without_import() -> TestResult {
    let harness = Harness::new(InMemorySupervisor::new()).await?;
    harness.serve_documents().await;
    harness.serve_state(503).await;

    let outcome = harness.bootstrap.run(&CharmConfig::default()).await?;

    assert_eq!(
        outcome.status,
        UnitStatus::blocked("database did not become ready after 3 checks")
    );
    assert_eq!(harness.imports().await, 0);
    Ok(())
}

#[tokio::test]
async fn given_missing_documents_when_installing_then_blocked_before_layer() -> TestResult {
    let harness = Harness::new(InMemorySupervisor::new()).await?;
    harness.serve_state(200).await;

    let outcome = harness.bootstrap.run(&CharmConfig::default()).await?;

    assert_eq!(outcome.status, UnitStatus::blocked("failed to fetch demo data"));
    assert!(harness.supervisor.mutations().await.is_empty());
    let state = BootstrapState::load(&harness.dir.path().join("import")).await?;
    assert!(!state.fetched);
    assert!(state.is_pending());
    Ok(())
}

#[tokio::test]
async fn given_fetch_failed_at_install_when_documents_return_then_resume_fetches_and_imports() -> TestResult {
    let harness = Harness::new(InMemorySupervisor::new()).await?;
    harness.serve_state(200).await;
    let failed = harness.bootstrap.run(&CharmConfig::default()).await?;
    assert_eq!(failed.status, UnitStatus::blocked("failed to fetch demo data"));

    harness.serve_documents().await;
    let reconciled = harness.reconciler.reconcile(&CharmConfig::default()).await?;
    assert_eq!(reconciled.status, UnitStatus::Active);

    let resumed = harness.bootstrap.resume().await?.ok_or("bootstrap was not pending")?;

    assert_eq!(resumed.status, UnitStatus::Active);
    assert_eq!(harness.imports().await, 1);
    assert!(matches!(
        resumed.actions_taken.first(),
        Some(ReconcileAction::FetchFile { .. })
    ));
    assert_eq!(
        harness.reporter.history().await.get(1..),
        Some(
            &[
                UnitStatus::maintenance("Fetching data"),
                UnitStatus::Active,
                UnitStatus::waiting("waiting for db initialization"),
            ][..]
        )
    );
    let import_dir = harness.dir.path().join("import");
    assert!(import_dir.join(DATA_FILE).exists());
    assert!(harness.bootstrap.resume().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn given_status_set_failing_when_installing_then_bootstrap_still_imports() -> TestResult {
    let recorded = RecordingStatusReporter::new();
    let flaky = FlakyReporter {
        fails_on: UnitStatus::fetching_data(),
        inner: recorded.clone(),
    };
    let harness =
        Harness::with_reporter(InMemorySupervisor::new(), recorded, Arc::new(flaky)).await?;
    harness.serve_documents().await;
    harness.serve_state(200).await;

    let outcome = harness.bootstrap.run(&CharmConfig::default()).await?;

    assert_eq!(outcome.status, UnitStatus::Active);
    assert_eq!(harness.imports().await, 1);
    assert_eq!(
        harness.reporter.history().await,
        vec![
            UnitStatus::Active,
            UnitStatus::waiting("waiting for db initialization"),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn given_supervisor_down_at_install_when_it_comes_up_then_import_resumes() -> TestResult {
    let harness = Harness::new(InMemorySupervisor::unreachable()).await?;
    harness.serve_documents().await;
    harness.serve_state(200).await;

    let deferred = harness.bootstrap.run(&CharmConfig::default()).await?;
    assert_eq!(deferred.status, UnitStatus::waiting_for_pebble());
    assert_eq!(harness.imports().await, 0);

    harness.supervisor.set_reachable(true).await;
    let reconciled = harness.reconciler.reconcile(&CharmConfig::default()).await?;
    assert_eq!(reconciled.status, UnitStatus::Active);

    let resumed = harness.bootstrap.resume().await?.ok_or("import was not pending")?;
    assert_eq!(resumed.status, UnitStatus::Active);
    assert_eq!(harness.imports().await, 1);
    assert!(harness.bootstrap.resume().await?.is_none());
    Ok(())
}
