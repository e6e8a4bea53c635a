//! Event handling through `DgraphCharm` with fake hook tools, an in-memory
//! supervisor and mocked Dgraph endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dgraph_core::CharmConfig;
use dgraph_operator::{DgraphCharm, Error, HookStatusReporter, HookTools, LifecycleEvent, Result};
use dgraph_pebble::{InMemorySupervisor, SupervisorCall};
use dgraph_reconciler::bootstrap::{DATA_FILE, SCHEMA_FILE};
use dgraph_reconciler::{
    Bootstrap, BootstrapConfig, Exporter, HttpReadinessProbe, Reconciler, ReconcilerConfig,
    RetryPolicy, UnitStatus,
};
use serde_json::json;
use tokio::sync::RwLock;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ToolCall {
    Status(UnitStatus),
    ActionSet(String, String),
    ActionFail(String),
}

#[derive(Default)]
struct FakeHookTools {
    config: RwLock<CharmConfig>,
    calls: RwLock<Vec<ToolCall>>,
}

impl FakeHookTools {
    async fn set_whitelist(&self, whitelist: &str) {
        *self.config.write().await = CharmConfig::with_whitelist(whitelist);
    }

    async fn calls(&self) -> Vec<ToolCall> {
        self.calls.read().await.clone()
    }

    async fn statuses(&self) -> Vec<UnitStatus> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                ToolCall::Status(status) => Some(status),
                ToolCall::ActionSet(..) | ToolCall::ActionFail(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl HookTools for FakeHookTools {
    async fn config_get(&self) -> Result<CharmConfig> {
        Ok(self.config.read().await.clone())
    }

    async fn status_set(&self, status: &UnitStatus) -> Result<()> {
        self.calls.write().await.push(ToolCall::Status(status.clone()));
        Ok(())
    }

    async fn action_set(&self, key: &str, value: &str) -> Result<()> {
        self.calls
            .write()
            .await
            .push(ToolCall::ActionSet(key.to_string(), value.to_string()));
        Ok(())
    }

    async fn action_fail(&self, message: &str) -> Result<()> {
        self.calls
            .write()
            .await
            .push(ToolCall::ActionFail(message.to_string()));
        Ok(())
    }
}

struct Fixture {
    charm: DgraphCharm,
    tools: Arc<FakeHookTools>,
    supervisor: InMemorySupervisor,
    server: MockServer,
    _dir: tempfile::TempDir,
}

impl Fixture {
    async fn new(supervisor: InMemorySupervisor) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir()?;
        let tools = Arc::new(FakeHookTools::default());
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(supervisor.clone()),
            ReconcilerConfig::default(),
        ));
        let bootstrap = Bootstrap::new(
            reconciler.clone(),
            Arc::new(HttpReadinessProbe::new(
                format!("{}/state", server.uri()),
                Duration::from_secs(2),
            )?),
            Arc::new(HookStatusReporter::new(tools.clone())),
            reqwest::Client::new(),
            BootstrapConfig {
                schema_url: format!("{}/{SCHEMA_FILE}", server.uri()),
                data_url: format!("{}/{DATA_FILE}", server.uri()),
                import_dir: dir.path().join("import"),
                retry: RetryPolicy::new(Duration::from_millis(10), Some(3)),
                exec_timeout: Duration::from_secs(60),
            },
        );
        let exporter = Exporter::new(reqwest::Client::new(), format!("{}/admin", server.uri()));
        let charm = DgraphCharm::new(tools.clone(), reconciler, bootstrap, exporter, "dgraph");

        Ok(Self {
            charm,
            tools,
            supervisor,
            server,
            _dir: dir,
        })
    }

    async fn serve_dgraph(&self) {
        for (route, body) in [
            (format!("/{SCHEMA_FILE}"), "name: string .\n"),
            (format!("/{DATA_FILE}"), "rdf"),
            ("/state".to_string(), "{}"),
        ] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&self.server)
                .await;
        }
    }
}

#[tokio::test]
async fn test_install_reports_each_stage_then_active() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::new()).await?;
    fixture.serve_dgraph().await;

    let status = fixture.charm.handle(&LifecycleEvent::Install).await;

    assert_eq!(status, Some(UnitStatus::Active));
    assert_eq!(
        fixture.tools.statuses().await,
        vec![
            UnitStatus::maintenance("Fetching data"),
            UnitStatus::Active,
            UnitStatus::waiting("waiting for db initialization"),
            UnitStatus::Active,
        ]
    );
    assert_eq!(fixture.supervisor.restarts().await, vec!["zero", "alpha"]);
    Ok(())
}

#[tokio::test]
async fn test_config_changed_applies_whitelist() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::new()).await?;
    fixture.tools.set_whitelist("192.168.1.16").await;

    let status = fixture.charm.handle(&LifecycleEvent::ConfigChanged).await;

    assert_eq!(status, Some(UnitStatus::Active));
    let alpha = fixture
        .supervisor
        .plan()
        .await
        .services
        .get("alpha")
        .map(|s| s.command.clone())
        .unwrap_or_default();
    assert!(alpha.ends_with("--security whitelist=192.168.1.16"));
    Ok(())
}

#[tokio::test]
async fn test_config_changed_without_pebble_waits() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::unreachable()).await?;

    let status = fixture.charm.handle(&LifecycleEvent::ConfigChanged).await;

    assert_eq!(status, Some(UnitStatus::waiting_for_pebble()));
    assert!(fixture.supervisor.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pebble_ready_for_own_container_reconciles() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::new()).await?;

    let status = fixture
        .charm
        .handle(&LifecycleEvent::from_dispatch_path("hooks/dgraph-pebble-ready"))
        .await;

    assert_eq!(status, Some(UnitStatus::Active));
    assert!(fixture.supervisor.is_running("zero").await);
    Ok(())
}

#[tokio::test]
async fn test_pebble_ready_resumes_deferred_import() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::unreachable()).await?;
    fixture.serve_dgraph().await;

    let deferred = fixture.charm.handle(&LifecycleEvent::Install).await;
    assert_eq!(deferred, Some(UnitStatus::waiting_for_pebble()));

    fixture.supervisor.set_reachable(true).await;
    let status = fixture
        .charm
        .handle(&LifecycleEvent::PebbleReady {
            container: "dgraph".to_string(),
        })
        .await;

    assert_eq!(status, Some(UnitStatus::Active));
    let statuses = fixture.tools.statuses().await;
    assert!(statuses.contains(&UnitStatus::waiting_for_db()));
    Ok(())
}

#[tokio::test]
async fn test_config_changed_retries_fetch_that_failed_at_install() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::new()).await?;

    let failed = fixture.charm.handle(&LifecycleEvent::Install).await;
    assert_eq!(failed, Some(UnitStatus::blocked("failed to fetch demo data")));

    fixture.serve_dgraph().await;
    let status = fixture.charm.handle(&LifecycleEvent::ConfigChanged).await;

    assert_eq!(status, Some(UnitStatus::Active));
    let imports = fixture
        .supervisor
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, SupervisorCall::Exec { .. }))
        .count();
    assert_eq!(imports, 1);
    Ok(())
}

#[tokio::test]
async fn test_other_events_leave_status_alone() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::new()).await?;

    assert_eq!(
        fixture
            .charm
            .handle(&LifecycleEvent::from_dispatch_path("hooks/update-status"))
            .await,
        None
    );
    assert_eq!(
        fixture
            .charm
            .handle(&LifecycleEvent::PebbleReady {
                container: "sidecar".to_string()
            })
            .await,
        None
    );
    assert!(fixture.tools.calls().await.is_empty());
    assert!(fixture.supervisor.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_export_action_sets_result() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::new()).await?;
    Mock::given(method("POST"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"export": {"response": {"message": "Export completed.", "code": "Success"}}}
        })))
        .mount(&fixture.server)
        .await;

    let status = fixture
        .charm
        .handle(&LifecycleEvent::from_dispatch_path("actions/export"))
        .await;

    assert_eq!(status, None);
    assert_eq!(
        fixture.tools.calls().await,
        vec![ToolCall::ActionSet(
            "result".to_string(),
            "database exported".to_string()
        )]
    );
    Ok(())
}

#[tokio::test]
async fn test_export_failure_fails_action_only() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::new()).await?;
    Mock::given(method("POST"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&fixture.server)
        .await;

    fixture
        .charm
        .handle(&LifecycleEvent::Action {
            name: "export".to_string(),
        })
        .await;

    let calls = fixture.tools.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls.first(), Some(ToolCall::ActionFail(message)) if message.contains("export failed")));
    Ok(())
}

#[tokio::test]
async fn test_unknown_action_fails() -> TestResult {
    let fixture = Fixture::new(InMemorySupervisor::new()).await?;

    fixture
        .charm
        .handle(&LifecycleEvent::Action {
            name: "backup".to_string(),
        })
        .await;

    assert_eq!(
        fixture.tools.calls().await,
        vec![ToolCall::ActionFail("unknown action 'backup'".to_string())]
    );
    Ok(())
}

#[test]
fn test_hook_tool_errors_are_not_unavailability() {
    assert!(!Error::hook_tool_failed("config-get", "boom").is_unavailable());
}
