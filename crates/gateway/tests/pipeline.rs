//! End-to-end pipeline tests over the in-memory backend with a mock
//! container worker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gort_data::{DataAccess, DataAccessHolder, DynDataAccess, MemoryDataAccess};
use gort_domain::config::Config;
use gort_domain::{
    Bundle, BundleCommand, ConfigLayer, DynamicConfiguration, Error, Group, Result, User,
};
use gort_gateway::dispatch::worker::{CommandWorker, WorkRequest, WorkResult};
use gort_gateway::dispatch::{self, CommandIssuer};
use gort_gateway::scheduler::Scheduler;
use gort_gateway::state::{AppState, REQUEST_CHANNEL_CAPACITY};
use parking_lot::Mutex;

/// Captures every work request and answers with a canned result.
struct MockWorker {
    calls: Mutex<Vec<WorkRequest>>,
    response: Box<dyn Fn() -> Result<WorkResult> + Send + Sync>,
}

impl MockWorker {
    fn ok(stdout: &str) -> Arc<Self> {
        let stdout = stdout.to_owned();
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            response: Box::new(move || {
                Ok(WorkResult {
                    stdout: stdout.clone(),
                    stderr: String::new(),
                    exit_code: 0,
                    duration_ms: 7,
                })
            }),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        let message = message.to_owned();
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            response: Box::new(move || Err(Error::Execution(message.clone()))),
        })
    }
}

#[async_trait]
impl CommandWorker for MockWorker {
    async fn execute(&self, work: &WorkRequest) -> Result<WorkResult> {
        self.calls.lock().push(work.clone());
        (self.response)()
    }
}

async fn state_with(worker: Arc<dyn CommandWorker>) -> (AppState, DynDataAccess) {
    let da: DynDataAccess = Arc::new(MemoryDataAccess::new());
    let holder = Arc::new(DataAccessHolder::new());
    holder.install(da.clone()).await;

    let (request_tx, _request_rx) = tokio::sync::mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    let scheduler = Arc::new(Scheduler::new(holder.clone(), request_tx.clone()));
    let state = AppState {
        config: Arc::new(Config::default()),
        data: holder,
        service_token: Arc::new(gort_auth::ServiceTokenWindow::from_env()),
        scheduler,
        worker,
        request_tx,
    };
    (state, da)
}

/// An `echo` bundle guarded by `echo:can_echo`, granted to jsmith.
async fn seed_echo_fixture(da: &dyn DataAccess) -> CommandIssuer {
    let user = User {
        username: "jsmith".into(),
        email: "jsmith@example.com".into(),
        full_name: "Jo Smith".into(),
        password_hash: gort_auth::hash_password("password123!").unwrap(),
        mappings: HashMap::from([("slack".to_owned(), "U012ABC".to_owned())]),
    };
    da.user_create(&user).await.unwrap();
    da.group_create(&Group { name: "dev".into() }).await.unwrap();
    da.group_user_add("dev", "jsmith").await.unwrap();
    da.role_create("echoer").await.unwrap();
    da.group_role_add("dev", "echoer").await.unwrap();
    da.role_permission_add("echoer", "echo", "can_echo").await.unwrap();

    let mut commands = HashMap::new();
    commands.insert(
        "echo".to_owned(),
        BundleCommand {
            name: "echo".into(),
            description: "echo".into(),
            executable: vec!["/bin/echo".into()],
            rules: vec!["must have echo:can_echo".into()],
            ..BundleCommand::default()
        },
    );
    let bundle = Bundle {
        gort_bundle_version: 1,
        name: "echo".into(),
        version: "1.0.0".into(),
        description: "echo bundle".into(),
        image: "ubuntu:22.04".into(),
        permissions: vec!["can_echo".into()],
        commands,
        ..Bundle::default()
    };
    da.bundle_create(&bundle).await.unwrap();
    da.bundle_enable("echo", "1.0.0").await.unwrap();

    CommandIssuer {
        adapter: "slack".into(),
        channel_id: "C42".into(),
        user,
    }
}

#[tokio::test]
async fn pipeline_executes_and_closes_the_request() {
    let worker = MockWorker::ok("hello world\n");
    let (state, da) = state_with(worker.clone()).await;
    let issuer = seed_echo_fixture(da.as_ref()).await;

    let envelope = dispatch::handle_command_line(&state, "echo:echo \"hello world\"", &issuer)
        .await
        .unwrap();

    assert_ne!(envelope.request.request_id, 0);
    assert!(!envelope.response.is_error);
    assert_eq!(envelope.response.lines, vec!["hello world"]);
    assert_eq!(envelope.data.exit_code, 0);

    let calls = worker.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].image, "ubuntu:22.04");
    assert_eq!(calls[0].argv, vec!["/bin/echo", "hello world"]);

    // The lifecycle row is closed: a second close errors.
    assert!(da.request_close(&envelope).await.is_err());
}

#[tokio::test]
async fn unqualified_commands_resolve_across_enabled_bundles() {
    let worker = MockWorker::ok("ok");
    let (state, da) = state_with(worker).await;
    let issuer = seed_echo_fixture(da.as_ref()).await;

    let envelope = dispatch::handle_command_line(&state, "echo hi", &issuer)
        .await
        .unwrap();
    assert_eq!(envelope.request.entry.bundle.name, "echo");
}

#[tokio::test]
async fn unknown_command_is_not_found() {
    let worker = MockWorker::ok("ok");
    let (state, da) = state_with(worker).await;
    let issuer = seed_echo_fixture(da.as_ref()).await;

    let err = dispatch::handle_command_line(&state, "nosuch", &issuer)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn denial_closes_with_an_error_envelope() {
    let worker = MockWorker::ok("never runs");
    let (state, da) = state_with(worker.clone()).await;
    let issuer = seed_echo_fixture(da.as_ref()).await;

    // Revoke the permission: the rule still fires, nothing satisfies it.
    da.role_permission_delete("echoer", "echo", "can_echo")
        .await
        .unwrap();

    let envelope = dispatch::handle_command_line(&state, "echo:echo hi", &issuer)
        .await
        .unwrap();
    assert!(envelope.response.is_error);
    assert_eq!(envelope.data.error.as_deref(), Some("permission denied"));
    assert!(worker.calls.lock().is_empty(), "worker must not run");
}

#[tokio::test]
async fn worker_failure_is_an_execution_error_envelope() {
    let worker = MockWorker::failing("timed out after 60s");
    let (state, da) = state_with(worker).await;
    let issuer = seed_echo_fixture(da.as_ref()).await;

    let envelope = dispatch::handle_command_line(&state, "echo:echo hi", &issuer)
        .await
        .unwrap();
    assert!(envelope.response.is_error);
    assert_eq!(envelope.data.error.as_deref(), Some("timed out after 60s"));
}

#[tokio::test]
async fn dynamic_configurations_layer_into_the_environment() {
    let worker = MockWorker::ok("ok");
    let (state, da) = state_with(worker.clone()).await;
    let issuer = seed_echo_fixture(da.as_ref()).await;

    let configs = [
        (ConfigLayer::Bundle, "", "API_HOST", "bundle-wide"),
        (ConfigLayer::Bundle, "", "REGION", "us-east-1"),
        (ConfigLayer::Room, "C42", "API_HOST", "room-override"),
        (ConfigLayer::User, "jsmith", "API_HOST", "user-override"),
    ];
    for (layer, owner, key, value) in configs {
        da.config_set(&DynamicConfiguration {
            layer,
            bundle: "echo".into(),
            owner: owner.into(),
            key: key.into(),
            value: value.into(),
            secret: key == "REGION",
        })
        .await
        .unwrap();
    }

    dispatch::handle_command_line(&state, "echo:echo hi", &issuer)
        .await
        .unwrap();

    let calls = worker.calls.lock();
    let env = &calls[0].env;
    // User layer wins over room over bundle.
    assert_eq!(env.get("API_HOST").map(String::as_str), Some("user-override"));
    // Secrets reach the workload unredacted.
    assert_eq!(env.get("REGION").map(String::as_str), Some("us-east-1"));
    // Controller-provided variables ride along.
    assert_eq!(env.get("GORT_BUNDLE").map(String::as_str), Some("echo"));
    assert_eq!(env.get("GORT_ROOM").map(String::as_str), Some("C42"));
    assert_eq!(
        env.get("GORT_INVOKER_USERNAME").map(String::as_str),
        Some("jsmith")
    );
}
