//! End-to-end lifecycle tests against a fake provisioning tool.
//!
//! The fake tool is a shell script that prints tool-like output, leaves the
//! artifacts the real tool would, and fails when a `fail-<command>` marker
//! file exists in the working directory.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use halldyll_infra::config::Settings;
use halldyll_infra::lifecycle::{InitRequest, LifecycleController};
use halldyll_infra::process::OutputStream;
use halldyll_infra::server::{router, AppState};
use halldyll_infra::session::SessionStatus;
use halldyll_infra::stream::FeedEvent;

const FAKE_TOOL: &str = r#"#!/bin/sh
cmd="$1"
if [ -f "fail-$cmd" ]; then
  echo "Error: simulated $cmd failure" >&2
  exit 1
fi
case "$cmd" in
  init)
    echo "Initializing the backend... automation=$TF_IN_AUTOMATION input=$TF_INPUT"
    mkdir -p .terraform
    echo "Warning: provider cache is empty" >&2
    echo "Terraform has been successfully initialized!"
    ;;
  plan)
    [ -f main.tf ] || { echo "Error: No configuration files" >&2; exit 1; }
    echo "Plan: 1 to add, 0 to change, 0 to destroy."
    echo plan > tfplan
    ;;
  apply)
    [ "$5" = "tfplan" ] && [ -f tfplan ] || { echo "Error: saved plan missing" >&2; exit 1; }
    echo "Apply complete! Resources: 1 added, 0 changed, 0 destroyed."
    echo '{"resources":[1]}' > terraform.tfstate
    ;;
  destroy)
    echo "Destroy complete! Resources: 1 destroyed."
    : > terraform.tfstate
    ;;
  *)
    echo "unknown command $cmd" >&2
    exit 2
    ;;
esac
"#;

struct Harness {
    dir: tempfile::TempDir,
    settings: Settings,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tool = install_script(dir.path(), "fake-tf", FAKE_TOOL);

        let workspace = dir.path().join("sessions");
        std::fs::create_dir_all(&workspace).unwrap();
        let settings = Settings::with_workspace(&workspace).with_tool(tool.to_string_lossy());
        Self { dir, settings }
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.settings.workspace_root.join(id)
    }

    fn controller(&self) -> LifecycleController {
        LifecycleController::from_settings(&self.settings)
    }

    fn app(&self) -> Router {
        router(AppState::new(Arc::new(self.controller())))
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

fn install_script(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

async fn request(app: &Router, method: &str, uri: &str, body: &Value) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

/// Decodes the `data:` payloads of a server-sent event body.
fn sse_events(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

fn terminal_count(events: &[Value]) -> usize {
    events
        .iter()
        .filter(|e| e.get("status").is_some() || e.get("error").is_some())
        .count()
}

#[tokio::test]
async fn test_http_lifecycle_end_to_end() {
    let harness = Harness::new();
    let app = harness.app();

    let init = json!({
        "region": "eu-west-1",
        "descriptor": {
            "name": "orders",
            "environment": {"region": "eu-west-1"},
            "services": {"database": true}
        }
    });
    let (status, body) = request(&app, "POST", "/sessions/orders-1/init", &init).await;
    assert_eq!(status, StatusCode::OK);
    let events = sse_events(&body);
    assert_eq!(terminal_count(&events), 1);
    assert_eq!(events.last().unwrap(), &json!({"status": "initialized"}));
    assert!(events.contains(&json!({
        "log": "Initializing the backend... automation=1 input=0"
    })));

    let config = std::fs::read_to_string(harness.session_dir("orders-1").join("main.tf")).unwrap();
    assert!(config.contains("region = \"eu-west-1\""));
    assert!(config.contains("app_name = \"orders\""));
    assert!(config.contains("aws_db_instance"));

    let (_, body) = request(&app, "POST", "/sessions/orders-1/plan", &Value::Null).await;
    assert_eq!(sse_events(&body).last().unwrap(), &json!({"status": "planned"}));

    let (_, body) = request(&app, "POST", "/sessions/orders-1/apply", &Value::Null).await;
    assert_eq!(sse_events(&body).last().unwrap(), &json!({"status": "applied"}));
    assert!(!harness.session_dir("orders-1").join("tfplan").exists());

    let (status, body) = request(&app, "GET", "/sessions/orders-1/status", &Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(snapshot["status"], "applied");
    assert_eq!(snapshot["history"].as_array().unwrap().len(), 3);
    assert!(snapshot["last_error"].is_null());
    assert!(snapshot["logs"]
        .as_array()
        .unwrap()
        .contains(&json!("Apply complete! Resources: 1 added, 0 changed, 0 destroyed.")));

    let (_, body) = request(&app, "POST", "/sessions/orders-1/destroy", &Value::Null).await;
    assert_eq!(sse_events(&body).last().unwrap(), &json!({"status": "destroyed"}));
}

#[tokio::test]
async fn test_http_out_of_order_requests() {
    let harness = Harness::new();
    let app = harness.app();

    let (status, body) = request(&app, "POST", "/sessions/s1/plan", &Value::Null).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["kind"], "precondition");

    let (status, _) = request(&app, "POST", "/sessions/s1/init", &json!({"region": "nowhere-1"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = request(&app, "POST", "/sessions/s1/init", &json!({"region": "us-east-1"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(&app, "POST", "/sessions/s1/apply", &Value::Null).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_tool_failure_ends_feed_with_one_error() {
    let harness = Harness::new();
    let app = harness.app();

    request(&app, "POST", "/sessions/s1/init", &json!({"region": "eu-west-1"})).await;
    std::fs::write(harness.session_dir("s1").join("fail-plan"), "").unwrap();

    let (status, body) = request(&app, "POST", "/sessions/s1/plan", &Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let events = sse_events(&body);
    assert_eq!(terminal_count(&events), 1);
    assert_eq!(events[0], json!({"log": "Error: simulated plan failure"}));
    let message = events.last().unwrap()["error"].as_str().unwrap().to_string();
    assert!(message.contains("code 1"), "{message}");
    assert!(message.contains("simulated plan failure"), "{message}");

    let (_, body) = request(&app, "GET", "/sessions/s1/status", &Value::Null).await;
    let snapshot: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(snapshot["status"], "error");
    assert!(snapshot["last_error"].as_str().unwrap().contains("code 1"));
}

#[tokio::test]
async fn test_missing_tool_is_reported_on_the_feed() {
    let harness = Harness::new();
    let settings = harness
        .settings
        .clone()
        .with_tool(harness.root().join("no-such-tool").to_string_lossy());
    let controller = LifecycleController::from_settings(&settings);

    let feed = controller.init("s1", InitRequest::new("eu-west-1")).await.unwrap();
    let events = feed.collect_events().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], FeedEvent::Error { message } if message.contains("no-such-tool")));
    assert_eq!(controller.status("s1").unwrap().status, SessionStatus::Error);
}

#[tokio::test]
async fn test_concurrent_sessions_are_isolated() {
    let harness = Harness::new();
    let controller = harness.controller();

    let (first, second) = tokio::join!(
        controller.init("alpha", InitRequest::new("eu-west-1")),
        controller.init("beta", InitRequest::new("us-east-1")),
    );
    let (first, second) = tokio::join!(
        first.unwrap().collect_events(),
        second.unwrap().collect_events(),
    );

    for events in [&first, &second] {
        assert_eq!(
            events.last(),
            Some(&FeedEvent::Done {
                status: SessionStatus::Initialized
            })
        );
    }

    let alpha = std::fs::read_to_string(harness.session_dir("alpha").join("main.tf")).unwrap();
    let beta = std::fs::read_to_string(harness.session_dir("beta").join("main.tf")).unwrap();
    assert!(alpha.contains("eu-west-1") && alpha.contains("app-alpha"));
    assert!(beta.contains("us-east-1") && beta.contains("app-beta"));
    assert!(harness.session_dir("alpha").join(".terraform").is_dir());
    assert!(harness.session_dir("beta").join(".terraform").is_dir());

    let alpha_logs = controller.status("alpha").unwrap().logs;
    assert_eq!(alpha_logs.len(), 3);
}

#[tokio::test]
async fn test_restart_rediscovers_session_state_from_disk() {
    let harness = Harness::new();
    {
        let controller = harness.controller();
        let feed = controller.init("s1", InitRequest::new("eu-west-1")).await.unwrap();
        feed.collect_events().await;
        let feed = controller.plan("s1").await.unwrap();
        feed.collect_events().await;
    }

    let controller = harness.controller();
    let feed = controller.apply("s1").await.unwrap();
    assert_eq!(
        feed.collect_events().await.last(),
        Some(&FeedEvent::Done {
            status: SessionStatus::Applied
        })
    );
}

#[tokio::test]
async fn test_feed_keeps_interleaved_stream_order() {
    let harness = Harness::new();
    let tool = install_script(
        harness.root(),
        "interleaving-tf",
        "#!/bin/sh\necho A\nsleep 0.2\necho B >&2\nsleep 0.2\necho C\n",
    );
    let settings = harness.settings.clone().with_tool(tool.to_string_lossy());
    let controller = LifecycleController::from_settings(&settings);

    let feed = controller.init("s1", InitRequest::new("eu-west-1")).await.unwrap();
    assert_eq!(
        feed.collect_events().await,
        vec![
            FeedEvent::output("A", OutputStream::Stdout),
            FeedEvent::output("B", OutputStream::Stderr),
            FeedEvent::output("C", OutputStream::Stdout),
            FeedEvent::Done {
                status: SessionStatus::Initialized
            },
        ]
    );
}
