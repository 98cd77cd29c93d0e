//! Console regression tests.
//!
//! Drives the full router in-process: status placeholder and refresh,
//! log targets, alert settings round trip and the action contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use opsdeck_action::ActionExecutor;
use opsdeck_api::{ApiState, build_router};
use opsdeck_core::Layout;
use opsdeck_probe::{CommandOutput, Probes, ScriptedRunner};
use opsdeck_status::{Snapshot, SnapshotSource, StatusAggregator, StatusResult};

/// Numbered snapshots after a short delay.
struct SlowSource {
    n: AtomicI64,
}

#[async_trait]
impl SnapshotSource for SlowSource {
    async fn collect(&self) -> StatusResult<Snapshot> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let n = self.n.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Snapshot {
            ts: 1_700_000_000 + n,
            root_dir: "/srv/app".into(),
            ..Snapshot::default()
        })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    layout: Layout,
    router: Router,
    status: Arc<StatusAggregator>,
}

fn fixture(runner: ScriptedRunner) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path());
    let probes = Arc::new(Probes::new(layout.clone(), Arc::new(runner)));
    let status = Arc::new(StatusAggregator::new(
        Arc::new(SlowSource { n: AtomicI64::new(0) }),
        "/srv/app",
    ));
    let actions = Arc::new(ActionExecutor::new(probes, reqwest_client()));
    let router = build_router(ApiState::new(status.clone(), actions));
    Fixture {
        _dir: dir,
        layout,
        router,
        status,
    }
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::new()
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

async fn post(router: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn index_and_unknown_routes() {
    let f = fixture(ScriptedRunner::new());
    let (code, body) = get(&f.router, "/").await;
    assert_eq!(code, StatusCode::OK);
    assert!(body.contains("<title>opsdeck</title>"));

    let (code, _) = get(&f.router, "/api/nope").await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_serves_placeholder_then_snapshot() {
    let f = fixture(ScriptedRunner::new());

    let (code, body) = get(&f.router, "/api/status").await;
    assert_eq!(code, StatusCode::OK);
    let first: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(first["ts"], 0);
    assert_eq!(first["root_dir"], "/srv/app");
    assert_eq!(first["_meta"]["has_data"], false);
    assert_eq!(first["_meta"]["updating"], true);

    for _ in 0..100 {
        if f.status.meta().has_data {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (_, body) = get(&f.router, "/api/status").await;
    let second: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(second["ts"], 1_700_000_001);
    assert_eq!(second["_meta"]["last_ok"], true);
    assert!(second["api"]["local"].is_object());
}

#[tokio::test]
async fn malformed_action_body_is_a_failed_reply() {
    let f = fixture(ScriptedRunner::new());
    for body in ["{not json", "", "[1,2]", "{\"action\": 5}"] {
        let (code, reply) = post(&f.router, "/api/action", body).await;
        assert_eq!(code, StatusCode::OK, "body {body:?}");
        assert_eq!(reply["ok"], false, "body {body:?}");
        assert!(reply["message"].as_str().unwrap().starts_with("Unknown action"));
    }
}

#[tokio::test]
async fn action_round_trip() {
    let runner = ScriptedRunner::new().on("compose", CommandOutput::ok("Container deploy-db-1  Restarted"));
    let f = fixture(runner);
    let (code, reply) = post(
        &f.router,
        "/api/action",
        &json!({"action": "docker_restart", "service": "db"}).to_string(),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["message"], "Restarted database");
    assert_eq!(reply["detail"], "Container deploy-db-1  Restarted");
    assert!(f.layout.home_env.is_file(), "actions generate the deployment env");
}

#[tokio::test]
async fn log_targets() {
    let f = fixture(ScriptedRunner::new());
    std::fs::create_dir_all(&f.layout.runtime_dir).unwrap();
    std::fs::write(&f.layout.tunnel_log, "line 1\nINF Registered tunnel connection\n").unwrap();

    let (code, body) = get(&f.router, "/api/logs?target=tunnel").await;
    assert_eq!(code, StatusCode::OK);
    assert!(body.ends_with("Registered tunnel connection"));

    let (code, body) = get(&f.router, "/api/logs?target=alerts").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body, "(no logs)");

    let (code, body) = get(&f.router, "/api/logs?target=mobile_preview").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body, "(no logs)");

    let (code, _) = get(&f.router, "/api/logs?target=kernel").await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    let (code, _) = get(&f.router, "/api/logs").await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn alert_settings_round_trip() {
    let f = fixture(ScriptedRunner::new());

    let (code, body) = get(&f.router, "/api/alerts/config").await;
    assert_eq!(code, StatusCode::OK);
    let view: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(view["values"]["ALERT_ENABLED"], "0");
    assert_eq!(view["configured"]["ALERT_TG_BOT_TOKEN"], false);

    let (code, reply) = post(
        &f.router,
        "/api/alerts/config",
        &json!({"values": {"ALERT_ENABLED": true, "ALERT_TG_BOT_TOKEN": "123456:abcdefghijkl", "ALERT_TG_CHAT_ID": "42"}})
            .to_string(),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(reply["ok"], true, "{reply}");
    assert_eq!(reply["message"], "Saved (3 changed)");

    let (_, body) = get(&f.router, "/api/alerts/config").await;
    let view: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(view["values"]["ALERT_ENABLED"], "1");
    assert_eq!(view["configured"]["ALERT_TG_BOT_TOKEN"], true);
    assert_eq!(view["values"]["ALERT_TG_BOT_TOKEN"], "", "secrets are never echoed");

    let (code, reply) = post(&f.router, "/api/alerts/config", "{}").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(reply["message"], "No changes");
}

#[tokio::test]
async fn malformed_alert_settings_body_is_a_failed_reply() {
    let f = fixture(ScriptedRunner::new());
    for body in ["{not json", "garbage", "[1]", "{\"values\": \"x\"}"] {
        let (code, reply) = post(&f.router, "/api/alerts/config", body).await;
        assert_eq!(code, StatusCode::OK, "body {body:?}");
        assert_eq!(reply["ok"], false, "body {body:?}");
    }
    let (_, body) = get(&f.router, "/api/alerts/config").await;
    let view: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(view["values"]["ALERT_ENABLED"], "0");
}

#[tokio::test]
async fn numeric_clear_flags_do_not_drop_the_edit() {
    let f = fixture(ScriptedRunner::new());
    let (_, reply) = post(
        &f.router,
        "/api/alerts/config",
        &json!({
            "values": {"ALERT_ENABLED": "1", "ALERT_INTERVAL_S": "60"},
            "clear": {"ALERT_BARK_URL": 1}
        })
        .to_string(),
    )
    .await;
    assert_eq!(reply["ok"], true, "{reply}");
    assert_eq!(reply["message"], "Saved (2 changed)");

    let env = opsdeck_core::read_env_file(&f.layout.alerts_env);
    assert_eq!(env.get("ALERT_ENABLED").map(String::as_str), Some("1"));
    assert_eq!(env.get("ALERT_INTERVAL_S").map(String::as_str), Some("60"));
}

#[tokio::test]
async fn invalid_silence_time_is_rejected_without_writes() {
    let f = fixture(ScriptedRunner::new());
    let (_, reply) = post(
        &f.router,
        "/api/alerts/config",
        &json!({"values": {"ALERT_ENABLED": "1", "ALERT_SILENCE_START": "25:99"}}).to_string(),
    )
    .await;
    assert_eq!(reply["ok"], false);
    let (_, body) = get(&f.router, "/api/alerts/config").await;
    let view: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(view["values"]["ALERT_ENABLED"], "0");
}
