//! Route handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use opsdeck_action::mobile_preview_logs;
use opsdeck_alert::{SaveRequest, config_view, save_config};
use opsdeck_probe::process::tail_file;

use crate::ApiState;

const INDEX_HTML: &str = include_str!("index.html");

const LOG_TAIL_LINES: usize = 200;

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /api/status
pub async fn get_status(State(state): State<ApiState>) -> Json<Value> {
    Json(state.status.get().to_json())
}

/// GET /api/alerts/config
pub async fn get_alerts_config(State(state): State<ApiState>) -> impl IntoResponse {
    Json(config_view(state.layout()))
}

/// POST /api/alerts/config
pub async fn save_alerts_config(State(state): State<ApiState>, body: Bytes) -> impl IntoResponse {
    let request = match SaveRequest::from_body(&body) {
        Ok(request) => request,
        Err(reply) => {
            debug!(detail = %reply.detail, "alert settings body rejected");
            return Json(reply);
        }
    };
    let reply = save_config(state.layout(), &request);
    state.status.trigger_refresh(true);
    Json(reply)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogsQuery {
    pub target: String,
    pub service: String,
}

/// GET /api/logs?target=tunnel|named_init|mobile_preview|alerts|docker|git
pub async fn get_logs(State(state): State<ApiState>, Query(q): Query<LogsQuery>) -> Response {
    let layout = state.layout();
    let service = q.service.trim();
    let text = match q.target.trim() {
        "tunnel" => tail_file(&layout.tunnel_log, LOG_TAIL_LINES),
        "named_init" => tail_file(&layout.named_init_log, LOG_TAIL_LINES),
        "mobile_preview" => mobile_preview_logs(layout),
        "alerts" => match tail_file(&layout.alerts_log, LOG_TAIL_LINES) {
            t if t.is_empty() => "(no logs)".to_string(),
            t => t,
        },
        "docker" => state.probes().compose_logs(service, LOG_TAIL_LINES as u32).await,
        "git" => state.probes().git_status_text(service).await,
        other => {
            debug!(log_target = other, "unknown log target");
            return (StatusCode::BAD_REQUEST, "Unknown log target").into_response();
        }
    };
    text.into_response()
}

/// Loose string field: strings as-is, numbers and booleans rendered,
/// anything else empty.
fn field_text(body: &Value, key: &str) -> String {
    match body.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
        _ => String::new(),
    }
}

/// POST /api/action — body `{action, service}`.
pub async fn run_action(State(state): State<ApiState>, body: Bytes) -> impl IntoResponse {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let action = field_text(&payload, "action");
    let service = field_text(&payload, "service");

    let reply = state.actions.execute(&action, &service).await;
    state.status.trigger_refresh(true);
    Json(reply)
}
