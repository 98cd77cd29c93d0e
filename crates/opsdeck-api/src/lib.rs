//! opsdeck-api — HTTP front door of the console.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Landing page |
//! | GET | `/api/status` | Cached snapshot plus `_meta` (never blocks on probes) |
//! | GET | `/api/alerts/config` | Alert settings with secrets masked |
//! | POST | `/api/alerts/config` | Save alert settings |
//! | GET | `/api/logs?target=&service=` | Plain-text log tails |
//! | POST | `/api/action` | Run a remediation action |
//!
//! Contract errors (malformed JSON, unknown action) are answered with
//! `200 {ok: false, …}`; only an unknown log target yields `400`.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use opsdeck_action::ActionExecutor;
use opsdeck_core::Layout;
use opsdeck_probe::Probes;
use opsdeck_status::StatusAggregator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub status: Arc<StatusAggregator>,
    pub actions: Arc<ActionExecutor>,
}

impl ApiState {
    pub fn new(status: Arc<StatusAggregator>, actions: Arc<ActionExecutor>) -> Self {
        Self { status, actions }
    }

    pub fn probes(&self) -> &Probes {
        self.actions.probes()
    }

    pub fn layout(&self) -> &Layout {
        self.probes().layout()
    }
}

/// Build the complete console router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(handlers::get_status))
        .route(
            "/alerts/config",
            get(handlers::get_alerts_config).post(handlers::save_alerts_config),
        )
        .route("/logs", get(handlers::get_logs))
        .route("/action", post(handlers::run_action));

    Router::new()
        .route("/", get(handlers::index))
        .nest("/api", api_routes)
        .with_state(state)
}
