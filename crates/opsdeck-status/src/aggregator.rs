//! Non-blocking status with a single background refresh.
//!
//! Readers always get the last good snapshot immediately. A stale read
//! schedules one refresh task; concurrent readers piggyback on it. A
//! forced refresh that arrives mid-flight makes the running task collect
//! once more, since its probes may predate the change that forced it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use opsdeck_core::humanize_error;

use crate::error::StatusError;
use crate::snapshot::{Snapshot, SnapshotSource};

/// Snapshots younger than this are served without a refresh.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(2);

#[derive(Default)]
struct RefreshState {
    snapshot: Option<Arc<Snapshot>>,
    refreshed_at: Option<Instant>,
    updating: bool,
    last_ok: bool,
    last_error: String,
    last_duration_ms: u64,
    task: Option<JoinHandle<()>>,
    rerun: bool,
}

/// Freshness and refresh bookkeeping, returned as `_meta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusMeta {
    pub has_data: bool,
    pub updating: bool,
    pub age_s: u64,
    pub last_ok: bool,
    pub last_error: String,
    pub last_duration_ms: u64,
}

/// What `get()` hands back: the best snapshot plus its metadata.
#[derive(Debug, Clone)]
pub struct StatusView {
    pub snapshot: Option<Arc<Snapshot>>,
    pub root_dir: String,
    pub meta: StatusMeta,
}

impl StatusView {
    /// Wire form: the snapshot fields (or `{ts: 0, root_dir}`) plus `_meta`.
    pub fn to_json(&self) -> Value {
        let body = self
            .snapshot
            .as_deref()
            .map(serde_json::to_value)
            .transpose()
            .unwrap_or_else(|e| {
                warn!(error = %e, "snapshot encoding failed");
                None
            });
        let mut out = match body {
            Some(Value::Object(map)) => Value::Object(map),
            _ => json!({ "ts": 0, "root_dir": self.root_dir }),
        };
        if let Value::Object(map) = &mut out {
            map.insert("_meta".into(), json!(self.meta));
        }
        out
    }
}

pub struct StatusAggregator {
    source: Arc<dyn SnapshotSource>,
    root_dir: String,
    max_age: Duration,
    state: Arc<Mutex<RefreshState>>,
}

impl StatusAggregator {
    pub fn new(source: Arc<dyn SnapshotSource>, root_dir: impl Into<String>) -> Self {
        Self {
            source,
            root_dir: root_dir.into(),
            max_age: DEFAULT_MAX_AGE,
            state: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Current best view; never waits for a refresh. Must be called inside
    /// a Tokio runtime.
    pub fn get(&self) -> StatusView {
        self.trigger_refresh(false);
        let st = lock(&self.state);
        StatusView {
            snapshot: st.snapshot.clone(),
            root_dir: self.root_dir.clone(),
            meta: meta_of(&st),
        }
    }

    pub fn meta(&self) -> StatusMeta {
        meta_of(&lock(&self.state))
    }

    /// Start a refresh unless one is running or (without `force`) the
    /// snapshot is still fresh. Returns whether a task was spawned; a
    /// forced call during a running refresh queues one more collection.
    pub fn trigger_refresh(&self, force: bool) -> bool {
        let mut st = lock(&self.state);
        if task_alive(&st) {
            st.updating = true;
            if force {
                st.rerun = true;
            }
            return false;
        }
        let fresh = st.refreshed_at.is_some_and(|t| t.elapsed() <= self.max_age);
        if fresh && !force {
            return false;
        }

        st.updating = true;
        st.rerun = false;
        let source = self.source.clone();
        let state = self.state.clone();
        st.task = Some(tokio::spawn(refresh(source, state)));
        debug!(force, "status refresh scheduled");
        true
    }
}

fn lock(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn task_alive(st: &RefreshState) -> bool {
    st.task.as_ref().is_some_and(|h| !h.is_finished())
}

fn meta_of(st: &RefreshState) -> StatusMeta {
    StatusMeta {
        has_data: st.snapshot.is_some(),
        updating: st.updating || task_alive(st),
        age_s: st.refreshed_at.map(|t| t.elapsed().as_secs()).unwrap_or(0),
        last_ok: st.last_ok,
        last_error: st.last_error.clone(),
        last_duration_ms: st.last_duration_ms,
    }
}

async fn refresh(source: Arc<dyn SnapshotSource>, state: Arc<Mutex<RefreshState>>) {
    loop {
        let started = Instant::now();

        // Collect on an inner task so a panic surfaces as a JoinError.
        let collector = source.clone();
        let outcome = match tokio::spawn(async move { collector.collect().await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(StatusError::Panicked(panic_text(e.into_panic()))),
            Err(e) => Err(StatusError::Collect(e.to_string())),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut st = lock(&state);
        st.last_duration_ms = elapsed_ms;
        match outcome {
            Ok(snapshot) => {
                st.snapshot = Some(Arc::new(snapshot));
                st.refreshed_at = Some(Instant::now());
                st.last_ok = true;
                st.last_error.clear();
                debug!(elapsed_ms, "status refreshed");
            }
            Err(e) => {
                warn!(error = %e, elapsed_ms, "status refresh failed, keeping previous snapshot");
                st.last_ok = false;
                st.last_error = humanize_error(&e.to_string());
            }
        }
        if std::mem::take(&mut st.rerun) {
            debug!("forced refresh arrived mid-flight, collecting again");
            continue;
        }
        st.updating = false;
        st.task = None;
        return;
    }
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
