//! Shared runtime state for cbk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The repository sits
//! behind one `RwLock`: every mutation takes the write half, so writers are
//! serialized across all schedules.

use std::sync::Arc;
use std::time::Duration;

use cbk_repo::ScheduleRepository;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

// ---------------------------------------------------------------------------
// BusMsg
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    /// A schedule's cached lines were replaced.
    ScheduleRebuilt {
        schedule_id: String,
        entity_id: String,
        periods: usize,
        /// "created" | "event_appended" | "period_closed" | "forced"
        trigger: String,
    },
    PeriodClosed {
        entity_id: String,
        period: String,
        rebuilt: Vec<String>,
    },
    /// An append was refused; nothing was written.
    EventRejected {
        schedule_id: String,
        event_type: String,
        code: String,
    },
}

impl BusMsg {
    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::ScheduleRebuilt { .. } => "schedule_rebuilt",
            BusMsg::PeriodClosed { .. } => "period_closed",
            BusMsg::EventRejected { .. } => "event_rejected",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub repo: Arc<RwLock<ScheduleRepository>>,
    /// Hash of the effective layered config; `None` when running on defaults.
    pub config_hash: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Empty in-memory repository, default policy, no journal.
    pub fn new() -> Self {
        Self::with_repository(ScheduleRepository::new(), None)
    }

    pub fn with_repository(repo: ScheduleRepository, config_hash: Option<String>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "cbk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            repo: Arc::new(RwLock::new(repo)),
            config_hash,
        }
    }

    /// Best effort: no subscribers is not an error.
    pub fn publish(&self, msg: BusMsg) {
        let _ = self.bus.send(msg);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
