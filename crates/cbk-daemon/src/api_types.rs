//! Request and response types for the cbk-daemon HTTP endpoints.
//!
//! `Serialize + Deserialize` so tests can decode them. No business logic.

use cbk_closure::PeriodStatus;
use cbk_schedule::{PeriodLine, ScheduleEvent, ScheduleMaster};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub config_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. "PERIOD_CLOSED".
    pub error: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// /schedules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSchedulesQuery {
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleListResponse {
    pub schedules: Vec<ScheduleMaster>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleResponse {
    pub schedule: ScheduleMaster,
    pub periods: Vec<PeriodLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEventResponse {
    pub event: ScheduleEvent,
    pub periods: Vec<PeriodLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildResponse {
    pub schedule_id: String,
    pub periods: Vec<PeriodLine>,
}

// ---------------------------------------------------------------------------
// /entities/:entity_id/periods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosePeriodResponse {
    pub status: PeriodStatus,
    /// Ids of schedules whose lines were recomputed; empty on a repeat close.
    pub rebuilt_schedules: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPeriodsResponse {
    pub entity_id: String,
    pub closed: Vec<PeriodStatus>,
}
