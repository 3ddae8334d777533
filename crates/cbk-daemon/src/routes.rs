//! Axum router and all HTTP handlers for cbk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers are `pub(crate)`; tests compose the router.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use cbk_period::{is_period_key_shape, Period};
use cbk_schedule::{EventDraft, NewSchedule, ScheduleError, ScheduleId};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    api_types::{
        AppendEventResponse, ClosePeriodResponse, ClosedPeriodsResponse, CreateScheduleResponse,
        ErrorResponse, HealthResponse, ListSchedulesQuery, RebuildResponse, ScheduleListResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stream", get(stream))
        .route("/schedules", post(create_schedule).get(list_schedules))
        .route("/schedules/:id", get(get_schedule))
        .route("/schedules/:id/events", post(append_event))
        .route("/schedules/:id/rebuild", post(rebuild_schedule))
        .route("/entities/:entity_id/periods", get(closed_periods))
        .route(
            "/entities/:entity_id/periods/:period/close",
            post(close_period),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// HTTP status for a domain error.
pub fn status_for(err: &ScheduleError) -> StatusCode {
    match err {
        ScheduleError::ScheduleNotFound { .. } => StatusCode::NOT_FOUND,
        ScheduleError::DuplicateSchedule { .. } => StatusCode::CONFLICT,
        ScheduleError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn bad_request(code: &str, message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: code.to_string(),
                message,
            },
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(e: ScheduleError) -> Self {
        Self {
            status: status_for(&e),
            body: ErrorResponse {
                error: e.code().to_string(),
                message: e.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self::bad_request("INVALID_REQUEST_BODY", r.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// `YYYY-MM` with a real month, else INVALID_PERIOD.
fn parse_period_key(raw: &str) -> Result<Period, ApiError> {
    let invalid = || ApiError::from(ScheduleError::InvalidPeriod {
        input: raw.to_string(),
    });
    if !is_period_key_shape(raw) {
        return Err(invalid());
    }
    Period::parse(raw).map_err(|_| invalid())
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            uptime_secs: uptime_secs(),
            config_hash: st.config_hash.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// /schedules
// ---------------------------------------------------------------------------

pub(crate) async fn create_schedule(
    State(st): State<Arc<AppState>>,
    body: Result<Json<NewSchedule>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateScheduleResponse>), ApiError> {
    let Json(terms) = body?;

    let (schedule, periods) = {
        let mut repo = st.repo.write().await;
        let schedule = repo.create_schedule(terms)?;
        let periods = repo.periods(&schedule.schedule_id)?.to_vec();
        (schedule, periods)
    };

    st.publish(BusMsg::ScheduleRebuilt {
        schedule_id: schedule.schedule_id.to_string(),
        entity_id: schedule.entity_id.clone(),
        periods: periods.len(),
        trigger: "created".to_string(),
    });
    Ok((
        StatusCode::CREATED,
        Json(CreateScheduleResponse { schedule, periods }),
    ))
}

pub(crate) async fn list_schedules(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListSchedulesQuery>,
) -> impl IntoResponse {
    let repo = st.repo.read().await;
    let schedules = repo.schedules(q.entity_id.as_deref());
    (StatusCode::OK, Json(ScheduleListResponse { schedules }))
}

pub(crate) async fn get_schedule(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let repo = st.repo.read().await;
    let view = repo.view(&ScheduleId::new(id))?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub(crate) async fn append_event(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<EventDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<AppendEventResponse>), ApiError> {
    let Json(draft) = body?;
    let schedule_id = ScheduleId::new(id);
    let event_type = draft.event_type.clone();

    let (event, periods, entity_id) = {
        let mut repo = st.repo.write().await;
        let event = match repo.append_event(&schedule_id, draft) {
            Ok(ev) => ev,
            Err(e) => {
                st.publish(BusMsg::EventRejected {
                    schedule_id: schedule_id.to_string(),
                    event_type,
                    code: e.code().to_string(),
                });
                return Err(e.into());
            }
        };
        let periods = repo.periods(&schedule_id)?.to_vec();
        let entity_id = repo.schedule(&schedule_id)?.entity_id;
        (event, periods, entity_id)
    };

    st.publish(BusMsg::ScheduleRebuilt {
        schedule_id: schedule_id.to_string(),
        entity_id,
        periods: periods.len(),
        trigger: "event_appended".to_string(),
    });
    Ok((
        StatusCode::CREATED,
        Json(AppendEventResponse { event, periods }),
    ))
}

pub(crate) async fn rebuild_schedule(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RebuildResponse>, ApiError> {
    let schedule_id = ScheduleId::new(id);
    let (periods, entity_id) = {
        let mut repo = st.repo.write().await;
        let periods = repo.rebuild(&schedule_id)?.to_vec();
        (periods, repo.schedule(&schedule_id)?.entity_id)
    };

    info!(schedule_id = %schedule_id, periods = periods.len(), "forced rebuild");
    st.publish(BusMsg::ScheduleRebuilt {
        schedule_id: schedule_id.to_string(),
        entity_id,
        periods: periods.len(),
        trigger: "forced".to_string(),
    });
    Ok(Json(RebuildResponse {
        schedule_id: schedule_id.to_string(),
        periods,
    }))
}

// ---------------------------------------------------------------------------
// /entities/:entity_id/periods
// ---------------------------------------------------------------------------

pub(crate) async fn close_period(
    State(st): State<Arc<AppState>>,
    Path((entity_id, period_key)): Path<(String, String)>,
) -> Result<Json<ClosePeriodResponse>, ApiError> {
    let period = match parse_period_key(&period_key) {
        Ok(p) => p,
        Err(e) => {
            warn!(entity_id = %entity_id, period = %period_key, "close rejected: bad period key");
            return Err(e);
        }
    };

    let (outcome, sizes) = {
        let mut repo = st.repo.write().await;
        let outcome = repo.close_period(&entity_id, period)?;
        let mut sizes = Vec::with_capacity(outcome.rebuilt.len());
        for id in &outcome.rebuilt {
            sizes.push(repo.periods(id)?.len());
        }
        (outcome, sizes)
    };

    let rebuilt: Vec<String> = outcome.rebuilt.iter().map(|id| id.to_string()).collect();
    if outcome.newly_closed {
        for (id, n) in rebuilt.iter().zip(&sizes) {
            st.publish(BusMsg::ScheduleRebuilt {
                schedule_id: id.clone(),
                entity_id: entity_id.clone(),
                periods: *n,
                trigger: "period_closed".to_string(),
            });
        }
        st.publish(BusMsg::PeriodClosed {
            entity_id: entity_id.clone(),
            period: period.key(),
            rebuilt: rebuilt.clone(),
        });
    }

    Ok(Json(ClosePeriodResponse {
        status: outcome.status,
        rebuilt_schedules: rebuilt,
    }))
}

pub(crate) async fn closed_periods(
    State(st): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> impl IntoResponse {
    let closed = st.repo.read().await.closed_periods(&entity_id);
    (
        StatusCode::OK,
        Json(ClosedPeriodsResponse { entity_id, closed }),
    )
}

// ---------------------------------------------------------------------------
// GET /stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
