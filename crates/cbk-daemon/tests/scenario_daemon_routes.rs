//! Scenario: daemon HTTP surface.
//!
//! # Invariants under test
//!
//! 1. GET /health reports the service and a null config hash on defaults.
//! 2. POST /schedules returns 201 with the derived lines; a reused id is 409,
//!    a malformed body is 400 INVALID_REQUEST_BODY.
//! 3. POST /schedules/:id/events returns 201 and the rebuilt lines; each
//!    validation failure maps to 400 with its stable code.
//! 4. Closing a period rebuilds the entity's schedules and later appends
//!    into it are 400 PERIOD_CLOSED; a bad period key is 400 INVALID_PERIOD.
//! 5. Unknown schedule ids are 404.
//! 6. Mutations publish bus messages that feed GET /stream; a refused append
//!    publishes its error code and nothing else.
//!
//! All tests are pure in-process; no network or disk required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use cbk_daemon::{
    routes,
    state::{self, BusMsg},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn schedule_body(id: &str, entity: &str) -> Value {
    json!({
        "schedule_id": id,
        "entity_id": entity,
        "schedule_type": "prepaid",
        "start_date": "2024-01",
        "end_date": "2024-03",
        "total_amount_local": 100,
        "total_amount_reporting": 100
    })
}

async fn create(st: &Arc<state::AppState>, id: &str, entity: &str) -> Value {
    let (status, body) = call(
        routes::build_router(Arc::clone(st)),
        post_json("/schedules", &schedule_body(id, entity)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    parse_json(body)
}

// ---------------------------------------------------------------------------
// 1. Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_service() {
    let st = Arc::new(state::AppState::new());
    let (status, body) = call(routes::build_router(st), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "cbk-daemon");
    assert!(json["config_hash"].is_null());
}

// ---------------------------------------------------------------------------
// 2. Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_schedule_returns_straight_line_periods() {
    let st = Arc::new(state::AppState::new());
    let json = create(&st, "S1", "E1").await;

    assert_eq!(json["schedule"]["schedule_id"], "S1");
    let periods = json["periods"].as_array().unwrap();
    assert_eq!(periods.len(), 3);
    assert_eq!(periods[0]["period"], "2024-01");
    assert_eq!(periods[0]["state"], "SYSTEM_BASE");
    assert_eq!(periods[0]["amount_reporting"], 33.33);
    assert_eq!(periods[2]["amount_reporting"], 33.34);
    assert_eq!(periods[2]["remaining_amount_reporting"], 0.0);
    // A one-cent residue is absorbed without the true-up note.
    assert_eq!(periods[2]["explanation"], "Standard allocation");
}

#[tokio::test]
async fn duplicate_id_is_conflict() {
    let st = Arc::new(state::AppState::new());
    create(&st, "S1", "E1").await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/schedules", &schedule_body("S1", "E1")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse_json(body)["error"], "DUPLICATE_SCHEDULE");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let st = Arc::new(state::AppState::new());
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/schedules", &json!({"entity_id": "E1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(body)["error"], "INVALID_REQUEST_BODY");

    // Zero local amount passes decoding but fails schedule validation.
    let mut zero = schedule_body("S0", "E1");
    zero["total_amount_local"] = json!(0);
    let (status, body) = call(routes::build_router(st), post_json("/schedules", &zero)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(body)["error"], "INVALID_SCHEDULE");
}

#[tokio::test]
async fn list_filters_by_entity() {
    let st = Arc::new(state::AppState::new());
    create(&st, "A1", "E1").await;
    create(&st, "B1", "E2").await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        get("/schedules?entity_id=E2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    let ids: Vec<&str> = json["schedules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["schedule_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["B1"]);

    let (_, body) = call(routes::build_router(st), get("/schedules")).await;
    assert_eq!(parse_json(body)["schedules"].as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn append_event_rebuilds_lines() {
    let st = Arc::new(state::AppState::new());
    create(&st, "S1", "E1").await;

    let draft = json!({
        "type": "AMOUNT_ADJUSTMENT",
        "effective_period": "2024-02",
        "payload": {"amount_reporting_delta": 30},
        "reason": "price increase"
    });
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/schedules/S1/events", &draft),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let json = parse_json(body);
    assert_eq!(json["event"]["seq"], 1);
    assert_eq!(json["periods"][1]["state"], "SYSTEM_ADJUSTED");
    assert_eq!(json["periods"][1]["explanation"], "price increase");
    assert_eq!(json["periods"][1]["adjustment_delta"], 30.0);

    let (status, body) = call(routes::build_router(st), get("/schedules/S1")).await;
    assert_eq!(status, StatusCode::OK);
    let view = parse_json(body);
    assert_eq!(view["events"].as_array().unwrap().len(), 1);
    assert_eq!(view["periods"][2]["cumulative_amount_reporting"], 130.0);
}

#[tokio::test]
async fn invalid_events_map_to_stable_codes() {
    let st = Arc::new(state::AppState::new());
    create(&st, "S1", "E1").await;

    let cases = [
        (json!({"type": "WRITE_OFF", "effective_period": "2024-02"}), "UNSUPPORTED_EVENT_TYPE"),
        (json!({"type": "AMOUNT_ADJUSTMENT", "effective_period": "2024-02"}), "INVALID_EVENT_PAYLOAD"),
        (json!({"type": "ONBOARDING_BOUNDARY", "effective_period": "Feb 2024"}), "INVALID_PERIOD"),
        (json!({"type": "ONBOARDING_BOUNDARY", "effective_period": "2023-11"}), "EVENT_BEFORE_SCHEDULE_START"),
    ];
    for (draft, code) in cases {
        let (status, body) = call(
            routes::build_router(Arc::clone(&st)),
            post_json("/schedules/S1/events", &draft),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{draft}");
        assert_eq!(parse_json(body)["error"], code);
    }

    let (_, body) = call(routes::build_router(st), get("/schedules/S1")).await;
    assert!(parse_json(body)["events"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// 4. Close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_period_locks_lines_and_rejects_appends() {
    let st = Arc::new(state::AppState::new());
    create(&st, "S1", "E1").await;
    create(&st, "S2", "E1").await;
    create(&st, "OTHER", "E2").await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_empty("/entities/E1/periods/2024-02/close"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["status"]["status"], "CLOSED");
    assert_eq!(json["rebuilt_schedules"], json!(["S1", "S2"]));

    // Second close: same status, nothing rebuilt.
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_empty("/entities/E1/periods/2024-02/close"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let again = parse_json(body);
    assert_eq!(again["status"]["closed_at"], json["status"]["closed_at"]);
    assert_eq!(again["rebuilt_schedules"], json!([]));

    let (_, body) = call(routes::build_router(Arc::clone(&st)), get("/schedules/S2")).await;
    assert_eq!(parse_json(body)["periods"][1]["state"], "CLOSED");

    let draft = json!({"type": "ONBOARDING_BOUNDARY", "effective_period": "2024-02"});
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/schedules/S1/events", &draft),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(body)["error"], "PERIOD_CLOSED");

    let (_, body) = call(routes::build_router(st), get("/entities/E1/periods")).await;
    let listed = parse_json(body);
    assert_eq!(listed["closed"].as_array().unwrap().len(), 1);
    assert_eq!(listed["closed"][0]["period"], "2024-02");
}

#[tokio::test]
async fn bad_period_key_is_rejected() {
    let st = Arc::new(state::AppState::new());
    for key in ["2024-13", "2024-2", "202402"] {
        let (status, body) = call(
            routes::build_router(Arc::clone(&st)),
            post_empty(&format!("/entities/E1/periods/{key}/close")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{key}");
        assert_eq!(parse_json(body)["error"], "INVALID_PERIOD");
    }
}

// ---------------------------------------------------------------------------
// 5. Not found
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_schedule_is_not_found() {
    let st = Arc::new(state::AppState::new());
    let draft = json!({"type": "ONBOARDING_BOUNDARY", "effective_period": "2024-02"});

    for req in [
        get("/schedules/nope"),
        post_empty("/schedules/nope/rebuild"),
        post_json("/schedules/nope/events", &draft),
    ] {
        let (status, body) = call(routes::build_router(Arc::clone(&st)), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(parse_json(body)["error"], "SCHEDULE_NOT_FOUND");
    }
}

// ---------------------------------------------------------------------------
// 6. Bus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mutations_publish_bus_messages() {
    let st = Arc::new(state::AppState::new());
    let mut rx = st.bus.subscribe();

    create(&st, "S1", "E1").await;
    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post_empty("/schedules/S1/rebuild"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    call(
        routes::build_router(Arc::clone(&st)),
        post_empty("/entities/E1/periods/2024-01/close"),
    )
    .await;

    let mut triggers = Vec::new();
    let mut closed = None;
    while let Ok(msg) = rx.try_recv() {
        match msg {
            BusMsg::ScheduleRebuilt { trigger, .. } => triggers.push(trigger),
            BusMsg::PeriodClosed { period, rebuilt, .. } => closed = Some((period, rebuilt)),
            _ => {}
        }
    }
    assert_eq!(triggers, vec!["created", "forced", "period_closed"]);
    assert_eq!(closed, Some(("2024-01".to_string(), vec!["S1".to_string()])));
}

#[tokio::test]
async fn rejected_append_publishes_its_code() {
    let st = Arc::new(state::AppState::new());
    create(&st, "S1", "E1").await;
    let mut rx = st.bus.subscribe();

    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post_json(
            "/schedules/S1/events",
            &json!({"type": "ONBOARDING_BOUNDARY", "effective_period": "2023-11"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let msg = rx.try_recv().expect("rejection published");
    assert_eq!(msg.event_name(), "event_rejected");
    assert_eq!(
        msg,
        BusMsg::EventRejected {
            schedule_id: "S1".to_string(),
            event_type: "ONBOARDING_BOUNDARY".to_string(),
            code: "EVENT_BEFORE_SCHEDULE_START".to_string(),
        }
    );
    assert!(rx.try_recv().is_err(), "no rebuild after a refused append");
}

#[tokio::test]
async fn stream_is_event_stream() {
    let st = Arc::new(state::AppState::new());
    let resp = routes::build_router(st)
        .oneshot(get("/stream"))
        .await
        .expect("oneshot failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(ct.starts_with("text/event-stream"), "{ct}");
}
