use cbk_money::Money;
use cbk_period::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{ScheduleError, ScheduleId};

/// Wire tags of every supported event variant.
pub const EVENT_TYPES: &[&str] = &[
    "AMOUNT_ADJUSTMENT",
    "TIMELINE_EXTENSION",
    "TIMELINE_REDUCTION",
    "ONBOARDING_BOUNDARY",
];

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Amendment variants. Each carries only the fields it needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Additive deltas to the cumulative totals from `effective_period` on.
    AmountAdjustment {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount_reporting_delta: Option<Money>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount_local_delta: Option<Money>,
    },
    /// Replaces the effective end date.
    TimelineExtension { new_end_date: Period },
    /// Replaces the effective end date. Computed exactly like an extension;
    /// the tag records intent for audit.
    TimelineReduction { new_end_date: Period },
    /// Moves the system posting start to the event's `effective_period`.
    OnboardingBoundary,
}

impl EventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::AmountAdjustment { .. } => "AMOUNT_ADJUSTMENT",
            EventKind::TimelineExtension { .. } => "TIMELINE_EXTENSION",
            EventKind::TimelineReduction { .. } => "TIMELINE_REDUCTION",
            EventKind::OnboardingBoundary => "ONBOARDING_BOUNDARY",
        }
    }

    /// Decode a wire tag plus JSON payload.
    ///
    /// The tag is checked against [`EVENT_TYPES`] first so an unknown tag is
    /// always [`ScheduleError::UnsupportedEventType`], never a payload error.
    pub fn from_wire(event_type: &str, payload: &Value) -> Result<EventKind, ScheduleError> {
        if !EVENT_TYPES.contains(&event_type) {
            return Err(ScheduleError::UnsupportedEventType {
                event_type: event_type.to_string(),
            });
        }
        let invalid = |detail: String| ScheduleError::InvalidEventPayload {
            event_type: event_type.to_string(),
            detail,
        };

        let mut obj = match payload {
            Value::Object(m) => m.clone(),
            Value::Null => Map::new(),
            other => return Err(invalid(format!("payload must be an object, got {other}"))),
        };
        obj.insert("type".to_string(), Value::String(event_type.to_string()));

        let kind: EventKind =
            serde_json::from_value(Value::Object(obj)).map_err(|e| invalid(e.to_string()))?;

        if let EventKind::AmountAdjustment {
            amount_reporting_delta,
            amount_local_delta,
        } = &kind
        {
            if amount_reporting_delta.is_none() && amount_local_delta.is_none() {
                return Err(invalid(
                    "at least one of amount_reporting_delta, amount_local_delta is required"
                        .to_string(),
                ));
            }
            for (field, delta) in [
                ("amount_reporting_delta", amount_reporting_delta),
                ("amount_local_delta", amount_local_delta),
            ] {
                if let Some(d) = delta.filter(|d| !d.is_within_limit()) {
                    return Err(invalid(format!("{field} {d} exceeds {}", Money::LIMIT)));
                }
            }
        }
        Ok(kind)
    }

    /// Variant fields as a JSON object, without the tag.
    pub fn payload(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut m)) => {
                m.remove("type");
                Value::Object(m)
            }
            _ => Value::Object(Map::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// EventDraft
// ---------------------------------------------------------------------------

/// An amendment as submitted, before validation.
///
/// Deliberately loose (string tag, string period, JSON payload) so every
/// malformed input maps to a distinct [`ScheduleError`] at the append
/// boundary instead of a generic decode failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(rename = "type")]
    pub event_type: String,
    pub effective_period: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub reason: Option<String>,
}

impl EventDraft {
    pub fn new<T: Into<String>, P: Into<String>>(event_type: T, effective_period: P) -> Self {
        Self {
            event_type: event_type.into(),
            effective_period: effective_period.into(),
            payload: Value::Null,
            reason: None,
        }
    }

    /// Draft for a typed variant.
    pub fn from_kind(kind: &EventKind, effective_period: Period) -> Self {
        Self {
            event_type: kind.event_type().to_string(),
            effective_period: effective_period.key(),
            payload: kind.payload(),
            reason: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ScheduleEvent
// ---------------------------------------------------------------------------

/// An accepted amendment. Never mutated or deleted once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub event_id: Uuid,
    pub schedule_id: ScheduleId,
    /// Per-schedule append sequence (1-based). Final replay tie-break.
    pub seq: u64,
    pub effective_period: Period,
    /// Wall-clock append time; used only to order events that share an
    /// effective period.
    pub created_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub kind: EventKind,
}

/// Deterministic event id from the schedule id and append sequence.
///
/// No RNG: replaying the same appends yields the same ids.
pub fn derive_event_id(schedule_id: &ScheduleId, seq: u64) -> Uuid {
    let name = format!("cbk-event:{}:{}", schedule_id.as_str(), seq);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tag_is_unsupported_even_with_bad_payload() {
        let err = EventKind::from_wire("WRITE_OFF", &json!(42)).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_EVENT_TYPE");
    }

    #[test]
    fn amount_adjustment_parses_partial_deltas() {
        let kind =
            EventKind::from_wire("AMOUNT_ADJUSTMENT", &json!({"amount_reporting_delta": 12.5}))
                .unwrap();
        assert_eq!(
            kind,
            EventKind::AmountAdjustment {
                amount_reporting_delta: Some(Money::from_cents(1_250)),
                amount_local_delta: None,
            }
        );
    }

    #[test]
    fn empty_amount_adjustment_is_invalid() {
        let err = EventKind::from_wire("AMOUNT_ADJUSTMENT", &json!({})).unwrap_err();
        assert_eq!(err.code(), "INVALID_EVENT_PAYLOAD");
    }

    #[test]
    fn delta_beyond_limit_is_invalid() {
        let err = EventKind::from_wire(
            "AMOUNT_ADJUSTMENT",
            &json!({"amount_reporting_delta": "90000000000000000"}),
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_EVENT_PAYLOAD");
        assert!(err.to_string().contains("amount_reporting_delta"), "{err}");

        let err = EventKind::from_wire(
            "AMOUNT_ADJUSTMENT",
            &json!({"amount_reporting_delta": 1, "amount_local_delta": "-10000000000000"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("amount_local_delta"), "{err}");

        assert!(EventKind::from_wire(
            "AMOUNT_ADJUSTMENT",
            &json!({"amount_local_delta": "-9999999999999.99"}),
        )
        .is_ok());
    }

    #[test]
    fn timeline_requires_new_end_date() {
        let err = EventKind::from_wire("TIMELINE_EXTENSION", &Value::Null).unwrap_err();
        assert_eq!(err.code(), "INVALID_EVENT_PAYLOAD");

        let err = EventKind::from_wire("TIMELINE_REDUCTION", &json!({"new_end_date": "2024-1"}))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_EVENT_PAYLOAD");
    }

    #[test]
    fn onboarding_boundary_needs_no_payload() {
        let kind = EventKind::from_wire("ONBOARDING_BOUNDARY", &Value::Null).unwrap();
        assert_eq!(kind, EventKind::OnboardingBoundary);
        assert_eq!(kind.payload(), json!({}));
    }

    #[test]
    fn draft_from_kind_decodes_back() {
        let kind = EventKind::TimelineExtension {
            new_end_date: Period::parse("2025-06").unwrap(),
        };
        let draft = EventDraft::from_kind(&kind, Period::parse("2024-03").unwrap());
        assert_eq!(draft.event_type, "TIMELINE_EXTENSION");
        assert_eq!(draft.effective_period, "2024-03");
        assert_eq!(
            EventKind::from_wire(&draft.event_type, &draft.payload).unwrap(),
            kind
        );
    }

    #[test]
    fn event_ids_are_deterministic() {
        let id = ScheduleId::new("sch-1");
        assert_eq!(derive_event_id(&id, 1), derive_event_id(&id, 1));
        assert_ne!(derive_event_id(&id, 1), derive_event_id(&id, 2));
        assert_ne!(
            derive_event_id(&id, 1),
            derive_event_id(&ScheduleId::new("sch-2"), 1)
        );
    }
}
