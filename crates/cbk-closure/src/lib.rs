//! cbk-closure
//!
//! Period closure registry.
//!
//! - (entity_id, period) is OPEN until closed; closing is permanent.
//! - Re-closing is a no-op that reports the original `closed_at`.
//! - The rebuild engine reads closures through [`ClosureLookup`]; it never
//!   writes here.
//!
//! Pure deterministic logic. No IO, no wall-clock: callers pass `now`.

use std::collections::BTreeMap;

use cbk_period::Period;
use cbk_schedule::ClosureLookup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodState {
    Open,
    Closed,
}

impl PeriodState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodState::Open => "OPEN",
            PeriodState::Closed => "CLOSED",
        }
    }
}

/// Status of one (entity, period) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodStatus {
    pub entity_id: String,
    pub period: Period,
    pub status: PeriodState,
    /// Set iff `status == Closed`.
    pub closed_at: Option<DateTime<Utc>>,
}

impl PeriodStatus {
    pub fn open(entity_id: &str, period: Period) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            period,
            status: PeriodState::Open,
            closed_at: None,
        }
    }

    pub fn closed(entity_id: &str, period: Period, closed_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            period,
            status: PeriodState::Closed,
            closed_at: Some(closed_at),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == PeriodState::Closed
    }
}

/// Result of [`PeriodClosureRegistry::close`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseOutcome {
    pub status: PeriodStatus,
    /// `false` when the period was already closed (nothing changed).
    pub newly_closed: bool,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Closed periods keyed by (entity_id, period). Absent means OPEN.
#[derive(Clone, Debug, Default)]
pub struct PeriodClosureRegistry {
    closed: BTreeMap<(String, Period), DateTime<Utc>>,
}

impl PeriodClosureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close (entity_id, period) at `now`. Idempotent: a second close keeps
    /// the first `closed_at`.
    pub fn close(&mut self, entity_id: &str, period: Period, now: DateTime<Utc>) -> CloseOutcome {
        let key = (entity_id.to_string(), period);
        if let Some(at) = self.closed.get(&key) {
            return CloseOutcome {
                status: PeriodStatus::closed(entity_id, period, *at),
                newly_closed: false,
            };
        }
        self.closed.insert(key, now);
        CloseOutcome {
            status: PeriodStatus::closed(entity_id, period, now),
            newly_closed: true,
        }
    }

    /// Record a closure read back from durable storage. Returns `false` if
    /// the pair was already closed; the stored timestamp is kept.
    pub fn insert_closed(
        &mut self,
        entity_id: &str,
        period: Period,
        closed_at: DateTime<Utc>,
    ) -> bool {
        let key = (entity_id.to_string(), period);
        if self.closed.contains_key(&key) {
            return false;
        }
        self.closed.insert(key, closed_at);
        true
    }

    pub fn status(&self, entity_id: &str, period: Period) -> PeriodStatus {
        match self.closed.get(&(entity_id.to_string(), period)) {
            Some(at) => PeriodStatus::closed(entity_id, period, *at),
            None => PeriodStatus::open(entity_id, period),
        }
    }

    pub fn is_closed(&self, entity_id: &str, period: Period) -> bool {
        self.closed.contains_key(&(entity_id.to_string(), period))
    }

    /// Every closed period of `entity_id`, ascending.
    pub fn closed_periods(&self, entity_id: &str) -> Vec<PeriodStatus> {
        self.closed
            .range((entity_id.to_string(), Period::MIN)..=(entity_id.to_string(), Period::MAX))
            .map(|((e, p), at)| PeriodStatus::closed(e, *p, *at))
            .collect()
    }

    /// Number of closed (entity, period) pairs across all entities.
    pub fn len(&self) -> usize {
        self.closed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty()
    }
}

impl ClosureLookup for PeriodClosureRegistry {
    fn is_closed(&self, entity_id: &str, period: Period) -> bool {
        PeriodClosureRegistry::is_closed(self, entity_id, period)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
