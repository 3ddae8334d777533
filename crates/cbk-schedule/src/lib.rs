//! cbk-schedule
//!
//! Schedule model and the deterministic rebuild engine.
//!
//! - A [`ScheduleMaster`] is immutable after creation; its terms change only
//!   through an append-only log of [`ScheduleEvent`]s.
//! - [`validate_draft`] is the append boundary: unknown tags, events before
//!   the schedule start and events into closed periods are rejected here.
//!   [`validate_amount_range`] then checks the candidate log's totals.
//! - [`rebuild`] replays the log in canonical order and produces one
//!   [`PeriodLine`] per calendar month, with a final-period true-up so the
//!   schedule ties to its total exactly.
//!
//! Pure deterministic logic. No IO, no wall-clock, no randomness. Closure
//! status is read through the [`ClosureLookup`] seam; timestamps and ids are
//! assigned by the caller (the repository).

mod engine;
mod error;
mod event;
mod line;
mod lookup;
mod ordering;
mod types;
mod validate;

pub use engine::{rebuild, rebuild_with, replay, AdjustmentNote, RebuildPolicy, ReplayState};
pub use error::ScheduleError;
pub use event::{derive_event_id, EventDraft, EventKind, ScheduleEvent, EVENT_TYPES};
pub use line::{LineState, PeriodLine};
pub use lookup::{ClosureLookup, NoClosures};
pub use ordering::{is_canonical, sort_events_canonical};
pub use types::{NewSchedule, ScheduleId, ScheduleMaster};
pub use validate::{validate_amount_range, validate_draft, ValidatedEvent};

pub use cbk_money::Money;
pub use cbk_period::{months_between, Period};
