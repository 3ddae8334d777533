//! Canonical replay order.
//!
//! Events are replayed sorted by `(effective_period, created_at, seq)`
//! ascending. The same set of events must always produce the same lines
//! regardless of the order in which they were appended, so the log is
//! re-sorted into this order on every append and the engine sorts its own
//! view again before replaying.
//!
//! `seq` is unique per schedule, which makes the order total: no two events
//! ever compare equal, so the result does not depend on sort stability.

use std::cmp::Ordering;

use crate::ScheduleEvent;

fn canonical_cmp(a: &ScheduleEvent, b: &ScheduleEvent) -> Ordering {
    a.effective_period
        .cmp(&b.effective_period)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.seq.cmp(&b.seq))
}

/// Sort `events` into canonical order in place.
pub fn sort_events_canonical(events: &mut [ScheduleEvent]) {
    events.sort_by(canonical_cmp);
}

pub(crate) fn sort_refs_canonical(events: &mut [&ScheduleEvent]) {
    events.sort_by(|a, b| canonical_cmp(a, b));
}

/// `true` when `events` is already in canonical order.
pub fn is_canonical(events: &[ScheduleEvent]) -> bool {
    events
        .windows(2)
        .all(|w| canonical_cmp(&w[0], &w[1]) != Ordering::Greater)
}
