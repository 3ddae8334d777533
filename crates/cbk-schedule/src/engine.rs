//! Rebuild engine.
//!
//! `rebuild` is a pure function of (schedule, events, closure view):
//!
//! 1. **Replay**: walk the events in canonical order and fold them into the
//!    final scalar state: totals, fx, end date, posting start, and a
//!    per-period map of adjustment annotations.
//! 2. **Generate**: split the final totals straight-line across every month
//!    from start to end, resolve each month's [`LineState`], and let the last
//!    month absorb the rounding residue (true-up) so cumulative totals land
//!    exactly on the final totals.
//!
//! Same inputs, same output, byte for byte. No IO, no clock.
//!
//! Amounts saturate instead of overflowing. Appends that would push a total
//! past [`Money::LIMIT`] are refused by
//! [`validate_amount_range`](crate::validate_amount_range), so saturation
//! only shows on logs that never went through the repository.

use std::collections::BTreeMap;

use cbk_money::Money;
use cbk_period::{months_between, Period};
use serde::{Deserialize, Serialize};

use crate::ordering::sort_refs_canonical;
use crate::{ClosureLookup, EventKind, LineState, PeriodLine, ScheduleEvent, ScheduleMaster};

const EXPLAIN_EXTERNAL: &str = "Outside system responsibility (late onboarding)";
const EXPLAIN_CLOSED: &str = "Period closed, immutable";
const EXPLAIN_ADJUSTED: &str = "Amount adjustment applied";
const EXPLAIN_BASE: &str = "Standard allocation";
const TRUE_UP_SUFFIX: &str = " (true-up applied)";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Knobs that shape a rebuild without being part of the schedule itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildPolicy {
    /// Periods generated for a schedule with no end date (12 by convention:
    /// start + 11 months).
    pub open_ended_periods: u32,
}

impl Default for RebuildPolicy {
    fn default() -> Self {
        Self {
            open_ended_periods: 12,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase 1: replay
// ---------------------------------------------------------------------------

/// Adjustment deltas that landed on one period, summed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdjustmentNote {
    pub reporting_delta: Money,
    pub local_delta: Money,
    /// Reason of the last adjustment on this period that carried one.
    pub reason: Option<String>,
}

/// Final scalar state after replaying the whole log.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayState {
    pub total_reporting: Money,
    pub total_local: Money,
    pub fx: f64,
    pub end_date: Period,
    pub posting_start: Option<Period>,
    pub adjustments: BTreeMap<Period, AdjustmentNote>,
    /// Local-delta events whose fx recompute was skipped because the local
    /// total was zero at that point.
    pub fx_recompute_skipped: u32,
}

/// Fold `events` (any order; sorted here) into the final scalar state.
pub fn replay(
    schedule: &ScheduleMaster,
    events: &[ScheduleEvent],
    policy: &RebuildPolicy,
) -> ReplayState {
    let mut ordered: Vec<&ScheduleEvent> = events.iter().collect();
    sort_refs_canonical(&mut ordered);

    let mut total_reporting = schedule.total_amount_reporting_initial;
    let mut total_local = schedule.total_amount_local_initial;
    let mut fx = schedule.implied_fx_initial;
    let mut end_date = schedule.end_date;
    let mut posting_start = schedule.system_posting_start_period;
    let mut adjustments: BTreeMap<Period, AdjustmentNote> = BTreeMap::new();
    let mut fx_recompute_skipped = 0u32;

    for ev in ordered {
        debug_assert_eq!(ev.schedule_id, schedule.schedule_id);
        match &ev.kind {
            EventKind::AmountAdjustment {
                amount_reporting_delta,
                amount_local_delta,
            } => {
                let rep = amount_reporting_delta.unwrap_or(Money::ZERO);
                let loc = amount_local_delta.unwrap_or(Money::ZERO);
                total_reporting = total_reporting.saturating_add(rep);
                total_local = total_local.saturating_add(loc);

                let note = adjustments
                    .entry(ev.effective_period)
                    .or_insert(AdjustmentNote {
                        reporting_delta: Money::ZERO,
                        local_delta: Money::ZERO,
                        reason: None,
                    });
                note.reporting_delta = note.reporting_delta.saturating_add(rep);
                note.local_delta = note.local_delta.saturating_add(loc);
                if ev.reason.is_some() {
                    note.reason = ev.reason.clone();
                }

                if amount_local_delta.is_some() {
                    // Zero local total: keep the prior fx.
                    match total_reporting.ratio(total_local) {
                        Some(r) => fx = r,
                        None => fx_recompute_skipped += 1,
                    }
                }
            }
            EventKind::TimelineExtension { new_end_date }
            | EventKind::TimelineReduction { new_end_date } => {
                end_date = Some(*new_end_date);
            }
            EventKind::OnboardingBoundary => {
                posting_start = Some(ev.effective_period);
            }
        }
    }

    // Creation refuses open-ended spans past Period::MAX; a hand-built
    // master that skipped it is clamped there.
    let end_date = end_date.unwrap_or_else(|| {
        let span = i64::from(policy.open_ended_periods.max(1));
        schedule
            .start_date
            .add_months(span - 1)
            .unwrap_or(Period::MAX)
    });

    ReplayState {
        total_reporting,
        total_local,
        fx,
        end_date,
        posting_start,
        adjustments,
        fx_recompute_skipped,
    }
}

// ---------------------------------------------------------------------------
// Phase 2: generate
// ---------------------------------------------------------------------------

/// Rebuild with the default policy.
pub fn rebuild<C>(
    schedule: &ScheduleMaster,
    events: &[ScheduleEvent],
    closures: &C,
) -> Vec<PeriodLine>
where
    C: ClosureLookup + ?Sized,
{
    rebuild_with(&RebuildPolicy::default(), schedule, events, closures)
}

/// Replay `events` and generate one line per month from start to the
/// resolved end date.
///
/// # Panics
/// If the resolved end date precedes the start. Append-time validation
/// rejects such events, so this only fires on corrupt input.
pub fn rebuild_with<C>(
    policy: &RebuildPolicy,
    schedule: &ScheduleMaster,
    events: &[ScheduleEvent],
    closures: &C,
) -> Vec<PeriodLine>
where
    C: ClosureLookup + ?Sized,
{
    let st = replay(schedule, events, policy);
    let start = schedule.start_date;
    let count = months_between(start, st.end_date);
    assert!(
        count >= 1,
        "schedule {}: resolved end {} precedes start {}",
        schedule.schedule_id,
        st.end_date,
        start
    );

    let reporting_per_period = st.total_reporting.div_round(count);
    let local_per_period = st.total_local.div_round(count);

    let mut cumulative_reporting = Money::ZERO;
    let mut cumulative_local = Money::ZERO;
    let mut lines = Vec::with_capacity(usize::try_from(count).unwrap_or(0));

    for (i, period) in Period::range_inclusive(start, st.end_date).enumerate() {
        let is_last = i as i64 == count - 1;

        // True-up: the last period takes whatever is left so the schedule
        // ties to the total exactly.
        let (amount_reporting, amount_local) = if is_last {
            (
                st.total_reporting.saturating_sub(cumulative_reporting),
                st.total_local.saturating_sub(cumulative_local),
            )
        } else {
            (reporting_per_period, local_per_period)
        };
        cumulative_reporting = cumulative_reporting.saturating_add(amount_reporting);
        cumulative_local = cumulative_local.saturating_add(amount_local);

        let (state, mut explanation, adjustment_delta) =
            resolve_state(&schedule.entity_id, &st, closures, period);
        if is_last && amount_reporting.saturating_sub(reporting_per_period).abs() > Money::CENT {
            explanation.push_str(TRUE_UP_SUFFIX);
        }

        lines.push(PeriodLine {
            period,
            state,
            amount_reporting,
            amount_local,
            effective_fx: st.fx,
            cumulative_amount_reporting: cumulative_reporting,
            cumulative_amount_local: cumulative_local,
            remaining_amount_reporting: st.total_reporting.saturating_sub(cumulative_reporting),
            remaining_amount_local: st.total_local.saturating_sub(cumulative_local),
            adjustment_delta,
            explanation,
        });
    }

    lines
}

/// First match wins: EXTERNAL, CLOSED, SYSTEM_ADJUSTED, SYSTEM_BASE.
fn resolve_state<C>(
    entity_id: &str,
    st: &ReplayState,
    closures: &C,
    period: Period,
) -> (LineState, String, Option<Money>)
where
    C: ClosureLookup + ?Sized,
{
    if matches!(st.posting_start, Some(ps) if period < ps) {
        return (LineState::External, EXPLAIN_EXTERNAL.to_string(), None);
    }
    if closures.is_closed(entity_id, period) {
        return (LineState::Closed, EXPLAIN_CLOSED.to_string(), None);
    }
    if let Some(note) = st.adjustments.get(&period) {
        let explanation = note
            .reason
            .clone()
            .unwrap_or_else(|| EXPLAIN_ADJUSTED.to_string());
        return (
            LineState::SystemAdjusted,
            explanation,
            Some(note.reporting_delta),
        );
    }
    (LineState::SystemBase, EXPLAIN_BASE.to_string(), None)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewSchedule, NoClosures, ScheduleId};
    use chrono::{TimeZone, Utc};

    fn p(s: &str) -> Period {
        Period::parse(s).unwrap()
    }

    fn schedule(end: Option<&str>) -> ScheduleMaster {
        ScheduleMaster::create(
            ScheduleId::new("s1"),
            NewSchedule {
                schedule_id: None,
                entity_id: "E1".to_string(),
                schedule_type: None,
                start_date: p("2024-01"),
                end_date: end.map(p),
                total_amount_local: Money::from_cents(10_000),
                total_amount_reporting: Money::from_cents(12_000),
                system_posting_start_period: None,
            },
            &RebuildPolicy::default(),
        )
        .unwrap()
    }

    fn ev(seq: u64, period: &str, kind: EventKind, reason: Option<&str>) -> ScheduleEvent {
        ScheduleEvent {
            event_id: crate::derive_event_id(&ScheduleId::new("s1"), seq),
            schedule_id: ScheduleId::new("s1"),
            seq,
            effective_period: p(period),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, seq as u32).unwrap(),
            reason: reason.map(str::to_string),
            kind,
        }
    }

    #[test]
    fn open_ended_schedule_defaults_to_twelve_periods() {
        let st = replay(&schedule(None), &[], &RebuildPolicy::default());
        assert_eq!(st.end_date, p("2024-12"));

        let lines = rebuild(&schedule(None), &[], &NoClosures);
        assert_eq!(lines.len(), 12);
    }

    #[test]
    fn open_ended_period_count_follows_policy() {
        let policy = RebuildPolicy {
            open_ended_periods: 24,
        };
        let st = replay(&schedule(None), &[], &policy);
        assert_eq!(st.end_date, p("2025-12"));
    }

    #[test]
    fn last_timeline_event_wins() {
        let events = vec![
            ev(1, "2024-02", EventKind::TimelineExtension { new_end_date: p("2024-12") }, None),
            ev(2, "2024-03", EventKind::TimelineReduction { new_end_date: p("2024-06") }, None),
        ];
        let st = replay(&schedule(Some("2024-03")), &events, &RebuildPolicy::default());
        assert_eq!(st.end_date, p("2024-06"));
    }

    #[test]
    fn adjustments_on_same_period_are_summed_last_reason_wins() {
        let adj = |r: i64| EventKind::AmountAdjustment {
            amount_reporting_delta: Some(Money::from_cents(r)),
            amount_local_delta: None,
        };
        let events = vec![
            ev(1, "2024-02", adj(500), Some("first")),
            ev(2, "2024-02", adj(250), Some("second")),
            ev(3, "2024-02", adj(100), None),
        ];
        let st = replay(&schedule(Some("2024-03")), &events, &RebuildPolicy::default());
        let note = &st.adjustments[&p("2024-02")];
        assert_eq!(note.reporting_delta, Money::from_cents(850));
        assert_eq!(note.reason.as_deref(), Some("second"));
        assert_eq!(st.total_reporting, Money::from_cents(12_850));
    }

    #[test]
    fn reporting_only_delta_does_not_recompute_fx() {
        let events = vec![ev(
            1,
            "2024-02",
            EventKind::AmountAdjustment {
                amount_reporting_delta: Some(Money::from_cents(3_000)),
                amount_local_delta: None,
            },
            None,
        )];
        let st = replay(&schedule(Some("2024-03")), &events, &RebuildPolicy::default());
        assert_eq!(st.fx, 1.2);
    }

    #[test]
    fn zero_local_total_keeps_prior_fx() {
        let events = vec![ev(
            1,
            "2024-02",
            EventKind::AmountAdjustment {
                amount_reporting_delta: None,
                amount_local_delta: Some(Money::from_cents(-10_000)),
            },
            None,
        )];
        let st = replay(&schedule(Some("2024-03")), &events, &RebuildPolicy::default());
        assert_eq!(st.total_local, Money::ZERO);
        assert_eq!(st.fx, 1.2);
        assert_eq!(st.fx_recompute_skipped, 1);
    }

    #[test]
    fn unvalidated_huge_deltas_saturate() {
        let adj = EventKind::AmountAdjustment {
            amount_reporting_delta: Some(Money::from_cents(9_000_000_000_000_000_000)),
            amount_local_delta: None,
        };
        let events = vec![ev(1, "2024-02", adj.clone(), None), ev(2, "2024-02", adj, None)];
        let st = replay(&schedule(Some("2024-03")), &events, &RebuildPolicy::default());
        assert_eq!(st.total_reporting, Money::MAX);
        assert_eq!(st.adjustments[&p("2024-02")].reporting_delta, Money::MAX);

        let lines = rebuild(&schedule(Some("2024-03")), &events, &NoClosures);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].cumulative_amount_reporting, Money::MAX);
    }

    #[test]
    fn hand_built_open_ended_master_clamps_at_last_period() {
        let mut master = schedule(None);
        master.start_date = p("9999-06");
        let st = replay(&master, &[], &RebuildPolicy::default());
        assert_eq!(st.end_date, Period::MAX);
    }

    #[test]
    #[should_panic(expected = "precedes start")]
    fn unvalidated_end_before_start_panics() {
        let events = vec![ev(
            1,
            "2024-01",
            EventKind::TimelineReduction {
                new_end_date: p("2023-06"),
            },
            None,
        )];
        let _ = rebuild(&schedule(Some("2024-03")), &events, &NoClosures);
    }
}
