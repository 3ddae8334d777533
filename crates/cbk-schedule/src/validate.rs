use std::collections::BTreeMap;

use cbk_money::Money;
use cbk_period::Period;

use crate::ordering::is_canonical;
use crate::{ClosureLookup, EventDraft, EventKind, ScheduleError, ScheduleEvent, ScheduleMaster};

/// A draft that passed every append-time check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedEvent {
    pub kind: EventKind,
    pub effective_period: Period,
    pub reason: Option<String>,
}

/// Run the append-time checks, in order:
///
/// 1. known tag, then a payload matching that tag;
/// 2. well-formed `effective_period`, not before the schedule start;
/// 3. `(entity_id, effective_period)` not closed;
/// 4. timeline events keep the end date at or after the schedule start.
///
/// The first failing check is returned. Closed periods are immutable: a
/// draft landing in one is always rejected, whatever its variant.
pub fn validate_draft<C>(
    schedule: &ScheduleMaster,
    draft: &EventDraft,
    closures: &C,
) -> Result<ValidatedEvent, ScheduleError>
where
    C: ClosureLookup + ?Sized,
{
    let kind = EventKind::from_wire(&draft.event_type, &draft.payload)?;

    let effective_period =
        Period::parse(draft.effective_period.trim()).map_err(|e| ScheduleError::InvalidPeriod {
            input: e.input,
        })?;
    if effective_period < schedule.start_date {
        return Err(ScheduleError::EventBeforeScheduleStart {
            effective_period,
            start_date: schedule.start_date,
        });
    }

    if closures.is_closed(&schedule.entity_id, effective_period) {
        return Err(ScheduleError::PeriodClosed {
            entity_id: schedule.entity_id.clone(),
            period: effective_period,
        });
    }

    if let EventKind::TimelineExtension { new_end_date }
    | EventKind::TimelineReduction { new_end_date } = &kind
    {
        if *new_end_date < schedule.start_date {
            return Err(ScheduleError::EndBeforeScheduleStart {
                end_date: *new_end_date,
                start_date: schedule.start_date,
            });
        }
    }

    let reason = draft
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    Ok(ValidatedEvent {
        kind,
        effective_period,
        reason,
    })
}

/// Replay the amount deltas of `log` with checked arithmetic.
///
/// `log` is the canonical log with the candidate event already in place.
/// Every running total, and every per-period sum of deltas, must stay within
/// [`Money::LIMIT`]; otherwise the candidate is INVALID_EVENT_PAYLOAD.
pub fn validate_amount_range(
    schedule: &ScheduleMaster,
    log: &[ScheduleEvent],
    event_type: &str,
) -> Result<(), ScheduleError> {
    debug_assert!(is_canonical(log), "log must be in canonical order");

    let out_of_range = |what: String| ScheduleError::InvalidEventPayload {
        event_type: event_type.to_string(),
        detail: format!("{what} would exceed {}", Money::LIMIT),
    };
    let bounded = |a: Money, b: Money| a.checked_add(b).filter(|m| m.is_within_limit());

    let mut total_reporting = schedule.total_amount_reporting_initial;
    let mut total_local = schedule.total_amount_local_initial;
    let mut per_period: BTreeMap<Period, (Money, Money)> = BTreeMap::new();

    for ev in log {
        let EventKind::AmountAdjustment {
            amount_reporting_delta,
            amount_local_delta,
        } = &ev.kind
        else {
            continue;
        };
        let rep = amount_reporting_delta.unwrap_or(Money::ZERO);
        let loc = amount_local_delta.unwrap_or(Money::ZERO);

        total_reporting = bounded(total_reporting, rep)
            .ok_or_else(|| out_of_range("total_amount_reporting".to_string()))?;
        total_local = bounded(total_local, loc)
            .ok_or_else(|| out_of_range("total_amount_local".to_string()))?;

        let (period_rep, period_loc) = per_period
            .entry(ev.effective_period)
            .or_insert((Money::ZERO, Money::ZERO));
        let period = ev.effective_period;
        *period_rep = bounded(*period_rep, rep)
            .ok_or_else(|| out_of_range(format!("reporting adjustment on {period}")))?;
        *period_loc = bounded(*period_loc, loc)
            .ok_or_else(|| out_of_range(format!("local adjustment on {period}")))?;
    }
    Ok(())
}
