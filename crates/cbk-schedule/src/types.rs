use cbk_money::Money;
use cbk_period::{months_between, Period};
use serde::{Deserialize, Serialize};

use crate::{RebuildPolicy, ScheduleError};

/// Opaque schedule identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(pub String);

impl ScheduleId {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creation terms for a schedule, as submitted by a caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSchedule {
    /// Caller-chosen id; the repository assigns one when absent.
    #[serde(default)]
    pub schedule_id: Option<String>,
    pub entity_id: String,
    /// Free-form instrument label (prepaid, fixed asset, ...). Opaque here.
    #[serde(default)]
    pub schedule_type: Option<String>,
    pub start_date: Period,
    /// `None` = ongoing.
    #[serde(default)]
    pub end_date: Option<Period>,
    pub total_amount_local: Money,
    pub total_amount_reporting: Money,
    #[serde(default)]
    pub system_posting_start_period: Option<Period>,
}

/// One financial instrument's recognition terms at creation.
///
/// Immutable: amendments are events, never edits to these fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMaster {
    pub schedule_id: ScheduleId,
    pub entity_id: String,
    pub schedule_type: Option<String>,
    pub start_date: Period,
    pub end_date: Option<Period>,
    pub total_amount_local_initial: Money,
    pub total_amount_reporting_initial: Money,
    /// reporting / local at creation.
    pub implied_fx_initial: f64,
    /// Month count at creation; the open-ended default for ongoing schedules.
    pub recognition_periods: u32,
    pub system_posting_start_period: Option<Period>,
}

impl ScheduleMaster {
    /// Validate creation terms and derive the initial fx and period count.
    pub fn create(
        schedule_id: ScheduleId,
        terms: NewSchedule,
        policy: &RebuildPolicy,
    ) -> Result<Self, ScheduleError> {
        if schedule_id.as_str().trim().is_empty() {
            return Err(ScheduleError::InvalidSchedule {
                detail: "schedule_id must not be empty".to_string(),
            });
        }
        if terms.entity_id.trim().is_empty() {
            return Err(ScheduleError::InvalidSchedule {
                detail: "entity_id must not be empty".to_string(),
            });
        }
        if !terms.total_amount_local.is_positive() {
            return Err(ScheduleError::InvalidSchedule {
                detail: format!(
                    "total_amount_local must be > 0, got {}",
                    terms.total_amount_local
                ),
            });
        }
        for (field, amount) in [
            ("total_amount_local", terms.total_amount_local),
            ("total_amount_reporting", terms.total_amount_reporting),
        ] {
            if !amount.is_within_limit() {
                return Err(ScheduleError::InvalidSchedule {
                    detail: format!("{field} {amount} exceeds {}", Money::LIMIT),
                });
            }
        }
        if let Some(end) = terms.end_date {
            if end < terms.start_date {
                return Err(ScheduleError::EndBeforeScheduleStart {
                    end_date: end,
                    start_date: terms.start_date,
                });
            }
        }

        let recognition_periods = match terms.end_date {
            Some(end) => u32::try_from(months_between(terms.start_date, end)).map_err(|_| {
                ScheduleError::InvalidSchedule {
                    detail: "recognition span too long".to_string(),
                }
            })?,
            None => {
                let span = i64::from(policy.open_ended_periods.max(1));
                if terms.start_date.add_months(span - 1).is_none() {
                    return Err(ScheduleError::InvalidSchedule {
                        detail: format!(
                            "open-ended schedule from {} runs past {}",
                            terms.start_date,
                            Period::MAX
                        ),
                    });
                }
                policy.open_ended_periods
            }
        };

        // total_amount_local > 0 was checked above, so the ratio exists.
        let implied_fx_initial = terms
            .total_amount_reporting
            .ratio(terms.total_amount_local)
            .unwrap_or(1.0);

        Ok(Self {
            schedule_id,
            entity_id: terms.entity_id,
            schedule_type: terms.schedule_type,
            start_date: terms.start_date,
            end_date: terms.end_date,
            total_amount_local_initial: terms.total_amount_local,
            total_amount_reporting_initial: terms.total_amount_reporting,
            implied_fx_initial,
            recognition_periods,
            system_posting_start_period: terms.system_posting_start_period,
        })
    }
}
