use cbk_period::Period;

/// Every failure the schedule boundary can surface.
///
/// Append-time variants are returned before any state changes; the log and
/// the cached lines are untouched when one of them comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The referenced schedule does not exist.
    ScheduleNotFound { schedule_id: String },
    /// A schedule with this id already exists.
    DuplicateSchedule { schedule_id: String },
    /// Creation terms violate a schedule invariant.
    InvalidSchedule { detail: String },
    /// Event tag outside the known variant set.
    UnsupportedEventType { event_type: String },
    /// Known tag, but the payload does not match the variant.
    InvalidEventPayload { event_type: String, detail: String },
    /// Not a `YYYY-MM` key.
    InvalidPeriod { input: String },
    /// `effective_period` precedes the schedule start.
    EventBeforeScheduleStart {
        effective_period: Period,
        start_date: Period,
    },
    /// Amendment into a closed (immutable) period.
    PeriodClosed { entity_id: String, period: Period },
    /// An end date before the schedule start.
    EndBeforeScheduleStart { end_date: Period, start_date: Period },
    /// The journal could not record the mutation; nothing was applied.
    Persistence { detail: String },
}

impl ScheduleError {
    /// Stable machine-readable code surfaced to HTTP callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ScheduleNotFound { .. } => "SCHEDULE_NOT_FOUND",
            Self::DuplicateSchedule { .. } => "DUPLICATE_SCHEDULE",
            Self::InvalidSchedule { .. } => "INVALID_SCHEDULE",
            Self::UnsupportedEventType { .. } => "UNSUPPORTED_EVENT_TYPE",
            Self::InvalidEventPayload { .. } => "INVALID_EVENT_PAYLOAD",
            Self::InvalidPeriod { .. } => "INVALID_PERIOD",
            Self::EventBeforeScheduleStart { .. } => "EVENT_BEFORE_SCHEDULE_START",
            Self::PeriodClosed { .. } => "PERIOD_CLOSED",
            Self::EndBeforeScheduleStart { .. } => "END_BEFORE_SCHEDULE_START",
            Self::Persistence { .. } => "PERSISTENCE_FAILED",
        }
    }

    /// `true` for caller mistakes (bad input), as opposed to missing
    /// resources, conflicts or infrastructure failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSchedule { .. }
                | Self::UnsupportedEventType { .. }
                | Self::InvalidEventPayload { .. }
                | Self::InvalidPeriod { .. }
                | Self::EventBeforeScheduleStart { .. }
                | Self::PeriodClosed { .. }
                | Self::EndBeforeScheduleStart { .. }
        )
    }
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScheduleNotFound { schedule_id } => {
                write!(f, "schedule {schedule_id} not found")
            }
            Self::DuplicateSchedule { schedule_id } => {
                write!(f, "schedule {schedule_id} already exists")
            }
            Self::InvalidSchedule { detail } => write!(f, "invalid schedule: {detail}"),
            Self::UnsupportedEventType { event_type } => {
                write!(f, "unsupported event type {event_type:?}")
            }
            Self::InvalidEventPayload { event_type, detail } => {
                write!(f, "invalid payload for {event_type}: {detail}")
            }
            Self::InvalidPeriod { input } => {
                write!(f, "invalid period {input:?}: expected YYYY-MM")
            }
            Self::EventBeforeScheduleStart {
                effective_period,
                start_date,
            } => write!(
                f,
                "effective period {effective_period} is before schedule start {start_date}"
            ),
            Self::PeriodClosed { entity_id, period } => write!(
                f,
                "period {period} is closed for entity {entity_id}; changes must be prospective only"
            ),
            Self::EndBeforeScheduleStart {
                end_date,
                start_date,
            } => write!(
                f,
                "end date {end_date} is before schedule start {start_date}"
            ),
            Self::Persistence { detail } => write!(f, "journal write failed: {detail}"),
        }
    }
}

impl std::error::Error for ScheduleError {}
