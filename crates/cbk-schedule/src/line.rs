use cbk_money::Money;
use cbk_period::Period;
use serde::{Deserialize, Serialize};

/// Per-period state, resolved in priority order (first match wins):
/// `External` > `Closed` > `SystemAdjusted` > `SystemBase`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineState {
    /// Before the system posting start (late onboarding).
    External,
    /// Period closed for the owning entity; immutable.
    Closed,
    /// An amount adjustment landed on this period.
    SystemAdjusted,
    /// Standard straight-line allocation.
    SystemBase,
}

impl LineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineState::External => "EXTERNAL",
            LineState::Closed => "CLOSED",
            LineState::SystemAdjusted => "SYSTEM_ADJUSTED",
            LineState::SystemBase => "SYSTEM_BASE",
        }
    }
}

/// One derived schedule line. Never authoritative: recomputed in full on
/// every rebuild.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodLine {
    pub period: Period,
    pub state: LineState,
    pub amount_reporting: Money,
    pub amount_local: Money,
    /// FX after the whole log was replayed, identical on every line.
    pub effective_fx: f64,
    pub cumulative_amount_reporting: Money,
    pub cumulative_amount_local: Money,
    pub remaining_amount_reporting: Money,
    pub remaining_amount_local: Money,
    /// Reporting delta, set only on `SystemAdjusted` lines.
    pub adjustment_delta: Option<Money>,
    pub explanation: String,
}
