use cbk_period::Period;

/// Read-only view of period closure status.
///
/// Implementations must answer consistently for the duration of a single
/// rebuild; the engine calls `is_closed` once per generated line.
pub trait ClosureLookup {
    fn is_closed(&self, entity_id: &str, period: Period) -> bool;
}

impl<F> ClosureLookup for F
where
    F: Fn(&str, Period) -> bool,
{
    fn is_closed(&self, entity_id: &str, period: Period) -> bool {
        self(entity_id, period)
    }
}

/// Every period open. Offline rebuilds and tests.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoClosures;

impl ClosureLookup for NoClosures {
    fn is_closed(&self, _entity_id: &str, _period: Period) -> bool {
        false
    }
}
