use std::collections::BTreeMap;

use cbk_schedule::{is_canonical, ScheduleEvent, ScheduleId, ScheduleMaster};

/// Storage for schedule masters and their event logs.
///
/// The repository owns ordering, validation and caching; a store only keeps
/// what it is given. Reads return owned values so implementations are free
/// to deserialize on demand.
pub trait ScheduleStore: Send + Sync {
    fn contains(&self, id: &ScheduleId) -> bool;

    fn schedule(&self, id: &ScheduleId) -> Option<ScheduleMaster>;

    /// Insert a new master with an empty log. Callers check `contains` first.
    fn insert_schedule(&mut self, schedule: ScheduleMaster);

    /// Event log in stored order (canonical, as the repository writes it).
    fn events(&self, id: &ScheduleId) -> Vec<ScheduleEvent>;

    /// Replace the whole log of `id`. `events` arrive in canonical order.
    fn replace_events(&mut self, id: &ScheduleId, events: Vec<ScheduleEvent>);

    /// Every stored schedule, ascending by id.
    fn schedule_ids(&self) -> Vec<ScheduleId>;

    /// Schedules owned by `entity_id`, ascending by id.
    fn schedule_ids_for_entity(&self, entity_id: &str) -> Vec<ScheduleId> {
        self.schedule_ids()
            .into_iter()
            .filter(|id| {
                self.schedule(id)
                    .map(|s| s.entity_id == entity_id)
                    .unwrap_or(false)
            })
            .collect()
    }
}

#[derive(Debug)]
struct StoredSchedule {
    master: ScheduleMaster,
    events: Vec<ScheduleEvent>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    schedules: BTreeMap<ScheduleId, StoredSchedule>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleStore for InMemoryStore {
    fn contains(&self, id: &ScheduleId) -> bool {
        self.schedules.contains_key(id)
    }

    fn schedule(&self, id: &ScheduleId) -> Option<ScheduleMaster> {
        self.schedules.get(id).map(|s| s.master.clone())
    }

    fn insert_schedule(&mut self, schedule: ScheduleMaster) {
        let id = schedule.schedule_id.clone();
        self.schedules.insert(
            id,
            StoredSchedule {
                master: schedule,
                events: Vec::new(),
            },
        );
    }

    fn events(&self, id: &ScheduleId) -> Vec<ScheduleEvent> {
        self.schedules
            .get(id)
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }

    fn replace_events(&mut self, id: &ScheduleId, events: Vec<ScheduleEvent>) {
        debug_assert!(is_canonical(&events), "event log for {id} is not canonical");
        if let Some(s) = self.schedules.get_mut(id) {
            s.events = events;
        }
    }

    fn schedule_ids(&self) -> Vec<ScheduleId> {
        self.schedules.keys().cloned().collect()
    }

    fn schedule_ids_for_entity(&self, entity_id: &str) -> Vec<ScheduleId> {
        self.schedules
            .iter()
            .filter(|(_, s)| s.master.entity_id == entity_id)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
