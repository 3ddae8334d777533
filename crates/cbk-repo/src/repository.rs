use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cbk_closure::{PeriodClosureRegistry, PeriodStatus};
use cbk_journal::{read_journal, JournalRecord, JournalWriter};
use cbk_period::Period;
use cbk_schedule::{
    derive_event_id, rebuild_with, sort_events_canonical, validate_amount_range, validate_draft,
    EventDraft, NewSchedule, PeriodLine, RebuildPolicy, ScheduleError, ScheduleEvent, ScheduleId,
    ScheduleMaster,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Clock, InMemoryStore, ScheduleStore, SystemClock};

/// Immutable snapshot of a schedule's derived lines.
pub type PeriodSnapshot = Arc<[PeriodLine]>;

/// Master, sorted log and current lines of one schedule.
#[derive(Clone, Debug, Serialize)]
pub struct ScheduleView {
    pub schedule: ScheduleMaster,
    pub events: Vec<ScheduleEvent>,
    pub periods: Vec<PeriodLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClosePeriodOutcome {
    pub status: PeriodStatus,
    /// False on a repeat close.
    pub newly_closed: bool,
    /// Schedules whose lines were recomputed. Empty on a repeat close.
    pub rebuilt: Vec<ScheduleId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub schedules: usize,
    pub events: usize,
    pub closures: usize,
}

/// Owns schedules, event logs, the closure registry and the cached lines.
///
/// Every mutation runs validate, rebuild, journal, commit in that order; a
/// failure at any step returns before the commit, so an `Err` never leaves
/// a partial change behind.
pub struct ScheduleRepository<S: ScheduleStore = InMemoryStore> {
    store: S,
    closures: PeriodClosureRegistry,
    cache: BTreeMap<ScheduleId, PeriodSnapshot>,
    policy: RebuildPolicy,
    clock: Arc<dyn Clock>,
    journal: Option<JournalWriter>,
}

impl Default for ScheduleRepository<InMemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRepository<InMemoryStore> {
    /// Empty in-memory repository on the system clock.
    pub fn new() -> Self {
        Self::with_store(InMemoryStore::new())
    }

    /// Rebuild state from the journal at `path` and keep journaling to it.
    /// A missing file starts an empty journal; a broken chain is an error.
    pub fn open_journaled(
        path: impl AsRef<Path>,
        hash_chain: bool,
        policy: RebuildPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let writer = JournalWriter::resume(path, hash_chain)
            .with_context(|| format!("resume journal {:?}", path))?;
        let entries = read_journal(path)?;

        let mut repo = Self::new().with_clock(clock).with_policy(policy);
        repo.restore(entries.into_iter().map(|e| e.record))
            .with_context(|| format!("restore from journal {:?}", path))?;
        Ok(repo.with_journal(writer))
    }
}

impl<S: ScheduleStore> ScheduleRepository<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            closures: PeriodClosureRegistry::new(),
            cache: BTreeMap::new(),
            policy: RebuildPolicy::default(),
            clock: Arc::new(SystemClock),
            journal: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the rebuild policy. Cached lines are recomputed under it.
    pub fn with_policy(mut self, policy: RebuildPolicy) -> Self {
        self.policy = policy;
        self.rebuild_all();
        self
    }

    /// Journal every later mutation through `writer`.
    pub fn with_journal(mut self, writer: JournalWriter) -> Self {
        self.journal = Some(writer);
        self
    }

    pub fn policy(&self) -> RebuildPolicy {
        self.policy
    }

    pub fn journal(&self) -> Option<&JournalWriter> {
        self.journal.as_ref()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Register a schedule. An id is generated when `terms` carries none.
    pub fn create_schedule(
        &mut self,
        terms: NewSchedule,
    ) -> Result<ScheduleMaster, ScheduleError> {
        let id = match terms.schedule_id.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => ScheduleId::new(s),
            Some(_) => {
                return Err(ScheduleError::InvalidSchedule {
                    detail: "schedule_id must not be blank".to_string(),
                })
            }
            None => ScheduleId::new(Uuid::new_v4().to_string()),
        };
        if self.store.contains(&id) {
            return Err(ScheduleError::DuplicateSchedule {
                schedule_id: id.to_string(),
            });
        }

        let schedule = ScheduleMaster::create(id, terms, &self.policy)?;
        let lines = rebuild_with(&self.policy, &schedule, &[], &self.closures);

        let now = self.clock.now();
        self.journal_append(
            now,
            JournalRecord::ScheduleCreated {
                schedule: schedule.clone(),
            },
        )?;

        let id = schedule.schedule_id.clone();
        self.store.insert_schedule(schedule.clone());
        self.cache.insert(id.clone(), lines.into());

        info!(
            schedule_id = %id,
            entity_id = %schedule.entity_id,
            start = %schedule.start_date,
            end = ?schedule.end_date.map(|p| p.key()),
            "schedule created"
        );
        Ok(schedule)
    }

    /// Validate and append one amendment, then replace the cached lines.
    pub fn append_event(
        &mut self,
        schedule_id: &ScheduleId,
        draft: EventDraft,
    ) -> Result<ScheduleEvent, ScheduleError> {
        let schedule = self.require(schedule_id)?;

        let validated = match validate_draft(&schedule, &draft, &self.closures) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    schedule_id = %schedule_id,
                    event_type = %draft.event_type,
                    effective_period = %draft.effective_period,
                    code = e.code(),
                    "event rejected"
                );
                return Err(e);
            }
        };

        let mut log = self.store.events(schedule_id);
        let seq = log.iter().map(|e| e.seq).max().unwrap_or(0) + 1;
        let event = ScheduleEvent {
            event_id: derive_event_id(schedule_id, seq),
            schedule_id: schedule_id.clone(),
            seq,
            effective_period: validated.effective_period,
            created_at: self.clock.now(),
            reason: validated.reason,
            kind: validated.kind,
        };

        log.push(event.clone());
        sort_events_canonical(&mut log);
        if let Err(e) = validate_amount_range(&schedule, &log, event.kind.event_type()) {
            warn!(
                schedule_id = %schedule_id,
                effective_period = %event.effective_period,
                code = e.code(),
                "event rejected: amount out of range"
            );
            return Err(e);
        }
        let lines = rebuild_with(&self.policy, &schedule, &log, &self.closures);

        self.journal_append(
            event.created_at,
            JournalRecord::EventAppended {
                event: event.clone(),
            },
        )?;

        self.store.replace_events(schedule_id, log);
        self.cache.insert(schedule_id.clone(), lines.into());

        info!(
            schedule_id = %schedule_id,
            seq,
            event_type = event.kind.event_type(),
            effective_period = %event.effective_period,
            "event appended"
        );
        Ok(event)
    }

    /// Close (entity_id, period) and rebuild every schedule of the entity.
    ///
    /// Closing an already-closed period returns the original status and
    /// changes nothing.
    pub fn close_period(
        &mut self,
        entity_id: &str,
        period: Period,
    ) -> Result<ClosePeriodOutcome, ScheduleError> {
        if entity_id.trim().is_empty() {
            return Err(ScheduleError::InvalidSchedule {
                detail: "entity_id must not be empty".to_string(),
            });
        }

        let existing = self.closures.status(entity_id, period);
        if existing.is_closed() {
            debug!(entity_id, period = %period, "period already closed");
            return Ok(ClosePeriodOutcome {
                status: existing,
                newly_closed: false,
                rebuilt: Vec::new(),
            });
        }

        let now = self.clock.now();
        self.journal_append(
            now,
            JournalRecord::PeriodClosed {
                entity_id: entity_id.to_string(),
                period,
                closed_at: now,
            },
        )?;

        let outcome = self.closures.close(entity_id, period, now);
        let rebuilt = self.store.schedule_ids_for_entity(entity_id);
        for id in &rebuilt {
            self.refresh(id);
        }

        info!(
            entity_id,
            period = %period,
            rebuilt = rebuilt.len(),
            "period closed"
        );
        Ok(ClosePeriodOutcome {
            status: outcome.status,
            newly_closed: outcome.newly_closed,
            rebuilt,
        })
    }

    /// Recompute and replace the cached lines of `schedule_id`.
    pub fn rebuild(&mut self, schedule_id: &ScheduleId) -> Result<PeriodSnapshot, ScheduleError> {
        self.require(schedule_id)?;
        Ok(self.refresh(schedule_id))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn schedule(&self, schedule_id: &ScheduleId) -> Result<ScheduleMaster, ScheduleError> {
        self.require(schedule_id)
    }

    /// Event log in canonical replay order.
    pub fn events(&self, schedule_id: &ScheduleId) -> Result<Vec<ScheduleEvent>, ScheduleError> {
        self.require(schedule_id)?;
        Ok(self.store.events(schedule_id))
    }

    /// Cached lines. Cheap: clones an `Arc`.
    pub fn periods(&self, schedule_id: &ScheduleId) -> Result<PeriodSnapshot, ScheduleError> {
        match self.cache.get(schedule_id) {
            Some(lines) => Ok(Arc::clone(lines)),
            None => Err(ScheduleError::ScheduleNotFound {
                schedule_id: schedule_id.to_string(),
            }),
        }
    }

    pub fn view(&self, schedule_id: &ScheduleId) -> Result<ScheduleView, ScheduleError> {
        Ok(ScheduleView {
            schedule: self.require(schedule_id)?,
            events: self.store.events(schedule_id),
            periods: self.periods(schedule_id)?.to_vec(),
        })
    }

    /// Masters, ascending by id; only `entity_id`'s when given.
    pub fn schedules(&self, entity_id: Option<&str>) -> Vec<ScheduleMaster> {
        let ids = match entity_id {
            Some(e) => self.store.schedule_ids_for_entity(e),
            None => self.store.schedule_ids(),
        };
        ids.iter().filter_map(|id| self.store.schedule(id)).collect()
    }

    pub fn period_status(&self, entity_id: &str, period: Period) -> PeriodStatus {
        self.closures.status(entity_id, period)
    }

    pub fn closed_periods(&self, entity_id: &str) -> Vec<PeriodStatus> {
        self.closures.closed_periods(entity_id)
    }

    pub fn closures(&self) -> &PeriodClosureRegistry {
        &self.closures
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Replay journal records into a freshly built repository.
    ///
    /// Records are applied as history, not re-validated: an event appended
    /// before its period was closed is legitimate. Nothing is journaled while
    /// restoring. Caches are rebuilt once at the end.
    pub fn restore<I>(&mut self, records: I) -> Result<RestoreSummary>
    where
        I: IntoIterator<Item = JournalRecord>,
    {
        let mut summary = RestoreSummary::default();
        let mut logs: BTreeMap<ScheduleId, Vec<ScheduleEvent>> = BTreeMap::new();

        for record in records {
            match record {
                JournalRecord::ScheduleCreated { schedule } => {
                    if self.store.contains(&schedule.schedule_id) {
                        bail!("restore: schedule {} created twice", schedule.schedule_id);
                    }
                    logs.insert(schedule.schedule_id.clone(), Vec::new());
                    self.store.insert_schedule(schedule);
                    summary.schedules += 1;
                }
                JournalRecord::EventAppended { event } => {
                    let Some(log) = logs.get_mut(&event.schedule_id) else {
                        bail!(
                            "restore: event seq {} for unknown schedule {}",
                            event.seq,
                            event.schedule_id
                        );
                    };
                    if log.iter().any(|e| e.seq == event.seq) {
                        bail!(
                            "restore: duplicate seq {} for schedule {}",
                            event.seq,
                            event.schedule_id
                        );
                    }
                    log.push(event);
                    summary.events += 1;
                }
                JournalRecord::PeriodClosed {
                    entity_id,
                    period,
                    closed_at,
                } => {
                    if self.closures.insert_closed(&entity_id, period, closed_at) {
                        summary.closures += 1;
                    }
                }
            }
        }

        for (id, mut log) in logs {
            if log.is_empty() {
                continue;
            }
            let mut existing = self.store.events(&id);
            existing.append(&mut log);
            sort_events_canonical(&mut existing);
            self.store.replace_events(&id, existing);
        }
        self.rebuild_all();

        info!(
            schedules = summary.schedules,
            events = summary.events,
            closures = summary.closures,
            "repository restored"
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require(&self, schedule_id: &ScheduleId) -> Result<ScheduleMaster, ScheduleError> {
        self.store
            .schedule(schedule_id)
            .ok_or_else(|| ScheduleError::ScheduleNotFound {
                schedule_id: schedule_id.to_string(),
            })
    }

    fn refresh(&mut self, schedule_id: &ScheduleId) -> PeriodSnapshot {
        let snapshot: PeriodSnapshot = match self.store.schedule(schedule_id) {
            Some(schedule) => {
                let log = self.store.events(schedule_id);
                rebuild_with(&self.policy, &schedule, &log, &self.closures).into()
            }
            None => Vec::new().into(),
        };
        self.cache.insert(schedule_id.clone(), Arc::clone(&snapshot));
        snapshot
    }

    fn rebuild_all(&mut self) {
        for id in self.store.schedule_ids() {
            self.refresh(&id);
        }
    }

    fn journal_append(
        &mut self,
        ts_utc: DateTime<Utc>,
        record: JournalRecord,
    ) -> Result<(), ScheduleError> {
        let Some(journal) = self.journal.as_mut() else {
            return Ok(());
        };
        let kind = record.kind();
        journal
            .append(ts_utc, record)
            .map(|_| ())
            .map_err(|e| {
                warn!(kind, error = %format!("{e:#}"), "journal append failed");
                ScheduleError::Persistence {
                    detail: format!("{e:#}"),
                }
            })
    }
}
