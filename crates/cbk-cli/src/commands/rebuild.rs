//! `cbk rebuild`: derive a schedule's lines offline from JSON files.
//!
//! Events are applied in file order as history, then the `--closed` periods
//! are closed for the schedule's entity. Nothing is persisted.

use anyhow::{Context, Result};
use cbk_period::Period;
use cbk_repo::ScheduleRepository;
use cbk_schedule::{EventDraft, NewSchedule};
use tracing::debug;

pub struct RebuildArgs {
    pub schedule_path: String,
    pub events_path: Option<String>,
    pub closed: Vec<String>,
    pub config_paths: Vec<String>,
    pub json: bool,
}

pub fn run_rebuild(args: RebuildArgs) -> Result<()> {
    let policy = super::load_policy(&args.config_paths)?;

    let terms: NewSchedule = super::read_json_file(&args.schedule_path)?;
    let drafts: Vec<EventDraft> = match args.events_path.as_deref() {
        Some(p) => super::read_json_file(p)?,
        None => Vec::new(),
    };
    let closed = args
        .closed
        .iter()
        .map(|k| Period::parse(k).with_context(|| format!("invalid --closed period {:?}", k)))
        .collect::<Result<Vec<_>>>()?;

    let mut repo = ScheduleRepository::new().with_policy(policy);
    let schedule = repo
        .create_schedule(terms)
        .context("schedule rejected")?;
    let id = schedule.schedule_id.clone();

    for (i, draft) in drafts.into_iter().enumerate() {
        repo.append_event(&id, draft)
            .with_context(|| format!("event #{} rejected", i + 1))?;
    }
    for period in closed {
        repo.close_period(&schedule.entity_id, period)?;
    }
    debug!(schedule_id = %id, "offline rebuild done");

    super::print_view(&repo.view(&id)?, args.json)
}
