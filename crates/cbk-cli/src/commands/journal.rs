//! `cbk journal`: offline inspection of a schedule journal.

use anyhow::{bail, Result};
use cbk_journal::{read_journal, verify_journal, VerifyResult};
use cbk_repo::ScheduleRepository;
use cbk_schedule::ScheduleId;

/// Check the hash chain. A broken chain is an error (non-zero exit).
pub fn run_verify(path: &str) -> Result<()> {
    match verify_journal(path)? {
        VerifyResult::Valid { lines } => {
            println!("journal_valid=true lines={}", lines);
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            println!("journal_valid=false line={}", line);
            bail!("JOURNAL_BROKEN at line {}: {}", line, reason)
        }
    }
}

/// Restore the journal and print one schedule's derived lines.
pub fn run_show(path: &str, schedule_id: &str, config_paths: &[String], json: bool) -> Result<()> {
    if let VerifyResult::Broken { line, reason } = verify_journal(path)? {
        bail!("JOURNAL_BROKEN at line {}: {}", line, reason);
    }
    let policy = super::load_policy(config_paths)?;

    let mut repo = ScheduleRepository::new().with_policy(policy);
    let summary = repo.restore(read_journal(path)?.into_iter().map(|e| e.record))?;
    tracing::debug!(
        schedules = summary.schedules,
        events = summary.events,
        closures = summary.closures,
        "journal restored"
    );

    let view = repo.view(&ScheduleId::new(schedule_id))?;
    super::print_view(&view, json)
}
