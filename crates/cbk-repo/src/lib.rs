//! cbk-repo
//!
//! Schedule repository: masters, append-only event logs, period closures
//! and the cached lines derived from them.
//!
//! - Mutations (`create_schedule`, `append_event`, `close_period`) take
//!   `&mut self`; exclusive access is the only concurrency control needed.
//! - Lines are recomputed in full after every mutation and published as
//!   immutable `Arc<[PeriodLine]>` snapshots.
//! - An optional journal records each mutation before it is committed;
//!   `restore` replays it at start-up.

mod clock;
mod repository;
mod store;

pub use clock::{Clock, SteppingClock, SystemClock};
pub use repository::{
    ClosePeriodOutcome, PeriodSnapshot, RestoreSummary, ScheduleRepository, ScheduleView,
};
pub use store::{InMemoryStore, ScheduleStore};
