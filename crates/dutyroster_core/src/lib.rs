//! Duty roster core: recurring tasks, their dated occurrences, and the rules
//! that decide which aide can take which slot.
//! This crate is the single source of truth for scheduling invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schedule;
pub mod service;

pub use config::{BusinessHours, ConfigError, HorizonWeeks, InvalidHorizon, SchedulerSettings};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget, LoggingError};
pub use model::absence::{AbsenceId, AbsenceRange};
pub use model::aide::{Aide, AideId, AvailabilityWindow};
pub use model::occurrence::{Occurrence, OccurrenceId, OccurrenceStatus};
pub use model::task::{RecurringTask, TaskId};
pub use model::ValidationError;
pub use repo::{RepoError, RepoResult, ScheduleStore, SqliteScheduleStore, Transactional};
pub use schedule::recurrence::{RecurrenceError, RecurrenceRule};
pub use service::absence_release::AbsenceReleaseEngine;
pub use service::assignment::{AssignmentRequest, AssignmentService, ScheduleFilter};
pub use service::conflict::{AvailabilityQuery, AvailabilityVerdict, Conflict, ConflictResolver};
pub use service::horizon::{HorizonExtender, HorizonReport};
pub use service::occurrence_sync::OccurrenceSynchronizer;
pub use service::roster::RosterService;
pub use service::task_service::TaskService;
pub use service::{ErrorKind, ItemFailure, ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
