//! Store contracts and the SQLite implementation.
//!
//! # Responsibility
//! - Define the queries the scheduling engine issues as traits.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call the entity's `validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - The store never holds global state; callers hand a connection in.

use crate::db::migrations::{current_version, latest_version};
use crate::db::DbError;
use crate::model::{format_hhmm, parse_hhmm, ValidationError};
use chrono::{NaiveDate, NaiveTime};
use log::warn;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod absence_repo;
pub mod aide_repo;
pub mod occurrence_repo;
pub mod task_repo;

pub use absence_repo::AbsenceRepository;
pub use aide_repo::AideRepository;
pub use occurrence_repo::OccurrenceRepository;
pub use task_repo::TaskRepository;

const DATE_FORMAT: &str = "%Y-%m-%d";
const SAVEPOINT_NAME: &str = "dutyroster_unit";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for roster persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    NotFound { entity: &'static str, id: Uuid },
    InvalidData(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Whether the failure concerns one record rather than the store.
    ///
    /// Batch operations record these per item and keep going.
    pub fn is_item_scoped(&self) -> bool {
        match self {
            Self::Validation(_) | Self::NotFound { .. } | Self::InvalidData(_) => true,
            Self::Db(err) => err.is_constraint_violation(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted roster data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Unit-of-work boundary.
pub trait Transactional {
    /// Runs `work` atomically: its writes commit together or not at all.
    ///
    /// Calls nest; an inner failure rolls back only the inner unit.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>;
}

/// Everything the scheduling engine needs from persistence.
pub trait ScheduleStore:
    TaskRepository + OccurrenceRepository + AideRepository + AbsenceRepository + Transactional
{
}

impl<T> ScheduleStore for T where
    T: TaskRepository + OccurrenceRepository + AideRepository + AbsenceRepository + Transactional
{
}

/// SQLite-backed roster store over a borrowed, migrated connection.
pub struct SqliteScheduleStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteScheduleStore<'conn> {
    /// Wraps a connection after checking its schema is current.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let version = current_version(conn)?;
        if version != latest_version() {
            return Err(RepoError::InvalidData(format!(
                "connection schema version {version} does not match expected {}",
                latest_version()
            )));
        }
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &'conn Connection {
        self.conn
    }
}

impl Transactional for SqliteScheduleStore<'_> {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>,
    {
        self.conn
            .execute_batch(&format!("SAVEPOINT {SAVEPOINT_NAME};"))
            .map_err(|err| E::from(RepoError::from(err)))?;

        match work() {
            Ok(value) => {
                self.conn
                    .execute_batch(&format!("RELEASE {SAVEPOINT_NAME};"))
                    .map_err(|err| E::from(RepoError::from(err)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.conn.execute_batch(&format!(
                    "ROLLBACK TO {SAVEPOINT_NAME}; RELEASE {SAVEPOINT_NAME};"
                )) {
                    warn!(
                        "event=unit_rollback module=repo status=error error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }
}

pub(crate) fn date_to_db(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn time_to_db(time: NaiveTime) -> String {
    format_hhmm(time)
}

pub(crate) fn uuid_to_db(id: Uuid) -> String {
    id.to_string()
}

pub(crate) fn parse_db_date(value: &str, column: &str) -> RepoResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}

pub(crate) fn parse_db_time(value: &str, column: &str) -> RepoResult<NaiveTime> {
    parse_hhmm(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid time `{value}` in {column}")))
}

pub(crate) fn parse_db_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
