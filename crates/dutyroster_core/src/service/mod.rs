//! Scheduling engine and use-case services.
//!
//! # Responsibility
//! - Run the recurrence, conflict and absence rules on top of a store.
//! - Classify outcomes into validation / conflict / not-found / internal.
//!
//! # Invariants
//! - Services receive their store explicitly; there is no ambient session.
//! - Batch operations report per-item failures and abort (rolling back)
//!   only on store-level failures.

use crate::config::InvalidHorizon;
use crate::model::occurrence::OccurrenceId;
use crate::model::ValidationError;
use crate::repo::{RepoError, Transactional};
use crate::schedule::recurrence::RecurrenceError;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod absence_release;
pub mod assignment;
pub mod conflict;
pub mod horizon;
pub mod occurrence_sync;
pub mod roster;
pub mod task_service;

use crate::model::absence::AbsenceRange;
use conflict::Conflict;

/// Coarse outcome class, mapped onto HTTP status codes by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 422,
            Self::Conflict => 409,
            Self::NotFound => 404,
            Self::Internal => 500,
        }
    }
}

#[derive(Debug)]
pub enum ServiceError {
    Validation(ValidationError),
    InvalidRecurrenceRule(RecurrenceError),
    InvalidHorizon(InvalidHorizon),
    Conflict(Conflict),
    AbsenceOverlap { existing: AbsenceRange },
    DuplicateOccurrence { existing: OccurrenceId },
    NotFound { entity: &'static str, id: Uuid },
    Repo(RepoError),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidRecurrenceRule(_) | Self::InvalidHorizon(_) => {
                ErrorKind::Validation
            }
            Self::Conflict(_) | Self::AbsenceOverlap { .. } | Self::DuplicateOccurrence { .. } => {
                ErrorKind::Conflict
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Repo(_) => ErrorKind::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    /// Whether a batch may record this error against one item and continue.
    pub fn is_item_scoped(&self) -> bool {
        match self {
            Self::Repo(err) => err.is_item_scoped(),
            _ => true,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidRecurrenceRule(err) => write!(f, "{err}"),
            Self::InvalidHorizon(err) => write!(f, "{err}"),
            Self::Conflict(conflict) => write!(f, "scheduling conflict: {conflict}"),
            Self::AbsenceOverlap { existing } => write!(
                f,
                "absence overlaps existing absence {} ({} to {})",
                existing.id, existing.start_date, existing.end_date
            ),
            Self::DuplicateOccurrence { existing } => {
                write!(f, "an identical occurrence already exists: {existing}")
            }
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidRecurrenceRule(err) => Some(err),
            Self::InvalidHorizon(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        match value {
            ValidationError::Recurrence(err) => Self::InvalidRecurrenceRule(err),
            other => Self::Validation(other),
        }
    }
}

impl From<RecurrenceError> for ServiceError {
    fn from(value: RecurrenceError) -> Self {
        Self::InvalidRecurrenceRule(value)
    }
}

impl From<InvalidHorizon> for ServiceError {
    fn from(value: InvalidHorizon) -> Self {
        Self::InvalidHorizon(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::Validation(err) => err.into(),
            other => Self::Repo(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// One item of a batch that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure<K> {
    pub item: K,
    pub kind: ErrorKind,
    pub message: String,
}

/// Runs one batch item in its own atomic unit.
///
/// Item-scoped errors come back as `Ok(Err(_))` after rolling the item back;
/// anything else is returned as the outer error so the batch aborts.
pub(crate) fn run_item<S, K, T, F>(store: &S, item: K, work: F) -> ServiceResult<Result<T, ItemFailure<K>>>
where
    S: Transactional,
    F: FnOnce() -> ServiceResult<T>,
{
    match store.atomically(work) {
        Ok(value) => Ok(Ok(value)),
        Err(err) if err.is_item_scoped() => Ok(Err(ItemFailure {
            item,
            kind: err.kind(),
            message: err.to_string(),
        })),
        Err(err) => Err(err),
    }
}
