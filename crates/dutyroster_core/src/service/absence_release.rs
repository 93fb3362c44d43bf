//! Absence bookkeeping: releasing an absent aide's occurrences and trying to
//! hand them back when the absence goes away.
//!
//! # Responsibility
//! - `release`: unassign the aide's non-UNASSIGNED occurrences inside the
//!   absence and link each one to the absence.
//! - `restore_on_delete`: delete the absence, then re-assign each linked
//!   occurrence to the aide when the conflict check now allows it.
//!
//! # Invariants
//! - Only linked occurrences are ever restored; an occurrence that became
//!   UNASSIGNED for another reason is never touched.
//! - `release` is idempotent: a second call finds nothing left to release.
//! - Absences of one aide never overlap.
//! - A blocked restoration leaves the occurrence UNASSIGNED and is reported,
//!   not raised.

use super::conflict::{AvailabilityQuery, ConflictResolver};
use super::{run_item, ItemFailure, ServiceError, ServiceResult};
use crate::model::absence::{AbsenceId, AbsenceRange};
use crate::model::aide::AideId;
use crate::model::occurrence::{Occurrence, OccurrenceId};
use crate::repo::ScheduleStore;
use log::{debug, error, info};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    pub released: Vec<Occurrence>,
    pub failures: Vec<ItemFailure<OccurrenceId>>,
}

/// Linked occurrence that stayed UNASSIGNED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unrestored {
    pub occurrence_id: OccurrenceId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: Vec<OccurrenceId>,
    pub unrestored: Vec<Unrestored>,
    pub failures: Vec<ItemFailure<OccurrenceId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbsenceRecord {
    pub absence: AbsenceRange,
    pub released: ReleaseReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbsenceUpdate {
    pub absence: AbsenceRange,
    /// Linked occurrences that fell outside the new range.
    pub restored: RestoreReport,
    pub released: ReleaseReport,
}

enum RestoreOutcome {
    Restored,
    Blocked(String),
}

pub struct AbsenceReleaseEngine<'s, S> {
    store: &'s S,
}

impl<'s, S> AbsenceReleaseEngine<'s, S>
where
    S: ScheduleStore,
{
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Persists a new absence and releases the occurrences it covers.
    pub fn record_absence(&self, absence: AbsenceRange) -> ServiceResult<AbsenceRecord> {
        absence.validate()?;
        if self.store.get_aide(absence.aide_id)?.is_none() {
            return Err(ServiceError::not_found("aide", absence.aide_id));
        }
        self.reject_overlap(&absence)?;

        let released = self
            .store
            .atomically(|| {
                self.store.create_absence(&absence)?;
                self.release(&absence)
            })
            .map_err(|err| self.log_internal("absence_record", &absence, err))?;

        info!(
            "event=absence_record module=absence status=ok absence_id={} aide_id={} start={} end={} released={}",
            absence.id,
            absence.aide_id,
            absence.start_date,
            absence.end_date,
            released.released.len()
        );
        Ok(AbsenceRecord { absence, released })
    }

    /// Moves an absence to new dates.
    ///
    /// The aide never changes. Linked occurrences now outside the range are
    /// offered back to the aide; occurrences inside the new range are
    /// released.
    pub fn update_absence(&self, absence: AbsenceRange) -> ServiceResult<AbsenceUpdate> {
        let existing = self
            .store
            .get_absence(absence.id)?
            .ok_or_else(|| ServiceError::not_found("absence", absence.id))?;
        let absence = AbsenceRange {
            aide_id: existing.aide_id,
            ..absence
        };
        absence.validate()?;
        self.reject_overlap(&absence)?;

        let (restored, released) = self
            .store
            .atomically(|| {
                self.store.update_absence(&absence)?;

                let mut outside = Vec::new();
                for occurrence_id in self.store.list_released(absence.id)? {
                    let Some(occurrence) = self.store.get_occurrence(occurrence_id)? else {
                        continue;
                    };
                    if !absence.covers(occurrence.date) {
                        self.store.unlink_released(absence.id, occurrence_id)?;
                        outside.push(occurrence_id);
                    }
                }

                let restored = self.restore_each(absence.aide_id, outside)?;
                let released = self.release(&absence)?;
                Ok((restored, released))
            })
            .map_err(|err| self.log_internal("absence_update", &absence, err))?;

        info!(
            "event=absence_update module=absence status=ok absence_id={} start={} end={} restored={} released={}",
            absence.id,
            absence.start_date,
            absence.end_date,
            restored.restored.len(),
            released.released.len()
        );
        Ok(AbsenceUpdate {
            absence,
            restored,
            released,
        })
    }

    /// Deletes an absence and attempts to restore what it released.
    pub fn delete_absence(&self, id: AbsenceId) -> ServiceResult<RestoreReport> {
        self.restore_on_delete(id)
    }

    /// Unassigns every non-UNASSIGNED occurrence of the absent aide that falls
    /// inside the absence, and links it to the absence.
    pub fn release(&self, absence: &AbsenceRange) -> ServiceResult<ReleaseReport> {
        let candidates = self.store.list_aide_occurrences_between(
            absence.aide_id,
            absence.start_date,
            absence.end_date,
        )?;

        let mut report = ReleaseReport::default();
        for mut occurrence in candidates.into_iter().filter(|occ| !occ.is_unassigned()) {
            let outcome = run_item(self.store, occurrence.id, || {
                occurrence.release();
                self.store.update_occurrence(&occurrence)?;
                self.store.link_released(absence.id, occurrence.id)?;
                Ok(())
            })?;
            match outcome {
                Ok(()) => {
                    debug!(
                        "event=occurrence_release module=absence status=ok absence_id={} occurrence_id={} date={}",
                        absence.id, occurrence.id, occurrence.date
                    );
                    report.released.push(occurrence);
                }
                Err(failure) => report.failures.push(failure),
            }
        }
        Ok(report)
    }

    /// Deletes the absence, then re-assigns each occurrence it released to the
    /// aide when the aide is available again.
    pub fn restore_on_delete(&self, id: AbsenceId) -> ServiceResult<RestoreReport> {
        let absence = self
            .store
            .get_absence(id)?
            .ok_or_else(|| ServiceError::not_found("absence", id))?;

        let report = self
            .store
            .atomically(|| {
                let linked = self.store.list_released(absence.id)?;
                self.store.delete_absence(absence.id)?;
                self.restore_each(absence.aide_id, linked)
            })
            .map_err(|err| self.log_internal("absence_delete", &absence, err))?;

        info!(
            "event=absence_delete module=absence status=ok absence_id={} aide_id={} restored={} unrestored={} failed={}",
            absence.id,
            absence.aide_id,
            report.restored.len(),
            report.unrestored.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn restore_each(
        &self,
        aide_id: AideId,
        occurrence_ids: Vec<OccurrenceId>,
    ) -> ServiceResult<RestoreReport> {
        let resolver = ConflictResolver::new(self.store);
        let mut report = RestoreReport::default();

        for occurrence_id in occurrence_ids {
            let outcome = run_item(self.store, occurrence_id, || {
                let Some(mut occurrence) = self.store.get_occurrence(occurrence_id)? else {
                    return Ok(RestoreOutcome::Blocked("occurrence no longer exists".to_string()));
                };
                if !occurrence.is_unassigned() {
                    return Ok(RestoreOutcome::Blocked(format!(
                        "occurrence is already {}",
                        occurrence.status
                    )));
                }

                let query = AvailabilityQuery::for_occurrence(&occurrence, aide_id);
                if let Some(conflict) = resolver.check_availability(&query)?.conflict() {
                    return Ok(RestoreOutcome::Blocked(conflict.reason().to_string()));
                }

                occurrence.assign_to(aide_id);
                self.store.update_occurrence(&occurrence)?;
                Ok(RestoreOutcome::Restored)
            })?;

            match outcome {
                Ok(RestoreOutcome::Restored) => report.restored.push(occurrence_id),
                Ok(RestoreOutcome::Blocked(reason)) => {
                    debug!(
                        "event=occurrence_restore module=absence status=skip occurrence_id={occurrence_id} aide_id={aide_id} reason={reason}"
                    );
                    report.unrestored.push(Unrestored {
                        occurrence_id,
                        reason,
                    });
                }
                Err(failure) => report.failures.push(failure),
            }
        }
        Ok(report)
    }

    fn reject_overlap(&self, absence: &AbsenceRange) -> ServiceResult<()> {
        let clash = self
            .store
            .list_overlapping_absences(absence.aide_id, absence.start_date, absence.end_date)?
            .into_iter()
            .find(|existing| existing.id != absence.id);
        if let Some(existing) = clash {
            debug!(
                "event=absence_overlap module=absence status=conflict aide_id={} existing_id={}",
                absence.aide_id, existing.id
            );
            return Err(ServiceError::AbsenceOverlap { existing });
        }
        Ok(())
    }

    fn log_internal(&self, event: &str, absence: &AbsenceRange, err: ServiceError) -> ServiceError {
        if !err.is_item_scoped() {
            error!(
                "event={event} module=absence status=error absence_id={} aide_id={} start={} end={} error={err}",
                absence.id, absence.aide_id, absence.start_date, absence.end_date
            );
        }
        err
    }
}
