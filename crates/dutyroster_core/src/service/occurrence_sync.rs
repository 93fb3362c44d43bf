//! Keeps a task's stored occurrences in line with its recurrence rule.
//!
//! # Responsibility
//! - `generate`: materialize missing occurrences over a window.
//! - `resynchronize`: rebuild a window after the task's rule, times or
//!   expiry changed.
//!
//! # Invariants
//! - `generate` is idempotent: an existing `(task, date, start, end)` is
//!   skipped, so a second run over the same window creates nothing. A slot
//!   that a concurrent run inserts first also counts as skipped.
//! - No occurrence is generated after the task's expiry.
//! - `resynchronize` deletes only UNASSIGNED occurrences. Dates that still
//!   hold an assigned, in-progress or complete occurrence are left alone and
//!   are not regenerated.

use super::{run_item, ItemFailure, ServiceResult};
use crate::model::occurrence::Occurrence;
use crate::model::task::{RecurringTask, TaskSchedule};
use crate::repo::{OccurrenceRepository, RepoError, Transactional};
use crate::schedule::recurrence::expand_dates;
use chrono::NaiveDate;
use log::{error, info};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateReport {
    pub created: Vec<Occurrence>,
    /// Dates whose occurrence already existed (or was preserved).
    pub skipped: usize,
    pub failures: Vec<ItemFailure<NaiveDate>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub removed: usize,
    pub preserved: Vec<Occurrence>,
    pub created: Vec<Occurrence>,
    pub failures: Vec<ItemFailure<NaiveDate>>,
}

impl ResyncReport {
    /// Number of occurrences regenerated for the new schedule.
    pub fn occurrences_updated(&self) -> usize {
        self.created.len()
    }
}

pub struct OccurrenceSynchronizer<'s, S> {
    store: &'s S,
}

impl<'s, S> OccurrenceSynchronizer<'s, S>
where
    S: OccurrenceRepository + Transactional,
{
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Creates the occurrences `task`'s rule produces in `[from, to]` that do
    /// not exist yet.
    pub fn generate(
        &self,
        task: &RecurringTask,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<GenerateReport> {
        let report = self
            .store
            .atomically(|| self.generate_gaps(task, from, to, &BTreeSet::new()))
            .map_err(|err| {
                error!(
                    "event=occurrence_generate module=sync status=error task_id={} from={from} to={to} error={err}",
                    task.id
                );
                err
            })?;

        info!(
            "event=occurrence_generate module=sync status=ok task_id={} from={from} to={to} created={} skipped={} failed={}",
            task.id,
            report.created.len(),
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    /// Rebuilds `[from, to]` after the task's schedule moved from `previous`.
    ///
    /// Returns an empty report without touching the store when the rule, both
    /// times and the expiry are unchanged.
    pub fn resynchronize(
        &self,
        previous: &TaskSchedule,
        task: &RecurringTask,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<ResyncReport> {
        if *previous == task.schedule() {
            info!(
                "event=occurrence_resync module=sync status=skip task_id={} reason=unchanged",
                task.id
            );
            return Ok(ResyncReport::default());
        }

        let report = self
            .store
            .atomically(|| self.rebuild_window(task, from, to))
            .map_err(|err| {
                error!(
                    "event=occurrence_resync module=sync status=error task_id={} from={from} to={to} error={err}",
                    task.id
                );
                err
            })?;

        info!(
            "event=occurrence_resync module=sync status=ok task_id={} removed={} preserved={} created={} failed={}",
            task.id,
            report.removed,
            report.preserved.len(),
            report.created.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn rebuild_window(
        &self,
        task: &RecurringTask,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<ResyncReport> {
        let mut report = ResyncReport::default();
        let mut preserved_dates = BTreeSet::new();

        for occurrence in self.store.list_task_occurrences(task.id, from, to)? {
            if occurrence.is_unassigned() {
                self.store.delete_occurrence(occurrence.id)?;
                report.removed += 1;
            } else {
                preserved_dates.insert(occurrence.date);
                report.preserved.push(occurrence);
            }
        }

        let generated = self.generate_gaps(task, from, to, &preserved_dates)?;
        report.created = generated.created;
        report.failures = generated.failures;
        Ok(report)
    }

    fn generate_gaps(
        &self,
        task: &RecurringTask,
        from: NaiveDate,
        to: NaiveDate,
        skip_dates: &BTreeSet<NaiveDate>,
    ) -> ServiceResult<GenerateReport> {
        let dates = expand_dates(
            task.active_rule(),
            task.start_time,
            from,
            to,
            task.expires_on,
        )?;

        let mut report = GenerateReport::default();
        for date in dates {
            if skip_dates.contains(&date) {
                report.skipped += 1;
                continue;
            }

            let outcome = run_item(self.store, date, || {
                if self
                    .store
                    .find_occurrence(task.id, date, task.start_time, task.end_time)?
                    .is_some()
                {
                    return Ok(None);
                }
                let occurrence =
                    Occurrence::unassigned(task.id, date, task.start_time, task.end_time);
                match self.store.insert_occurrence(&occurrence) {
                    Ok(_) => Ok(Some(occurrence)),
                    // A concurrent run inserted the same slot after our lookup.
                    Err(RepoError::Db(err)) if err.is_constraint_violation() => {
                        match self
                            .store
                            .find_occurrence(task.id, date, task.start_time, task.end_time)?
                        {
                            Some(_) => Ok(None),
                            None => Err(RepoError::Db(err).into()),
                        }
                    }
                    Err(err) => Err(err.into()),
                }
            })?;

            match outcome {
                Ok(Some(occurrence)) => report.created.push(occurrence),
                Ok(None) => report.skipped += 1,
                Err(failure) => report.failures.push(failure),
            }
        }
        Ok(report)
    }
}
