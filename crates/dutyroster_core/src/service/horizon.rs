//! Rolling look-ahead maintenance across all recurring tasks.
//!
//! `extend` is the single entry point for external schedulers (cron, a
//! timer, a manual button). It is synchronous, re-entrant and idempotent;
//! each task is committed on its own, so an interrupted run is repaired by
//! running it again.

use super::occurrence_sync::OccurrenceSynchronizer;
use super::{ItemFailure, ServiceResult};
use crate::config::HorizonWeeks;
use crate::model::task::TaskId;
use crate::repo::{OccurrenceRepository, TaskRepository, Transactional};
use chrono::{Local, NaiveDate};
use log::{error, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HorizonReport {
    pub tasks_processed: usize,
    pub occurrences_created: usize,
    pub failures: Vec<ItemFailure<TaskId>>,
}

impl HorizonReport {
    pub fn as_tuple(&self) -> (usize, usize) {
        (self.tasks_processed, self.occurrences_created)
    }
}

pub struct HorizonExtender<'s, S> {
    store: &'s S,
}

impl<'s, S> HorizonExtender<'s, S>
where
    S: TaskRepository + OccurrenceRepository + Transactional,
{
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Extends every active recurring task `horizon_weeks` ahead of today.
    pub fn extend(&self, horizon_weeks: u32) -> ServiceResult<HorizonReport> {
        self.extend_from(Local::now().date_naive(), horizon_weeks)
    }

    /// Same as [`extend`](Self::extend) with an explicit "today".
    pub fn extend_from(&self, today: NaiveDate, horizon_weeks: u32) -> ServiceResult<HorizonReport> {
        let horizon = HorizonWeeks::new(horizon_weeks)?;
        let end = horizon.window_end(today);

        let tasks = self.store.list_recurring_tasks(today)?;
        let synchronizer = OccurrenceSynchronizer::new(self.store);
        let mut report = HorizonReport {
            tasks_processed: tasks.len(),
            ..HorizonReport::default()
        };

        for task in &tasks {
            match synchronizer.generate(task, today, end) {
                Ok(generated) => {
                    report.occurrences_created += generated.created.len();
                    report
                        .failures
                        .extend(generated.failures.into_iter().map(|failure| ItemFailure {
                            item: task.id,
                            kind: failure.kind,
                            message: format!("{}: {}", failure.item, failure.message),
                        }));
                }
                Err(err) if err.is_item_scoped() => {
                    warn!(
                        "event=horizon_extend module=horizon status=skip task_id={} error={err}",
                        task.id
                    );
                    report.failures.push(ItemFailure {
                        item: task.id,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    error!(
                        "event=horizon_extend module=horizon status=error task_id={} today={today} weeks={} error={err}",
                        task.id,
                        horizon.weeks()
                    );
                    return Err(err);
                }
            }
        }

        info!(
            "event=horizon_extend module=horizon status=ok today={today} weeks={} tasks={} created={} failed={}",
            horizon.weeks(),
            report.tasks_processed,
            report.occurrences_created,
            report.failures.len()
        );
        Ok(report)
    }
}
