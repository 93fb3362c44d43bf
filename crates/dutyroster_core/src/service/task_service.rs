//! Recurring task lifecycle with occurrence upkeep.
//!
//! Creating a task materializes the default horizon; updating it rebuilds
//! every stored future occurrence when the schedule moved; deleting it
//! cascades to its occurrences.

use super::occurrence_sync::{GenerateReport, OccurrenceSynchronizer, ResyncReport};
use super::{ServiceError, ServiceResult};
use crate::config::SchedulerSettings;
use crate::model::task::{RecurringTask, TaskId};
use crate::repo::{OccurrenceRepository, TaskRepository, Transactional};
use chrono::NaiveDate;
use log::{error, info};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCreated {
    pub task: RecurringTask,
    pub occurrences_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskUpdated {
    pub task: RecurringTask,
    pub occurrences_removed: usize,
    pub occurrences_updated: usize,
    pub occurrences_preserved: usize,
}

pub struct TaskService<'s, S> {
    store: &'s S,
    settings: &'s SchedulerSettings,
}

impl<'s, S> TaskService<'s, S>
where
    S: TaskRepository + OccurrenceRepository + Transactional,
{
    pub fn new(store: &'s S, settings: &'s SchedulerSettings) -> Self {
        Self { store, settings }
    }

    /// Persists `task` and generates its occurrences from `today` over the
    /// default horizon.
    pub fn create_task(&self, task: RecurringTask, today: NaiveDate) -> ServiceResult<TaskCreated> {
        task.validate()?;
        let end = self.settings.default_horizon().window_end(today);

        let generated: GenerateReport = self
            .store
            .atomically(|| {
                self.store.create_task(&task)?;
                OccurrenceSynchronizer::new(self.store).generate(&task, today, end)
            })
            .map_err(|err| log_internal("task_create", task.id, err))?;

        info!(
            "event=task_create module=task status=ok task_id={} recurring={} created={}",
            task.id,
            task.is_recurring(),
            generated.created.len()
        );
        Ok(TaskCreated {
            task,
            occurrences_created: generated.created.len(),
        })
    }

    /// Saves the new version of `task` and resynchronizes from `today` when
    /// its rule, times or expiry changed.
    ///
    /// The rebuilt window reaches the default horizon or the task's last
    /// stored occurrence, whichever is later.
    pub fn update_task(&self, task: RecurringTask, today: NaiveDate) -> ServiceResult<TaskUpdated> {
        task.validate()?;
        let previous = self
            .store
            .get_task(task.id)?
            .ok_or_else(|| ServiceError::not_found("task", task.id))?;
        // Horizon extension may have generated past the default window.
        let end = match self.store.last_occurrence_date(task.id)? {
            Some(last) => last.max(self.settings.default_horizon().window_end(today)),
            None => self.settings.default_horizon().window_end(today),
        };

        let resync: ResyncReport = self
            .store
            .atomically(|| {
                self.store.update_task(&task)?;
                OccurrenceSynchronizer::new(self.store).resynchronize(
                    &previous.schedule(),
                    &task,
                    today,
                    end,
                )
            })
            .map_err(|err| log_internal("task_update", task.id, err))?;

        info!(
            "event=task_update module=task status=ok task_id={} removed={} updated={} preserved={}",
            task.id,
            resync.removed,
            resync.occurrences_updated(),
            resync.preserved.len()
        );
        Ok(TaskUpdated {
            occurrences_removed: resync.removed,
            occurrences_updated: resync.occurrences_updated(),
            occurrences_preserved: resync.preserved.len(),
            task,
        })
    }

    pub fn delete_task(&self, id: TaskId) -> ServiceResult<()> {
        self.store.delete_task(id)?;
        info!("event=task_delete module=task status=ok task_id={id}");
        Ok(())
    }
}

fn log_internal(event: &str, task_id: TaskId, err: ServiceError) -> ServiceError {
    if !err.is_item_scoped() {
        error!("event={event} module=task status=error task_id={task_id} error={err}");
    }
    err
}
