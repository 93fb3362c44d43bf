//! Recurring task persistence.

use super::{
    date_to_db, parse_db_date, parse_db_time, parse_db_uuid, time_to_db, uuid_to_db, RepoError,
    RepoResult, SqliteScheduleStore,
};
use crate::model::task::{RecurringTask, TaskId};
use chrono::NaiveDate;
use rusqlite::{params, Row};

const TASK_SELECT_SQL: &str = "SELECT
    id,
    title,
    category,
    start_time,
    end_time,
    recurrence_rule,
    expires_on,
    location,
    notes
FROM recurring_tasks";

pub trait TaskRepository {
    fn create_task(&self, task: &RecurringTask) -> RepoResult<TaskId>;
    fn update_task(&self, task: &RecurringTask) -> RepoResult<()>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<RecurringTask>>;
    /// Tasks with a rule whose expiry (if any) is on or after `active_on`.
    fn list_recurring_tasks(&self, active_on: NaiveDate) -> RepoResult<Vec<RecurringTask>>;
    /// Deletes the task and, by cascade, its occurrences.
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
}

impl TaskRepository for SqliteScheduleStore<'_> {
    fn create_task(&self, task: &RecurringTask) -> RepoResult<TaskId> {
        task.validate()?;

        self.conn().execute(
            "INSERT INTO recurring_tasks (
                id,
                title,
                category,
                start_time,
                end_time,
                recurrence_rule,
                expires_on,
                location,
                notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                uuid_to_db(task.id),
                task.title.as_str(),
                task.category.as_str(),
                time_to_db(task.start_time),
                time_to_db(task.end_time),
                task.active_rule(),
                task.expires_on.map(date_to_db),
                task.location.as_deref(),
                task.notes.as_deref(),
            ],
        )?;

        Ok(task.id)
    }

    fn update_task(&self, task: &RecurringTask) -> RepoResult<()> {
        task.validate()?;

        let changed = self.conn().execute(
            "UPDATE recurring_tasks
             SET
                title = ?1,
                category = ?2,
                start_time = ?3,
                end_time = ?4,
                recurrence_rule = ?5,
                expires_on = ?6,
                location = ?7,
                notes = ?8,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?9;",
            params![
                task.title.as_str(),
                task.category.as_str(),
                time_to_db(task.start_time),
                time_to_db(task.end_time),
                task.active_rule(),
                task.expires_on.map(date_to_db),
                task.location.as_deref(),
                task.notes.as_deref(),
                uuid_to_db(task.id),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::not_found("task", task.id));
        }
        Ok(())
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<RecurringTask>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([uuid_to_db(id)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn list_recurring_tasks(&self, active_on: NaiveDate) -> RepoResult<Vec<RecurringTask>> {
        let mut stmt = self.conn().prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE recurrence_rule IS NOT NULL
               AND trim(recurrence_rule) <> ''
               AND (expires_on IS NULL OR expires_on >= ?1)
             ORDER BY start_time ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([date_to_db(active_on)])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM recurring_tasks WHERE id = ?1;", [uuid_to_db(id)])?;
        if changed == 0 {
            return Err(RepoError::not_found("task", id));
        }
        Ok(())
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<RecurringTask> {
    let id_text: String = row.get("id")?;
    let start_text: String = row.get("start_time")?;
    let end_text: String = row.get("end_time")?;
    let expires_on = match row.get::<_, Option<String>>("expires_on")? {
        Some(value) => Some(parse_db_date(&value, "recurring_tasks.expires_on")?),
        None => None,
    };

    let task = RecurringTask {
        id: parse_db_uuid(&id_text, "recurring_tasks.id")?,
        title: row.get("title")?,
        category: row.get("category")?,
        start_time: parse_db_time(&start_text, "recurring_tasks.start_time")?,
        end_time: parse_db_time(&end_text, "recurring_tasks.end_time")?,
        recurrence_rule: row.get("recurrence_rule")?,
        expires_on,
        location: row.get("location")?,
        notes: row.get("notes")?,
    };
    task.validate()?;
    Ok(task)
}
