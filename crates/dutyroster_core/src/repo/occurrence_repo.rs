//! Occurrence persistence and the range queries the engine issues.
//!
//! # Invariants
//! - `(task_id, date, start_time, end_time)` is unique; a duplicate insert
//!   fails with a constraint violation.
//! - Every list query returns rows ordered by `date, start_time, id`.

use super::{
    date_to_db, parse_db_date, parse_db_time, parse_db_uuid, time_to_db, uuid_to_db, RepoError,
    RepoResult, SqliteScheduleStore,
};
use crate::model::aide::AideId;
use crate::model::occurrence::{Occurrence, OccurrenceId, OccurrenceStatus};
use crate::model::task::TaskId;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Params, Row};

const OCCURRENCE_SELECT_SQL: &str = "SELECT
    id,
    task_id,
    aide_id,
    date,
    start_time,
    end_time,
    status
FROM occurrences";

const OCCURRENCE_ORDER_SQL: &str = "ORDER BY date ASC, start_time ASC, id ASC";

pub trait OccurrenceRepository {
    fn insert_occurrence(&self, occurrence: &Occurrence) -> RepoResult<OccurrenceId>;
    fn update_occurrence(&self, occurrence: &Occurrence) -> RepoResult<()>;
    fn get_occurrence(&self, id: OccurrenceId) -> RepoResult<Option<Occurrence>>;
    fn find_occurrence(
        &self,
        task_id: TaskId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> RepoResult<Option<Occurrence>>;
    fn list_task_occurrences(
        &self,
        task_id: TaskId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<Occurrence>>;
    /// Date of the task's latest stored occurrence, if any.
    fn last_occurrence_date(&self, task_id: TaskId) -> RepoResult<Option<NaiveDate>>;
    fn list_aide_occurrences_on(&self, aide_id: AideId, date: NaiveDate)
        -> RepoResult<Vec<Occurrence>>;
    fn list_aide_occurrences_between(
        &self,
        aide_id: AideId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<Occurrence>>;
    fn list_occurrences_between(&self, from: NaiveDate, to: NaiveDate)
        -> RepoResult<Vec<Occurrence>>;
    fn delete_occurrence(&self, id: OccurrenceId) -> RepoResult<()>;
}

impl SqliteScheduleStore<'_> {
    fn query_occurrences<P: Params>(&self, filter: &str, params: P) -> RepoResult<Vec<Occurrence>> {
        let mut stmt = self.conn().prepare(&format!(
            "{OCCURRENCE_SELECT_SQL} WHERE {filter} {OCCURRENCE_ORDER_SQL};"
        ))?;
        let mut rows = stmt.query(params)?;
        let mut occurrences = Vec::new();
        while let Some(row) = rows.next()? {
            occurrences.push(parse_occurrence_row(row)?);
        }
        Ok(occurrences)
    }
}

impl OccurrenceRepository for SqliteScheduleStore<'_> {
    fn insert_occurrence(&self, occurrence: &Occurrence) -> RepoResult<OccurrenceId> {
        occurrence.validate()?;

        self.conn().execute(
            "INSERT INTO occurrences (
                id,
                task_id,
                aide_id,
                date,
                start_time,
                end_time,
                status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                uuid_to_db(occurrence.id),
                uuid_to_db(occurrence.task_id),
                occurrence.aide_id.map(uuid_to_db),
                date_to_db(occurrence.date),
                time_to_db(occurrence.start_time),
                time_to_db(occurrence.end_time),
                occurrence.status.as_str(),
            ],
        )?;

        Ok(occurrence.id)
    }

    fn update_occurrence(&self, occurrence: &Occurrence) -> RepoResult<()> {
        occurrence.validate()?;

        let changed = self.conn().execute(
            "UPDATE occurrences
             SET
                aide_id = ?1,
                date = ?2,
                start_time = ?3,
                end_time = ?4,
                status = ?5,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?6;",
            params![
                occurrence.aide_id.map(uuid_to_db),
                date_to_db(occurrence.date),
                time_to_db(occurrence.start_time),
                time_to_db(occurrence.end_time),
                occurrence.status.as_str(),
                uuid_to_db(occurrence.id),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::not_found("occurrence", occurrence.id));
        }
        Ok(())
    }

    fn get_occurrence(&self, id: OccurrenceId) -> RepoResult<Option<Occurrence>> {
        Ok(self
            .query_occurrences("id = ?1", [uuid_to_db(id)])?
            .into_iter()
            .next())
    }

    fn find_occurrence(
        &self,
        task_id: TaskId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> RepoResult<Option<Occurrence>> {
        Ok(self
            .query_occurrences(
                "task_id = ?1 AND date = ?2 AND start_time = ?3 AND end_time = ?4",
                params![
                    uuid_to_db(task_id),
                    date_to_db(date),
                    time_to_db(start_time),
                    time_to_db(end_time),
                ],
            )?
            .into_iter()
            .next())
    }

    fn list_task_occurrences(
        &self,
        task_id: TaskId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<Occurrence>> {
        self.query_occurrences(
            "task_id = ?1 AND date >= ?2 AND date <= ?3",
            params![uuid_to_db(task_id), date_to_db(from), date_to_db(to)],
        )
    }

    fn last_occurrence_date(&self, task_id: TaskId) -> RepoResult<Option<NaiveDate>> {
        let value: Option<String> = self.conn().query_row(
            "SELECT MAX(date) FROM occurrences WHERE task_id = ?1;",
            [uuid_to_db(task_id)],
            |row| row.get(0),
        )?;
        value
            .map(|text| parse_db_date(&text, "occurrences.date"))
            .transpose()
    }

    fn list_aide_occurrences_on(
        &self,
        aide_id: AideId,
        date: NaiveDate,
    ) -> RepoResult<Vec<Occurrence>> {
        self.query_occurrences(
            "aide_id = ?1 AND date = ?2",
            params![uuid_to_db(aide_id), date_to_db(date)],
        )
    }

    fn list_aide_occurrences_between(
        &self,
        aide_id: AideId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<Occurrence>> {
        self.query_occurrences(
            "aide_id = ?1 AND date >= ?2 AND date <= ?3",
            params![uuid_to_db(aide_id), date_to_db(from), date_to_db(to)],
        )
    }

    fn list_occurrences_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<Occurrence>> {
        self.query_occurrences(
            "date >= ?1 AND date <= ?2",
            params![date_to_db(from), date_to_db(to)],
        )
    }

    fn delete_occurrence(&self, id: OccurrenceId) -> RepoResult<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM occurrences WHERE id = ?1;", [uuid_to_db(id)])?;
        if changed == 0 {
            return Err(RepoError::not_found("occurrence", id));
        }
        Ok(())
    }
}

fn parse_occurrence_row(row: &Row<'_>) -> RepoResult<Occurrence> {
    let id_text: String = row.get("id")?;
    let task_text: String = row.get("task_id")?;
    let aide_id = match row.get::<_, Option<String>>("aide_id")? {
        Some(value) => Some(parse_db_uuid(&value, "occurrences.aide_id")?),
        None => None,
    };
    let date_text: String = row.get("date")?;
    let start_text: String = row.get("start_time")?;
    let end_text: String = row.get("end_time")?;
    let status_text: String = row.get("status")?;
    let status = OccurrenceStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in occurrences.status"))
    })?;

    let occurrence = Occurrence {
        id: parse_db_uuid(&id_text, "occurrences.id")?,
        task_id: parse_db_uuid(&task_text, "occurrences.task_id")?,
        aide_id,
        date: parse_db_date(&date_text, "occurrences.date")?,
        start_time: parse_db_time(&start_text, "occurrences.start_time")?,
        end_time: parse_db_time(&end_text, "occurrences.end_time")?,
        status,
    };
    occurrence.validate()?;
    Ok(occurrence)
}
