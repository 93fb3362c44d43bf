//! Aide and availability window persistence.

use super::{
    parse_db_time, parse_db_uuid, time_to_db, uuid_to_db, RepoError, RepoResult,
    SqliteScheduleStore,
};
use crate::model::aide::{parse_weekday_code, weekday_code, Aide, AideId, AvailabilityWindow};
use crate::model::ValidationError;
use chrono::Weekday;
use rusqlite::{params, Row};

const WINDOW_SELECT_SQL: &str = "SELECT
    id,
    aide_id,
    weekday,
    start_time,
    end_time
FROM availability_windows";

pub trait AideRepository {
    fn create_aide(&self, aide: &Aide) -> RepoResult<AideId>;
    fn get_aide(&self, id: AideId) -> RepoResult<Option<Aide>>;
    /// Unassigns the aide's occurrences, then deletes the aide together with
    /// its windows and absences.
    fn delete_aide(&self, id: AideId) -> RepoResult<()>;
    /// Inserts or replaces the aide's window for `window.weekday`.
    fn upsert_availability(&self, window: &AvailabilityWindow) -> RepoResult<AvailabilityWindow>;
    fn list_availability(&self, aide_id: AideId) -> RepoResult<Vec<AvailabilityWindow>>;
    fn list_availability_on(
        &self,
        aide_id: AideId,
        weekday: Weekday,
    ) -> RepoResult<Vec<AvailabilityWindow>>;
    fn delete_availability(&self, aide_id: AideId, weekday: Weekday) -> RepoResult<()>;
}

impl AideRepository for SqliteScheduleStore<'_> {
    fn create_aide(&self, aide: &Aide) -> RepoResult<AideId> {
        aide.validate()?;

        self.conn().execute(
            "INSERT INTO aides (id, name, colour_hex, qualifications)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                uuid_to_db(aide.id),
                aide.name.as_str(),
                aide.colour_hex.as_str(),
                aide.qualifications.as_deref(),
            ],
        )?;
        Ok(aide.id)
    }

    fn get_aide(&self, id: AideId) -> RepoResult<Option<Aide>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, colour_hex, qualifications
             FROM aides
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([uuid_to_db(id)])?;
        if let Some(row) = rows.next()? {
            let id_text: String = row.get("id")?;
            let aide = Aide {
                id: parse_db_uuid(&id_text, "aides.id")?,
                name: row.get("name")?,
                colour_hex: row.get("colour_hex")?,
                qualifications: row.get("qualifications")?,
            };
            aide.validate()?;
            return Ok(Some(aide));
        }
        Ok(None)
    }

    fn delete_aide(&self, id: AideId) -> RepoResult<()> {
        let id_text = uuid_to_db(id);
        self.conn().execute(
            "UPDATE occurrences
             SET
                aide_id = NULL,
                status = 'UNASSIGNED',
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE aide_id = ?1;",
            [id_text.as_str()],
        )?;
        let changed = self
            .conn()
            .execute("DELETE FROM aides WHERE id = ?1;", [id_text.as_str()])?;
        if changed == 0 {
            return Err(RepoError::not_found("aide", id));
        }
        Ok(())
    }

    fn upsert_availability(&self, window: &AvailabilityWindow) -> RepoResult<AvailabilityWindow> {
        let code = weekday_code(window.weekday)
            .ok_or(ValidationError::NonSchoolDay(window.weekday))?;

        self.conn().execute(
            "INSERT INTO availability_windows (id, aide_id, weekday, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (aide_id, weekday) DO UPDATE SET
                start_time = excluded.start_time,
                end_time = excluded.end_time;",
            params![
                uuid_to_db(window.id),
                uuid_to_db(window.aide_id),
                code,
                time_to_db(window.start_time),
                time_to_db(window.end_time),
            ],
        )?;

        self.list_availability_on(window.aide_id, window.weekday)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RepoError::InvalidData("availability window missing after upsert".to_string())
            })
    }

    fn list_availability(&self, aide_id: AideId) -> RepoResult<Vec<AvailabilityWindow>> {
        let mut stmt = self.conn().prepare(&format!(
            "{WINDOW_SELECT_SQL}
             WHERE aide_id = ?1
             ORDER BY CASE weekday
                WHEN 'MO' THEN 1 WHEN 'TU' THEN 2 WHEN 'WE' THEN 3
                WHEN 'TH' THEN 4 ELSE 5 END;"
        ))?;
        let mut rows = stmt.query([uuid_to_db(aide_id)])?;
        let mut windows = Vec::new();
        while let Some(row) = rows.next()? {
            windows.push(parse_window_row(row)?);
        }
        Ok(windows)
    }

    fn list_availability_on(
        &self,
        aide_id: AideId,
        weekday: Weekday,
    ) -> RepoResult<Vec<AvailabilityWindow>> {
        // Weekend days have no code and therefore never have windows.
        let Some(code) = weekday_code(weekday) else {
            return Ok(Vec::new());
        };
        let mut stmt = self.conn().prepare(&format!(
            "{WINDOW_SELECT_SQL} WHERE aide_id = ?1 AND weekday = ?2;"
        ))?;
        let mut rows = stmt.query(params![uuid_to_db(aide_id), code])?;
        let mut windows = Vec::new();
        while let Some(row) = rows.next()? {
            windows.push(parse_window_row(row)?);
        }
        Ok(windows)
    }

    fn delete_availability(&self, aide_id: AideId, weekday: Weekday) -> RepoResult<()> {
        let code = weekday_code(weekday).ok_or(ValidationError::NonSchoolDay(weekday))?;
        let changed = self.conn().execute(
            "DELETE FROM availability_windows WHERE aide_id = ?1 AND weekday = ?2;",
            params![uuid_to_db(aide_id), code],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("availability window", aide_id));
        }
        Ok(())
    }
}

fn parse_window_row(row: &Row<'_>) -> RepoResult<AvailabilityWindow> {
    let id_text: String = row.get("id")?;
    let aide_text: String = row.get("aide_id")?;
    let weekday_text: String = row.get("weekday")?;
    let start_text: String = row.get("start_time")?;
    let end_text: String = row.get("end_time")?;
    let weekday = parse_weekday_code(&weekday_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid weekday `{weekday_text}` in availability_windows.weekday"
        ))
    })?;

    Ok(AvailabilityWindow {
        id: parse_db_uuid(&id_text, "availability_windows.id")?,
        aide_id: parse_db_uuid(&aide_text, "availability_windows.aide_id")?,
        weekday,
        start_time: parse_db_time(&start_text, "availability_windows.start_time")?,
        end_time: parse_db_time(&end_text, "availability_windows.end_time")?,
    })
}
