//! Absence range persistence and the absence → released-occurrence links.
//!
//! # Invariants
//! - Links cascade away with either their absence or their occurrence.
//! - Linking is idempotent.

use super::{date_to_db, parse_db_date, parse_db_uuid, uuid_to_db, RepoError, RepoResult, SqliteScheduleStore};
use crate::model::absence::{AbsenceId, AbsenceRange};
use crate::model::aide::AideId;
use crate::model::occurrence::OccurrenceId;
use chrono::NaiveDate;
use rusqlite::{params, Params, Row};

const ABSENCE_SELECT_SQL: &str = "SELECT
    id,
    aide_id,
    start_date,
    end_date,
    reason
FROM absences";

pub trait AbsenceRepository {
    fn create_absence(&self, absence: &AbsenceRange) -> RepoResult<AbsenceId>;
    fn update_absence(&self, absence: &AbsenceRange) -> RepoResult<()>;
    fn get_absence(&self, id: AbsenceId) -> RepoResult<Option<AbsenceRange>>;
    /// Deletes the absence; its release links go with it.
    fn delete_absence(&self, id: AbsenceId) -> RepoResult<()>;
    fn list_absences_covering(&self, aide_id: AideId, date: NaiveDate)
        -> RepoResult<Vec<AbsenceRange>>;
    fn list_overlapping_absences(
        &self,
        aide_id: AideId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepoResult<Vec<AbsenceRange>>;
    fn list_aide_absences(&self, aide_id: AideId) -> RepoResult<Vec<AbsenceRange>>;
    fn link_released(&self, absence_id: AbsenceId, occurrence_id: OccurrenceId) -> RepoResult<()>;
    fn unlink_released(&self, absence_id: AbsenceId, occurrence_id: OccurrenceId)
        -> RepoResult<()>;
    fn list_released(&self, absence_id: AbsenceId) -> RepoResult<Vec<OccurrenceId>>;
}

impl SqliteScheduleStore<'_> {
    fn query_absences<P: Params>(&self, filter: &str, params: P) -> RepoResult<Vec<AbsenceRange>> {
        let mut stmt = self.conn().prepare(&format!(
            "{ABSENCE_SELECT_SQL} WHERE {filter} ORDER BY start_date ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params)?;
        let mut absences = Vec::new();
        while let Some(row) = rows.next()? {
            absences.push(parse_absence_row(row)?);
        }
        Ok(absences)
    }
}

impl AbsenceRepository for SqliteScheduleStore<'_> {
    fn create_absence(&self, absence: &AbsenceRange) -> RepoResult<AbsenceId> {
        absence.validate()?;

        self.conn().execute(
            "INSERT INTO absences (id, aide_id, start_date, end_date, reason)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                uuid_to_db(absence.id),
                uuid_to_db(absence.aide_id),
                date_to_db(absence.start_date),
                date_to_db(absence.end_date),
                absence.reason.as_deref(),
            ],
        )?;
        Ok(absence.id)
    }

    fn update_absence(&self, absence: &AbsenceRange) -> RepoResult<()> {
        absence.validate()?;

        let changed = self.conn().execute(
            "UPDATE absences
             SET start_date = ?1, end_date = ?2, reason = ?3
             WHERE id = ?4;",
            params![
                date_to_db(absence.start_date),
                date_to_db(absence.end_date),
                absence.reason.as_deref(),
                uuid_to_db(absence.id),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("absence", absence.id));
        }
        Ok(())
    }

    fn get_absence(&self, id: AbsenceId) -> RepoResult<Option<AbsenceRange>> {
        Ok(self
            .query_absences("id = ?1", [uuid_to_db(id)])?
            .into_iter()
            .next())
    }

    fn delete_absence(&self, id: AbsenceId) -> RepoResult<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM absences WHERE id = ?1;", [uuid_to_db(id)])?;
        if changed == 0 {
            return Err(RepoError::not_found("absence", id));
        }
        Ok(())
    }

    fn list_absences_covering(
        &self,
        aide_id: AideId,
        date: NaiveDate,
    ) -> RepoResult<Vec<AbsenceRange>> {
        self.query_absences(
            "aide_id = ?1 AND start_date <= ?2 AND end_date >= ?2",
            params![uuid_to_db(aide_id), date_to_db(date)],
        )
    }

    fn list_overlapping_absences(
        &self,
        aide_id: AideId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepoResult<Vec<AbsenceRange>> {
        self.query_absences(
            "aide_id = ?1 AND start_date <= ?3 AND end_date >= ?2",
            params![
                uuid_to_db(aide_id),
                date_to_db(start_date),
                date_to_db(end_date)
            ],
        )
    }

    fn list_aide_absences(&self, aide_id: AideId) -> RepoResult<Vec<AbsenceRange>> {
        self.query_absences("aide_id = ?1", [uuid_to_db(aide_id)])
    }

    fn link_released(&self, absence_id: AbsenceId, occurrence_id: OccurrenceId) -> RepoResult<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO absence_releases (absence_id, occurrence_id)
             VALUES (?1, ?2);",
            params![uuid_to_db(absence_id), uuid_to_db(occurrence_id)],
        )?;
        Ok(())
    }

    fn unlink_released(
        &self,
        absence_id: AbsenceId,
        occurrence_id: OccurrenceId,
    ) -> RepoResult<()> {
        self.conn().execute(
            "DELETE FROM absence_releases WHERE absence_id = ?1 AND occurrence_id = ?2;",
            params![uuid_to_db(absence_id), uuid_to_db(occurrence_id)],
        )?;
        Ok(())
    }

    fn list_released(&self, absence_id: AbsenceId) -> RepoResult<Vec<OccurrenceId>> {
        let mut stmt = self.conn().prepare(
            "SELECT r.occurrence_id
             FROM absence_releases r
             INNER JOIN occurrences o ON o.id = r.occurrence_id
             WHERE r.absence_id = ?1
             ORDER BY o.date ASC, o.start_time ASC, o.id ASC;",
        )?;
        let mut rows = stmt.query([uuid_to_db(absence_id)])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.push(parse_db_uuid(&text, "absence_releases.occurrence_id")?);
        }
        Ok(ids)
    }
}

fn parse_absence_row(row: &Row<'_>) -> RepoResult<AbsenceRange> {
    let id_text: String = row.get("id")?;
    let aide_text: String = row.get("aide_id")?;
    let start_text: String = row.get("start_date")?;
    let end_text: String = row.get("end_date")?;

    let absence = AbsenceRange {
        id: parse_db_uuid(&id_text, "absences.id")?,
        aide_id: parse_db_uuid(&aide_text, "absences.aide_id")?,
        start_date: parse_db_date(&start_text, "absences.start_date")?,
        end_date: parse_db_date(&end_text, "absences.end_date")?,
        reason: row.get("reason")?,
    };
    absence.validate()?;
    Ok(absence)
}
