use chrono::{NaiveDate, NaiveTime};
use dutyroster_core::db::open_db_in_memory;
use dutyroster_core::repo::{AbsenceRepository, AideRepository, OccurrenceRepository, TaskRepository};
use dutyroster_core::{
    AbsenceRange, AbsenceReleaseEngine, Aide, ErrorKind, Occurrence, OccurrenceStatus,
    RecurringTask, ServiceError, SqliteScheduleStore, TaskId,
};
use uuid::Uuid;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn create_task(store: &SqliteScheduleStore<'_>) -> TaskId {
    let task = RecurringTask::new("Playground duty", "duty", hm(9, 0), hm(10, 0));
    store.create_task(&task).unwrap()
}

fn create_aide(store: &SqliteScheduleStore<'_>, name: &str) -> Aide {
    let aide = Aide::new(name, "#112233");
    store.create_aide(&aide).unwrap();
    aide
}

fn assigned(
    store: &SqliteScheduleStore<'_>,
    task_id: TaskId,
    aide: &Aide,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> Occurrence {
    let mut occurrence = Occurrence::unassigned(task_id, date, start, end);
    occurrence.assign_to(aide.id);
    store.insert_occurrence(&occurrence).unwrap();
    occurrence
}

#[test]
fn absence_releases_and_deletion_restores() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let task_id = create_task(&store);
    let aide = create_aide(&store, "Jo");
    let occurrence = assigned(&store, task_id, &aide, d(2024, 3, 4), hm(9, 0), hm(10, 0));
    let engine = AbsenceReleaseEngine::new(&store);

    let record = engine
        .record_absence(AbsenceRange::on(aide.id, d(2024, 3, 4)).with_reason("sick"))
        .unwrap();
    let released: Vec<_> = record.released.released.iter().map(|occ| occ.id).collect();
    assert_eq!(released, vec![occurrence.id]);

    let stored = store.get_occurrence(occurrence.id).unwrap().unwrap();
    assert_eq!(stored.status, OccurrenceStatus::Unassigned);
    assert_eq!(stored.aide_id, None);
    assert_eq!(store.list_released(record.absence.id).unwrap(), vec![occurrence.id]);

    let restore = engine.delete_absence(record.absence.id).unwrap();
    assert_eq!(restore.restored, vec![occurrence.id]);
    assert!(restore.unrestored.is_empty());

    let stored = store.get_occurrence(occurrence.id).unwrap().unwrap();
    assert_eq!(stored.status, OccurrenceStatus::Assigned);
    assert_eq!(stored.aide_id, Some(aide.id));
    assert!(store.get_absence(record.absence.id).unwrap().is_none());
}

#[test]
fn release_only_touches_the_absent_aides_days() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let task_id = create_task(&store);
    let jo = create_aide(&store, "Jo");
    let sam = create_aide(&store, "Sam");
    let inside = assigned(&store, task_id, &jo, d(2024, 3, 5), hm(9, 0), hm(10, 0));
    let outside = assigned(&store, task_id, &jo, d(2024, 3, 8), hm(9, 0), hm(10, 0));
    let someone_else = assigned(&store, task_id, &sam, d(2024, 3, 5), hm(11, 0), hm(12, 0));
    let unassigned = Occurrence::unassigned(task_id, d(2024, 3, 6), hm(9, 0), hm(10, 0));
    store.insert_occurrence(&unassigned).unwrap();

    let record = AbsenceReleaseEngine::new(&store)
        .record_absence(AbsenceRange::new(jo.id, d(2024, 3, 4), d(2024, 3, 6)))
        .unwrap();

    let released: Vec<_> = record.released.released.iter().map(|occ| occ.id).collect();
    assert_eq!(released, vec![inside.id]);
    for untouched in [&outside, &someone_else] {
        let stored = store.get_occurrence(untouched.id).unwrap().unwrap();
        assert_eq!(stored.status, OccurrenceStatus::Assigned);
    }
}

#[test]
fn in_progress_occurrences_are_released_too() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let task_id = create_task(&store);
    let aide = create_aide(&store, "Jo");
    let mut occurrence = assigned(&store, task_id, &aide, d(2024, 3, 4), hm(9, 0), hm(10, 0));
    occurrence.status = OccurrenceStatus::InProgress;
    store.update_occurrence(&occurrence).unwrap();

    let record = AbsenceReleaseEngine::new(&store)
        .record_absence(AbsenceRange::on(aide.id, d(2024, 3, 4)))
        .unwrap();
    assert_eq!(record.released.released.len(), 1);
    assert_eq!(
        store.get_occurrence(occurrence.id).unwrap().unwrap().status,
        OccurrenceStatus::Unassigned
    );
}

#[test]
fn releasing_twice_finds_nothing() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let task_id = create_task(&store);
    let aide = create_aide(&store, "Jo");
    assigned(&store, task_id, &aide, d(2024, 3, 4), hm(9, 0), hm(10, 0));
    let engine = AbsenceReleaseEngine::new(&store);

    let record = engine
        .record_absence(AbsenceRange::on(aide.id, d(2024, 3, 4)))
        .unwrap();
    let again = engine.release(&record.absence).unwrap();

    assert_eq!(record.released.released.len(), 1);
    assert!(again.released.is_empty());
    assert!(again.failures.is_empty());
}

#[test]
fn blocked_restoration_leaves_occurrence_unassigned() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let task_id = create_task(&store);
    let aide = create_aide(&store, "Jo");
    let occurrence = assigned(&store, task_id, &aide, d(2024, 3, 4), hm(9, 0), hm(10, 0));
    let engine = AbsenceReleaseEngine::new(&store);
    let record = engine
        .record_absence(AbsenceRange::on(aide.id, d(2024, 3, 4)))
        .unwrap();

    // While absent, the aide is booked elsewhere for an overlapping slot.
    let other_task = RecurringTask::new("Library", "support", hm(9, 30), hm(10, 30));
    store.create_task(&other_task).unwrap();
    let blocker = assigned(&store, other_task.id, &aide, d(2024, 3, 4), hm(9, 30), hm(10, 30));

    let restore = engine.restore_on_delete(record.absence.id).unwrap();

    assert!(restore.restored.is_empty());
    assert_eq!(restore.unrestored.len(), 1);
    assert_eq!(restore.unrestored[0].occurrence_id, occurrence.id);
    assert_eq!(restore.unrestored[0].reason, "overlap");
    let stored = store.get_occurrence(occurrence.id).unwrap().unwrap();
    assert_eq!(stored.status, OccurrenceStatus::Unassigned);
    assert_eq!(
        store.get_occurrence(blocker.id).unwrap().unwrap().aide_id,
        Some(aide.id)
    );
}

#[test]
fn manually_reassigned_occurrence_is_not_restored() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let task_id = create_task(&store);
    let jo = create_aide(&store, "Jo");
    let sam = create_aide(&store, "Sam");
    let occurrence = assigned(&store, task_id, &jo, d(2024, 3, 4), hm(9, 0), hm(10, 0));
    let engine = AbsenceReleaseEngine::new(&store);
    let record = engine
        .record_absence(AbsenceRange::on(jo.id, d(2024, 3, 4)))
        .unwrap();

    let mut covered = store.get_occurrence(occurrence.id).unwrap().unwrap();
    covered.assign_to(sam.id);
    store.update_occurrence(&covered).unwrap();

    let restore = engine.delete_absence(record.absence.id).unwrap();
    assert!(restore.restored.is_empty());
    assert_eq!(restore.unrestored.len(), 1);
    assert_eq!(
        store.get_occurrence(occurrence.id).unwrap().unwrap().aide_id,
        Some(sam.id)
    );
}

#[test]
fn unrelated_unassigned_occurrences_are_never_restored() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let task_id = create_task(&store);
    let aide = create_aide(&store, "Jo");
    let engine = AbsenceReleaseEngine::new(&store);
    let record = engine
        .record_absence(AbsenceRange::on(aide.id, d(2024, 3, 4)))
        .unwrap();
    let open_slot = Occurrence::unassigned(task_id, d(2024, 3, 4), hm(9, 0), hm(10, 0));
    store.insert_occurrence(&open_slot).unwrap();

    let restore = engine.delete_absence(record.absence.id).unwrap();
    assert!(restore.restored.is_empty());
    assert!(restore.unrestored.is_empty());
    assert!(store
        .get_occurrence(open_slot.id)
        .unwrap()
        .unwrap()
        .is_unassigned());
}

#[test]
fn overlapping_absences_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let aide = create_aide(&store, "Jo");
    let engine = AbsenceReleaseEngine::new(&store);
    let first = engine
        .record_absence(AbsenceRange::new(aide.id, d(2024, 3, 4), d(2024, 3, 8)))
        .unwrap();

    let err = engine
        .record_absence(AbsenceRange::new(aide.id, d(2024, 3, 8), d(2024, 3, 12)))
        .unwrap_err();
    match &err {
        ServiceError::AbsenceOverlap { existing } => assert_eq!(existing.id, first.absence.id),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.http_status(), 409);

    // Adjacent ranges are fine.
    engine
        .record_absence(AbsenceRange::new(aide.id, d(2024, 3, 9), d(2024, 3, 12)))
        .unwrap();
}

#[test]
fn invalid_absences_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let aide = create_aide(&store, "Jo");
    let engine = AbsenceReleaseEngine::new(&store);

    let backwards = engine
        .record_absence(AbsenceRange::new(aide.id, d(2024, 3, 8), d(2024, 3, 4)))
        .unwrap_err();
    assert_eq!(backwards.kind(), ErrorKind::Validation);

    let stranger = engine
        .record_absence(AbsenceRange::on(Uuid::new_v4(), d(2024, 3, 4)))
        .unwrap_err();
    assert_eq!(stranger.kind(), ErrorKind::NotFound);

    let missing = engine.delete_absence(Uuid::new_v4()).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn shrinking_an_absence_restores_days_it_no_longer_covers() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let task_id = create_task(&store);
    let aide = create_aide(&store, "Jo");
    let monday = assigned(&store, task_id, &aide, d(2024, 3, 4), hm(9, 0), hm(10, 0));
    let tuesday = assigned(&store, task_id, &aide, d(2024, 3, 5), hm(9, 0), hm(10, 0));
    let thursday = assigned(&store, task_id, &aide, d(2024, 3, 7), hm(9, 0), hm(10, 0));
    let engine = AbsenceReleaseEngine::new(&store);
    let record = engine
        .record_absence(AbsenceRange::new(aide.id, d(2024, 3, 4), d(2024, 3, 5)))
        .unwrap();
    assert_eq!(record.released.released.len(), 2);

    let moved = AbsenceRange {
        start_date: d(2024, 3, 5),
        end_date: d(2024, 3, 7),
        ..record.absence.clone()
    };
    let update = engine.update_absence(moved).unwrap();

    assert_eq!(update.restored.restored, vec![monday.id]);
    let newly_released: Vec<_> = update.released.released.iter().map(|occ| occ.id).collect();
    assert_eq!(newly_released, vec![thursday.id]);
    assert_eq!(
        store.list_released(record.absence.id).unwrap(),
        vec![tuesday.id, thursday.id]
    );
    assert_eq!(
        store.get_occurrence(monday.id).unwrap().unwrap().aide_id,
        Some(aide.id)
    );
}

#[test]
fn deleting_the_aide_clears_assignments_and_absences() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let task_id = create_task(&store);
    let aide = create_aide(&store, "Jo");
    let occurrence = assigned(&store, task_id, &aide, d(2024, 3, 11), hm(9, 0), hm(10, 0));
    AbsenceReleaseEngine::new(&store)
        .record_absence(AbsenceRange::on(aide.id, d(2024, 3, 4)))
        .unwrap();

    store.delete_aide(aide.id).unwrap();

    let stored = store.get_occurrence(occurrence.id).unwrap().unwrap();
    assert!(stored.is_unassigned());
    assert_eq!(stored.aide_id, None);
    assert!(store.list_aide_absences(aide.id).unwrap().is_empty());
}
