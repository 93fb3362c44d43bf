use chrono::{NaiveDate, NaiveTime, Weekday};
use dutyroster_core::db::open_db_in_memory;
use dutyroster_core::repo::{AbsenceRepository, AideRepository, OccurrenceRepository, TaskRepository};
use dutyroster_core::{
    AbsenceRange, Aide, AvailabilityQuery, AvailabilityWindow, Conflict, ConflictResolver,
    ErrorKind, Occurrence, RecurringTask, SqliteScheduleStore,
};
use uuid::Uuid;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Store with one aide holding an assigned 09:00-10:00 slot on Monday 2024-03-04.
fn seeded(store: &SqliteScheduleStore<'_>) -> (Aide, Occurrence) {
    let aide = Aide::new("Jo", "#112233");
    store.create_aide(&aide).unwrap();
    let task = RecurringTask::new("Reading group", "support", hm(9, 0), hm(10, 0));
    store.create_task(&task).unwrap();
    let mut occurrence = Occurrence::unassigned(task.id, d(2024, 3, 4), hm(9, 0), hm(10, 0));
    occurrence.assign_to(aide.id);
    store.insert_occurrence(&occurrence).unwrap();
    (aide, occurrence)
}

#[test]
fn overlapping_slot_reports_the_blocking_occurrence() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let (aide, existing) = seeded(&store);

    let verdict = ConflictResolver::new(&store)
        .check_availability(&AvailabilityQuery::new(
            aide.id,
            d(2024, 3, 4),
            hm(9, 30),
            hm(10, 30),
        ))
        .unwrap();

    assert!(!verdict.is_available());
    let report = verdict.to_report();
    assert_eq!(report.reason, Some("overlap"));
    assert_eq!(report.conflicting_occurrence.map(|occ| occ.id), Some(existing.id));
}

#[test]
fn touching_slot_is_not_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let (aide, _) = seeded(&store);
    let resolver = ConflictResolver::new(&store);

    for (start, end) in [(hm(10, 0), hm(11, 0)), (hm(8, 0), hm(9, 0))] {
        let verdict = resolver
            .check_availability(&AvailabilityQuery::new(aide.id, d(2024, 3, 4), start, end))
            .unwrap();
        assert!(verdict.is_available(), "{start}-{end} should be free");
    }
}

#[test]
fn other_days_and_excluded_occurrence_do_not_conflict() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let (aide, existing) = seeded(&store);
    let resolver = ConflictResolver::new(&store);

    let next_day = AvailabilityQuery::new(aide.id, d(2024, 3, 5), hm(9, 0), hm(10, 0));
    assert!(resolver.check_availability(&next_day).unwrap().is_available());

    let itself = AvailabilityQuery::for_occurrence(&existing, aide.id);
    assert!(resolver.check_availability(&itself).unwrap().is_available());
}

#[test]
fn absence_covering_the_date_blocks() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let aide = Aide::new("Sam", "#445566");
    store.create_aide(&aide).unwrap();
    store
        .create_absence(&AbsenceRange::new(aide.id, d(2024, 3, 1), d(2024, 3, 5)).with_reason("leave"))
        .unwrap();
    let resolver = ConflictResolver::new(&store);

    for date in [d(2024, 3, 1), d(2024, 3, 5)] {
        let verdict = resolver
            .check_availability(&AvailabilityQuery::new(aide.id, date, hm(9, 0), hm(10, 0)))
            .unwrap();
        assert!(matches!(verdict.conflict(), Some(Conflict::Absent { .. })));
        assert_eq!(verdict.to_report().reason, Some("absent"));
    }

    let after = AvailabilityQuery::new(aide.id, d(2024, 3, 6), hm(9, 0), hm(10, 0));
    assert!(resolver.check_availability(&after).unwrap().is_available());
}

#[test]
fn overlap_is_reported_before_absence() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let (aide, _) = seeded(&store);
    store
        .create_absence(&AbsenceRange::on(aide.id, d(2024, 3, 4)))
        .unwrap();

    let verdict = ConflictResolver::new(&store)
        .check_availability(&AvailabilityQuery::new(
            aide.id,
            d(2024, 3, 4),
            hm(9, 15),
            hm(9, 45),
        ))
        .unwrap();
    assert_eq!(verdict.to_report().reason, Some("overlap"));
}

#[test]
fn slot_must_fit_a_window_when_the_weekday_has_one() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let aide = Aide::new("Ari", "#778899");
    store.create_aide(&aide).unwrap();
    store
        .upsert_availability(&AvailabilityWindow::new(aide.id, Weekday::Mon, hm(9, 0), hm(12, 0)))
        .unwrap();
    let resolver = ConflictResolver::new(&store);
    let monday = d(2024, 3, 4);

    let inside = AvailabilityQuery::new(aide.id, monday, hm(9, 0), hm(12, 0));
    assert!(resolver.check_availability(&inside).unwrap().is_available());

    let spills = AvailabilityQuery::new(aide.id, monday, hm(11, 0), hm(13, 0));
    let verdict = resolver.check_availability(&spills).unwrap();
    assert_eq!(verdict.to_report().reason, Some("outside availability"));
    assert!(verdict.to_report().conflicting_occurrence.is_none());
}

#[test]
fn weekday_without_windows_is_unrestricted() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let aide = Aide::new("Ari", "#778899");
    store.create_aide(&aide).unwrap();
    store
        .upsert_availability(&AvailabilityWindow::new(aide.id, Weekday::Mon, hm(9, 0), hm(12, 0)))
        .unwrap();

    // 2024-03-05 is a Tuesday.
    let verdict = ConflictResolver::new(&store)
        .check_availability(&AvailabilityQuery::new(
            aide.id,
            d(2024, 3, 5),
            hm(14, 0),
            hm(15, 0),
        ))
        .unwrap();
    assert!(verdict.is_available());
}

#[test]
fn invalid_range_and_unknown_aide_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let (aide, _) = seeded(&store);
    let resolver = ConflictResolver::new(&store);

    let backwards = AvailabilityQuery::new(aide.id, d(2024, 3, 4), hm(11, 0), hm(10, 0));
    let err = resolver.check_availability(&backwards).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let stranger = AvailabilityQuery::new(Uuid::new_v4(), d(2024, 3, 4), hm(9, 0), hm(10, 0));
    let err = resolver.check_availability(&stranger).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn conflict_serializes_with_reason_tag() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteScheduleStore::try_new(&conn).unwrap();
    let (aide, existing) = seeded(&store);

    let verdict = ConflictResolver::new(&store)
        .check_availability(&AvailabilityQuery::new(
            aide.id,
            d(2024, 3, 4),
            hm(9, 30),
            hm(10, 30),
        ))
        .unwrap();
    let json = serde_json::to_value(verdict.conflict().unwrap()).unwrap();
    assert_eq!(json["reason"], "overlap");
    assert_eq!(json["occurrence"]["id"], existing.id.to_string());
    assert_eq!(json["occurrence"]["start_time"], "09:00");
}
