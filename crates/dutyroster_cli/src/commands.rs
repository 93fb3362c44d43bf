//! Subcommand arguments and handlers.

use chrono::{Local, NaiveDate, NaiveTime, Weekday};
use clap::{Args, Subcommand};
use dutyroster_core::db::migrations::current_version;
use dutyroster_core::model::aide::parse_weekday_code;
use dutyroster_core::model::parse_hhmm;
use dutyroster_core::repo::TaskRepository;
use dutyroster_core::{
    AbsenceReleaseEngine, AbsenceRange, Aide, AideId, AssignmentRequest, AssignmentService,
    AvailabilityQuery, ConflictResolver, HorizonExtender, OccurrenceId, OccurrenceStatus,
    RecurringTask, RosterService, ScheduleFilter, SchedulerSettings, ServiceError,
    SqliteScheduleStore, TaskId, TaskService,
};
use rusqlite::Connection;
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use uuid::Uuid;

type CommandResult = Result<(), Box<dyn Error>>;

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    parse_hhmm(value).ok_or_else(|| format!("expected HH:MM, got `{value}`"))
}

fn parse_weekday(value: &str) -> Result<Weekday, String> {
    parse_weekday_code(&value.to_ascii_uppercase())
        .ok_or_else(|| format!("expected one of MO, TU, WE, TH, FR, got `{value}`"))
}

fn parse_status(value: &str) -> Result<OccurrenceStatus, String> {
    OccurrenceStatus::parse(value).ok_or_else(|| {
        format!("expected UNASSIGNED, ASSIGNED, IN_PROGRESS or COMPLETE, got `{value}`")
    })
}

fn print_json<T: Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a task and generate its default horizon
    Add {
        title: String,
        #[arg(long)]
        category: String,
        #[arg(long, value_parser = parse_time)]
        start: NaiveTime,
        #[arg(long, value_parser = parse_time)]
        end: NaiveTime,
        /// Recurrence rule, e.g. FREQ=WEEKLY;BYDAY=MO,WE,FR
        #[arg(long)]
        rule: Option<String>,
        /// Last date occurrences may be generated for
        #[arg(long)]
        expires: Option<NaiveDate>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Change a task; its horizon is rebuilt when the schedule moved
    Update {
        id: TaskId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_parser = parse_time)]
        start: Option<NaiveTime>,
        #[arg(long, value_parser = parse_time)]
        end: Option<NaiveTime>,
        /// New rule; an empty string makes the task one-off
        #[arg(long)]
        rule: Option<String>,
        #[arg(long)]
        expires: Option<NaiveDate>,
    },
    /// Delete a task and its occurrences
    Delete { id: TaskId },
}

#[derive(Subcommand)]
pub enum AideAction {
    Add {
        name: String,
        /// #RRGGBB
        #[arg(long, default_value = "#4A90D9")]
        colour: String,
        #[arg(long)]
        qualifications: Option<String>,
    },
    /// Delete an aide; their occurrences become unassigned
    Delete { id: AideId },
}

#[derive(Subcommand)]
pub enum AvailabilityAction {
    /// Set the window for one weekday, replacing any existing one
    Set {
        aide: AideId,
        #[arg(value_parser = parse_weekday)]
        weekday: Weekday,
        #[arg(value_parser = parse_time)]
        start: NaiveTime,
        #[arg(value_parser = parse_time)]
        end: NaiveTime,
    },
    Remove {
        aide: AideId,
        #[arg(value_parser = parse_weekday)]
        weekday: Weekday,
    },
    List { aide: AideId },
}

#[derive(Subcommand)]
pub enum AbsenceAction {
    /// Record an absence and release the aide's occurrences in it
    Add {
        aide: AideId,
        start: NaiveDate,
        /// Defaults to the start date
        end: Option<NaiveDate>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Move an absence to new dates
    Update {
        id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Delete an absence and try to restore what it released
    Delete { id: Uuid },
}

#[derive(Subcommand)]
pub enum OccurrenceAction {
    /// Create a one-off occurrence
    Add {
        task: TaskId,
        date: NaiveDate,
        #[arg(value_parser = parse_time)]
        start: NaiveTime,
        #[arg(value_parser = parse_time)]
        end: NaiveTime,
        #[arg(long)]
        aide: Option<AideId>,
    },
    Unassign { id: OccurrenceId },
    /// Move to UNASSIGNED, ASSIGNED, IN_PROGRESS or COMPLETE
    Status {
        id: OccurrenceId,
        #[arg(value_parser = parse_status)]
        status: OccurrenceStatus,
    },
    Delete { id: OccurrenceId },
}

#[derive(Args)]
pub struct CheckArgs {
    aide: AideId,
    date: NaiveDate,
    #[arg(value_parser = parse_time)]
    start: NaiveTime,
    #[arg(value_parser = parse_time)]
    end: NaiveTime,
}

#[derive(Args)]
pub struct AssignArgs {
    /// `OCCURRENCE_ID=AIDE_ID` pairs
    #[arg(required = true, value_parser = parse_request)]
    pairs: Vec<AssignmentRequest>,
}

fn parse_request(value: &str) -> Result<AssignmentRequest, String> {
    let (occurrence, aide) = value
        .split_once('=')
        .ok_or_else(|| format!("expected OCCURRENCE_ID=AIDE_ID, got `{value}`"))?;
    Ok(AssignmentRequest {
        occurrence_id: occurrence.trim().parse().map_err(|err| format!("{err}"))?,
        aide_id: aide.trim().parse().map_err(|err| format!("{err}"))?,
    })
}

#[derive(Args)]
pub struct WeekArgs {
    /// ISO week, YYYY-WW
    week: String,
    #[arg(long)]
    aide: Option<AideId>,
    #[arg(long, value_parser = parse_status)]
    status: Option<OccurrenceStatus>,
}

pub struct Context<'c> {
    conn: &'c Connection,
    store: SqliteScheduleStore<'c>,
    settings: &'c SchedulerSettings,
    today: NaiveDate,
}

impl<'c> Context<'c> {
    pub fn new(
        conn: &'c Connection,
        settings: &'c SchedulerSettings,
        today: Option<NaiveDate>,
    ) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            conn,
            store: SqliteScheduleStore::try_new(conn)?,
            settings,
            today: today.unwrap_or_else(|| Local::now().date_naive()),
        })
    }

    pub fn init(&self, path: &Path) -> CommandResult {
        print_json(&serde_json::json!({
            "database": path.display().to_string(),
            "schema_version": current_version(self.conn)?,
        }))
    }

    pub fn task(&self, action: TaskAction) -> CommandResult {
        let service = TaskService::new(&self.store, self.settings);
        match action {
            TaskAction::Add {
                title,
                category,
                start,
                end,
                rule,
                expires,
                location,
                notes,
            } => {
                let mut task = RecurringTask::new(title, category, start, end);
                task.recurrence_rule = rule;
                task.expires_on = expires;
                task.location = location;
                task.notes = notes;
                print_json(&service.create_task(task, self.today)?)
            }
            TaskAction::Update {
                id,
                title,
                category,
                start,
                end,
                rule,
                expires,
            } => {
                let mut task = self
                    .store
                    .get_task(id)?
                    .ok_or_else(|| ServiceError::not_found("task", id))?;
                if let Some(title) = title {
                    task.title = title;
                }
                if let Some(category) = category {
                    task.category = category;
                }
                if let Some(start) = start {
                    task.start_time = start;
                }
                if let Some(end) = end {
                    task.end_time = end;
                }
                if let Some(rule) = rule {
                    task.recurrence_rule = Some(rule).filter(|rule| !rule.trim().is_empty());
                }
                if expires.is_some() {
                    task.expires_on = expires;
                }
                print_json(&service.update_task(task, self.today)?)
            }
            TaskAction::Delete { id } => {
                service.delete_task(id)?;
                print_json(&serde_json::json!({ "deleted": id }))
            }
        }
    }

    pub fn aide(&self, action: AideAction) -> CommandResult {
        let service = RosterService::new(&self.store, self.settings.business_hours);
        match action {
            AideAction::Add {
                name,
                colour,
                qualifications,
            } => {
                let mut aide = Aide::new(name, colour);
                aide.qualifications = qualifications;
                print_json(&service.create_aide(aide)?)
            }
            AideAction::Delete { id } => {
                service.delete_aide(id)?;
                print_json(&serde_json::json!({ "deleted": id }))
            }
        }
    }

    pub fn availability(&self, action: AvailabilityAction) -> CommandResult {
        let service = RosterService::new(&self.store, self.settings.business_hours);
        match action {
            AvailabilityAction::Set {
                aide,
                weekday,
                start,
                end,
            } => print_json(&service.set_availability(aide, weekday, start, end)?),
            AvailabilityAction::Remove { aide, weekday } => {
                service.remove_availability(aide, weekday)?;
                print_json(&serde_json::json!({ "removed": weekday.to_string() }))
            }
            AvailabilityAction::List { aide } => print_json(&service.list_availability(aide)?),
        }
    }

    pub fn absence(&self, action: AbsenceAction) -> CommandResult {
        let engine = AbsenceReleaseEngine::new(&self.store);
        match action {
            AbsenceAction::Add {
                aide,
                start,
                end,
                reason,
            } => {
                let mut absence = AbsenceRange::new(aide, start, end.unwrap_or(start));
                absence.reason = reason;
                print_json(&engine.record_absence(absence)?)
            }
            AbsenceAction::Update {
                id,
                start,
                end,
                reason,
            } => {
                // The engine keeps the stored aide; the nil id here is never written.
                let absence = AbsenceRange {
                    id,
                    aide_id: Uuid::nil(),
                    start_date: start,
                    end_date: end,
                    reason,
                };
                print_json(&engine.update_absence(absence)?)
            }
            AbsenceAction::Delete { id } => print_json(&engine.delete_absence(id)?),
        }
    }

    pub fn occurrence(&self, action: OccurrenceAction) -> CommandResult {
        let service = AssignmentService::new(&self.store);
        match action {
            OccurrenceAction::Add {
                task,
                date,
                start,
                end,
                aide,
            } => print_json(&service.create_occurrence(task, date, start, end, aide)?),
            OccurrenceAction::Unassign { id } => print_json(&service.unassign(id)?),
            OccurrenceAction::Status { id, status } => {
                print_json(&service.transition_status(id, status)?)
            }
            OccurrenceAction::Delete { id } => {
                service.delete_occurrence(id)?;
                print_json(&serde_json::json!({ "deleted": id }))
            }
        }
    }

    pub fn check(&self, args: CheckArgs) -> CommandResult {
        let query = AvailabilityQuery::new(args.aide, args.date, args.start, args.end);
        let verdict = ConflictResolver::new(&self.store).check_availability(&query)?;
        print_json(&verdict.to_report())
    }

    pub fn assign(&self, args: AssignArgs) -> CommandResult {
        let service = AssignmentService::new(&self.store);
        if let [single] = args.pairs.as_slice() {
            return print_json(&service.assign(single.occurrence_id, single.aide_id)?);
        }
        print_json(&service.assign_batch(&args.pairs)?)
    }

    pub fn extend(&self, weeks: Option<u32>) -> CommandResult {
        let weeks = weeks.unwrap_or(self.settings.default_horizon_weeks);
        let report = HorizonExtender::new(&self.store).extend_from(self.today, weeks)?;
        print_json(&report)
    }

    pub fn week(&self, args: WeekArgs) -> CommandResult {
        let filter = ScheduleFilter {
            aide_id: args.aide,
            status: args.status,
        };
        print_json(&AssignmentService::new(&self.store).week_schedule(&args.week, filter)?)
    }
}
