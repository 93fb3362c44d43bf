//! `dutyroster` command-line entry point.
//!
//! # Responsibility
//! - Parse arguments, bootstrap logging, settings and the database.
//! - Print every result as JSON on stdout and map failures to exit codes.

use clap::{Parser, Subcommand};
use dutyroster_core::{init_logging, LogTarget, SchedulerSettings, ServiceError};
use std::error::Error;
use std::path::PathBuf;

mod commands;

const DEFAULT_DB_PATH: &str = "dutyroster.sqlite3";

#[derive(Parser)]
#[command(name = "dutyroster", version, about = "Duty roster scheduling engine")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// trace|debug|info|warn|error
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    /// Absolute directory for rotated log files (default: stderr)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Override today's date (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<chrono::NaiveDate>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or migrate the database
    Init,
    /// Recurring task management
    Task {
        #[command(subcommand)]
        action: commands::TaskAction,
    },
    /// Aide management
    Aide {
        #[command(subcommand)]
        action: commands::AideAction,
    },
    /// Weekly availability windows
    Availability {
        #[command(subcommand)]
        action: commands::AvailabilityAction,
    },
    /// Absence ranges
    Absence {
        #[command(subcommand)]
        action: commands::AbsenceAction,
    },
    /// One-off occurrences and status changes
    Occurrence {
        #[command(subcommand)]
        action: commands::OccurrenceAction,
    },
    /// Check whether an aide can take a slot
    Check(commands::CheckArgs),
    /// Assign occurrences to aides
    Assign(commands::AssignArgs),
    /// Extend every recurring task's horizon
    Extend {
        /// Weeks ahead of today (1-10, default from settings)
        #[arg(long)]
        weeks: Option<u32>,
    },
    /// Occurrences of one ISO week
    Week(commands::WeekArgs),
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(exit_code(err.as_ref()));
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let target = match &cli.log_dir {
        Some(dir) => LogTarget::directory(dir)?,
        None => LogTarget::Stderr,
    };
    init_logging(&cli.log_level, target)?;

    let settings = match &cli.config {
        Some(path) => SchedulerSettings::load(path)?,
        None => SchedulerSettings::default(),
    };
    let conn = dutyroster_core::open_db(&cli.db)?;
    let ctx = commands::Context::new(&conn, &settings, cli.today)?;

    match cli.command {
        Commands::Init => ctx.init(&cli.db),
        Commands::Task { action } => ctx.task(action),
        Commands::Aide { action } => ctx.aide(action),
        Commands::Availability { action } => ctx.availability(action),
        Commands::Absence { action } => ctx.absence(action),
        Commands::Occurrence { action } => ctx.occurrence(action),
        Commands::Check(args) => ctx.check(args),
        Commands::Assign(args) => ctx.assign(args),
        Commands::Extend { weeks } => ctx.extend(weeks),
        Commands::Week(args) => ctx.week(args),
    }
}

/// 2 validation, 3 conflict, 4 not found, 1 anything else.
fn exit_code(err: &(dyn Error + 'static)) -> i32 {
    use dutyroster_core::ErrorKind;
    match err.downcast_ref::<ServiceError>().map(ServiceError::kind) {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::Conflict) => 3,
        Some(ErrorKind::NotFound) => 4,
        Some(ErrorKind::Internal) | None => 1,
    }
}
