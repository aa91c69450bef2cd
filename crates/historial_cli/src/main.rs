//! Historial CLI
//!
//! Academic records from the command line.
//!
//! # Commands
//!
//! - `list` - Instructor overview of every student
//! - `show` - Everything recorded for one student
//! - `register`, `edit`, `status`, `remove` - Manage students
//! - `grade`, `add-record`, `edit-score`, `add-credential` - Manage history
//! - `compact` - Rewrite the journal as a snapshot

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use historial_academic::{Credential, ProfileEdit, Registry, Student, StudentStatus, SubjectRecord};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Historial academic records.
#[derive(Parser)]
#[command(name = "historial")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal file
    #[arg(global = true, short, long, default_value = "historial.journal")]
    path: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Enrollment status as typed on the command line.
#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Inactive,
}

impl From<StatusArg> for StudentStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => StudentStatus::Active,
            StatusArg::Inactive => StudentStatus::Inactive,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite the journal as one snapshot frame per database
    Compact {
        /// Only report the current size
        #[arg(short, long)]
        dry_run: bool,
    },

    #[command(flatten)]
    Records(RecordCommand),
}

/// Commands that work on the loaded students.
#[derive(Subcommand)]
enum RecordCommand {
    /// List every student with average and pass counts
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one student's profile, records and credentials
    Show {
        /// Student id
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Register a new, active student
    Register {
        /// Student id (identity document number)
        id: String,
        /// Full name
        name: String,
        /// Birth date
        #[arg(long, default_value = "")]
        birth_date: String,
        /// Nationality
        #[arg(long, default_value = "")]
        nationality: String,
    },

    /// Edit a student's profile
    Edit {
        /// Current student id
        id: String,
        /// New id
        #[arg(long)]
        new_id: Option<String>,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New birth date
        #[arg(long)]
        birth_date: Option<String>,
        /// New nationality
        #[arg(long)]
        nationality: Option<String>,
        /// New status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },

    /// Activate or deactivate a student
    Status {
        /// Student id
        id: String,
        /// New status
        #[arg(value_enum)]
        status: StatusArg,
    },

    /// Remove a student and their history
    Remove {
        /// Student id
        id: String,
    },

    /// Grade a subject; the pass flag follows the score
    Grade {
        /// Student id
        id: String,
        /// Subject name
        subject: String,
        /// Score
        score: f64,
    },

    /// Add a subject record with an explicit pass flag
    AddRecord {
        /// Student id
        id: String,
        /// Subject name
        subject: String,
        /// Score
        score: f64,
        /// Whether the subject was passed
        #[arg(long)]
        passed: bool,
    },

    /// Correct the score of a subject record
    EditScore {
        /// Student id
        id: String,
        /// Position of the record, as shown by `show`
        index: usize,
        /// New score
        score: f64,
    },

    /// Add a title or certification
    AddCredential {
        /// Student id
        id: String,
        /// Title
        title: String,
        /// Date obtained
        date: String,
        /// Distinction, if any
        #[arg(long)]
        note: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Compact { dry_run } => commands::compact::run(&cli.path, dry_run),
        Commands::Records(command) => {
            let mut registry = commands::open_registry(&cli.path).await?;
            run_record_command(&mut registry, command).await
        }
    }
}

async fn run_record_command(
    registry: &mut Registry,
    command: RecordCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        RecordCommand::List { format } => commands::view::list(registry, &format)?,
        RecordCommand::Show { id, format } => commands::view::show(registry, &id, &format)?,
        RecordCommand::Register {
            id,
            name,
            birth_date,
            nationality,
        } => {
            let student = Student::new(id, name, birth_date, nationality);
            commands::students::register(registry, student).await?;
        }
        RecordCommand::Edit {
            id,
            new_id,
            name,
            birth_date,
            nationality,
            status,
        } => {
            let edit = ProfileEdit {
                id: new_id,
                name,
                birth_date,
                nationality,
                status: status.map(StudentStatus::from),
            };
            commands::students::edit(registry, &id, edit).await?;
        }
        RecordCommand::Status { id, status } => {
            commands::students::set_status(registry, &id, status.into()).await?;
        }
        RecordCommand::Remove { id } => commands::students::remove(registry, &id).await?,
        RecordCommand::Grade { id, subject, score } => {
            commands::history::grade(registry, &id, &subject, score).await?;
        }
        RecordCommand::AddRecord {
            id,
            subject,
            score,
            passed,
        } => {
            let record = SubjectRecord::new(subject, score, passed);
            commands::history::add_record(registry, &id, record).await?;
        }
        RecordCommand::EditScore { id, index, score } => {
            commands::history::edit_score(registry, &id, index, score).await?;
        }
        RecordCommand::AddCredential {
            id,
            title,
            date,
            note,
        } => {
            let credential = Credential::new(title, date, note);
            commands::history::add_credential(registry, &id, credential).await?;
        }
    }
    Ok(())
}
