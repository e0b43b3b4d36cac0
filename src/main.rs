//! Roster Tracker
//!
//! Tracks a mobile game alliance roster over time. Roster screenshots are
//! OCR'd into name/level/power rows, reconciled against known players and
//! stored as daily snapshots; growth summaries and charts are built from them.

mod analysis;
mod commands;
mod config;
mod error;
mod fetch;
mod logging;
mod maintenance;
mod ocr;
mod paths;
mod roster;
mod store;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{debug, error};

use commands::{Reply, Session};
use fetch::AttachmentLoader;
use ocr::TesseractEngine;
use store::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "roster-tracker", version)]
#[command(about = "Track alliance roster growth from in-game screenshots")]
struct Cli {
    /// Configuration file (defaults to config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overriding the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print more log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print replies as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add roster screenshot data for an alliance
    Upload {
        alliance: String,
        /// Screenshot files or http(s) URLs
        #[arg(required = true)]
        screenshots: Vec<String>,
    },
    /// Add player names to the dictionary and submit their backlog
    AddName {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Make <new_name> another spelling of <old_name>
    Alias { new_name: String, old_name: String },
    /// Correct a name in the backlog and submit the data for that player
    Correct { wrong: String, right: String },
    /// Submit backlog data without the power check
    Confirm {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Today's backlog and recorded count for an alliance
    Status { team: String },
    /// Known players a backlogged name probably belongs to
    Guess { name: String },
    /// Recent members without a snapshot today
    Missing { team: String },
    /// Set the case-sensitive display name of a player
    SetName { name: String },
    /// Summary and growth chart of a player
    Player { name: String },
    /// Growth of several players on one chart
    Compare {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Growth of every recent member of an alliance
    AllianceChart {
        team: String,
        #[arg(long, default_value_t = 1)]
        min_level: u32,
        #[arg(long, default_value_t = 40)]
        max_level: u32,
    },
    /// Activity of every recent member of an alliance
    Roster { team: String },
    /// Time until the next daily reset
    ResetTime,
    /// Database repairs
    #[command(subcommand)]
    Maintenance(Maintenance),
}

#[derive(Subcommand, Debug)]
enum Maintenance {
    /// Remove backlog entries recorded before a date (YYYY-MM-DD)
    PruneBacklog {
        #[arg(long)]
        before: NaiveDate,
    },
    Deactivate { name: String },
    Reactivate { name: String },
    /// Add the spellings of a newline-delimited file to the dictionary
    ImportDictionary { file: PathBuf },
}

fn run(cli: Cli) -> Result<Reply> {
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database = Some(db);
    }

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    debug!("Using database {}", db_path.display());

    let session = Session::new(
        &store,
        &config,
        Local::now().naive_local(),
        paths::get_charts_dir(),
    );

    match cli.command {
        Command::Upload {
            alliance,
            screenshots,
        } => {
            let engine = TesseractEngine::new(&config.ocr)?;
            let loader = AttachmentLoader::new(&config.fetch)?;
            session.upload(&alliance, &screenshots, &engine, &loader)
        }
        Command::AddName { names } => session.add_names(&names),
        Command::Alias { new_name, old_name } => session.alias(&new_name, &old_name),
        Command::Correct { wrong, right } => session.correct(&wrong, &right),
        Command::Confirm { names } => session.confirm(&names),
        Command::Status { team } => session.status(&team),
        Command::Guess { name } => session.guess(&name),
        Command::Missing { team } => session.missing(&team),
        Command::SetName { name } => session.set_name(&name),
        Command::Player { name } => session.player(&name),
        Command::Compare { names } => session.compare(&names),
        Command::AllianceChart {
            team,
            min_level,
            max_level,
        } => session.alliance_chart(&team, min_level, max_level),
        Command::Roster { team } => session.roster(&team),
        Command::ResetTime => Ok(session.reset_time()),
        Command::Maintenance(task) => match task {
            Maintenance::PruneBacklog { before } => session.prune_backlog(before),
            Maintenance::Deactivate { name } => session.set_active(&name, false),
            Maintenance::Reactivate { name } => session.set_active(&name, true),
            Maintenance::ImportDictionary { file } => session.import_dictionary(&file),
        },
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    paths::ensure_directories()?;
    logging::init(&paths::get_logs_dir(), cli.verbose)?;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("[PANIC] {}", panic_info);
    }));

    debug!("Running {:?}", cli.command);
    let json = cli.json;
    let reply = run(cli).inspect_err(|e| error!("{:#}", e))?;
    println!("{}", reply.render(json)?);
    Ok(())
}
