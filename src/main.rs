#[macro_use] extern crate prettytable;

use structopt::StructOpt;
use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use directories::ProjectDirs;
use rusqlite::Connection;
use tracing::debug;

mod auth;
mod cli;
mod config;
mod context;
mod error;
mod interface;
mod model;
mod stats;
mod store;
mod tracking;
mod validation;

use cli::{Command::*, CommandLineArgs};
use config::Config;
use context::AppContext;
use interface::{ListFilter, TaskEdit, TaskForm};
use model::TimeFrame;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "gozque", "taskmaster")
}

fn find_default_journal_file() -> anyhow::Result<Option<PathBuf>> {
    if let Some(base_dirs) = project_dirs() {
        let root_dir = base_dirs.data_dir();
        if !root_dir.exists() {
            std::fs::create_dir_all(root_dir).context("Failed to create directory.")?;
        }
        let mut path = PathBuf::from(root_dir);
        path.push("db.sqlite");
        Ok(Some(path))
    } else {
        Ok(None)
    }
}

/// Get a connection to the journal database, creating it if it does
/// not exist. Tables are created when the store opens it.
pub fn get_journal_db(journal_path: &Path) -> anyhow::Result<Connection> {
    debug!(path = %journal_path.display(), "opening journal");
    Connection::open(journal_path)
        .with_context(|| format!("Failed to open journal {}.", journal_path.display()))
}

fn init_tracing(quiet: bool, verbose: bool, configured: Option<&str>) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        configured.unwrap_or("warn")
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("TASKMASTER_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("Failed to initialize logging: {}", error))?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Get the command-line arguments.
    let CommandLineArgs {
        action,
        journal_file,
        verbose,
        quiet,
    } = CommandLineArgs::from_args();

    let dirs = project_dirs();
    let config = Config::load(dirs.as_ref().map(ProjectDirs::config_dir))?;
    init_tracing(quiet, verbose, config.log_level.as_deref())?;

    // Unpack the journal file.
    let journal_file = match journal_file.or_else(|| config.journal_file.clone()) {
        Some(path) => path,
        None => find_default_journal_file()?.ok_or(anyhow!("Failed to find journal file."))?,
    };
    let default_frame = config.default_frame()?;
    let mut ctx = AppContext::new(get_journal_db(&journal_file)?, config)?;
    let frame_or_default = |frame: Option<TimeFrame>| frame.unwrap_or(default_frame);

    // Perform the action.
    match action {
        Register { email, password, confirm_password } => {
            interface::register(&ctx, &email, &password, &confirm_password)
        },
        Login { email, password } => interface::login(&ctx, &email, &password),
        Logout => interface::logout(&ctx),
        Whoami => interface::whoami(&ctx),
        Verify { code } => interface::verify(&ctx, &code),
        ResendVerification => interface::resend_verification(&ctx),
        ResetPassword { email } => interface::reset_password(&ctx, &email),
        ConfirmReset { code, new_password } => {
            interface::confirm_reset(&ctx, &code, &new_password)
        },
        Add { title, frame, description, priority, category, duration, start, end, due } => {
            let form = TaskForm { title, description, start, end, due, duration };
            interface::add_task(&mut ctx, frame, priority, category, form).map(|_| ())
        },
        List { frame, category, completed, pending } => {
            let status = if completed {
                Some(model::Status::Completed)
            } else if pending {
                Some(model::Status::Pending)
            } else {
                None
            };
            interface::list(&ctx, frame_or_default(frame), ListFilter { category, status })
        },
        Toggle { id } => interface::toggle(&mut ctx, id),
        Edit { id, title, description, priority, category, frame, start, end, due } => {
            let edit = TaskEdit { title, description, priority, category, frame, start, end, due };
            interface::edit(&mut ctx, id, edit)
        },
        Rm { id } => interface::remove_task(&mut ctx, id),
        Start { id } => interface::start(&mut ctx, id),
        Stop { id } => interface::stop(&mut ctx, id),
        Status => interface::status(&ctx),
        Dashboard { frame } => interface::dashboard(&ctx, frame_or_default(frame)),
        Watch { frame } => interface::watch(&mut ctx, frame_or_default(frame)),
        Init => {
            println!("Journal ready at {}", journal_file.display());
            Ok(())
        },
    }?;
    Ok(())
}
