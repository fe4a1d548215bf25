use std::path::PathBuf;
use std::time::Duration;

use humantime::parse_duration;
use structopt::StructOpt;

use crate::model::{Category, Priority, TaskId, TimeFrame};

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Create an account. You will be logged in and given a verification code.
    Register {
        email: String,
        password: String,
        /// Repeat the password.
        confirm_password: String,
    },
    /// Log in to an existing account.
    Login { email: String, password: String },
    /// Log out.
    Logout,
    /// Show who is logged in.
    Whoami,
    /// Verify your email address with the code you were given.
    Verify { code: String },
    /// Get a new verification code.
    ResendVerification,
    /// Ask for a password reset code.
    ResetPassword { email: String },
    /// Set a new password using a reset code.
    ConfirmReset {
        code: String,
        new_password: String,
    },
    /// Add a new task.
    Add {
        /// The task title.
        title: String,

        /// daily, weekly or monthly.
        #[structopt(short, long, default_value = "daily")]
        frame: TimeFrame,

        #[structopt(short, long)]
        description: Option<String>,

        /// low, medium or high.
        #[structopt(short, long, default_value = "medium")]
        priority: Priority,

        /// work, school, domestic, personal or other.
        #[structopt(short, long, default_value = "personal")]
        category: Category,

        /// Time already spent (parse_duration, e.g. "45m" or "1h 30m").
        #[structopt(long, parse(try_from_str=parse_duration))]
        duration: Option<Duration>,

        /// Daily: start time ("09:00 AM"). Weekly: start day. Monthly: start week (First..Last).
        #[structopt(long)]
        start: Option<String>,

        /// Daily: end time. Weekly: end day. Monthly: end week.
        #[structopt(long)]
        end: Option<String>,

        /// Due date, YYYY-MM-DD.
        #[structopt(long)]
        due: Option<String>,
    },
    /// List tasks of a time frame.
    List {
        #[structopt(short, long)]
        frame: Option<TimeFrame>,

        /// Only tasks of this category.
        #[structopt(short, long)]
        category: Option<Category>,

        /// Only completed tasks.
        #[structopt(long, conflicts_with = "pending")]
        completed: bool,

        /// Only pending tasks.
        #[structopt(long)]
        pending: bool,
    },
    /// Mark a task completed, or pending again.
    Toggle { id: TaskId },
    /// Change fields of a task.
    Edit {
        id: TaskId,

        #[structopt(long)]
        title: Option<String>,

        /// New description. An empty string removes it.
        #[structopt(long)]
        description: Option<String>,

        #[structopt(long)]
        priority: Option<Priority>,

        #[structopt(long)]
        category: Option<Category>,

        /// Move the task to another time frame.
        #[structopt(long)]
        frame: Option<TimeFrame>,

        #[structopt(long)]
        start: Option<String>,

        #[structopt(long)]
        end: Option<String>,

        /// Due date, YYYY-MM-DD. An empty string removes it.
        #[structopt(long)]
        due: Option<String>,
    },
    /// Remove a task.
    Rm { id: TaskId },
    /// Start tracking time on a task.
    Start { id: TaskId },
    /// Stop tracking time on a task and add it to the task's duration.
    Stop { id: TaskId },
    /// Show running timers.
    Status,
    /// Show completion, time and distribution statistics.
    Dashboard {
        #[structopt(short, long)]
        frame: Option<TimeFrame>,
    },
    /// Keep the dashboard and timers on screen, refreshing on changes.
    Watch {
        #[structopt(short, long)]
        frame: Option<TimeFrame>,
    },
    /// Init the journal file
    Init,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "taskmaster",
    about = "Track daily, weekly and monthly tasks and how you spend your time."
)]
pub struct CommandLineArgs {
    #[structopt(subcommand)]
    pub action: Command,

    /// Use a different journal file.
    #[structopt(parse(from_os_str), short, long)]
    pub journal_file: Option<PathBuf>,

    /// Log debug output.
    #[structopt(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors.
    #[structopt(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}
