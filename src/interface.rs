use std::convert::TryFrom;
use std::io::Write;
use std::time::Duration as STDDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use prettytable::Table;
use tracing::{debug, info};

use crate::context::AppContext;
use crate::error::AuthError;
use crate::model::{
    Category, NewTask, Priority, Status, Task, TaskExtra, TaskId, TaskUpdate, TimeFrame, User,
};
use crate::stats::{self, FrameDashboard};
use crate::tracking::{format_clock, TrackingSession, TrackingState};
use crate::validation::{
    parse_due_date, parse_period, validate_confirmation, validate_description, validate_email,
    validate_password, validate_title,
};

const VERIFY_FIRST: &str = "Please verify your email address before continuing.";
const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// "45m", "2h" or "1h 30m".
pub fn format_minutes(minutes: u64) -> String {
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    let (hours, rest) = (minutes / 60, minutes % 60);
    if rest == 0 {
        format!("{}h", hours)
    } else {
        format!("{}h {}m", hours, rest)
    }
}

/// The auth request a failure message is chosen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthRequest {
    Register,
    Login,
    Verify,
    ResendVerification,
    ResetPassword,
    ConfirmReset,
}

/// The fixed message shown for a failed auth request.
fn auth_message(request: AuthRequest, err: &AuthError) -> &'static str {
    use AuthRequest::*;
    match (request, err) {
        (Register, AuthError::EmailInUse) => "Email is already in use. Please try another one.",
        (Register, AuthError::InvalidEmail(_)) => "Invalid email format.",
        (Register, AuthError::WeakPassword(_)) | (ConfirmReset, AuthError::WeakPassword(_)) => {
            "Password is too weak. Please choose a stronger password."
        }
        (Register, _) => "Failed to create an account. Please try again.",
        (Login, AuthError::UserNotFound) => "Failed to log in. Please try again.",
        (Login, _) => "Failed to log in. Incorrect email address or password.",
        (Verify, _) => "Invalid or expired verification code.",
        (ResendVerification, _) => "Failed to send verification email. Please try again.",
        (ResetPassword, AuthError::UserNotFound) => "No account found for that email address.",
        (ResetPassword, _) => "Failed to send password reset email. Please try again.",
        (ConfirmReset, _) => "Invalid or expired password reset code.",
    }
}

/// Unwrap an auth result, turning store failures into errors and everything
/// else into the message the user should see.
fn user_facing<T>(
    result: Result<T, AuthError>,
    request: AuthRequest,
) -> Result<Result<T, &'static str>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(AuthError::Store(err)) => Err(err.into()),
        Err(err) => {
            debug!(%err, ?request, "auth request failed");
            Ok(Err(auth_message(request, &err)))
        }
    }
}

/// The logged in and verified user, or `None` after telling the user why not.
fn require_user(ctx: &AppContext) -> Result<Option<User>> {
    match ctx.current_user()? {
        None => {
            println!("You are not logged in. Use 'taskmaster login' or 'taskmaster register' first.");
            Ok(None)
        }
        Some(user) if !user.email_verified => {
            println!("{}", VERIFY_FIRST);
            println!("Use 'taskmaster verify <code>', or 'taskmaster resend-verification' for a new code.");
            Ok(None)
        }
        Some(user) => Ok(Some(user)),
    }
}

fn find_task(ctx: &AppContext, user: &User, id: TaskId) -> Result<Option<Task>> {
    let task = ctx.store.task(Some(user), id)?;
    if task.is_none() {
        println!("There is no task {}.", id);
    }
    Ok(task)
}

pub fn register(ctx: &AppContext, email: &str, password: &str, confirmation: &str) -> Result<()> {
    let problems: Vec<String> = vec![
        validate_email(email.trim()),
        validate_password(password),
        validate_confirmation(password, confirmation),
    ]
    .into_iter()
    .filter_map(|check| check.err().map(|err| err.to_string()))
    .collect();
    if !problems.is_empty() {
        for problem in problems {
            println!("{}", problem);
        }
        return Ok(());
    }

    let auth = ctx.auth();
    let user = match user_facing(auth.register(email, password), AuthRequest::Register)? {
        Ok(user) => user,
        Err(message) => {
            println!("{}", message);
            return Ok(());
        }
    };

    let code = auth
        .send_verification_email(&user)
        .context("Failed to issue a verification code.")?;
    println!("Account created for {}.", user.email);
    println!("Verification code: {}", code);
    println!(
        "Verify your email address with 'taskmaster verify {}', then start adding tasks.",
        code
    );
    Ok(())
}

pub fn login(ctx: &AppContext, email: &str, password: &str) -> Result<()> {
    let result = user_facing(ctx.auth().login(email, password), AuthRequest::Login)?;
    match result {
        Ok(user) if !user.email_verified => println!("{}", VERIFY_FIRST),
        Ok(user) => println!("Logged in as {}.", user.email),
        Err(message) => println!("{}", message),
    }
    Ok(())
}

pub fn logout(ctx: &AppContext) -> Result<()> {
    ctx.auth().logout()?;
    println!("Logged out.");
    Ok(())
}

pub fn whoami(ctx: &AppContext) -> Result<()> {
    match ctx.current_user()? {
        Some(user) if user.email_verified => println!("{}", user.email),
        Some(user) => println!("{} (email not verified)", user.email),
        None => println!("Not logged in."),
    }
    Ok(())
}

pub fn verify(ctx: &AppContext, code: &str) -> Result<()> {
    match user_facing(ctx.auth().verify_email(code), AuthRequest::Verify)? {
        Ok(_) => println!("Email verified."),
        Err(message) => println!("{}", message),
    }
    Ok(())
}

pub fn resend_verification(ctx: &AppContext) -> Result<()> {
    let user = match ctx.current_user()? {
        Some(user) => user,
        None => {
            println!("You are not logged in.");
            return Ok(());
        }
    };
    if user.email_verified {
        println!("Your email address is already verified.");
        return Ok(());
    }
    let sent = ctx.auth().send_verification_email(&user);
    match user_facing(sent, AuthRequest::ResendVerification)? {
        Ok(code) => println!("Verification email sent. Your code is {}.", code),
        Err(message) => println!("{}", message),
    }
    Ok(())
}

pub fn reset_password(ctx: &AppContext, email: &str) -> Result<()> {
    match user_facing(ctx.auth().reset_password(email), AuthRequest::ResetPassword)? {
        Ok(code) => {
            println!("Password reset code: {}", code);
            println!("Set a new password with 'taskmaster confirm-reset {} <new password>'.", code);
        }
        Err(message) => println!("{}", message),
    }
    Ok(())
}

pub fn confirm_reset(ctx: &AppContext, code: &str, new_password: &str) -> Result<()> {
    if let Err(reason) = validate_password(new_password) {
        println!("{}", reason);
        return Ok(());
    }
    let reset = ctx.auth().confirm_password_reset(code, new_password);
    let result = user_facing(reset, AuthRequest::ConfirmReset)?;
    match result {
        Ok(()) => println!("Password updated. You can now log in."),
        Err(message) => println!("{}", message),
    }
    Ok(())
}

/// Input of the `add` command, before validation.
#[derive(Debug, Default)]
pub struct TaskForm {
    pub title: String,
    pub description: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub due: Option<String>,
    pub duration: Option<STDDuration>,
}

pub fn add_task(
    ctx: &mut AppContext,
    frame: TimeFrame,
    priority: Priority,
    category: Category,
    form: TaskForm,
) -> Result<Option<TaskId>> {
    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(None),
    };

    let TaskForm {
        title,
        description,
        start,
        end,
        due,
        duration,
    } = form;
    let title = title.trim().to_string();
    let description = description.unwrap_or_default().trim().to_string();
    let checked = validate_title(&title)
        .and(validate_description(&description))
        .and_then(|_| parse_period(frame, start.as_deref(), end.as_deref()))
        .and_then(|period| {
            let due_date = due.as_deref().map(parse_due_date).transpose()?;
            Ok((period, due_date))
        });
    let (period, due_date) = match checked {
        Ok(checked) => checked,
        Err(err) => {
            println!("{}", err);
            return Ok(None);
        }
    };

    let duration = match duration.map(duration_minutes).transpose() {
        Ok(minutes) => minutes.unwrap_or(0),
        Err(message) => {
            println!("{}", message);
            return Ok(None);
        }
    };
    let task = NewTask {
        title,
        description: Some(description).filter(|d| !d.is_empty()),
        priority,
        category,
        period,
        duration,
        due_date,
    };

    let id = ctx.store.create(Some(&user), &task)?;
    if let Some(id) = id {
        println!("{}. {} ({}, {})", id, task.title, frame, task.period);
    }
    Ok(id)
}

/// Whole minutes of a typed duration, rounding half a minute up.
fn duration_minutes(duration: STDDuration) -> Result<u32, String> {
    u32::try_from(duration.as_secs().saturating_add(30) / 60)
        .map_err(|_| format!("Duration '{}' is too long.", humantime::format_duration(duration)))
}

/// Which tasks `list` shows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub category: Option<Category>,
    pub status: Option<Status>,
}

impl ListFilter {
    fn keeps(&self, task: &Task) -> bool {
        self.category.map_or(true, |category| task.category == Some(category))
            && self.status.map_or(true, |status| task.status == status)
    }
}

fn label<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "?".to_string(), |value| value.to_string())
}

fn task_cell(task: &Task) -> String {
    let text = match &task.description {
        Some(description) => format!("{}\n{}", task.title, description),
        None => task.title.clone(),
    };
    textwrap::fill(&text, 40)
}

pub fn list(ctx: &AppContext, frame: TimeFrame, filter: ListFilter) -> Result<()> {
    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(()),
    };
    let now = Local::now();
    let tasks: Vec<Task> = stats::tasks_in_frame(&ctx.store.tasks(Some(&user))?, frame)
        .into_iter()
        .filter(|task| filter.keeps(task))
        .collect();
    if tasks.is_empty() {
        println!("No tasks found for the selected filters.");
        return Ok(());
    }
    let timers = ctx.store.active_tracking(&user)?;

    let mut table = Table::new();
    table.add_row(row!["id", "task", "when", "priority", "category", "status", "time", "due"]);
    for task in &tasks {
        let mut time = format_minutes(u64::from(task.duration));
        if let Some((_, started_at)) = timers.iter().find(|(id, _)| *id == task.id) {
            let running = TrackingSession::resumed(*started_at).elapsed(now);
            time = format!("{} (+{})", time, format_clock(running));
        }
        table.add_row(row![
            task.id,
            task_cell(task),
            label(task.period.as_ref()),
            label(task.priority),
            label(task.category),
            task.status,
            time,
            task.due_date
                .map(|due| due.format("%a %b %e").to_string())
                .unwrap_or_default()
        ]);
    }
    table.printstd();
    Ok(())
}

pub fn toggle(ctx: &mut AppContext, id: TaskId) -> Result<()> {
    toggle_at(ctx, id, Local::now())
}

fn toggle_at(ctx: &mut AppContext, id: TaskId, now: DateTime<Local>) -> Result<()> {
    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(()),
    };
    let task = match find_task(ctx, &user, id)? {
        Some(task) => task,
        None => return Ok(()),
    };

    // a completed task cannot be tracked, so commit a running timer first
    if !task.is_done() {
        commit_tracking(ctx, &user, &task, now)?;
    }
    ctx.store
        .update(Some(&user), id, &TaskUpdate::toggle(&task, now))?;
    println!("'{}' is now {}.", task.title, task.status.toggled());
    Ok(())
}

/// Requested changes of the `edit` command, before validation.
#[derive(Debug, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub frame: Option<TimeFrame>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub due: Option<String>,
}

fn edit_to_update(task: &Task, edit: TaskEdit) -> Result<TaskUpdate, String> {
    let mut update = TaskUpdate {
        priority: edit.priority,
        category: edit.category,
        ..TaskUpdate::default()
    };
    if let Some(title) = edit.title {
        let title = title.trim().to_string();
        validate_title(&title).map_err(|err| err.to_string())?;
        update.title = Some(title);
    }
    if let Some(description) = edit.description {
        let description = description.trim().to_string();
        validate_description(&description).map_err(|err| err.to_string())?;
        update.description = Some(Some(description).filter(|d| !d.is_empty()));
    }
    if edit.frame.is_some() || edit.start.is_some() || edit.end.is_some() {
        let frame = match edit.frame.or_else(|| task.time_frame()) {
            Some(frame) => frame,
            None => return Err("The task has no known time frame; pass --frame.".to_string()),
        };
        // bounds left out keep their stored value while the frame is unchanged
        let (start, end) = match &task.period {
            Some(period) if period.time_frame() == frame => {
                let (start, end) = period.bounds();
                let kept = |bound: String| Some(bound).filter(|b| !b.is_empty());
                (edit.start.or_else(|| kept(start)), edit.end.or_else(|| kept(end)))
            }
            _ => (edit.start, edit.end),
        };
        let period = parse_period(frame, start.as_deref(), end.as_deref())
            .map_err(|err| err.to_string())?;
        update.period = Some(period);
    }
    if let Some(due) = edit.due {
        let due = due.trim();
        update.due_date = Some(if due.is_empty() {
            None
        } else {
            Some(parse_due_date(due).map_err(|err| err.to_string())?)
        });
    }
    Ok(update)
}

pub fn edit(ctx: &mut AppContext, id: TaskId, edit: TaskEdit) -> Result<()> {
    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(()),
    };
    let task = match find_task(ctx, &user, id)? {
        Some(task) => task,
        None => return Ok(()),
    };
    let update = match edit_to_update(&task, edit) {
        Ok(update) => update,
        Err(message) => {
            println!("{}", message);
            return Ok(());
        }
    };
    if update.is_empty() {
        println!("Nothing to change.");
        return Ok(());
    }
    ctx.store.update(Some(&user), id, &update)?;
    println!("Task {} updated.", id);
    Ok(())
}

pub fn remove_task(ctx: &mut AppContext, id: TaskId) -> Result<()> {
    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(()),
    };
    if ctx.store.delete(Some(&user), id)? {
        println!("Task {} removed.", id);
    } else {
        println!("There is no task {}.", id);
    }
    Ok(())
}

pub fn start(ctx: &mut AppContext, id: TaskId) -> Result<()> {
    start_at(ctx, id, Local::now())
}

fn start_at(ctx: &mut AppContext, id: TaskId, now: DateTime<Local>) -> Result<()> {
    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(()),
    };
    let task = match find_task(ctx, &user, id)? {
        Some(task) => task,
        None => return Ok(()),
    };

    let mut session = match ctx.store.tracking_for(&user, id)? {
        Some(started_at) => TrackingSession::resumed(started_at),
        None => TrackingSession::default(),
    };
    if session.start(&task, now) {
        ctx.store.open_tracking(&user, id, now)?;
        info!(task = %id, "tracking started");
        println!("Tracking '{}'.", task.title);
    } else {
        match session.state() {
            TrackingState::Tracking { started_at } => println!(
                "Already tracking '{}' since {} ({}).",
                task.title,
                started_at.format("%H:%M"),
                format_clock(session.elapsed(now))
            ),
            TrackingState::Idle => println!(
                "'{}' is completed. Toggle it back to pending to track time.",
                task.title
            ),
        }
    }
    Ok(())
}

/// Stop the timer of `task`, if running, and add its minutes to the task.
fn commit_tracking(
    ctx: &mut AppContext,
    user: &User,
    task: &Task,
    now: DateTime<Local>,
) -> Result<Option<u32>> {
    let mut session = match ctx.store.tracking_for(user, task.id)? {
        Some(started_at) => TrackingSession::resumed(started_at),
        None => TrackingSession::default(),
    };
    let minutes = match session.stop(now) {
        Some(minutes) => minutes,
        None => return Ok(None),
    };
    let total = ctx.store.finish_tracking(user, task.id, minutes)?;
    info!(task = %task.id, minutes, "tracking stopped");
    Ok(total.map(|_| minutes))
}

pub fn stop(ctx: &mut AppContext, id: TaskId) -> Result<()> {
    stop_at(ctx, id, Local::now())
}

fn stop_at(ctx: &mut AppContext, id: TaskId, now: DateTime<Local>) -> Result<()> {
    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(()),
    };
    let task = match find_task(ctx, &user, id)? {
        Some(task) => task,
        None => return Ok(()),
    };
    match commit_tracking(ctx, &user, &task, now)? {
        Some(minutes) => println!(
            "Stopped. Added {} to '{}' (total {}).",
            format_minutes(u64::from(minutes)),
            task.title,
            format_minutes(u64::from(task.duration) + u64::from(minutes))
        ),
        None => println!("Not tracking '{}'.", task.title),
    }
    Ok(())
}

fn timers_table(
    tasks: &[Task],
    timers: &[(TaskId, DateTime<Local>)],
    now: DateTime<Local>,
) -> Table {
    let mut table = Table::new();
    table.add_row(row!["id", "task", "running for", "tracked before"]);
    for (id, started_at) in timers {
        let task = tasks.iter().find(|task| task.id == *id);
        table.add_row(row![
            id,
            task.map(|task| task.title.clone()).unwrap_or_default(),
            format_clock(TrackingSession::resumed(*started_at).elapsed(now)),
            format_minutes(task.map_or(0, |task| u64::from(task.duration)))
        ]);
    }
    table
}

pub fn status(ctx: &AppContext) -> Result<()> {
    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(()),
    };
    let timers = ctx.store.active_tracking(&user)?;
    if timers.is_empty() {
        println!("No timers running.");
        return Ok(());
    }
    timers_table(&ctx.store.tasks(Some(&user))?, &timers, Local::now()).printstd();
    Ok(())
}

fn bar(count: u32) -> String {
    "#".repeat(count as usize)
}

fn summary_table(dashboard: &FrameDashboard) -> Table {
    let completion = &dashboard.completion;
    let mut table = Table::new();
    table.add_row(row![
        "tasks",
        format!("{} completed / {} pending", completion.completed, completion.pending)
    ]);
    table.add_row(row!["completion rate", format!("{}%", completion.rate)]);
    table.add_row(row![
        "time tracked",
        format!("{}h {}m", dashboard.duration.hours, dashboard.duration.minutes)
    ]);
    table.add_row(row!["productivity score", format!("{}%", dashboard.productivity_score)]);
    if dashboard.frame == TimeFrame::Weekly {
        table.add_row(row![
            "rating",
            stats::productivity_rating(dashboard.productivity_score)
        ]);
    }
    table.add_row(row![
        "high priority completion",
        format!("{}%", dashboard.high_priority_rate)
    ]);
    table
}

fn categories_table(dashboard: &FrameDashboard) -> Table {
    let mut table = Table::new();
    table.add_row(row!["category", "tasks", "completed", "rate", "time"]);
    for entry in &dashboard.categories {
        table.add_row(row![
            entry.category,
            entry.count,
            entry.completed_count,
            format!("{}%", entry.completion_rate()),
            format_minutes(entry.total_minutes)
        ]);
    }
    table
}

fn category_time_table(dashboard: &FrameDashboard) -> Table {
    let mut table = Table::new();
    table.add_row(row!["category", "time"]);
    for (category, minutes) in &dashboard.category_minutes {
        table.add_row(row![category, format_minutes(*minutes)]);
    }
    table
}

fn priority_table(dashboard: &FrameDashboard) -> Table {
    let mut table = Table::new();
    table.add_row(row!["priority", "tasks"]);
    for entry in stats::chart_ready(dashboard.priorities.clone()) {
        table.add_row(row![entry.priority, entry.count]);
    }
    table
}

fn hourly_table(dashboard: &FrameDashboard) -> Table {
    let mut table = Table::new();
    table.add_row(row!["hour", "tasks created"]);
    for (hour, count) in dashboard.hourly.iter().enumerate().filter(|(_, count)| **count > 0) {
        table.add_row(row![format!("{}:00", hour), format!("{} {}", bar(*count), count)]);
    }
    table
}

fn weekday_table(dashboard: &FrameDashboard) -> Table {
    let mut table = Table::new();
    table.add_row(row!["day", "completed", "pending"]);
    for (day, counts) in WEEKDAYS.iter().zip(dashboard.weekdays.iter()) {
        table.add_row(row![day, counts.completed, counts.pending]);
    }
    table
}

fn weeks_table(dashboard: &FrameDashboard) -> Table {
    let mut table = Table::new();
    table.add_row(row!["week", "completed", "pending", "time"]);
    for (index, week) in dashboard.weeks.iter().enumerate() {
        // the fifth week only exists in long months
        if index == 4 && week.completed + week.pending == 0 {
            continue;
        }
        table.add_row(row![
            format!("Week {}", index + 1),
            week.completed,
            week.pending,
            format_minutes(week.total_minutes)
        ]);
    }
    table
}

/// The sections shown for a frame, each with its heading.
fn dashboard_sections(dashboard: &FrameDashboard) -> Vec<(&'static str, Table)> {
    let mut sections = vec![("Overview", summary_table(dashboard))];
    if dashboard.completion.total == 0 {
        return sections;
    }
    match dashboard.frame {
        TimeFrame::Daily => {
            sections.push(("Time by category", category_time_table(dashboard)));
            sections.push(("Tasks by priority", priority_table(dashboard)));
            sections.push(("Tasks by hour", hourly_table(dashboard)));
        }
        TimeFrame::Weekly => {
            sections.push(("Daily completion", weekday_table(dashboard)));
            sections.push(("Categories", categories_table(dashboard)));
        }
        TimeFrame::Monthly => {
            sections.push(("Weekly progress", weeks_table(dashboard)));
            sections.push(("Categories", categories_table(dashboard)));
        }
    }
    sections
}

fn print_dashboard(dashboard: &FrameDashboard) {
    let title = dashboard.frame.as_str();
    println!(
        "{}{} overview",
        title[..1].to_ascii_uppercase(),
        &title[1..]
    );
    for (heading, table) in dashboard_sections(dashboard) {
        println!("\n{}", heading);
        table.printstd();
    }
}

pub fn dashboard(ctx: &AppContext, frame: TimeFrame) -> Result<()> {
    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(()),
    };
    let tasks = ctx.store.tasks(Some(&user))?;
    print_dashboard(&FrameDashboard::build(&tasks, frame));
    Ok(())
}

/// Keep the dashboard on screen. The dashboard is rebuilt from every
/// snapshot the store pushes; the timers are redrawn on every tick.
pub fn watch(ctx: &mut AppContext, frame: TimeFrame) -> Result<()> {
    use std::cell::RefCell;
    use std::rc::Rc;

    let user = match require_user(ctx)? {
        Some(user) => user,
        None => return Ok(()),
    };

    let latest: Rc<RefCell<(Vec<Task>, FrameDashboard)>> =
        Rc::new(RefCell::new((Vec::new(), FrameDashboard::build(&[], frame))));
    let sink = Rc::clone(&latest);
    let subscription = ctx.store.subscribe(Some(&user), move |tasks| {
        debug!(tasks = tasks.len(), "new snapshot");
        *sink.borrow_mut() = (tasks.to_vec(), FrameDashboard::build(tasks, frame));
    })?;

    let interval = STDDuration::from_millis(ctx.config.watch_interval_ms);
    loop {
        if ctx.store.poll_changes()? && ctx.current_user()?.map(|u| u.id) != Some(user.id) {
            // logged out from another terminal
            if let Some(subscription) = subscription {
                ctx.store.unsubscribe(subscription);
            }
            println!("The session has ended.");
            return Ok(());
        }
        let timers = ctx.store.active_tracking(&user)?;

        print!("\x1B[2J\x1B[H");
        {
            let snapshot = latest.borrow();
            print_dashboard(&snapshot.1);
            if !timers.is_empty() {
                println!("\nRunning timers");
                timers_table(&snapshot.0, &timers, Local::now()).printstd();
            }
        }
        std::io::stdout().flush().context("Failed to write to the terminal.")?;

        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, ValidationError};
    use crate::model::fixtures::at;
    use crate::model::Period;
    use chrono::{Duration, Weekday};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const PASSWORD: &str = "Sup3r$ecret";

    /// A context with a verified, logged in user.
    fn logged_in() -> (AppContext, User) {
        let ctx = AppContext::in_memory();
        let auth = ctx.auth();
        let user = auth.register("ada@example.com", PASSWORD).unwrap();
        let code = auth.send_verification_email(&user).unwrap();
        auth.verify_email(&code).unwrap();
        let user = ctx.current_user().unwrap().unwrap();
        (ctx, user)
    }

    fn form(title: &str) -> TaskForm {
        TaskForm {
            title: title.to_string(),
            ..TaskForm::default()
        }
    }

    fn add(ctx: &mut AppContext, title: &str) -> TaskId {
        add_task(ctx, TimeFrame::Daily, Priority::High, Category::Work, form(title))
            .unwrap()
            .unwrap()
    }

    #[rstest]
    #[case(0, "0m")]
    #[case(45, "45m")]
    #[case(60, "1h")]
    #[case(90, "1h 30m")]
    #[case(600, "10h")]
    fn minutes_are_formatted_like_the_dashboard(#[case] minutes: u64, #[case] expected: &str) {
        assert_eq!(format_minutes(minutes), expected);
    }

    #[rstest]
    #[case(AuthRequest::Register, AuthError::EmailInUse, "Email is already in use. Please try another one.")]
    #[case(AuthRequest::Register, AuthError::InvalidEmail(ValidationError::InvalidEmail), "Invalid email format.")]
    #[case(
        AuthRequest::Register,
        AuthError::WeakPassword(ValidationError::PasswordTooShort { min: 8 }),
        "Password is too weak. Please choose a stronger password."
    )]
    #[case(AuthRequest::Register, AuthError::InvalidCode, "Failed to create an account. Please try again.")]
    #[case(AuthRequest::Login, AuthError::UserNotFound, "Failed to log in. Please try again.")]
    #[case(
        AuthRequest::Login,
        AuthError::InvalidCredentials,
        "Failed to log in. Incorrect email address or password."
    )]
    #[case(AuthRequest::Verify, AuthError::InvalidCode, "Invalid or expired verification code.")]
    #[case(
        AuthRequest::ResendVerification,
        AuthError::UserNotFound,
        "Failed to send verification email. Please try again."
    )]
    #[case(AuthRequest::ResetPassword, AuthError::UserNotFound, "No account found for that email address.")]
    #[case(
        AuthRequest::ResetPassword,
        AuthError::InvalidEmail(ValidationError::InvalidEmail),
        "Failed to send password reset email. Please try again."
    )]
    #[case(AuthRequest::ConfirmReset, AuthError::InvalidCode, "Invalid or expired password reset code.")]
    #[case(
        AuthRequest::ConfirmReset,
        AuthError::WeakPassword(ValidationError::PasswordMismatch),
        "Password is too weak. Please choose a stronger password."
    )]
    fn auth_failures_map_to_fixed_messages(
        #[case] request: AuthRequest,
        #[case] err: AuthError,
        #[case] expected: &str,
    ) {
        assert_eq!(auth_message(request, &err), expected);
        assert_eq!(user_facing::<()>(Err(err), request).unwrap(), Err(expected));
    }

    #[test]
    fn auth_store_failures_are_errors_not_messages() {
        let err = AuthError::Store(StoreError::Sqlite {
            context: "Failed to read the session from database.",
            source: rusqlite::Error::QueryReturnedNoRows,
        });
        assert!(user_facing::<()>(Err(err), AuthRequest::Login).is_err());
    }

    #[test]
    fn auth_messages_from_a_real_journal() {
        let ctx = AppContext::in_memory();
        let auth = ctx.auth();
        auth.register("ada@example.com", PASSWORD).unwrap();

        let taken = auth.register("ada@example.com", PASSWORD);
        assert_eq!(
            user_facing(taken, AuthRequest::Register).unwrap().unwrap_err(),
            "Email is already in use. Please try another one."
        );
        let wrong = auth.login("ada@example.com", "Wr0ng!pass");
        assert_eq!(
            user_facing(wrong, AuthRequest::Login).unwrap().unwrap_err(),
            "Failed to log in. Incorrect email address or password."
        );
    }

    #[test]
    fn tasks_need_a_verified_user() {
        let mut ctx = AppContext::in_memory();
        assert_eq!(
            add_task(&mut ctx, TimeFrame::Daily, Priority::Low, Category::Other, form("Nope")).unwrap(),
            None
        );

        ctx.auth().register("ada@example.com", PASSWORD).unwrap();
        assert_eq!(
            add_task(&mut ctx, TimeFrame::Daily, Priority::Low, Category::Other, form("Still no")).unwrap(),
            None
        );
    }

    #[test]
    fn invalid_forms_are_not_stored() {
        let (mut ctx, user) = logged_in();
        let mut bad_start = form("Standup");
        bad_start.start = Some("noonish".to_string());

        for form in vec![form("42 things"), bad_start] {
            assert_eq!(
                add_task(&mut ctx, TimeFrame::Daily, Priority::Low, Category::Work, form).unwrap(),
                None
            );
        }
        assert!(ctx.store.tasks(Some(&user)).unwrap().is_empty());
    }

    #[test]
    fn add_rounds_duration_and_keeps_period() {
        let (mut ctx, user) = logged_in();
        let mut weekly = form("  Review goals ");
        weekly.description = Some("   ".to_string());
        weekly.start = Some("Tuesday".to_string());
        weekly.duration = Some(STDDuration::from_secs(90 * 60 + 40));

        let id = add_task(&mut ctx, TimeFrame::Weekly, Priority::Medium, Category::School, weekly)
            .unwrap()
            .unwrap();
        let task = ctx.store.task(Some(&user), id).unwrap().unwrap();
        assert_eq!(task.title, "Review goals");
        assert_eq!(task.description, None);
        assert_eq!(task.duration, 91);
        assert_eq!(task.time_frame(), Some(TimeFrame::Weekly));
        assert_eq!(task.period.unwrap().to_string(), "Tuesday - Friday");
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert_eq!(duration_minutes(STDDuration::from_secs(89)), Ok(1));
        assert_eq!(duration_minutes(STDDuration::from_secs(90)), Ok(2));
        assert!(duration_minutes(STDDuration::from_secs(u64::MAX)).is_err());

        let (mut ctx, user) = logged_in();
        let mut huge = form("Forever");
        huge.duration = Some(STDDuration::from_secs(60 * (u64::from(u32::MAX) + 1)));
        assert_eq!(
            add_task(&mut ctx, TimeFrame::Daily, Priority::Low, Category::Other, huge).unwrap(),
            None
        );
        assert!(ctx.store.tasks(Some(&user)).unwrap().is_empty());
    }

    #[test]
    fn tracking_adds_rounded_minutes() {
        let (mut ctx, user) = logged_in();
        let id = add(&mut ctx, "Write report");
        let start = at(2024, 5, 6, 9, 0);

        start_at(&mut ctx, id, start).unwrap();
        // a second start keeps the first timestamp
        start_at(&mut ctx, id, start + Duration::minutes(10)).unwrap();
        stop_at(&mut ctx, id, start + Duration::seconds(20 * 60 + 45)).unwrap();
        assert_eq!(ctx.store.task(Some(&user), id).unwrap().unwrap().duration, 21);

        // stopping again changes nothing
        stop_at(&mut ctx, id, start + Duration::hours(2)).unwrap();
        assert_eq!(ctx.store.task(Some(&user), id).unwrap().unwrap().duration, 21);
    }

    #[test]
    fn completing_a_task_commits_its_timer_and_blocks_new_ones() {
        let (mut ctx, user) = logged_in();
        let id = add(&mut ctx, "Laundry");
        let start = at(2024, 5, 6, 18, 0);

        start_at(&mut ctx, id, start).unwrap();
        toggle_at(&mut ctx, id, start + Duration::minutes(30)).unwrap();

        let task = ctx.store.task(Some(&user), id).unwrap().unwrap();
        assert_eq!(task.status, Status::Completed);
        assert_eq!(task.duration, 30);
        assert_eq!(task.completed_at, Some(start + Duration::minutes(30)));
        assert!(ctx.store.active_tracking(&user).unwrap().is_empty());

        start_at(&mut ctx, id, start + Duration::hours(1)).unwrap();
        assert!(ctx.store.active_tracking(&user).unwrap().is_empty());

        toggle_at(&mut ctx, id, start + Duration::hours(2)).unwrap();
        let task = ctx.store.task(Some(&user), id).unwrap().unwrap();
        assert_eq!(task.status, Status::Pending);
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn edit_moves_a_task_to_another_frame() {
        let (mut ctx, user) = logged_in();
        let id = add(&mut ctx, "Budget");

        edit(
            &mut ctx,
            id,
            TaskEdit {
                frame: Some(TimeFrame::Monthly),
                end: Some("Last".to_string()),
                due: Some("2024-06-30".to_string()),
                ..TaskEdit::default()
            },
        )
        .unwrap();

        let task = ctx.store.task(Some(&user), id).unwrap().unwrap();
        assert_eq!(task.time_frame(), Some(TimeFrame::Monthly));
        assert_eq!(task.period.unwrap().to_string(), "First - Last week");
        assert!(task.due_date.is_some());
    }

    #[test]
    fn editing_one_bound_keeps_the_other() {
        let mut daily = crate::model::fixtures::task(1);
        daily.period = Some(Period::Daily {
            start_time: "09:00 AM".to_string(),
            end_time: "11:00 AM".to_string(),
        });
        let later_start = TaskEdit {
            start: Some("10:00 AM".to_string()),
            ..TaskEdit::default()
        };
        assert_eq!(
            edit_to_update(&daily, later_start).unwrap().period,
            Some(Period::Daily {
                start_time: "10:00 AM".to_string(),
                end_time: "11:00 AM".to_string(),
            })
        );

        let mut weekly = crate::model::fixtures::task(2);
        weekly.period = Some(Period::Weekly {
            start_day: Weekday::Wed,
            end_day: Weekday::Thu,
        });
        let to_saturday = TaskEdit {
            frame: Some(TimeFrame::Weekly),
            end: Some("saturday".to_string()),
            ..TaskEdit::default()
        };
        assert_eq!(
            edit_to_update(&weekly, to_saturday).unwrap().period,
            Some(Period::Weekly {
                start_day: Weekday::Wed,
                end_day: Weekday::Sat,
            })
        );
    }

    #[test]
    fn switching_frames_starts_from_the_new_frame_defaults() {
        let mut daily = crate::model::fixtures::task(1);
        daily.period = Some(Period::Daily {
            start_time: "09:00 AM".to_string(),
            end_time: "11:00 AM".to_string(),
        });
        let to_weekly = TaskEdit {
            frame: Some(TimeFrame::Weekly),
            ..TaskEdit::default()
        };
        assert_eq!(
            edit_to_update(&daily, to_weekly).unwrap().period,
            Some(Period::default_for(TimeFrame::Weekly))
        );
    }

    #[test]
    fn edit_rejects_bad_input_without_touching_the_task() {
        let task = crate::model::fixtures::task(1);

        let bad = TaskEdit {
            title: Some("#hashtag".to_string()),
            ..TaskEdit::default()
        };
        assert_eq!(
            edit_to_update(&task, bad).unwrap_err(),
            "Title must start with a letter"
        );

        let clear = TaskEdit {
            description: Some(String::new()),
            due: Some(String::new()),
            ..TaskEdit::default()
        };
        let update = edit_to_update(&task, clear).unwrap();
        assert_eq!(update.description, Some(None));
        assert_eq!(update.due_date, Some(None));
    }

    #[test]
    fn list_filter() {
        let mut work = crate::model::fixtures::task(1);
        work.category = Some(Category::Work);
        let mut done = crate::model::fixtures::task(2);
        done.status = Status::Completed;

        let only_work = ListFilter {
            category: Some(Category::Work),
            status: None,
        };
        assert!(only_work.keeps(&work));
        assert!(!only_work.keeps(&done));

        let only_done = ListFilter {
            category: None,
            status: Some(Status::Completed),
        };
        assert!(!only_done.keeps(&work));
        assert!(only_done.keeps(&done));
    }

    #[test]
    fn dashboard_sections_follow_the_frame() {
        let headings = |frame| {
            let mut task = crate::model::fixtures::task(1);
            task.period = Some(crate::model::Period::default_for(frame));
            dashboard_sections(&FrameDashboard::build(&[task], frame))
                .into_iter()
                .map(|(heading, _)| heading)
                .collect::<Vec<_>>()
        };
        assert_eq!(
            headings(TimeFrame::Daily),
            vec!["Overview", "Time by category", "Tasks by priority", "Tasks by hour"]
        );
        assert_eq!(
            headings(TimeFrame::Weekly),
            vec!["Overview", "Daily completion", "Categories"]
        );
        assert_eq!(
            headings(TimeFrame::Monthly),
            vec!["Overview", "Weekly progress", "Categories"]
        );

        let empty = dashboard_sections(&FrameDashboard::build(&[], TimeFrame::Daily));
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn removing_a_task() {
        let (mut ctx, user) = logged_in();
        let id = add(&mut ctx, "Temporary");
        remove_task(&mut ctx, id).unwrap();
        assert!(ctx.store.tasks(Some(&user)).unwrap().is_empty());
        // removing twice is harmless
        remove_task(&mut ctx, id).unwrap();
    }
}
