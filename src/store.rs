//! The task store: every task of every user, kept in the journal database.
//!
//! All reads and writes are scoped to the user passed in. Passing no user
//! (nobody is logged in) turns every call into a no-op, mirroring a hosted
//! store that refuses unauthenticated requests.

use std::convert::TryFrom;

use chrono::{DateTime, Local};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::{StoreContext, StoreError};
use crate::model::{NewTask, Period, Status, Task, TaskId, TaskUpdate, User, UserId};

pub type Result<T> = std::result::Result<T, StoreError>;

const TASK_COLUMNS: &str = "id, user_id, title, description, status, priority, category, time_frame, period_start, period_end, duration, created_at, due_date, completed_at";

/// Handle returned by [`TaskStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    user_id: UserId,
    on_change: Box<dyn FnMut(&[Task])>,
}

pub struct TaskStore {
    db: Connection,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
    seen_version: Option<i64>,
}

/// Initialize the journal database.
pub fn init_journal(db: &Connection) -> Result<()> {
    db.execute(
        "CREATE TABLE if not exists user (
                  id              INTEGER PRIMARY KEY AUTOINCREMENT,
                  email           TEXT NOT NULL UNIQUE,
                  password_salt   TEXT NOT NULL,
                  password_digest TEXT NOT NULL,
                  email_verified  INTEGER NOT NULL DEFAULT 0,
                  created_at      TEXT NOT NULL
                  )",
        [],
    )
    .store_context("Failed to create user table.")?;

    db.execute(
        "CREATE TABLE if not exists session (
                  id              INTEGER PRIMARY KEY CHECK (id = 1),
                  user_id         INTEGER NOT NULL,
                  started_at      TEXT NOT NULL
                  )",
        [],
    )
    .store_context("Failed to create session table.")?;

    db.execute(
        "CREATE TABLE if not exists code (
                  code            TEXT PRIMARY KEY,
                  user_id         INTEGER NOT NULL,
                  purpose         TEXT NOT NULL,
                  created_at      TEXT NOT NULL
                  )",
        [],
    )
    .store_context("Failed to create code table.")?;

    db.execute(
        "CREATE TABLE if not exists task (
                  id              INTEGER PRIMARY KEY AUTOINCREMENT,
                  user_id         INTEGER NOT NULL,
                  title           TEXT NOT NULL,
                  description     TEXT,
                  status          TEXT NOT NULL,
                  priority        TEXT NOT NULL,
                  category        TEXT NOT NULL,
                  time_frame      TEXT NOT NULL,
                  period_start    TEXT NOT NULL,
                  period_end      TEXT NOT NULL,
                  duration        INTEGER,
                  created_at      TEXT,
                  due_date        TEXT,
                  completed_at    TEXT
                  )",
        [],
    )
    .store_context("Failed to create task table.")?;

    db.execute(
        "CREATE INDEX if not exists task_user ON task (user_id)",
        [],
    )
    .store_context("Failed to create index on task table.")?;

    db.execute(
        "CREATE TABLE if not exists tracking (
                  task_id         INTEGER PRIMARY KEY,
                  user_id         INTEGER NOT NULL,
                  started_at      TEXT NOT NULL
                  )",
        [],
    )
    .store_context("Failed to create tracking table.")?;

    Ok(())
}

/// Return a task from a row laid out as [`TASK_COLUMNS`]. Values this version
/// does not recognize are kept as `None` instead of failing the whole read.
pub fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let id = TaskId(row.get(0)?);

    let status: String = row.get(4)?;
    let status = status.parse::<Status>().unwrap_or_else(|err| {
        warn!(task = %id, %err, "reading task as pending");
        Status::Pending
    });

    let priority: String = row.get(5)?;
    let category: String = row.get(6)?;
    let time_frame: String = row.get(7)?;
    let period_start: String = row.get(8)?;
    let period_end: String = row.get(9)?;

    let duration = row
        .get::<_, Option<i64>>(10)?
        .map(|minutes| u32::try_from(minutes.max(0)).unwrap_or(u32::MAX))
        .unwrap_or(0);

    Ok(Task {
        id,
        user_id: UserId(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        status,
        priority: recognized(id, priority.parse()),
        category: recognized(id, category.parse()),
        period: recognized(id, Period::from_parts(&time_frame, &period_start, &period_end)),
        duration,
        created_at: row.get(11)?,
        due_date: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

fn recognized<T, E: std::fmt::Display>(id: TaskId, parsed: std::result::Result<T, E>) -> Option<T> {
    match parsed {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(task = %id, %err, "keeping unrecognized value out of breakdowns");
            None
        }
    }
}

impl TaskStore {
    /// Wrap an open journal, creating its tables if they do not exist yet.
    pub fn open(db: Connection) -> Result<TaskStore> {
        init_journal(&db)?;
        Ok(TaskStore {
            db,
            subscribers: Vec::new(),
            next_subscription: 0,
            seen_version: None,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.db
    }

    /// Changes whenever another connection commits to the journal.
    pub fn data_version(&self) -> Result<i64> {
        self.db
            .query_row("PRAGMA data_version", [], |row| row.get(0))
            .store_context("Failed to read the journal data version.")
    }

    /// All tasks of `user`, oldest first. Empty when nobody is logged in.
    pub fn tasks(&self, user: Option<&User>) -> Result<Vec<Task>> {
        let user = match user {
            Some(user) => user,
            None => return Ok(Vec::new()),
        };
        self.tasks_of(user.id)
    }

    fn tasks_of(&self, user_id: UserId) -> Result<Vec<Task>> {
        let mut stmt = self
            .db
            .prepare(&format!(
                "SELECT {} FROM task WHERE user_id = ?1 ORDER BY id",
                TASK_COLUMNS
            ))
            .store_context("Failed to fetch tasks from database.")?;
        let mapped_rows = stmt
            .query_map(params![user_id.0], |row| task_from_row(row))
            .store_context("Failed to fetch tasks from database.")?;

        let mut tasks = Vec::new();
        for task in mapped_rows {
            tasks.push(task.store_context("Failed to read task from database.")?);
        }
        Ok(tasks)
    }

    pub fn task(&self, user: Option<&User>, id: TaskId) -> Result<Option<Task>> {
        let user = match user {
            Some(user) => user,
            None => return Ok(None),
        };
        self.db
            .query_row(
                &format!(
                    "SELECT {} FROM task WHERE id = ?1 AND user_id = ?2",
                    TASK_COLUMNS
                ),
                params![id.0, user.id.0],
                |row| task_from_row(row),
            )
            .optional()
            .store_context("Failed to fetch task from database.")
    }

    /// Register `on_change` for the snapshots of `user`. It is called once
    /// right away and again after every change made through this store.
    pub fn subscribe<F>(
        &mut self,
        user: Option<&User>,
        mut on_change: F,
    ) -> Result<Option<SubscriptionId>>
    where
        F: FnMut(&[Task]) + 'static,
    {
        let user = match user {
            Some(user) => user,
            None => return Ok(None),
        };
        on_change(&self.tasks_of(user.id)?);

        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push(Subscriber {
            id,
            user_id: user.id,
            on_change: Box::new(on_change),
        });
        Ok(Some(id))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|subscriber| subscriber.id != id);
    }

    /// Push fresh snapshots to every subscriber if another connection changed
    /// the journal since the last poll. Returns whether anything changed.
    pub fn poll_changes(&mut self) -> Result<bool> {
        let version = self.data_version()?;
        let changed = self.seen_version.map_or(false, |seen| seen != version);
        self.seen_version = Some(version);
        if !changed {
            return Ok(false);
        }

        let mut users: Vec<UserId> = self.subscribers.iter().map(|s| s.user_id).collect();
        users.sort_by_key(|user_id| user_id.0);
        users.dedup();
        for user_id in users {
            self.notify(user_id)?;
        }
        Ok(true)
    }

    fn notify(&mut self, user_id: UserId) -> Result<()> {
        if !self.subscribers.iter().any(|s| s.user_id == user_id) {
            return Ok(());
        }
        let snapshot = self.tasks_of(user_id)?;
        for subscriber in self.subscribers.iter_mut().filter(|s| s.user_id == user_id) {
            (subscriber.on_change)(&snapshot);
        }
        Ok(())
    }

    /// Store a new pending task stamped with the current time.
    pub fn create(&mut self, user: Option<&User>, task: &NewTask) -> Result<Option<TaskId>> {
        let user = match user {
            Some(user) => user,
            None => {
                debug!("ignoring task creation without a user");
                return Ok(None);
            }
        };
        let (period_start, period_end) = task.period.bounds();

        self.db
            .execute(
                "INSERT INTO task (user_id, title, description, status, priority, category, time_frame, period_start, period_end, duration, created_at, due_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    user.id.0,
                    task.title,
                    task.description,
                    Status::Pending.as_str(),
                    task.priority.as_str(),
                    task.category.as_str(),
                    task.period.time_frame().as_str(),
                    period_start,
                    period_end,
                    task.duration,
                    Local::now(),
                    task.due_date,
                ],
            )
            .store_context("Failed to insert task to database.")?;
        let id = TaskId(self.db.last_insert_rowid());
        debug!(task = %id, "task created");

        self.notify(user.id)?;
        Ok(Some(id))
    }

    /// Apply a partial update. Returns whether a task of `user` was changed.
    pub fn update(&mut self, user: Option<&User>, id: TaskId, update: &TaskUpdate) -> Result<bool> {
        let user = match user {
            Some(user) => user,
            None => return Ok(false),
        };
        if update.is_empty() {
            return Ok(false);
        }

        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(title) = &update.title {
            columns.push("title");
            values.push(Box::new(title.clone()));
        }
        if let Some(description) = &update.description {
            columns.push("description");
            values.push(Box::new(description.clone()));
        }
        if let Some(status) = update.status {
            columns.push("status");
            values.push(Box::new(status.as_str()));
        }
        if let Some(priority) = update.priority {
            columns.push("priority");
            values.push(Box::new(priority.as_str()));
        }
        if let Some(category) = update.category {
            columns.push("category");
            values.push(Box::new(category.as_str()));
        }
        if let Some(period) = &update.period {
            let (start, end) = period.bounds();
            columns.push("time_frame");
            values.push(Box::new(period.time_frame().as_str()));
            columns.push("period_start");
            values.push(Box::new(start));
            columns.push("period_end");
            values.push(Box::new(end));
        }
        if let Some(duration) = update.duration {
            columns.push("duration");
            values.push(Box::new(duration));
        }
        if let Some(due_date) = update.due_date {
            columns.push("due_date");
            values.push(Box::new(due_date));
        }
        if let Some(completed_at) = update.completed_at {
            columns.push("completed_at");
            values.push(Box::new(completed_at));
        }

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE task SET {} WHERE id = ?{} AND user_id = ?{}",
            assignments.join(", "),
            columns.len() + 1,
            columns.len() + 2
        );
        values.push(Box::new(id.0));
        values.push(Box::new(user.id.0));
        let params: Vec<&dyn ToSql> = values.iter().map(|value| value.as_ref()).collect();

        let changed = self
            .db
            .execute(&sql, &params[..])
            .store_context("Failed to update task in database.")?;
        debug!(task = %id, fields = ?columns, changed, "task updated");

        if changed > 0 {
            self.notify(user.id)?;
        }
        Ok(changed > 0)
    }

    /// Add tracked minutes on top of the task's current duration.
    pub fn add_duration(
        &mut self,
        user: Option<&User>,
        id: TaskId,
        minutes: u32,
    ) -> Result<Option<u32>> {
        let task = match self.task(user, id)? {
            Some(task) => task,
            None => return Ok(None),
        };
        let duration = task.duration.saturating_add(minutes);
        let update = TaskUpdate {
            duration: Some(duration),
            ..TaskUpdate::default()
        };
        self.update(user, id, &update)?;
        Ok(Some(duration))
    }

    /// Remove a task and any tracking session open on it.
    pub fn delete(&mut self, user: Option<&User>, id: TaskId) -> Result<bool> {
        let user = match user {
            Some(user) => user,
            None => return Ok(false),
        };
        let removed = self
            .db
            .execute(
                "DELETE FROM task WHERE id = ?1 AND user_id = ?2",
                params![id.0, user.id.0],
            )
            .store_context("Failed to remove task from database.")?;
        self.db
            .execute(
                "DELETE FROM tracking WHERE task_id = ?1 AND user_id = ?2",
                params![id.0, user.id.0],
            )
            .store_context("Failed to remove tracking from database.")?;

        if removed > 0 {
            debug!(task = %id, "task deleted");
            self.notify(user.id)?;
        }
        Ok(removed > 0)
    }

    /// Record that tracking started on a task. Keeps an earlier start if one
    /// is already open. Returns whether a new session was opened.
    pub fn open_tracking(
        &self,
        user: &User,
        id: TaskId,
        started_at: DateTime<Local>,
    ) -> Result<bool> {
        let inserted = self
            .db
            .execute(
                "INSERT OR IGNORE INTO tracking (task_id, user_id, started_at) VALUES (?1, ?2, ?3)",
                params![id.0, user.id.0, started_at],
            )
            .store_context("Failed to insert entry to the tracking table.")?;
        Ok(inserted > 0)
    }

    pub fn tracking_for(&self, user: &User, id: TaskId) -> Result<Option<DateTime<Local>>> {
        self.db
            .query_row(
                "SELECT started_at FROM tracking WHERE task_id = ?1 AND user_id = ?2",
                params![id.0, user.id.0],
                |row| row.get(0),
            )
            .optional()
            .store_context("Failed to read the tracking table.")
    }

    /// Every open tracking session of `user`, by task.
    pub fn active_tracking(&self, user: &User) -> Result<Vec<(TaskId, DateTime<Local>)>> {
        let mut stmt = self
            .db
            .prepare("SELECT task_id, started_at FROM tracking WHERE user_id = ?1 ORDER BY started_at")
            .store_context("Failed to read the tracking table.")?;
        let rows = stmt
            .query_map(params![user.id.0], |row| Ok((TaskId(row.get(0)?), row.get(1)?)))
            .store_context("Failed to read the tracking table.")?;

        let mut sessions = Vec::new();
        for session in rows {
            sessions.push(session.store_context("Failed to read the tracking table.")?);
        }
        Ok(sessions)
    }

    pub fn close_tracking(&self, user: &User, id: TaskId) -> Result<()> {
        self.db
            .execute(
                "DELETE FROM tracking WHERE task_id = ?1 AND user_id = ?2",
                params![id.0, user.id.0],
            )
            .store_context("Failed to remove entry from the tracking table.")?;
        Ok(())
    }

    /// Add the minutes of a finished session to its task and close the
    /// session in one transaction. Returns the new duration.
    pub fn finish_tracking(
        &mut self,
        user: &User,
        id: TaskId,
        minutes: u32,
    ) -> Result<Option<u32>> {
        self.db
            .execute_batch("BEGIN IMMEDIATE")
            .store_context("Failed to start a transaction.")?;
        let finished = self
            .add_duration(Some(user), id, minutes)
            .and_then(|total| self.close_tracking(user, id).map(|_| total));
        match finished {
            Ok(total) => {
                self.db
                    .execute_batch("COMMIT")
                    .store_context("Failed to commit tracked time.")?;
                Ok(total)
            }
            Err(err) => {
                if let Err(rollback) = self.db.execute_batch("ROLLBACK") {
                    warn!(%rollback, "rollback of tracked time failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn memory_store() -> TaskStore {
        TaskStore::open(Connection::open_in_memory().unwrap()).unwrap()
    }

    pub fn user(id: i64) -> User {
        User {
            id: UserId(id),
            email: format!("user{}@example.com", id),
            email_verified: true,
        }
    }
}
