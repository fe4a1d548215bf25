use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, Weekday};
use thiserror::Error;

/// Identifier assigned by the store when a task is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TaskId(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// An account known to the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub email_verified: bool,
}

/// Returned when a stored or typed value is not one of the known variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}

/// The reporting bucket of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeFrame {
    Daily,
    Weekly,
    Monthly,
}

impl TimeFrame {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFrame::Daily => "daily",
            TimeFrame::Weekly => "weekly",
            TimeFrame::Monthly => "monthly",
        }
    }
}

impl FromStr for TimeFrame {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(TimeFrame::Daily),
            "weekly" => Ok(TimeFrame::Weekly),
            "monthly" => Ok(TimeFrame::Monthly),
            _ => Err(UnknownVariant::new("time frame", s)),
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task is either waiting to be done or done. Toggling is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Completed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
        }
    }

    pub fn toggled(self) -> Status {
        match self {
            Status::Pending => Status::Completed,
            Status::Completed => Status::Pending,
        }
    }
}

impl FromStr for Status {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "completed" => Ok(Status::Completed),
            _ => Err(UnknownVariant::new("status", s)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Display order used by the priority breakdown.
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Weight of a task of this priority in the productivity score.
    pub fn weight(self) -> u64 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(UnknownVariant::new("priority", s)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Work,
    School,
    Domestic,
    Personal,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Work => "work",
            Category::School => "school",
            Category::Domestic => "domestic",
            Category::Personal => "personal",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Ok(Category::Work),
            "school" => Ok(Category::School),
            "domestic" => Ok(Category::Domestic),
            "personal" => Ok(Category::Personal),
            "other" => Ok(Category::Other),
            _ => Err(UnknownVariant::new("category", s)),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Week of the month a monthly task is planned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekOfMonth {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl WeekOfMonth {
    pub fn as_str(self) -> &'static str {
        match self {
            WeekOfMonth::First => "First",
            WeekOfMonth::Second => "Second",
            WeekOfMonth::Third => "Third",
            WeekOfMonth::Fourth => "Fourth",
            WeekOfMonth::Last => "Last",
        }
    }
}

impl FromStr for WeekOfMonth {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(WeekOfMonth::First),
            "second" => Ok(WeekOfMonth::Second),
            "third" => Ok(WeekOfMonth::Third),
            "fourth" => Ok(WeekOfMonth::Fourth),
            "last" => Ok(WeekOfMonth::Last),
            _ => Err(UnknownVariant::new("week of month", s)),
        }
    }
}

impl fmt::Display for WeekOfMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When, inside its time frame, a task is planned. Each time frame carries
/// its own pair of bounds, so a task never holds bounds of another frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    /// Clock times as typed, e.g. "09:00 AM".
    Daily { start_time: String, end_time: String },
    Weekly { start_day: Weekday, end_day: Weekday },
    Monthly { start_week: WeekOfMonth, end_week: WeekOfMonth },
}

impl Period {
    pub fn time_frame(&self) -> TimeFrame {
        match self {
            Period::Daily { .. } => TimeFrame::Daily,
            Period::Weekly { .. } => TimeFrame::Weekly,
            Period::Monthly { .. } => TimeFrame::Monthly,
        }
    }

    /// The default bounds of each frame, as offered by the task form.
    pub fn default_for(frame: TimeFrame) -> Period {
        match frame {
            TimeFrame::Daily => Period::Daily {
                start_time: String::new(),
                end_time: String::new(),
            },
            TimeFrame::Weekly => Period::Weekly {
                start_day: Weekday::Mon,
                end_day: Weekday::Fri,
            },
            TimeFrame::Monthly => Period::Monthly {
                start_week: WeekOfMonth::First,
                end_week: WeekOfMonth::Second,
            },
        }
    }

    /// Both bounds rendered as they are stored.
    pub fn bounds(&self) -> (String, String) {
        match self {
            Period::Daily {
                start_time,
                end_time,
            } => (start_time.clone(), end_time.clone()),
            Period::Weekly { start_day, end_day } => {
                (weekday_name(*start_day).to_string(), weekday_name(*end_day).to_string())
            }
            Period::Monthly {
                start_week,
                end_week,
            } => (start_week.to_string(), end_week.to_string()),
        }
    }

    /// Rebuild a period from the stored frame name and bounds.
    pub fn from_parts(frame: &str, start: &str, end: &str) -> Result<Period, UnknownVariant> {
        match frame.parse::<TimeFrame>()? {
            TimeFrame::Daily => Ok(Period::Daily {
                start_time: start.to_string(),
                end_time: end.to_string(),
            }),
            TimeFrame::Weekly => Ok(Period::Weekly {
                start_day: parse_weekday(start)?,
                end_day: parse_weekday(end)?,
            }),
            TimeFrame::Monthly => Ok(Period::Monthly {
                start_week: start.parse()?,
                end_week: end.parse()?,
            }),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.bounds();
        match self {
            Period::Monthly { .. } => write!(f, "{} - {} week", start, end),
            _ => write!(f, "{} - {}", start, end),
        }
    }
}

pub fn parse_weekday(s: &str) -> Result<Weekday, UnknownVariant> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| UnknownVariant::new("weekday", s))
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// A single task, saved as an entry in the task table.
///
/// Enumerated fields are optional because the journal may hold values this
/// version does not know about; such tasks are still counted in totals.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub period: Option<Period>,
    pub duration: u32, // in minutes
    pub created_at: Option<DateTime<Local>>,
    pub due_date: Option<DateTime<Local>>,
    pub completed_at: Option<DateTime<Local>>,
}

/// Fields supplied by the user when adding a task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub category: Category,
    pub period: Period,
    pub duration: u32,
    pub due_date: Option<DateTime<Local>>,
}

/// A partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub period: Option<Period>,
    pub duration: Option<u32>,
    pub due_date: Option<Option<DateTime<Local>>>,
    pub completed_at: Option<Option<DateTime<Local>>>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        *self == TaskUpdate::default()
    }

    /// Flip the status of `task`, stamping or clearing its completion time.
    pub fn toggle(task: &Task, now: DateTime<Local>) -> TaskUpdate {
        let status = task.status.toggled();
        let completed_at = match status {
            Status::Completed => Some(now),
            Status::Pending => None,
        };
        TaskUpdate {
            status: Some(status),
            completed_at: Some(completed_at),
            ..TaskUpdate::default()
        }
    }
}

/// Derived facts about a task that the store does not keep as columns.
pub trait TaskExtra {
    fn is_done(&self) -> bool;
    fn time_frame(&self) -> Option<TimeFrame>;
}

impl TaskExtra for Task {
    fn is_done(&self) -> bool {
        self.status == Status::Completed
    }

    fn time_frame(&self) -> Option<TimeFrame> {
        self.period.as_ref().map(Period::time_frame)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A pending daily task with sensible defaults, for tests to tweak.
    pub fn task(id: i64) -> Task {
        Task {
            id: TaskId(id),
            user_id: UserId(1),
            title: format!("Task {}", id),
            description: None,
            status: Status::Pending,
            priority: Some(Priority::Medium),
            category: Some(Category::Personal),
            period: Some(Period::default_for(TimeFrame::Daily)),
            duration: 0,
            created_at: None,
            due_date: None,
            completed_at: None,
        }
    }

    pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("daily", TimeFrame::Daily)]
    #[case("Weekly", TimeFrame::Weekly)]
    #[case(" monthly ", TimeFrame::Monthly)]
    fn time_frames_parse_loosely(#[case] input: &str, #[case] expected: TimeFrame) {
        assert_eq!(input.parse::<TimeFrame>().unwrap(), expected);
    }

    #[test]
    fn unknown_category_is_an_error() {
        let err = "errands".parse::<Category>().unwrap_err();
        assert_eq!(err.to_string(), "unrecognized category 'errands'");
    }

    #[test]
    fn status_toggles_between_two_states() {
        assert_eq!(Status::Pending.toggled(), Status::Completed);
        assert_eq!(Status::Completed.toggled(), Status::Pending);
    }

    #[test]
    fn period_round_trips_through_its_stored_parts() {
        let period = Period::Weekly {
            start_day: Weekday::Tue,
            end_day: Weekday::Sat,
        };
        let (start, end) = period.bounds();
        assert_eq!((start.as_str(), end.as_str()), ("Tuesday", "Saturday"));
        assert_eq!(Period::from_parts("weekly", &start, &end).unwrap(), period);
    }

    #[test]
    fn period_with_unknown_frame_is_rejected() {
        assert!(Period::from_parts("yearly", "a", "b").is_err());
        assert!(Period::from_parts("monthly", "Fifth", "Last").is_err());
    }

    #[test]
    fn toggle_stamps_and_clears_completion_time() {
        let now = at(2024, 3, 4, 10, 0);
        let mut t = task(1);

        let update = TaskUpdate::toggle(&t, now);
        assert_eq!(update.status, Some(Status::Completed));
        assert_eq!(update.completed_at, Some(Some(now)));

        t.status = Status::Completed;
        let update = TaskUpdate::toggle(&t, now);
        assert_eq!(update.status, Some(Status::Pending));
        assert_eq!(update.completed_at, Some(None));
    }

    #[test]
    fn time_frame_follows_period() {
        let mut t = task(1);
        assert_eq!(t.time_frame(), Some(TimeFrame::Daily));
        t.period = None;
        assert_eq!(t.time_frame(), None);
    }
}
