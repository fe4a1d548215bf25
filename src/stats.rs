//! Derived statistics over a snapshot of tasks.
//!
//! Everything here is a pure function of its input: the dashboards call
//! these again on every new snapshot instead of keeping running totals.
//! Tasks whose category, priority or time frame is not recognized are left
//! out of the breakdowns indexed by those values but still count in totals.

use chrono::{Datelike, Timelike};

use crate::model::{Category, Priority, Status, Task, TaskExtra, TimeFrame};

/// `round(part / whole * 100)`, rounding halves up. Zero when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((200 * part + whole) / (2 * whole)) as u32
}

/// Keep the tasks of one time frame, in their original order.
pub fn tasks_in_frame(tasks: &[Task], frame: TimeFrame) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| task.time_frame() == Some(frame))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Percentage of completed tasks, 0 when there are none.
    pub rate: u32,
}

pub fn completion_stats(tasks: &[Task]) -> CompletionStats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.is_done()).count();
    CompletionStats {
        total,
        completed,
        pending: total - completed,
        rate: percentage(completed as u64, total as u64),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationStats {
    pub total_minutes: u64,
    pub hours: u64,
    pub minutes: u64,
}

impl DurationStats {
    pub fn from_minutes(total_minutes: u64) -> DurationStats {
        DurationStats {
            total_minutes,
            hours: total_minutes / 60,
            minutes: total_minutes % 60,
        }
    }
}

pub fn duration_stats(tasks: &[Task]) -> DurationStats {
    DurationStats::from_minutes(total_minutes(tasks))
}

fn total_minutes(tasks: &[Task]) -> u64 {
    tasks.iter().map(|task| u64::from(task.duration)).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryBreakdown {
    pub category: Category,
    pub count: usize,
    pub completed_count: usize,
    pub total_minutes: u64,
}

impl CategoryBreakdown {
    /// Share of the category's tasks that are completed.
    pub fn completion_rate(&self) -> u32 {
        percentage(self.completed_count as u64, self.count as u64)
    }
}

/// One entry per category present, in the order categories first appear.
pub fn by_category(tasks: &[Task]) -> Vec<CategoryBreakdown> {
    let mut breakdown: Vec<CategoryBreakdown> = Vec::new();
    for task in tasks {
        let category = match task.category {
            Some(category) => category,
            None => continue,
        };
        let index = match breakdown.iter().position(|entry| entry.category == category) {
            Some(index) => index,
            None => {
                breakdown.push(CategoryBreakdown {
                    category,
                    count: 0,
                    completed_count: 0,
                    total_minutes: 0,
                });
                breakdown.len() - 1
            }
        };
        let entry = &mut breakdown[index];
        entry.count += 1;
        if task.is_done() {
            entry.completed_count += 1;
        }
        entry.total_minutes += u64::from(task.duration);
    }
    breakdown
}

/// Tracked minutes per category, leaving out categories with no tracked time.
pub fn category_minutes(tasks: &[Task]) -> Vec<(Category, u64)> {
    by_category(tasks)
        .into_iter()
        .filter(|entry| entry.total_minutes > 0)
        .map(|entry| (entry.category, entry.total_minutes))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityCount {
    pub priority: Priority,
    pub count: usize,
}

/// Task counts for low, medium and high, in that order, zeros included.
pub fn by_priority(tasks: &[Task]) -> Vec<PriorityCount> {
    Priority::ALL
        .iter()
        .map(|&priority| PriorityCount {
            priority,
            count: tasks
                .iter()
                .filter(|task| task.priority == Some(priority))
                .count(),
        })
        .collect()
}

/// Drop the empty slices a chart would not draw.
pub fn chart_ready(counts: Vec<PriorityCount>) -> Vec<PriorityCount> {
    counts.into_iter().filter(|entry| entry.count > 0).collect()
}

/// Number of tasks created in each local hour of the day.
pub fn hourly_distribution(tasks: &[Task]) -> [u32; 24] {
    let mut hours = [0u32; 24];
    for created_at in tasks.iter().filter_map(|task| task.created_at) {
        hours[created_at.hour() as usize] += 1;
    }
    hours
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCompletion {
    pub completed: u32,
    pub pending: u32,
}

/// Completed and pending counts by local weekday of creation, Sunday first.
pub fn weekday_distribution(tasks: &[Task]) -> [DayCompletion; 7] {
    let mut days = [DayCompletion::default(); 7];
    for task in tasks {
        if let Some(created_at) = task.created_at {
            let day = &mut days[created_at.weekday().num_days_from_sunday() as usize];
            match task.status {
                Status::Completed => day.completed += 1,
                Status::Pending => day.pending += 1,
            }
        }
    }
    days
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekBucket {
    pub completed: u32,
    pub pending: u32,
    pub total_minutes: u64,
}

/// Tasks grouped by week of the month they were created in. Days 29 to 31
/// fall in the fifth bucket.
pub fn week_of_month_breakdown(tasks: &[Task]) -> [WeekBucket; 5] {
    let mut weeks = [WeekBucket::default(); 5];
    for task in tasks {
        if let Some(created_at) = task.created_at {
            let week = &mut weeks[((created_at.day() - 1) / 7) as usize];
            match task.status {
                Status::Completed => week.completed += 1,
                Status::Pending => week.pending += 1,
            }
            week.total_minutes += u64::from(task.duration);
        }
    }
    weeks
}

/// Completion percentage weighted by priority (high 3, medium 2, low 1).
pub fn productivity_score(tasks: &[Task]) -> u32 {
    let (earned, total) = tasks
        .iter()
        .filter_map(|task| task.priority.map(|priority| (priority.weight(), task.is_done())))
        .fold((0, 0), |(earned, total), (weight, done)| {
            (if done { earned + weight } else { earned }, total + weight)
        });
    percentage(earned, total)
}

/// Verdict shown next to the weekly productivity score.
pub fn productivity_rating(score: u32) -> &'static str {
    match score {
        80..=u32::MAX => "Excellent productivity this week!",
        60..=79 => "Good progress this week!",
        40..=59 => "Moderate productivity this week.",
        _ => "Needs improvement this week.",
    }
}

/// Completion rate among the tasks of a single priority.
pub fn priority_completion_rate(tasks: &[Task], priority: Priority) -> u32 {
    let of_priority: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.priority == Some(priority))
        .collect();
    let done = of_priority.iter().filter(|task| task.is_done()).count();
    percentage(done as u64, of_priority.len() as u64)
}

/// Everything a dashboard shows for one time frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDashboard {
    pub frame: TimeFrame,
    pub completion: CompletionStats,
    pub duration: DurationStats,
    pub categories: Vec<CategoryBreakdown>,
    pub category_minutes: Vec<(Category, u64)>,
    pub priorities: Vec<PriorityCount>,
    pub hourly: [u32; 24],
    pub weekdays: [DayCompletion; 7],
    pub weeks: [WeekBucket; 5],
    pub productivity_score: u32,
    pub high_priority_rate: u32,
}

impl FrameDashboard {
    pub fn build(tasks: &[Task], frame: TimeFrame) -> FrameDashboard {
        let tasks = tasks_in_frame(tasks, frame);
        FrameDashboard {
            frame,
            completion: completion_stats(&tasks),
            duration: duration_stats(&tasks),
            categories: by_category(&tasks),
            category_minutes: category_minutes(&tasks),
            priorities: by_priority(&tasks),
            hourly: hourly_distribution(&tasks),
            weekdays: weekday_distribution(&tasks),
            weeks: week_of_month_breakdown(&tasks),
            productivity_score: productivity_score(&tasks),
            high_priority_rate: priority_completion_rate(&tasks, Priority::High),
        }
    }
}
