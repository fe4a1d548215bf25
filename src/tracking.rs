use chrono::{DateTime, Duration, Local};

use crate::model::{Task, TaskExtra};

/// An enumeration to capture the possible states of the time tracker of a
/// task. The user is either working on the task or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Tracking { started_at: DateTime<Local> },
}

/// Time tracking for a single task. Elapsed time is always recomputed from
/// the start timestamp; nothing accumulates between display refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingSession {
    state: TrackingState,
}

impl Default for TrackingSession {
    fn default() -> Self {
        TrackingSession {
            state: TrackingState::Idle,
        }
    }
}

impl TrackingSession {
    /// Resume a session that was started earlier, e.g. by another invocation.
    pub fn resumed(started_at: DateTime<Local>) -> TrackingSession {
        TrackingSession {
            state: TrackingState::Tracking { started_at },
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackingState::Tracking { .. })
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        match self.state {
            TrackingState::Tracking { started_at } => Some(started_at),
            TrackingState::Idle => None,
        }
    }

    /// Start tracking `task`. Completed tasks cannot be tracked and a running
    /// session keeps its original start. Returns whether tracking started.
    pub fn start(&mut self, task: &Task, now: DateTime<Local>) -> bool {
        if task.is_done() || self.is_tracking() {
            return false;
        }
        self.state = TrackingState::Tracking { started_at: now };
        true
    }

    /// Stop tracking and return the elapsed time rounded to whole minutes.
    /// Does nothing and returns `None` if the session is idle.
    pub fn stop(&mut self, now: DateTime<Local>) -> Option<u32> {
        let started_at = self.started_at()?;
        self.state = TrackingState::Idle;
        Some(elapsed_minutes(started_at, now))
    }

    /// Time spent so far, for display. Zero when idle.
    pub fn elapsed(&self, now: DateTime<Local>) -> Duration {
        match self.started_at() {
            Some(started_at) => std::cmp::max(Duration::zero(), now - started_at),
            None => Duration::zero(),
        }
    }
}

/// `round((stop - start) / 1 minute)`, never negative.
pub fn elapsed_minutes(started_at: DateTime<Local>, stopped_at: DateTime<Local>) -> u32 {
    let millis = (stopped_at - started_at).num_milliseconds().max(0);
    ((millis + 30_000) / 60_000) as u32
}

/// Format a duration as HH:MM:SS, the way the live timer is shown.
pub fn format_clock(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{at, task};
    use crate::model::Status;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn start_then_stop_rounds_to_minutes() {
        let start = at(2024, 5, 6, 9, 0);
        let mut session = TrackingSession::default();

        assert!(session.start(&task(1), start));
        assert!(session.is_tracking());

        let stop = start + Duration::seconds(25 * 60 + 31);
        assert_eq!(session.stop(stop), Some(26));
        assert_eq!(session.state(), TrackingState::Idle);
    }

    #[test]
    fn immediate_stop_is_zero_minutes() {
        let now = at(2024, 5, 6, 9, 0);
        let mut session = TrackingSession::default();
        session.start(&task(1), now);
        assert_eq!(session.stop(now), Some(0));
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let mut session = TrackingSession::default();
        assert_eq!(session.stop(at(2024, 5, 6, 9, 0)), None);
        assert_eq!(session, TrackingSession::default());
    }

    #[test]
    fn completed_tasks_cannot_be_tracked() {
        let mut done = task(1);
        done.status = Status::Completed;
        let mut session = TrackingSession::default();

        assert!(!session.start(&done, at(2024, 5, 6, 9, 0)));
        assert!(!session.is_tracking());
    }

    #[test]
    fn second_start_keeps_first_timestamp() {
        let first = at(2024, 5, 6, 9, 0);
        let mut session = TrackingSession::default();
        session.start(&task(1), first);

        assert!(!session.start(&task(1), at(2024, 5, 6, 9, 30)));
        assert_eq!(session.started_at(), Some(first));
    }

    #[rstest]
    #[case(29_999, 0)]
    #[case(30_000, 1)]
    #[case(89_999, 1)]
    #[case(90_000, 2)]
    #[case(-5_000, 0)]
    fn elapsed_minutes_rounds_half_up(#[case] millis: i64, #[case] minutes: u32) {
        let start = at(2024, 5, 6, 9, 0);
        assert_eq!(
            elapsed_minutes(start, start + Duration::milliseconds(millis)),
            minutes
        );
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(Duration::seconds(0)), "00:00:00");
        assert_eq!(format_clock(Duration::seconds(3725)), "01:02:05");
        assert_eq!(
            TrackingSession::resumed(at(2024, 5, 6, 9, 0)).elapsed(at(2024, 5, 6, 8, 0)),
            Duration::zero()
        );
    }
}
