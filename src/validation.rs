//! Rules applied to form input before anything reaches the store.

use std::sync::OnceLock;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Weekday};
use regex::Regex;

use crate::error::ValidationError;
use crate::model::{parse_weekday, Period, TimeFrame, WeekOfMonth};

const MAX_WORDS: usize = 50;
const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_title(input: &str) -> Result<(), ValidationError> {
    validate_text("Title", input.trim())
}

/// A description is optional: blank input is always accepted.
pub fn validate_description(input: &str) -> Result<(), ValidationError> {
    if input.trim().is_empty() {
        return Ok(());
    }
    validate_text("Description", input)
}

fn validate_text(field: &'static str, input: &str) -> Result<(), ValidationError> {
    if !input.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(ValidationError::MustStartWithLetter { field });
    }
    if input.split_whitespace().count() > MAX_WORDS {
        return Err(ValidationError::TooManyWords {
            field,
            max: MAX_WORDS,
        });
    }
    Ok(())
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::Required { field: "Email" });
    }
    if !email_regex().is_match(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

/// Checks are made in a fixed order and the first failure is reported.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Required { field: "Password" });
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    let missing = if !password.chars().any(|c| c.is_ascii_uppercase()) {
        Some("uppercase letter")
    } else if !password.chars().any(|c| c.is_ascii_lowercase()) {
        Some("lowercase letter")
    } else if !password.chars().any(|c| c.is_ascii_digit()) {
        Some("number")
    } else if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some("special character")
    } else {
        None
    };
    match missing {
        Some(what) => Err(ValidationError::PasswordMissing { what }),
        None => Ok(()),
    }
}

pub fn validate_confirmation(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    if password != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// Accept "9:30", "09:30 PM" or "21:30" and store it as "09:30 PM".
pub fn parse_clock(field: &'static str, input: &str) -> Result<String, ValidationError> {
    let input = input.trim();
    let time = NaiveTime::parse_from_str(&input.to_ascii_uppercase(), "%I:%M %p")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .map_err(|_| ValidationError::InvalidPeriod {
            field,
            value: input.to_string(),
            expected: "a time such as 09:30 AM or 21:30",
        })?;
    Ok(time.format("%I:%M %p").to_string())
}

fn weekday_or(
    field: &'static str,
    value: Option<&str>,
    default: Weekday,
) -> Result<Weekday, ValidationError> {
    match value {
        Some(value) => parse_weekday(value).map_err(|_| ValidationError::InvalidPeriod {
            field,
            value: value.to_string(),
            expected: "a day of the week",
        }),
        None => Ok(default),
    }
}

fn week_or(
    field: &'static str,
    value: Option<&str>,
    default: WeekOfMonth,
) -> Result<WeekOfMonth, ValidationError> {
    match value {
        Some(value) => value.parse().map_err(|_| ValidationError::InvalidPeriod {
            field,
            value: value.to_string(),
            expected: "First, Second, Third, Fourth or Last",
        }),
        None => Ok(default),
    }
}

/// Build the period of a task from the optional bounds typed by the user.
/// Missing bounds take the defaults of the frame.
pub fn parse_period(
    frame: TimeFrame,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Period, ValidationError> {
    let period = match Period::default_for(frame) {
        Period::Daily {
            start_time,
            end_time,
        } => Period::Daily {
            start_time: match start {
                Some(start) => parse_clock("Start time", start)?,
                None => start_time,
            },
            end_time: match end {
                Some(end) => parse_clock("End time", end)?,
                None => end_time,
            },
        },
        Period::Weekly { start_day, end_day } => Period::Weekly {
            start_day: weekday_or("Start day", start, start_day)?,
            end_day: weekday_or("End day", end, end_day)?,
        },
        Period::Monthly {
            start_week,
            end_week,
        } => Period::Monthly {
            start_week: week_or("Start week", start, start_week)?,
            end_week: week_or("End week", end, end_week)?,
        },
    };
    Ok(period)
}

/// A due date typed as YYYY-MM-DD, at local midnight.
pub fn parse_due_date(input: &str) -> Result<DateTime<Local>, ValidationError> {
    let invalid = || ValidationError::InvalidDate(input.to_string());
    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn message(result: Result<(), ValidationError>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn titles_must_start_with_a_letter() {
        assert!(validate_title("Write report").is_ok());
        assert!(validate_title("  padded title  ").is_ok());
        assert_eq!(
            message(validate_title("1st draft")),
            "Title must start with a letter"
        );
        assert_eq!(message(validate_title("")), "Title must start with a letter");
    }

    #[test]
    fn titles_are_limited_to_fifty_words() {
        let fifty = vec!["word"; 50].join(" ");
        assert!(validate_title(&fifty).is_ok());
        let fifty_one = vec!["word"; 51].join(" ");
        assert_eq!(
            message(validate_title(&fifty_one)),
            "Title cannot exceed 50 words"
        );
    }

    #[test]
    fn blank_description_is_fine() {
        assert!(validate_description("").is_ok());
        assert!(validate_description("   ").is_ok());
        assert_eq!(
            message(validate_description("- bullet")),
            "Description must start with a letter"
        );
    }

    #[rstest]
    #[case("", "Email is required")]
    #[case("someone", "Please enter a valid email address")]
    #[case("some one@example.com", "Please enter a valid email address")]
    #[case("someone@example", "Please enter a valid email address")]
    fn bad_emails(#[case] email: &str, #[case] expected: &str) {
        assert_eq!(message(validate_email(email)), expected);
    }

    #[test]
    fn good_email() {
        assert!(validate_email("someone@example.com").is_ok());
    }

    #[rstest]
    #[case("", "Password is required")]
    #[case("Ab1!", "Password must be at least 8 characters")]
    #[case("abcdefg1!", "Password must contain at least one uppercase letter")]
    #[case("ABCDEFG1!", "Password must contain at least one lowercase letter")]
    #[case("Abcdefgh!", "Password must contain at least one number")]
    #[case("Abcdefgh1", "Password must contain at least one special character")]
    fn weak_passwords(#[case] password: &str, #[case] expected: &str) {
        assert_eq!(message(validate_password(password)), expected);
    }

    #[test]
    fn strong_password_and_confirmation() {
        assert!(validate_password("Correct1!horse").is_ok());
        assert!(validate_confirmation("Correct1!horse", "Correct1!horse").is_ok());
        assert_eq!(
            message(validate_confirmation("Correct1!horse", "correct1!horse")),
            "Passwords do not match"
        );
    }

    #[rstest]
    #[case("9:30 am", "09:30 AM")]
    #[case("09:30 PM", "09:30 PM")]
    #[case("21:30", "09:30 PM")]
    #[case("00:15", "12:15 AM")]
    fn clocks_are_normalized(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse_clock("Start time", input).unwrap(), expected);
    }

    #[test]
    fn bad_clock_names_the_field() {
        assert_eq!(
            message(parse_clock("End time", "noon").map(|_| ())),
            "End time 'noon' is not valid, expected a time such as 09:30 AM or 21:30"
        );
    }

    #[test]
    fn periods_fill_in_frame_defaults() {
        assert_eq!(
            parse_period(TimeFrame::Weekly, None, Some("sunday")).unwrap(),
            Period::Weekly {
                start_day: Weekday::Mon,
                end_day: Weekday::Sun
            }
        );
        assert_eq!(
            parse_period(TimeFrame::Monthly, Some("third"), None).unwrap(),
            Period::Monthly {
                start_week: WeekOfMonth::Third,
                end_week: WeekOfMonth::Second
            }
        );
        assert_eq!(
            parse_period(TimeFrame::Daily, Some("8:00 am"), None).unwrap(),
            Period::Daily {
                start_time: "08:00 AM".to_string(),
                end_time: String::new()
            }
        );
        assert!(parse_period(TimeFrame::Weekly, Some("Someday"), None).is_err());
        assert!(parse_period(TimeFrame::Monthly, None, Some("Fifth")).is_err());
    }

    #[test]
    fn due_dates() {
        let due = parse_due_date("2024-02-29").unwrap();
        assert_eq!((due.year(), due.month(), due.day()), (2024, 2, 29));
        assert_eq!(
            message(parse_due_date("2023-02-29").map(|_| ())),
            "Due date '2023-02-29' is not valid, expected YYYY-MM-DD"
        );
    }
}
