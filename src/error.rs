use thiserror::Error;

/// Rejected form input. Shown next to the offending field, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must start with a letter")]
    MustStartWithLetter { field: &'static str },

    #[error("{field} cannot exceed {max} words")]
    TooManyWords { field: &'static str, max: usize },

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Password must contain at least one {what}")]
    PasswordMissing { what: &'static str },

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("{field} '{value}' is not valid, expected {expected}")]
    InvalidPeriod {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Due date '{0}' is not valid, expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Failures of the journal database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context}: {source}")]
    Sqlite {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

/// Helper to attach a short description to a database error, in the spirit
/// of `anyhow::Context`.
pub trait StoreContext<T> {
    fn store_context(self, context: &'static str) -> Result<T, StoreError>;
}

impl<T> StoreContext<T> for Result<T, rusqlite::Error> {
    fn store_context(self, context: &'static str) -> Result<T, StoreError> {
        self.map_err(|source| StoreError::Sqlite { context, source })
    }
}

/// Categorized failures of the auth provider. The interface maps each of
/// them to a fixed message.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email already in use")]
    EmailInUse,

    #[error("invalid email")]
    InvalidEmail(#[source] ValidationError),

    #[error("weak password")]
    WeakPassword(#[source] ValidationError),

    #[error("user not found")]
    UserNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid or expired code")]
    InvalidCode,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
