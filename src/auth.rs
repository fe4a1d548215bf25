//! Local accounts, the login session, and the one-time codes used to verify
//! an email address or reset a password.
//!
//! There is no mail transport: a code is "sent" by handing it back to the
//! caller, which shows it to the user.

use chrono::{DateTime, Duration, Local};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AuthError, StoreContext};
use crate::model::{User, UserId};
use crate::validation::{validate_email, validate_password};

pub type Result<T> = std::result::Result<T, AuthError>;

/// How long a verification or reset code stays valid.
pub const CODE_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodePurpose {
    Verify,
    Reset,
}

impl CodePurpose {
    fn as_str(self) -> &'static str {
        match self {
            CodePurpose::Verify => "verify",
            CodePurpose::Reset => "reset",
        }
    }
}

pub struct AuthProvider<'a> {
    db: &'a Connection,
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

fn new_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase()
}

impl<'a> AuthProvider<'a> {
    pub fn new(db: &'a Connection) -> AuthProvider<'a> {
        AuthProvider { db }
    }

    /// The logged in user, if any.
    pub fn current_user(&self) -> Result<Option<User>> {
        let user = self
            .db
            .query_row(
                "SELECT user.id, user.email, user.email_verified FROM session JOIN user ON user.id = session.user_id WHERE session.id = 1",
                [],
                |row| {
                    Ok(User {
                        id: UserId(row.get(0)?),
                        email: row.get(1)?,
                        email_verified: row.get(2)?,
                    })
                },
            )
            .optional()
            .store_context("Failed to read the session from database.")?;
        Ok(user)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<(User, String, String)>> {
        let found = self
            .db
            .query_row(
                "SELECT id, email, email_verified, password_salt, password_digest FROM user WHERE email = ?1",
                params![email],
                |row| {
                    Ok((
                        User {
                            id: UserId(row.get(0)?),
                            email: row.get(1)?,
                            email_verified: row.get(2)?,
                        },
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .store_context("Failed to read user from database.")?;
        Ok(found)
    }

    fn start_session(&self, user: &User) -> Result<()> {
        self.db
            .execute(
                "INSERT OR REPLACE INTO session (id, user_id, started_at) VALUES (1, ?1, ?2)",
                params![user.id.0, Local::now()],
            )
            .store_context("Failed to write the session to database.")?;
        Ok(())
    }

    /// Create an unverified account and log it in.
    pub fn register(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim();
        validate_email(email).map_err(AuthError::InvalidEmail)?;
        validate_password(password).map_err(AuthError::WeakPassword)?;
        if self.find_by_email(email)?.is_some() {
            return Err(AuthError::EmailInUse);
        }

        let salt = new_salt();
        self.db
            .execute(
                "INSERT INTO user (email, password_salt, password_digest, email_verified, created_at) VALUES (?1, ?2, ?3, 0, ?4)",
                params![email, salt, digest(&salt, password), Local::now()],
            )
            .store_context("Failed to insert user to database.")?;

        let user = User {
            id: UserId(self.db.last_insert_rowid()),
            email: email.to_string(),
            email_verified: false,
        };
        self.start_session(&user)?;
        info!(user = user.id.0, "account registered");
        Ok(user)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<User> {
        let (user, salt, stored) = self
            .find_by_email(email.trim())?
            .ok_or(AuthError::UserNotFound)?;
        if digest(&salt, password) != stored {
            debug!(user = user.id.0, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }
        self.start_session(&user)?;
        info!(user = user.id.0, "logged in");
        Ok(user)
    }

    pub fn logout(&self) -> Result<()> {
        self.db
            .execute("DELETE FROM session", [])
            .store_context("Failed to clear the session.")?;
        info!("logged out");
        Ok(())
    }

    fn issue_code(&self, user_id: UserId, purpose: CodePurpose) -> Result<String> {
        self.db
            .execute(
                "DELETE FROM code WHERE user_id = ?1 AND purpose = ?2",
                params![user_id.0, purpose.as_str()],
            )
            .store_context("Failed to discard previous codes.")?;

        let code = new_code();
        self.db
            .execute(
                "INSERT INTO code (code, user_id, purpose, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![code, user_id.0, purpose.as_str(), Local::now()],
            )
            .store_context("Failed to insert code to database.")?;
        info!(user = user_id.0, purpose = purpose.as_str(), "code issued");
        Ok(code)
    }

    /// Consume a code, returning the user it was issued to.
    fn redeem_code(&self, code: &str, purpose: CodePurpose) -> Result<UserId> {
        let code = code.trim().to_ascii_uppercase();
        let found: Option<(i64, DateTime<Local>)> = self
            .db
            .query_row(
                "SELECT user_id, created_at FROM code WHERE code = ?1 AND purpose = ?2",
                params![code, purpose.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .store_context("Failed to read code from database.")?;
        let (user_id, created_at) = found.ok_or(AuthError::InvalidCode)?;

        self.db
            .execute("DELETE FROM code WHERE code = ?1", params![code])
            .store_context("Failed to remove code from database.")?;

        if Local::now() - created_at > Duration::hours(CODE_TTL_HOURS) {
            return Err(AuthError::InvalidCode);
        }
        Ok(UserId(user_id))
    }

    /// Issue a fresh verification code for `user`, replacing older ones.
    pub fn send_verification_email(&self, user: &User) -> Result<String> {
        self.issue_code(user.id, CodePurpose::Verify)
    }

    pub fn verify_email(&self, code: &str) -> Result<UserId> {
        let user_id = self.redeem_code(code, CodePurpose::Verify)?;
        self.db
            .execute(
                "UPDATE user SET email_verified = 1 WHERE id = ?1",
                params![user_id.0],
            )
            .store_context("Failed to mark email as verified.")?;
        info!(user = user_id.0, "email verified");
        Ok(user_id)
    }

    pub fn reset_password(&self, email: &str) -> Result<String> {
        let (user, _, _) = self
            .find_by_email(email.trim())?
            .ok_or(AuthError::UserNotFound)?;
        self.issue_code(user.id, CodePurpose::Reset)
    }

    pub fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<()> {
        validate_password(new_password).map_err(AuthError::WeakPassword)?;
        let user_id = self.redeem_code(code, CodePurpose::Reset)?;

        let salt = new_salt();
        self.db
            .execute(
                "UPDATE user SET password_salt = ?1, password_digest = ?2 WHERE id = ?3",
                params![salt, digest(&salt, new_password), user_id.0],
            )
            .store_context("Failed to update password.")?;
        info!(user = user_id.0, "password reset");
        Ok(())
    }
}
