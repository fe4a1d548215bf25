use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::auth::AuthProvider;
use crate::config::Config;
use crate::model::User;
use crate::store::TaskStore;

/// Everything a command needs, built once in `main` and passed down.
pub struct AppContext {
    pub store: TaskStore,
    pub config: Config,
}

impl AppContext {
    pub fn new(db: Connection, config: Config) -> Result<AppContext> {
        let store = TaskStore::open(db).context("Failed to open the journal.")?;
        Ok(AppContext { store, config })
    }

    pub fn auth(&self) -> AuthProvider<'_> {
        AuthProvider::new(self.store.connection())
    }

    pub fn current_user(&self) -> Result<Option<User>> {
        self.auth()
            .current_user()
            .context("Failed to read the current session.")
    }

    #[cfg(test)]
    pub fn in_memory() -> AppContext {
        AppContext::new(Connection::open_in_memory().unwrap(), Config::default()).unwrap()
    }
}
