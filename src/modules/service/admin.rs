use std::sync::Arc;

use crate::modules::accounts::{Account, AccountStore, PasswordHasher};
use crate::modules::error::{AuthError, AuthResult};
use crate::modules::sessions::SessionTokenManager;
use crate::modules::utils::log_admin_operation;
use crate::modules::utils::time::now;
use crate::DEFAULT_PASSWORD;

/// Privileged account management. No call checks a user password; the caller
/// is trusted because it holds the admin secret.
pub struct AdminService {
    store: Arc<dyn AccountStore>,
    hasher: Arc<dyn PasswordHasher>,
    sessions: Arc<SessionTokenManager>,
    default_password: String,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        hasher: Arc<dyn PasswordHasher>,
        sessions: Arc<SessionTokenManager>,
    ) -> Self {
        Self {
            store,
            hasher,
            sessions,
            default_password: DEFAULT_PASSWORD.to_string(),
        }
    }

    /// Override the password given to new and reset accounts
    pub fn with_default_password(mut self, password: impl Into<String>) -> Self {
        self.default_password = password.into();
        self
    }

    /// Create an account holding the default password, flagged for a forced change
    pub fn add_account(&self, username: &str) -> AuthResult<()> {
        if username.trim().is_empty() {
            return Err(AuthError::InvalidUsername);
        }
        let mut account = Account::new(username, self.hasher.hash(&self.default_password)?);
        account.must_change_password = true;

        let result = self.store.put(account);
        log_admin_operation("add_account", username, result.is_ok(), None);
        result
    }

    pub fn del_account(&self, username: &str) -> AuthResult<()> {
        let result = self.store.delete(username);
        if result.is_ok() {
            self.sessions.discard(username);
        }
        log_admin_operation("del_account", username, result.is_ok(), None);
        result
    }

    pub fn get_account(&self, username: &str) -> AuthResult<Account> {
        self.store.get(username)
    }

    /// Replace an account record. The stored password hash and creation date are
    /// always kept; a password can only change through a reset or a change.
    pub fn update_account(&self, account: Account) -> AuthResult<()> {
        let username = account.username.clone();
        let result = self.store.modify(&username, &mut |current| {
            let mut replacement = account.clone();
            replacement.password_hash = current.password_hash.clone();
            replacement.date_created = current.date_created;
            *current = replacement;
            Ok(())
        });
        log_admin_operation("update_account", &username, result.is_ok(), None);
        result
    }

    /// Put the default password back and force a change at next use
    pub fn reset_password(&self, username: &str) -> AuthResult<()> {
        let hash = self.hasher.hash(&self.default_password)?;
        let result = self.store.modify(username, &mut |account| {
            account.password_hash = hash.clone();
            account.must_change_password = true;
            account.date_changed = now();
            Ok(())
        });
        if result.is_ok() {
            self.sessions.discard(username);
        }
        log_admin_operation("reset_password", username, result.is_ok(), None);
        result
    }

    pub fn list_accounts(&self) -> AuthResult<Vec<String>> {
        self.store.usernames()
    }
}
