use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::model::Account;
use crate::modules::error::{AuthError, AuthResult};

/// Durable username -> Account mapping.
///
/// Every operation is atomic with respect to every other operation on the
/// same store, and every mutation has reached stable storage when it returns.
pub trait AccountStore: Send + Sync {
    /// Return a copy of the stored account
    fn get(&self, username: &str) -> AuthResult<Account>;

    /// Insert a new account; `AlreadyExists` if the username is taken
    fn put(&self, account: Account) -> AuthResult<()>;

    /// Replace an existing account; `NotFound` if it is absent
    fn update(&self, account: Account) -> AuthResult<()>;

    /// Remove an account; `NotFound` if it is absent
    fn delete(&self, username: &str) -> AuthResult<()>;

    /// Apply `change` to the stored account and persist it, all under one lock.
    ///
    /// If `change` fails nothing is written and its error is returned. The
    /// username cannot be changed this way.
    fn modify(
        &self,
        username: &str,
        change: &mut dyn FnMut(&mut Account) -> AuthResult<()>,
    ) -> AuthResult<()>;

    /// Remove an account only if `check` accepts the stored record
    fn delete_if(
        &self,
        username: &str,
        check: &mut dyn FnMut(&Account) -> AuthResult<()>,
    ) -> AuthResult<()>;

    /// All stored usernames in sorted order
    fn usernames(&self) -> AuthResult<Vec<String>>;

    /// Release held resources. Calling it more than once is harmless.
    fn close(&self) -> AuthResult<()>;
}

struct StoreState {
    accounts: BTreeMap<String, Account>,
    closed: bool,
}

impl StoreState {
    fn ensure_open(&self) -> AuthResult<()> {
        if self.closed {
            return Err(AuthError::StoreClosed);
        }
        Ok(())
    }
}

/// Account store kept in memory and mirrored to a single JSON file.
///
/// The whole map is rewritten on each mutation through a temp file in the
/// same directory that is then renamed over the target.
pub struct JsonAccountStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonAccountStore {
    /// Create a new, empty store. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(AuthError::Persistence(format!(
                "file {} already exists",
                path.display()
            )));
        }
        let accounts = BTreeMap::new();
        write_accounts(&path, &accounts)?;
        log::info!("Created account storage at {}", path.display());
        Ok(Self::from_parts(path, accounts))
    }

    /// Load an existing store, or create an empty one if `path` is missing
    pub fn open(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Self::create(path);
        }

        let data = fs::read(&path)?;
        let accounts: BTreeMap<String, Account> = serde_json::from_slice(&data).map_err(|e| {
            AuthError::Persistence(format!("failed to parse {}: {}", path.display(), e))
        })?;

        // Keys are the primary key; a record filed under another name is corrupt
        if let Some((key, account)) = accounts.iter().find(|(key, a)| *key != &a.username) {
            return Err(AuthError::Persistence(format!(
                "record under key {:?} belongs to {:?}",
                key, account.username
            )));
        }

        log::info!(
            "Opened account storage at {} with {} accounts",
            path.display(),
            accounts.len()
        );
        Ok(Self::from_parts(path, accounts))
    }

    fn from_parts(path: PathBuf, accounts: BTreeMap<String, Account>) -> Self {
        Self {
            path,
            state: Mutex::new(StoreState {
                accounts,
                closed: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, accounts: &BTreeMap<String, Account>) -> AuthResult<()> {
        write_accounts(&self.path, accounts).map_err(|e| {
            log::error!("Failed to persist account storage {}: {}", self.path.display(), e);
            e
        })
    }
}

/// Serialize the full map and atomically replace the backing file (owner read/write only)
fn write_accounts(path: &Path, accounts: &BTreeMap<String, Account>) -> AuthResult<()> {
    let data = serde_json::to_vec_pretty(accounts)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.as_file().sync_all()?;
    file.persist(path)
        .map_err(|e| AuthError::Persistence(e.error.to_string()))?;
    Ok(())
}

impl AccountStore for JsonAccountStore {
    fn get(&self, username: &str) -> AuthResult<Account> {
        let state = self.state.lock();
        state.ensure_open()?;
        state
            .accounts
            .get(username)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    fn put(&self, account: Account) -> AuthResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.accounts.contains_key(&account.username) {
            return Err(AuthError::AlreadyExists);
        }
        state.accounts.insert(account.username.clone(), account);
        self.flush(&state.accounts)
    }

    fn update(&self, account: Account) -> AuthResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        match state.accounts.get_mut(&account.username) {
            Some(existing) => *existing = account,
            None => return Err(AuthError::NotFound),
        }
        self.flush(&state.accounts)
    }

    fn delete(&self, username: &str) -> AuthResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.accounts.remove(username).is_none() {
            return Err(AuthError::NotFound);
        }
        self.flush(&state.accounts)
    }

    fn modify(
        &self,
        username: &str,
        change: &mut dyn FnMut(&mut Account) -> AuthResult<()>,
    ) -> AuthResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let mut account = state
            .accounts
            .get(username)
            .cloned()
            .ok_or(AuthError::NotFound)?;
        change(&mut account)?;
        account.username = username.to_string();
        state.accounts.insert(account.username.clone(), account);
        self.flush(&state.accounts)
    }

    fn delete_if(
        &self,
        username: &str,
        check: &mut dyn FnMut(&Account) -> AuthResult<()>,
    ) -> AuthResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        check(state.accounts.get(username).ok_or(AuthError::NotFound)?)?;
        state.accounts.remove(username);
        self.flush(&state.accounts)
    }

    fn usernames(&self) -> AuthResult<Vec<String>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.accounts.keys().cloned().collect())
    }

    fn close(&self) -> AuthResult<()> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.accounts.clear();
            log::info!("Closed account storage at {}", self.path.display());
        }
        Ok(())
    }
}
