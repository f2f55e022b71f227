use std::sync::Arc;

use crate::modules::accounts::{Account, AccountStore, PasswordHasher, Profile};
use crate::modules::error::{AuthError, AuthResult};
use crate::modules::sessions::SessionTokenManager;
use crate::modules::utils::log_auth_event;
use crate::modules::utils::time::now;

/// Self-service operations. Every call that touches an account must present
/// that account's current password (or a live session token, for session checks).
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    hasher: Arc<dyn PasswordHasher>,
    sessions: Arc<SessionTokenManager>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        hasher: Arc<dyn PasswordHasher>,
        sessions: Arc<SessionTokenManager>,
    ) -> Self {
        Self {
            store,
            hasher,
            sessions,
        }
    }

    /// Verify a password and record the outcome on the account
    pub fn check_password(&self, username: &str, password: &str) -> AuthResult<()> {
        loop {
            let account = self.store.get(username)?;
            if account.must_change_password {
                log_auth_event("check_password", username, false, Some("must change password"));
                return Err(AuthError::MustChangePassword);
            }

            let verified = self.hasher.verify(&account.password_hash, password);
            let mut attempts = 0;
            let mut stale = false;
            let recorded = self.store.modify(username, &mut |current| {
                if credentials_changed(&account, current) {
                    stale = true;
                    return Err(AuthError::InvalidPassword);
                }
                if verified {
                    current.record_login();
                } else {
                    current.record_failed_login();
                    attempts = current.failed_login_attempts;
                }
                Ok(())
            });
            if stale {
                log::debug!("Password for {} changed during check; retrying", username);
                continue;
            }
            recorded?;

            if verified {
                log_auth_event("check_password", username, true, None);
                return Ok(());
            }
            log_auth_event(
                "check_password",
                username,
                false,
                Some(&format!("failed attempts: {}", attempts)),
            );
            return Err(AuthError::InvalidPassword);
        }
    }

    /// Create an account and open a session for it
    pub fn add_user(&self, username: &str, password: &str) -> AuthResult<String> {
        if username.trim().is_empty() {
            return Err(AuthError::InvalidUsername);
        }
        if password.is_empty() {
            return Err(AuthError::EmptyPassword);
        }
        // Skip the expensive hash when the name is obviously taken
        if self.store.get(username).is_ok() {
            return Err(AuthError::AlreadyExists);
        }

        let hash = self.hasher.hash(password)?;
        self.store.put(Account::new(username, hash))?;
        log_auth_event("add_user", username, true, None);
        Ok(self.sessions.issue(username))
    }

    /// Replace the password; returns a fresh session token.
    ///
    /// Identical old and new passwords are refused before the account is even
    /// looked up, so the answer does not reveal whether it exists.
    pub fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<String> {
        if old_password == new_password {
            return Err(AuthError::SamePassword);
        }
        if new_password.is_empty() {
            return Err(AuthError::EmptyPassword);
        }

        loop {
            let account = self.store.get(username)?;
            // A forced change is the only way out of the must-change state
            if !account.must_change_password
                && !self.hasher.verify(&account.password_hash, old_password)
            {
                log_auth_event("change_password", username, false, Some("invalid password"));
                return Err(AuthError::InvalidPassword);
            }
            let new_hash = self.hasher.hash(new_password)?;

            let mut stale = false;
            let changed = self.store.modify(username, &mut |current| {
                if credentials_changed(&account, current) {
                    stale = true;
                    return Err(AuthError::InvalidPassword);
                }
                current.set_password_hash(new_hash.clone());
                Ok(())
            });
            if stale {
                continue;
            }
            changed?;

            log_auth_event("change_password", username, true, None);
            return Ok(self.sessions.issue(username));
        }
    }

    /// Delete the account after verifying its password
    pub fn del_user(&self, username: &str, password: &str) -> AuthResult<()> {
        loop {
            let account = self.authenticate(username, password)?;
            let mut stale = false;
            let deleted = self.store.delete_if(username, &mut |current| {
                if credentials_changed(&account, current) {
                    stale = true;
                    return Err(AuthError::InvalidPassword);
                }
                Ok(())
            });
            if stale {
                continue;
            }
            deleted?;

            self.sessions.discard(username);
            log_auth_event("del_user", username, true, None);
            return Ok(());
        }
    }

    pub fn get_profile(&self, username: &str, password: &str) -> AuthResult<Profile> {
        Ok(self.authenticate(username, password)?.profile)
    }

    pub fn update_profile(
        &self,
        username: &str,
        password: &str,
        profile: Profile,
    ) -> AuthResult<()> {
        loop {
            let account = self.authenticate(username, password)?;
            let mut stale = false;
            let updated = self.store.modify(username, &mut |current| {
                if credentials_changed(&account, current) {
                    stale = true;
                    return Err(AuthError::InvalidPassword);
                }
                current.profile = profile.clone();
                current.date_changed = now();
                Ok(())
            });
            if !stale {
                return updated;
            }
        }
    }

    /// Check the password and start a new session
    pub fn login(&self, username: &str, password: &str) -> AuthResult<String> {
        self.check_password(username, password)?;
        let token = self.sessions.issue(username);
        log_auth_event("login", username, true, None);
        Ok(token)
    }

    pub fn logout(&self, username: &str) -> AuthResult<()> {
        self.sessions.revoke(username)?;
        log_auth_event("logout", username, true, None);
        Ok(())
    }

    pub fn check_session(&self, username: &str, token: &str) -> AuthResult<()> {
        self.sessions.validate(username, token)
    }

    fn authenticate(&self, username: &str, password: &str) -> AuthResult<Account> {
        let account = self.store.get(username)?;
        if !self.hasher.verify(&account.password_hash, password) {
            return Err(AuthError::InvalidPassword);
        }
        Ok(account)
    }
}

/// Whether the credentials a caller was verified against have been replaced
/// since `seen` was read
fn credentials_changed(seen: &Account, current: &Account) -> bool {
    seen.password_hash != current.password_hash
        || seen.must_change_password != current.must_change_password
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::accounts::{JsonAccountStore, Pbkdf2Hasher};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Runs a one-shot hook right after the next successful `get`, so another
    /// request can complete between a service's read and its write.
    struct InterleavingStore {
        inner: Arc<JsonAccountStore>,
        hook: parking_lot::Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl AccountStore for InterleavingStore {
        fn get(&self, username: &str) -> AuthResult<Account> {
            let account = self.inner.get(username)?;
            let hook = self.hook.lock().take();
            if let Some(hook) = hook {
                hook();
            }
            Ok(account)
        }
        fn put(&self, account: Account) -> AuthResult<()> {
            self.inner.put(account)
        }
        fn update(&self, account: Account) -> AuthResult<()> {
            self.inner.update(account)
        }
        fn delete(&self, username: &str) -> AuthResult<()> {
            self.inner.delete(username)
        }
        fn modify(
            &self,
            username: &str,
            change: &mut dyn FnMut(&mut Account) -> AuthResult<()>,
        ) -> AuthResult<()> {
            self.inner.modify(username, change)
        }
        fn delete_if(
            &self,
            username: &str,
            check: &mut dyn FnMut(&Account) -> AuthResult<()>,
        ) -> AuthResult<()> {
            self.inner.delete_if(username, check)
        }
        fn usernames(&self) -> AuthResult<Vec<String>> {
            self.inner.usernames()
        }
        fn close(&self) -> AuthResult<()> {
            self.inner.close()
        }
    }

    /// A service over an interleaving store, plus a second service sharing
    /// the same backing store and sessions
    fn setup_interleaved() -> (AccountService, Arc<AccountService>, Arc<InterleavingStore>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(JsonAccountStore::create(dir.path().join("accounts.json")).unwrap());
        let hasher: Arc<dyn PasswordHasher> =
            Arc::new(Pbkdf2Hasher::with_iterations(1_000).unwrap());
        let sessions = Arc::new(SessionTokenManager::new(Duration::from_secs(60)));
        let store = Arc::new(InterleavingStore {
            inner: inner.clone(),
            hook: parking_lot::Mutex::new(None),
        });
        let slow = AccountService::new(store.clone(), hasher.clone(), sessions.clone());
        let other = Arc::new(AccountService::new(inner, hasher, sessions));
        (slow, other, store, dir)
    }

    #[test]
    fn test_failed_check_does_not_undo_concurrent_password_change() {
        let (slow, other, store, _dir) = setup_interleaved();
        other.add_user("joe", "passwd").unwrap();

        let changer = Arc::clone(&other);
        *store.hook.lock() = Some(Box::new(move || {
            changer.change_password("joe", "passwd", "newpasswd").unwrap();
        }));

        assert!(matches!(
            slow.check_password("joe", "wrong"),
            Err(AuthError::InvalidPassword)
        ));
        assert!(other.check_password("joe", "newpasswd").is_ok());
        assert!(matches!(
            other.check_password("joe", "passwd"),
            Err(AuthError::InvalidPassword)
        ));
    }

    #[test]
    fn test_check_with_replaced_password_is_retried() {
        let (slow, other, store, _dir) = setup_interleaved();
        other.add_user("joe", "passwd").unwrap();

        let changer = Arc::clone(&other);
        *store.hook.lock() = Some(Box::new(move || {
            changer.change_password("joe", "passwd", "newpasswd").unwrap();
        }));

        // Verified against the old hash, but the old password is gone by commit time
        assert!(matches!(
            slow.check_password("joe", "passwd"),
            Err(AuthError::InvalidPassword)
        ));
        assert_eq!(store.inner.get("joe").unwrap().failed_login_attempts, 1);
    }

    #[test]
    fn test_profile_update_does_not_revert_password() {
        let (slow, other, store, _dir) = setup_interleaved();
        other.add_user("joe", "passwd").unwrap();

        let changer = Arc::clone(&other);
        *store.hook.lock() = Some(Box::new(move || {
            changer.change_password("joe", "passwd", "newpasswd").unwrap();
        }));

        let profile = Profile {
            name: "Joe".to_string(),
            ..Profile::default()
        };
        assert!(matches!(
            slow.update_profile("joe", "passwd", profile),
            Err(AuthError::InvalidPassword)
        ));
        assert!(other.check_password("joe", "newpasswd").is_ok());
        assert!(other.get_profile("joe", "newpasswd").unwrap().is_empty());
    }

    #[test]
    fn test_failed_check_does_not_undo_admin_reset() {
        let (slow, other, store, _dir) = setup_interleaved();
        other.add_user("joe", "passwd").unwrap();

        let admin = crate::modules::service::AdminService::new(
            store.inner.clone(),
            Arc::new(Pbkdf2Hasher::with_iterations(1_000).unwrap()),
            Arc::new(SessionTokenManager::new(Duration::from_secs(60))),
        );
        *store.hook.lock() = Some(Box::new(move || admin.reset_password("joe").unwrap()));

        assert!(slow.check_password("joe", "wrong").is_err());
        let account = store.inner.get("joe").unwrap();
        assert!(account.must_change_password);
        assert!(matches!(
            other.check_password("joe", "passwd"),
            Err(AuthError::MustChangePassword)
        ));
    }

    fn setup_service() -> (AccountService, Arc<JsonAccountStore>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonAccountStore::create(dir.path().join("accounts.json")).unwrap());
        let hasher = Arc::new(Pbkdf2Hasher::with_iterations(1_000).unwrap());
        let sessions = Arc::new(SessionTokenManager::new(Duration::from_secs(60)));
        let service = AccountService::new(store.clone(), hasher, sessions);
        (service, store, dir)
    }

    #[test]
    fn test_add_then_check() {
        let (service, _store, _dir) = setup_service();
        let token = service.add_user("joe", "passwd").unwrap();

        assert!(service.check_session("joe", &token).is_ok());
        assert!(service.check_password("joe", "passwd").is_ok());
    }

    #[test]
    fn test_add_twice_keeps_first_record() {
        let (service, store, _dir) = setup_service();
        service.add_user("joe", "passwd").unwrap();
        let before = store.get("joe").unwrap();

        assert!(matches!(
            service.add_user("joe", "other"),
            Err(AuthError::AlreadyExists)
        ));
        assert_eq!(store.get("joe").unwrap(), before);
    }

    #[test]
    fn test_add_rejects_empty_credentials() {
        let (service, _store, _dir) = setup_service();
        assert!(matches!(
            service.add_user("  ", "passwd"),
            Err(AuthError::InvalidUsername)
        ));
        assert!(matches!(
            service.add_user("joe", ""),
            Err(AuthError::EmptyPassword)
        ));
    }

    #[test]
    fn test_same_password_checked_before_lookup() {
        let (service, _store, _dir) = setup_service();
        assert!(matches!(
            service.change_password("nobody", "same", "same"),
            Err(AuthError::SamePassword)
        ));
    }

    #[test]
    fn test_change_password() {
        let (service, store, _dir) = setup_service();
        let first_token = service.add_user("joe", "passwd").unwrap();
        let new_token = service.change_password("joe", "passwd", "newpasswd").unwrap();

        assert!(matches!(
            service.check_password("joe", "passwd"),
            Err(AuthError::InvalidPassword)
        ));
        assert!(service.check_password("joe", "newpasswd").is_ok());
        assert!(matches!(
            service.check_session("joe", &first_token),
            Err(AuthError::InvalidToken)
        ));
        assert!(service.check_session("joe", &new_token).is_ok());

        let account = store.get("joe").unwrap();
        assert!(account.date_changed >= account.date_created);
    }

    #[test]
    fn test_change_password_requires_old() {
        let (service, _store, _dir) = setup_service();
        service.add_user("joe", "passwd").unwrap();
        assert!(matches!(
            service.change_password("joe", "wrong", "newpasswd"),
            Err(AuthError::InvalidPassword)
        ));
        assert!(service.check_password("joe", "passwd").is_ok());
    }

    #[test]
    fn test_must_change_password_flow() {
        let (service, store, _dir) = setup_service();
        service.add_user("joe", "passwd").unwrap();
        let mut account = store.get("joe").unwrap();
        account.must_change_password = true;
        store.update(account).unwrap();

        assert!(matches!(
            service.check_password("joe", "passwd"),
            Err(AuthError::MustChangePassword)
        ));
        assert!(matches!(
            service.login("joe", "passwd"),
            Err(AuthError::MustChangePassword)
        ));

        // Old password is not checked while a change is forced
        service.change_password("joe", "anything", "fresh").unwrap();
        assert!(!store.get("joe").unwrap().must_change_password);
        assert!(service.check_password("joe", "fresh").is_ok());
    }

    #[test]
    fn test_failed_attempts_are_tracked() {
        let (service, store, _dir) = setup_service();
        service.add_user("joe", "passwd").unwrap();

        for _ in 0..3 {
            assert!(service.check_password("joe", "wrong").is_err());
        }
        assert_eq!(store.get("joe").unwrap().failed_login_attempts, 3);

        service.check_password("joe", "passwd").unwrap();
        let account = store.get("joe").unwrap();
        assert_eq!(account.failed_login_attempts, 0);
        assert!(account.last_login.is_some());
    }

    #[test]
    fn test_profile_is_password_gated() {
        let (service, _store, _dir) = setup_service();
        service.add_user("joe", "passwd").unwrap();

        let profile = Profile {
            name: "Joe".to_string(),
            last_name: "Doe".to_string(),
            ..Profile::default()
        };
        assert!(matches!(
            service.update_profile("joe", "wrong", profile.clone()),
            Err(AuthError::InvalidPassword)
        ));
        service.update_profile("joe", "passwd", profile.clone()).unwrap();
        assert_eq!(service.get_profile("joe", "passwd").unwrap(), profile);
        assert!(matches!(
            service.get_profile("joe", "wrong"),
            Err(AuthError::InvalidPassword)
        ));
    }

    #[test]
    fn test_login_logout() {
        let (service, _store, _dir) = setup_service();
        service.add_user("joe", "passwd").unwrap();

        let token = service.login("joe", "passwd").unwrap();
        assert!(service.check_session("joe", &token).is_ok());
        service.logout("joe").unwrap();
        assert!(matches!(
            service.check_session("joe", &token),
            Err(AuthError::NoSuchSession)
        ));
        assert!(matches!(service.logout("joe"), Err(AuthError::NoSuchSession)));
    }

    #[test]
    fn test_joe_scenario() {
        let (service, _store, _dir) = setup_service();

        service.add_user("joe", "passwd").unwrap();
        service.check_password("joe", "passwd").unwrap();
        service.change_password("joe", "passwd", "newpasswd").unwrap();
        assert!(service.check_password("joe", "passwd").is_err());
        service.check_password("joe", "newpasswd").unwrap();

        assert!(matches!(
            service.del_user("joe", "passwd"),
            Err(AuthError::InvalidPassword)
        ));
        service.del_user("joe", "newpasswd").unwrap();
        assert!(matches!(
            service.check_password("joe", "newpasswd"),
            Err(AuthError::NotFound)
        ));
    }

    #[test]
    fn test_concurrent_adds() {
        let (service, store, _dir) = setup_service();
        let service = Arc::new(service);

        std::thread::scope(|scope| {
            for i in 0..20 {
                let service = Arc::clone(&service);
                scope.spawn(move || {
                    service.add_user(&format!("user{}", i), "passwd").unwrap();
                });
            }
        });
        assert_eq!(store.usernames().unwrap().len(), 20);
        for i in 0..20 {
            assert!(store.get(&format!("user{}", i)).is_ok());
        }

        let results: Vec<AuthResult<String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    let service = Arc::clone(&service);
                    scope.spawn(move || service.add_user("contended", "passwd"))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AuthError::AlreadyExists)));
    }
}
