use parking_lot::RwLock;
use std::collections::HashSet;

use crate::modules::error::{AuthError, AuthResult};
use crate::modules::utils::constant_time_eq;

/// Which capability a presented secret unlocks for a given request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Admin,
    App,
    Rejected,
}

struct Secrets {
    admin: Option<String>,
    apps: HashSet<String>,
}

/// Shared secrets the dispatcher authenticates against. Mutable at runtime
/// through the admin secret-management actions.
pub struct SecretRegistry {
    secrets: RwLock<Secrets>,
}

impl SecretRegistry {
    /// An empty admin secret disables admin access entirely
    pub fn new(admin: Option<String>, apps: impl IntoIterator<Item = String>) -> Self {
        Self {
            secrets: RwLock::new(Secrets {
                admin: admin.filter(|secret| !secret.is_empty()),
                apps: apps.into_iter().filter(|s| !s.is_empty()).collect(),
            }),
        }
    }

    /// Decide how a request presenting `secret` may be handled
    pub fn authorize(&self, secret: &str, privileged: bool) -> Authorization {
        if secret.is_empty() {
            return Authorization::Rejected;
        }
        let secrets = self.secrets.read();
        if privileged {
            if let Some(admin) = &secrets.admin {
                if constant_time_eq(admin.as_bytes(), secret.as_bytes()) {
                    return Authorization::Admin;
                }
            }
        }
        // Walk every registered secret so timing does not reveal which matched
        let mut matched = false;
        for app in &secrets.apps {
            matched |= constant_time_eq(app.as_bytes(), secret.as_bytes());
        }
        if matched {
            Authorization::App
        } else {
            Authorization::Rejected
        }
    }

    pub fn has_admin_secret(&self) -> bool {
        self.secrets.read().admin.is_some()
    }

    pub fn app_secret_count(&self) -> usize {
        self.secrets.read().apps.len()
    }

    pub fn add_app_secret(&self, secret: &str) -> AuthResult<()> {
        if secret.is_empty() {
            return Err(AuthError::MalformedMessage("secret must not be empty".to_string()));
        }
        self.secrets.write().apps.insert(secret.to_string());
        Ok(())
    }

    pub fn revoke_app_secret(&self, secret: &str) -> AuthResult<()> {
        if self.secrets.write().apps.remove(secret) {
            Ok(())
        } else {
            Err(AuthError::UnknownSecret)
        }
    }

    /// Replace the admin secret; the old one stops working immediately
    pub fn rotate_admin_secret(&self, secret: &str) -> AuthResult<()> {
        if secret.is_empty() {
            return Err(AuthError::MalformedMessage(
                "admin secret must not be empty".to_string(),
            ));
        }
        self.secrets.write().admin = Some(secret.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SecretRegistry {
        SecretRegistry::new(Some("admin-secret".to_string()), vec!["app-secret".to_string()])
    }

    #[test]
    fn test_authorize() {
        let secrets = registry();
        assert_eq!(secrets.authorize("admin-secret", true), Authorization::Admin);
        assert_eq!(secrets.authorize("app-secret", false), Authorization::App);
        assert_eq!(secrets.authorize("app-secret", true), Authorization::App);
        assert_eq!(secrets.authorize("admin-secret", false), Authorization::Rejected);
        assert_eq!(secrets.authorize("guess", false), Authorization::Rejected);
        assert_eq!(secrets.authorize("", false), Authorization::Rejected);
    }

    #[test]
    fn test_empty_admin_secret_disables_admin() {
        let secrets = SecretRegistry::new(Some(String::new()), Vec::new());
        assert!(!secrets.has_admin_secret());
        assert_eq!(secrets.authorize("", true), Authorization::Rejected);
    }

    #[test]
    fn test_app_secret_management() {
        let secrets = registry();
        secrets.add_app_secret("second").unwrap();
        assert_eq!(secrets.app_secret_count(), 2);
        assert_eq!(secrets.authorize("second", false), Authorization::App);

        secrets.revoke_app_secret("second").unwrap();
        assert_eq!(secrets.authorize("second", false), Authorization::Rejected);
        assert!(matches!(
            secrets.revoke_app_secret("second"),
            Err(AuthError::UnknownSecret)
        ));
        assert!(secrets.add_app_secret("").is_err());
    }

    #[test]
    fn test_rotate_admin_secret() {
        let secrets = registry();
        secrets.rotate_admin_secret("new-admin").unwrap();
        assert_eq!(secrets.authorize("admin-secret", true), Authorization::Rejected);
        assert_eq!(secrets.authorize("new-admin", true), Authorization::Admin);
        assert!(secrets.rotate_admin_secret("").is_err());
    }
}
