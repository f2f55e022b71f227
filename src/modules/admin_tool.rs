use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::modules::accounts::{AccountStore, JsonAccountStore, Pbkdf2Hasher};
use crate::modules::client::RemoteClient;
use crate::modules::config::{AccountCommand, RemoteCommand, RemoteConfig};
use crate::modules::error::AuthResult;
use crate::modules::service::AdminService;
use crate::modules::sessions::SessionTokenManager;
use crate::{DEFAULT_PASSWORD, DEFAULT_TOKEN_TTL};

fn with_admin<T>(path: &Path, f: impl FnOnce(&AdminService) -> AuthResult<T>) -> Result<T> {
    let store = Arc::new(
        JsonAccountStore::open(path)
            .with_context(|| format!("open accounts file {}", path.display()))?,
    );
    // No server is running, so no session outlives this call
    let sessions = Arc::new(SessionTokenManager::new(Duration::from_secs(DEFAULT_TOKEN_TTL)));
    let admin = AdminService::new(store.clone(), Arc::new(Pbkdf2Hasher::new()), sessions);

    let result = f(&admin);
    store.close().context("close accounts file")?;
    Ok(result?)
}

/// Run one offline account command and return the text to print
pub fn run_account_command(path: &Path, command: AccountCommand) -> Result<String> {
    let output = match command {
        AccountCommand::Create => {
            JsonAccountStore::create(path)
                .with_context(|| format!("create accounts file {}", path.display()))?;
            format!("Created empty accounts file {}", path.display())
        }
        AccountCommand::List => {
            let names = with_admin(path, |admin| admin.list_accounts())?;
            if names.is_empty() {
                "No accounts.".to_string()
            } else {
                names.join("\n")
            }
        }
        AccountCommand::Show(username) => {
            with_admin(path, |admin| admin.get_account(&username))?.to_string()
        }
        AccountCommand::Add(username) => {
            with_admin(path, |admin| admin.add_account(&username))?;
            format!(
                "Account {} added with password '{}'; it must be changed at first use",
                username, DEFAULT_PASSWORD
            )
        }
        AccountCommand::Delete(username) => {
            with_admin(path, |admin| admin.del_account(&username))?;
            format!("Account {} deleted", username)
        }
        AccountCommand::ResetPassword(username) => {
            with_admin(path, |admin| admin.reset_password(&username))?;
            format!("Password for {} reset to '{}'", username, DEFAULT_PASSWORD)
        }
    };
    Ok(output)
}

/// Send one admin command to a running server and return the text to print
pub async fn run_remote_command(config: &RemoteConfig, command: RemoteCommand) -> Result<String> {
    let client = RemoteClient::new(config.url.clone(), config.admin_secret.clone());
    let server = client.url().to_string();
    let context = || format!("request to {}", server);

    let output = match command {
        RemoteCommand::Show(username) => client
            .admin_get_account(&username)
            .await
            .with_context(context)?
            .to_string(),
        RemoteCommand::Add(username) => {
            client.admin_add_account(&username).await.with_context(context)?;
            format!(
                "Account {} added; it must change its password at first use",
                username
            )
        }
        RemoteCommand::Delete(username) => {
            client.admin_delete_account(&username).await.with_context(context)?;
            format!("Account {} deleted", username)
        }
        RemoteCommand::ResetPassword(username) => {
            client.admin_reset_password(&username).await.with_context(context)?;
            format!("Password for {} reset", username)
        }
        RemoteCommand::AddAppSecret(secret) => {
            client.admin_add_app_secret(&secret).await.with_context(context)?;
            "Application secret added".to_string()
        }
        RemoteCommand::RevokeAppSecret(secret) => {
            client.admin_revoke_app_secret(&secret).await.with_context(context)?;
            "Application secret revoked".to_string()
        }
        RemoteCommand::RotateAdminSecret(secret) => {
            client.admin_rotate_admin_secret(&secret).await.with_context(context)?;
            "Admin secret replaced".to_string()
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::error::AuthError;

    #[test]
    fn test_create_then_manage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");

        run_account_command(&path, AccountCommand::Create).unwrap();
        assert!(run_account_command(&path, AccountCommand::Create).is_err());
        assert_eq!(
            run_account_command(&path, AccountCommand::List).unwrap(),
            "No accounts."
        );

        run_account_command(&path, AccountCommand::Add("joe".to_string())).unwrap();
        run_account_command(&path, AccountCommand::Add("ann".to_string())).unwrap();
        assert_eq!(
            run_account_command(&path, AccountCommand::List).unwrap(),
            "ann\njoe"
        );

        let shown = run_account_command(&path, AccountCommand::Show("joe".to_string())).unwrap();
        assert!(shown.contains("joe"));

        run_account_command(&path, AccountCommand::ResetPassword("joe".to_string())).unwrap();
        run_account_command(&path, AccountCommand::Delete("joe".to_string())).unwrap();
        assert_eq!(run_account_command(&path, AccountCommand::List).unwrap(), "ann");
    }

    #[test]
    fn test_missing_account_reports_domain_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let err = run_account_command(&path, AccountCommand::Delete("ghost".to_string()))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthError>(),
            Some(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_remote_commands_against_server() {
        use crate::modules::config::ServerConfig;
        use crate::modules::server::{build_router, AppState, Components};

        let dir = tempfile::tempdir().unwrap();
        let server = ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            accounts_file: dir.path().join("accounts.json"),
            admin_secret: Some("root".to_string()),
            app_secrets: Vec::new(),
            token_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            tls: None,
        };
        let hasher = Arc::new(Pbkdf2Hasher::with_iterations(1_000).unwrap());
        let components = Components::build(&server, hasher).unwrap();
        let app = build_router(AppState::new(components.dispatcher));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = RemoteConfig {
            url: format!("http://{}/", addr),
            admin_secret: "root".to_string(),
        };
        run_remote_command(&config, RemoteCommand::Add("ann".to_string()))
            .await
            .unwrap();
        let shown = run_remote_command(&config, RemoteCommand::Show("ann".to_string()))
            .await
            .unwrap();
        assert!(shown.contains("ann"));

        let err = run_remote_command(&config, RemoteCommand::Delete("ghost".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthError>(),
            Some(AuthError::NotFound)
        ));
    }
}
