use std::sync::atomic::{AtomicU64, Ordering};

use crate::modules::accounts::{Account, Profile};
use crate::modules::error::{AuthError, AuthResult};
use crate::modules::protocol::{Action, Request, Response};

/// Speaks the message protocol to a running server.
///
/// Every call carries the secret the client was built with, so one client
/// acts either as an application or as the admin. A response with
/// `success == false` comes back as the matching `AuthError`.
pub struct RemoteClient {
    http: reqwest::Client,
    url: String,
    secret: String,
    next_id: AtomicU64,
}

impl RemoteClient {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url, secret)
    }

    /// Use a preconfigured `reqwest::Client`, e.g. with custom roots or timeouts
    pub fn with_client(
        http: reqwest::Client,
        url: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            secret: secret.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, action: Action, username: &str) -> Request {
        Request {
            id: self.next_id.fetch_add(1, Ordering::Relaxed).to_string(),
            username: username.to_string(),
            ..Request::new(self.secret.clone(), action)
        }
    }

    /// Post one request and turn a failed response into an error
    pub async fn send(&self, request: Request) -> AuthResult<Response> {
        log::debug!("Sending {} request {}", request.action, request.id);
        let reply = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = reply.status();
        let response: Response = reply.json().await.map_err(|e| {
            AuthError::Transport(format!("unreadable response (HTTP {}): {}", status, e))
        })?;

        if response.success {
            Ok(response)
        } else {
            Err(AuthError::from_message(&response.error))
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> AuthResult<String> {
        let mut request = self.request(Action::Login, username);
        request.password = password.to_string();
        Ok(self.send(request).await?.token)
    }

    pub async fn logout(&self, username: &str) -> AuthResult<()> {
        self.send(self.request(Action::Logout, username)).await?;
        Ok(())
    }

    pub async fn check_session(&self, username: &str, token: &str) -> AuthResult<()> {
        let mut request = self.request(Action::CheckSessionIsValid, username);
        request.token = token.to_string();
        self.send(request).await?;
        Ok(())
    }

    pub async fn check_password(&self, username: &str, password: &str) -> AuthResult<()> {
        let mut request = self.request(Action::CheckPassword, username);
        request.password = password.to_string();
        self.send(request).await?;
        Ok(())
    }

    /// Register a user; returns the session token of the new account
    pub async fn add_user(&self, username: &str, password: &str) -> AuthResult<String> {
        let mut request = self.request(Action::AddUser, username);
        request.password = password.to_string();
        Ok(self.send(request).await?.token)
    }

    pub async fn delete_user(&self, username: &str, password: &str) -> AuthResult<()> {
        let mut request = self.request(Action::DeleteUser, username);
        request.password = password.to_string();
        self.send(request).await?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<String> {
        let mut request = self.request(Action::ChangePassword, username);
        request.password = old_password.to_string();
        request.new_password = new_password.to_string();
        Ok(self.send(request).await?.token)
    }

    pub async fn get_profile(&self, username: &str, password: &str) -> AuthResult<Profile> {
        let mut request = self.request(Action::GetProfile, username);
        request.password = password.to_string();
        Ok(self.send(request).await?.profile.unwrap_or_default())
    }

    pub async fn update_profile(
        &self,
        username: &str,
        password: &str,
        profile: Profile,
    ) -> AuthResult<()> {
        let mut request = self.request(Action::UpdateProfile, username);
        request.password = password.to_string();
        request.profile = Some(profile);
        self.send(request).await?;
        Ok(())
    }

    pub async fn admin_get_account(&self, username: &str) -> AuthResult<Account> {
        self.send(self.request(Action::AdminGetAccount, username))
            .await?
            .account
            .ok_or_else(|| AuthError::Transport("response carries no account".to_string()))
    }

    pub async fn admin_add_account(&self, username: &str) -> AuthResult<()> {
        self.send(self.request(Action::AdminAddAccount, username))
            .await?;
        Ok(())
    }

    pub async fn admin_delete_account(&self, username: &str) -> AuthResult<()> {
        self.send(self.request(Action::AdminDeleteAccount, username))
            .await?;
        Ok(())
    }

    pub async fn admin_update_account(&self, account: Account) -> AuthResult<()> {
        let mut request = self.request(Action::AdminUpdateAccount, &account.username);
        request.account = Some(account);
        self.send(request).await?;
        Ok(())
    }

    pub async fn admin_reset_password(&self, username: &str) -> AuthResult<()> {
        self.send(self.request(Action::AdminResetPassword, username))
            .await?;
        Ok(())
    }

    pub async fn admin_add_app_secret(&self, secret: &str) -> AuthResult<()> {
        self.secret_action(Action::AdminAddAppSecret, secret).await
    }

    pub async fn admin_revoke_app_secret(&self, secret: &str) -> AuthResult<()> {
        self.secret_action(Action::AdminRevokeAppSecret, secret).await
    }

    /// Replace the admin secret on the server. This client keeps sending the
    /// old one; build a new client to continue.
    pub async fn admin_rotate_admin_secret(&self, secret: &str) -> AuthResult<()> {
        self.secret_action(Action::AdminRotateAdminSecret, secret).await
    }

    async fn secret_action(&self, action: Action, secret: &str) -> AuthResult<()> {
        let mut request = self.request(action, "");
        request.token = secret.to_string();
        self.send(request).await?;
        Ok(())
    }
}
