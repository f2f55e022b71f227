use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::modules::accounts::{Account, Profile};
use crate::modules::error::AuthError;

/// Every operation a client can name in `Request::action`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Login,
    Logout,
    CheckSessionIsValid,
    CheckPassword,
    AddUser,
    DeleteUser,
    ChangePassword,
    GetProfile,
    UpdateProfile,
    AdminGetAccount,
    AdminAddAccount,
    AdminDeleteAccount,
    AdminUpdateAccount,
    AdminResetPassword,
    AdminAddAppSecret,
    AdminRevokeAppSecret,
    AdminRotateAdminSecret,
}

impl Action {
    pub const ALL: [Action; 17] = [
        Action::Login,
        Action::Logout,
        Action::CheckSessionIsValid,
        Action::CheckPassword,
        Action::AddUser,
        Action::DeleteUser,
        Action::ChangePassword,
        Action::GetProfile,
        Action::UpdateProfile,
        Action::AdminGetAccount,
        Action::AdminAddAccount,
        Action::AdminDeleteAccount,
        Action::AdminUpdateAccount,
        Action::AdminResetPassword,
        Action::AdminAddAppSecret,
        Action::AdminRevokeAppSecret,
        Action::AdminRotateAdminSecret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Logout => "logout",
            Action::CheckSessionIsValid => "checkSessionIsValid",
            Action::CheckPassword => "checkPassword",
            Action::AddUser => "addUser",
            Action::DeleteUser => "deleteUser",
            Action::ChangePassword => "changePassword",
            Action::GetProfile => "getProfile",
            Action::UpdateProfile => "updateProfile",
            Action::AdminGetAccount => "adminGetAccount",
            Action::AdminAddAccount => "adminAddAccount",
            Action::AdminDeleteAccount => "adminDeleteAccount",
            Action::AdminUpdateAccount => "adminUpdateAccount",
            Action::AdminResetPassword => "adminResetPassword",
            Action::AdminAddAppSecret => "adminAddAppSecret",
            Action::AdminRevokeAppSecret => "adminRevokeAppSecret",
            Action::AdminRotateAdminSecret => "adminRotateAdminSecret",
        }
    }

    /// Whether only the admin secret may invoke this action
    pub fn is_privileged(&self) -> bool {
        is_privileged_name(self.as_str())
    }
}

/// Admin actions are recognised by name prefix, known or not
pub fn is_privileged_name(action: &str) -> bool {
    action.starts_with("admin")
}

impl FromStr for Action {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| AuthError::UnknownAction(s.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client request. Which fields matter depends on `action`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Request {
    /// Echoed back in the response for client-side correlation
    pub id: String,
    /// Application or admin secret
    pub secret: String,
    pub action: String,
    pub username: String,
    pub password: String,
    pub new_password: String,
    /// Session token, or the secret being managed for secret actions
    pub token: String,
    pub account: Option<Account>,
    pub profile: Option<Profile>,
}

impl Request {
    pub fn new(secret: impl Into<String>, action: Action) -> Self {
        Self {
            secret: secret.into(),
            action: action.as_str().to_string(),
            ..Self::default()
        }
    }

    pub fn is_privileged(&self) -> bool {
        is_privileged_name(&self.action)
    }
}

/// The answer to a `Request`. Domain failures are reported here, never as transport errors.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl Response {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(id: impl Into<String>, error: &AuthError) -> Self {
        Self {
            id: id.into(),
            success: false,
            error: error.to_string(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }
}
