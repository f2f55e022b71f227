use super::message::{Action, Request, Response};
use super::secrets::{Authorization, SecretRegistry};
use crate::modules::error::{AuthError, AuthResult};
use crate::modules::service::{AccountService, AdminService};

/// Result of pushing one request through the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The action ran (successfully or not). `fatal` is set when the store
    /// reported a persistence failure and the process should stop serving.
    Responded { response: Response, fatal: bool },
    /// The secret did not authorize the request; nothing was executed
    Rejected(Response),
}

impl Outcome {
    pub fn response(&self) -> &Response {
        match self {
            Outcome::Responded { response, .. } => response,
            Outcome::Rejected(response) => response,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            Outcome::Responded { response, .. } => response,
            Outcome::Rejected(response) => response,
        }
    }
}

/// Routes authenticated requests to the account or admin service and renders
/// every result, including errors, as a `Response`.
pub struct Dispatcher {
    accounts: AccountService,
    admin: AdminService,
    secrets: SecretRegistry,
}

impl Dispatcher {
    pub fn new(accounts: AccountService, admin: AdminService, secrets: SecretRegistry) -> Self {
        Self {
            accounts,
            admin,
            secrets,
        }
    }

    pub fn secrets(&self) -> &SecretRegistry {
        &self.secrets
    }

    pub fn dispatch(&self, request: Request) -> Outcome {
        let authorization = self.secrets.authorize(&request.secret, request.is_privileged());
        let id = request.id.clone();

        let result = match authorization {
            Authorization::Rejected => {
                log::warn!("Rejected request for action {:?}: bad secret", request.action);
                return Outcome::Rejected(Response::failure(id, &AuthError::Forbidden));
            }
            Authorization::Admin => self.handle_admin(&request),
            Authorization::App => self.handle_regular(&request),
        };

        match result {
            Ok(response) => Outcome::Responded {
                response,
                fatal: false,
            },
            Err(e) => {
                if e.is_fatal() {
                    log::error!("Action {} hit a fatal storage error: {}", request.action, e);
                } else {
                    log::debug!("Action {} failed: {}", request.action, e);
                }
                Outcome::Responded {
                    response: Response::failure(id, &e),
                    fatal: e.is_fatal(),
                }
            }
        }
    }

    fn handle_regular(&self, request: &Request) -> AuthResult<Response> {
        let action: Action = request.action.parse()?;
        if action.is_privileged() {
            return Err(AuthError::Forbidden);
        }
        let username = required_username(request)?;
        let ok = Response::ok(request.id.clone());

        match action {
            Action::Login => {
                let token = self.accounts.login(username, &request.password)?;
                Ok(ok.with_token(token))
            }
            Action::Logout => {
                self.accounts.logout(username)?;
                Ok(ok)
            }
            Action::CheckSessionIsValid => {
                self.accounts.check_session(username, &request.token)?;
                Ok(ok.with_token(request.token.clone()))
            }
            Action::CheckPassword => {
                self.accounts.check_password(username, &request.password)?;
                Ok(ok)
            }
            Action::AddUser => {
                let token = self.accounts.add_user(username, &request.password)?;
                Ok(ok.with_token(token))
            }
            Action::DeleteUser => {
                self.accounts.del_user(username, &request.password)?;
                Ok(ok)
            }
            Action::ChangePassword => {
                let token = self.accounts.change_password(
                    username,
                    &request.password,
                    &request.new_password,
                )?;
                Ok(ok.with_token(token))
            }
            Action::GetProfile => {
                let profile = self.accounts.get_profile(username, &request.password)?;
                Ok(ok.with_profile(profile))
            }
            Action::UpdateProfile => {
                let profile = request
                    .profile
                    .clone()
                    .ok_or_else(|| AuthError::MalformedMessage("profile is required".to_string()))?;
                self.accounts
                    .update_profile(username, &request.password, profile)?;
                Ok(ok)
            }
            _ => Err(AuthError::Forbidden),
        }
    }

    fn handle_admin(&self, request: &Request) -> AuthResult<Response> {
        let action: Action = request.action.parse()?;
        let ok = Response::ok(request.id.clone());

        match action {
            Action::AdminGetAccount => {
                let account = self.admin.get_account(required_username(request)?)?;
                Ok(ok.with_account(account))
            }
            Action::AdminAddAccount => {
                self.admin.add_account(required_username(request)?)?;
                Ok(ok)
            }
            Action::AdminDeleteAccount => {
                self.admin.del_account(required_username(request)?)?;
                Ok(ok)
            }
            Action::AdminUpdateAccount => {
                let account = request
                    .account
                    .clone()
                    .ok_or_else(|| AuthError::MalformedMessage("account is required".to_string()))?;
                self.admin.update_account(account)?;
                Ok(ok)
            }
            Action::AdminResetPassword => {
                self.admin.reset_password(required_username(request)?)?;
                Ok(ok)
            }
            Action::AdminAddAppSecret => {
                self.secrets.add_app_secret(&request.token)?;
                log::info!("Registered a new application secret");
                Ok(ok)
            }
            Action::AdminRevokeAppSecret => {
                self.secrets.revoke_app_secret(&request.token)?;
                log::info!("Revoked an application secret");
                Ok(ok)
            }
            Action::AdminRotateAdminSecret => {
                self.secrets.rotate_admin_secret(&request.token)?;
                log::info!("Admin secret rotated");
                Ok(ok)
            }
            _ => Err(AuthError::UnknownAction(request.action.clone())),
        }
    }
}

fn required_username(request: &Request) -> AuthResult<&str> {
    if request.username.is_empty() {
        return Err(AuthError::MalformedMessage("username is required".to_string()));
    }
    Ok(&request.username)
}
