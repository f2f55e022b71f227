use std::io;
use thiserror::Error;

/// Every failure the account store, session manager, services and dispatcher can report.
///
/// The `Display` text is what ends up in the `error` field of a protocol response.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth error: no such user")]
    NotFound,
    #[error("auth error: user already exists")]
    AlreadyExists,
    #[error("auth error: password does not check out with stored value")]
    InvalidPassword,
    #[error("auth error: old password and new password must not match")]
    SamePassword,
    #[error("auth error: user is required to change password")]
    MustChangePassword,
    #[error("auth error: no such session")]
    NoSuchSession,
    #[error("auth error: invalid session token")]
    InvalidToken,
    #[error("auth error: username must not be empty")]
    InvalidUsername,
    #[error("auth error: password must not be empty")]
    EmptyPassword,
    #[error("storage error: {0}")]
    Persistence(String),
    #[error("storage error: store is closed")]
    StoreClosed,
    #[error("hashing error: {0}")]
    Hashing(String),
    #[error("auth error: secret not found")]
    UnknownSecret,
    #[error("forbidden")]
    Forbidden,
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    /// The server could not be reached or answered with something unreadable
    #[error("transport error: {0}")]
    Transport(String),
    /// A failure reported by a server that this build does not recognise
    #[error("{0}")]
    Remote(String),
}

impl AuthError {
    /// Disk and memory may have diverged; the process should not keep serving.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::Persistence(_))
    }
}

impl AuthError {
    /// Rebuild an error from the `error` text of a protocol response
    pub fn from_message(message: &str) -> Self {
        let known = [
            AuthError::NotFound,
            AuthError::AlreadyExists,
            AuthError::InvalidPassword,
            AuthError::SamePassword,
            AuthError::MustChangePassword,
            AuthError::NoSuchSession,
            AuthError::InvalidToken,
            AuthError::InvalidUsername,
            AuthError::EmptyPassword,
            AuthError::StoreClosed,
            AuthError::UnknownSecret,
            AuthError::Forbidden,
        ];
        if let Some(error) = known.into_iter().find(|e| e.to_string() == message) {
            return error;
        }

        let detail = |prefix: &str| message.strip_prefix(prefix).map(str::to_string);
        if let Some(detail) = detail("storage error: ") {
            AuthError::Persistence(detail)
        } else if let Some(detail) = detail("hashing error: ") {
            AuthError::Hashing(detail)
        } else if let Some(detail) = detail("unknown action: ") {
            AuthError::UnknownAction(detail)
        } else if let Some(detail) = detail("malformed message: ") {
            AuthError::MalformedMessage(detail)
        } else {
            AuthError::Remote(message.to_string())
        }
    }
}

impl From<io::Error> for AuthError {
    fn from(error: io::Error) -> Self {
        AuthError::Persistence(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        AuthError::Persistence(error.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
