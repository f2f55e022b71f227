use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::modules::utils::time::{format_optional_timestamp, format_timestamp, now};

/// Free-form user details. Nothing in the service interprets these fields.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub middle_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        self == &Profile::default()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = [&self.name, &self.middle_name, &self.last_name]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "name: {}", full_name)?;
        if !self.comment.is_empty() {
            write!(f, "\ncomment: {}", self.comment)?;
        }
        Ok(())
    }
}

/// Durable record for a single user, keyed by `username` in the store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub username: String,
    pub password_hash: String,
    pub date_created: DateTime<Utc>,
    pub date_changed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_login_attempts: u32,
    #[serde(default)]
    pub must_change_password: bool,
    #[serde(default, skip_serializing_if = "Profile::is_empty")]
    pub profile: Profile,
}

impl Account {
    /// Build a fresh account around an already computed password hash
    pub fn new(username: impl Into<String>, password_hash: String) -> Self {
        let created = now();
        Self {
            username: username.into(),
            password_hash,
            date_created: created,
            date_changed: created,
            last_login: None,
            failed_login_attempts: 0,
            must_change_password: false,
            profile: Profile::default(),
        }
    }

    /// Bookkeeping after a password verified
    pub fn record_login(&mut self) {
        self.last_login = Some(now());
        self.failed_login_attempts = 0;
    }

    /// Bookkeeping after a password failed to verify
    pub fn record_failed_login(&mut self) {
        self.failed_login_attempts = self.failed_login_attempts.saturating_add(1);
    }

    /// Swap in a new hash and clear any pending forced change
    pub fn set_password_hash(&mut self, password_hash: String) {
        self.password_hash = password_hash;
        self.date_changed = now();
        self.must_change_password = false;
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "username:   {}", self.username)?;
        writeln!(f, "created:    {}", format_timestamp(&self.date_created))?;
        writeln!(f, "changed:    {}", format_timestamp(&self.date_changed))?;
        writeln!(
            f,
            "last login: {}",
            format_optional_timestamp(self.last_login.as_ref())
        )?;
        writeln!(f, "failed:     {}", self.failed_login_attempts)?;
        writeln!(f, "mustchange: {}", self.must_change_password)?;
        write!(f, "{}", self.profile)
    }
}
