use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::{ACCOUNTS_FILE, DEFAULT_SWEEP_INTERVAL, DEFAULT_TOKEN_TTL, MAX_TOKEN_TTL};

/// Settings for the `serve` mode
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub accounts_file: PathBuf,
    pub admin_secret: Option<String>,
    pub app_secrets: Vec<String>,
    pub token_ttl: Duration,
    pub sweep_interval: Duration,
    pub tls: Option<TlsPaths>,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Offline operations on the backing file, run without a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountCommand {
    Create,
    List,
    Show(String),
    Add(String),
    Delete(String),
    ResetPassword(String),
}

/// Admin operations sent to a running server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    Show(String),
    Add(String),
    Delete(String),
    ResetPassword(String),
    AddAppSecret(String),
    RevokeAppSecret(String),
    RotateAdminSecret(String),
}

/// Where and as whom `remote` commands connect
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub admin_secret: String,
}

/// Logging settings shared by every mode
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub file: Option<PathBuf>,
}

fn accounts_file_arg() -> Arg {
    Arg::new("accounts-file")
        .long("accounts-file")
        .short('f')
        .env("BASICAUTH_ACCOUNTS_FILE")
        .help("JSON file holding the accounts")
        .value_parser(clap::value_parser!(PathBuf))
        .default_value(ACCOUNTS_FILE)
}

fn username_arg() -> Arg {
    Arg::new("username").help("Account username").required(true)
}

fn secret_arg() -> Arg {
    Arg::new("secret").help("Secret to manage").required(true)
}

/// Define the command-line interface
pub fn build_cli() -> Command {
    Command::new("basicauth")
        .about("A small self-hosted authentication service")
        .subcommand_required(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .env("BASICAUTH_LOG_LEVEL")
                .help("Log level (off, error, warn, info, debug, trace)")
                .value_parser(clap::value_parser!(LevelFilter))
                .default_value("info")
                .global(true),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .env("BASICAUTH_LOG_FILE")
                .help("Append logs to this file instead of stderr")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("serve")
                .about("Run the authentication server")
                .arg(
                    Arg::new("listen")
                        .long("listen")
                        .env("BASICAUTH_LISTEN")
                        .help("Address to listen on")
                        .value_parser(clap::value_parser!(SocketAddr))
                        .default_value("127.0.0.1:8081"),
                )
                .arg(accounts_file_arg())
                .arg(
                    Arg::new("admin-secret")
                        .long("admin-secret")
                        .env("BASICAUTH_ADMIN_SECRET")
                        .hide_env_values(true)
                        .help("Secret unlocking admin actions; admin is disabled without it"),
                )
                .arg(
                    Arg::new("app-secret")
                        .long("app-secret")
                        .env("BASICAUTH_APP_SECRETS")
                        .hide_env_values(true)
                        .help("Application secret (repeatable, comma separated in env)")
                        .action(ArgAction::Append)
                        .value_delimiter(','),
                )
                .arg(
                    Arg::new("token-ttl-secs")
                        .long("token-ttl-secs")
                        .env("BASICAUTH_TOKEN_TTL_SECS")
                        .help("Session token lifetime in seconds")
                        .value_parser(clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL))
                        .default_value(DEFAULT_TOKEN_TTL_STR),
                )
                .arg(
                    Arg::new("sweep-interval-secs")
                        .long("sweep-interval-secs")
                        .env("BASICAUTH_SWEEP_INTERVAL_SECS")
                        .help("How often expired session tokens are reclaimed")
                        .value_parser(clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL))
                        .default_value(DEFAULT_SWEEP_INTERVAL_STR),
                )
                .arg(
                    Arg::new("tls-cert")
                        .long("tls-cert")
                        .env("BASICAUTH_TLS_CERT")
                        .help("PEM certificate chain")
                        .value_parser(clap::value_parser!(PathBuf))
                        .requires("tls-key"),
                )
                .arg(
                    Arg::new("tls-key")
                        .long("tls-key")
                        .env("BASICAUTH_TLS_KEY")
                        .help("PEM private key")
                        .value_parser(clap::value_parser!(PathBuf))
                        .requires("tls-cert"),
                ),
        )
        .subcommand(
            Command::new("account")
                .about("Manage the accounts file directly")
                .subcommand_required(true)
                .arg(accounts_file_arg())
                .subcommand(Command::new("create").about("Create a new, empty accounts file"))
                .subcommand(Command::new("list").about("List stored usernames"))
                .subcommand(
                    Command::new("show")
                        .about("Display an account")
                        .arg(username_arg()),
                )
                .subcommand(
                    Command::new("add")
                        .about("Add an account with the default password")
                        .arg(username_arg()),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete an account")
                        .arg(username_arg()),
                )
                .subcommand(
                    Command::new("reset-password")
                        .about("Reset an account to the default password")
                        .arg(username_arg()),
                ),
        )
        .subcommand(
            Command::new("remote")
                .about("Administer a running server over the message protocol")
                .subcommand_required(true)
                .arg(
                    Arg::new("url")
                        .long("url")
                        .env("BASICAUTH_URL")
                        .help("Server address")
                        .default_value("http://127.0.0.1:8081/"),
                )
                .arg(
                    Arg::new("admin-secret")
                        .long("admin-secret")
                        .env("BASICAUTH_ADMIN_SECRET")
                        .hide_env_values(true)
                        .help("Admin secret of the server")
                        .required(true),
                )
                .subcommand(
                    Command::new("show")
                        .about("Display an account")
                        .arg(username_arg()),
                )
                .subcommand(
                    Command::new("add")
                        .about("Add an account with the default password")
                        .arg(username_arg()),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete an account")
                        .arg(username_arg()),
                )
                .subcommand(
                    Command::new("reset-password")
                        .about("Reset an account to the default password")
                        .arg(username_arg()),
                )
                .subcommand(
                    Command::new("add-app-secret")
                        .about("Allow an application secret")
                        .arg(secret_arg()),
                )
                .subcommand(
                    Command::new("revoke-app-secret")
                        .about("Revoke an application secret")
                        .arg(secret_arg()),
                )
                .subcommand(
                    Command::new("rotate-admin-secret")
                        .about("Replace the admin secret")
                        .arg(secret_arg()),
                ),
        )
}

// clap wants `'static` strings for defaults
const DEFAULT_TOKEN_TTL_STR: &str = "86400";
const DEFAULT_SWEEP_INTERVAL_STR: &str = "60";

impl LogConfig {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            level: matches
                .get_one::<LevelFilter>("log-level")
                .copied()
                .unwrap_or(LevelFilter::Info),
            file: matches.get_one::<PathBuf>("log-file").cloned(),
        }
    }
}

impl ServerConfig {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let listen = *matches
            .get_one::<SocketAddr>("listen")
            .context("missing listen address")?;
        let accounts_file = matches
            .get_one::<PathBuf>("accounts-file")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(ACCOUNTS_FILE));
        let admin_secret = matches
            .get_one::<String>("admin-secret")
            .filter(|secret| !secret.is_empty())
            .cloned();
        let app_secrets: Vec<String> = matches
            .get_many::<String>("app-secret")
            .map(|values| values.filter(|s| !s.is_empty()).cloned().collect())
            .unwrap_or_default();
        let token_ttl = matches
            .get_one::<u64>("token-ttl-secs")
            .copied()
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let sweep_interval = matches
            .get_one::<u64>("sweep-interval-secs")
            .copied()
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);

        let tls = match (
            matches.get_one::<PathBuf>("tls-cert"),
            matches.get_one::<PathBuf>("tls-key"),
        ) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.clone(),
                key: key.clone(),
            }),
            (None, None) => None,
            _ => bail!("--tls-cert and --tls-key must be given together"),
        };

        Ok(Self {
            listen,
            accounts_file,
            admin_secret,
            app_secrets,
            token_ttl: Duration::from_secs(token_ttl),
            sweep_interval: Duration::from_secs(sweep_interval),
            tls,
        })
    }
}

impl AccountCommand {
    /// Returns the accounts file and the operation to run on it
    pub fn from_matches(matches: &ArgMatches) -> Result<(PathBuf, Self)> {
        let path = matches
            .get_one::<PathBuf>("accounts-file")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(ACCOUNTS_FILE));
        let username = |sub: &ArgMatches| -> Result<String> {
            sub.get_one::<String>("username")
                .cloned()
                .context("missing username")
        };

        let command = match matches.subcommand() {
            Some(("create", _)) => AccountCommand::Create,
            Some(("list", _)) => AccountCommand::List,
            Some(("show", sub)) => AccountCommand::Show(username(sub)?),
            Some(("add", sub)) => AccountCommand::Add(username(sub)?),
            Some(("delete", sub)) => AccountCommand::Delete(username(sub)?),
            Some(("reset-password", sub)) => AccountCommand::ResetPassword(username(sub)?),
            Some((other, _)) => bail!("unknown account command: {}", other),
            None => bail!("no account command given"),
        };
        Ok((path, command))
    }
}

impl RemoteCommand {
    /// Returns the connection settings and the operation to send
    pub fn from_matches(matches: &ArgMatches) -> Result<(RemoteConfig, Self)> {
        let config = RemoteConfig {
            url: matches
                .get_one::<String>("url")
                .cloned()
                .context("missing server url")?,
            admin_secret: matches
                .get_one::<String>("admin-secret")
                .cloned()
                .context("missing admin secret")?,
        };
        let value = |sub: &ArgMatches, name: &str| -> Result<String> {
            sub.get_one::<String>(name)
                .cloned()
                .with_context(|| format!("missing {}", name))
        };

        let command = match matches.subcommand() {
            Some(("show", sub)) => RemoteCommand::Show(value(sub, "username")?),
            Some(("add", sub)) => RemoteCommand::Add(value(sub, "username")?),
            Some(("delete", sub)) => RemoteCommand::Delete(value(sub, "username")?),
            Some(("reset-password", sub)) => {
                RemoteCommand::ResetPassword(value(sub, "username")?)
            }
            Some(("add-app-secret", sub)) => RemoteCommand::AddAppSecret(value(sub, "secret")?),
            Some(("revoke-app-secret", sub)) => {
                RemoteCommand::RevokeAppSecret(value(sub, "secret")?)
            }
            Some(("rotate-admin-secret", sub)) => {
                RemoteCommand::RotateAdminSecret(value(sub, "secret")?)
            }
            Some((other, _)) => bail!("unknown remote command: {}", other),
            None => bail!("no remote command given"),
        };
        Ok((config, command))
    }
}
