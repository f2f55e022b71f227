use env_logger::{Builder, Target, WriteStyle};
use log::{error, info, warn, LevelFilter};
use std::fs::OpenOptions;
use std::path::Path;

/// Initialize the logging system, writing to the given file or to stderr
pub fn initialize_logging(
    level: LevelFilter,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = Builder::new();
    builder
        .filter_level(level)
        // RUST_LOG still wins for per-module overrides
        .parse_default_env()
        .format_timestamp_secs()
        .format_module_path(true)
        .write_style(WriteStyle::Auto);

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder.try_init()?;

    info!("Logging system initialized at level {}", level);
    Ok(())
}

/// Helper function to format sensitive data for logging
fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Structured logging for authentication events (password checks, logins, sessions)
pub fn log_auth_event(event_type: &str, username: &str, success: bool, details: Option<&str>) {
    if success {
        info!(
            "Auth event: type={}, user={}, success=true, details={:?}",
            event_type,
            format_sensitive(username),
            details
        );
    } else {
        warn!(
            "Auth event: type={}, user={}, success=false, details={:?}",
            event_type,
            format_sensitive(username),
            details
        );
    }
}

/// Structured logging for privileged account operations
pub fn log_admin_operation(operation: &str, username: &str, success: bool, details: Option<&str>) {
    if success {
        info!(
            "Admin operation: op={}, user={}, success=true, details={:?}",
            operation,
            format_sensitive(username),
            details
        );
    } else {
        error!(
            "Admin operation: op={}, user={}, success=false, details={:?}",
            operation,
            format_sensitive(username),
            details
        );
    }
}
