use chrono::{DateTime, Local, Utc};

/// Current wall-clock time in UTC, the clock every account timestamp uses
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a UTC timestamp as a readable local date
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    let local_time: DateTime<Local> = DateTime::from(*timestamp);
    local_time.format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

/// Format an optional timestamp, rendering `never` when absent
pub fn format_optional_timestamp(timestamp: Option<&DateTime<Utc>>) -> String {
    match timestamp {
        Some(ts) => format_timestamp(ts),
        None => "never".to_string(),
    }
}

/// Format duration in seconds to human readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{} seconds", seconds)
    } else if seconds < 3600 {
        format!("{} minutes", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours", seconds / 3600)
    } else {
        format!("{} days", seconds / 86400)
    }
}
