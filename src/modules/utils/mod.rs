pub mod compare;
pub mod logging;
pub mod time;

pub use compare::constant_time_eq;
pub use logging::{initialize_logging, log_admin_operation, log_auth_event};
