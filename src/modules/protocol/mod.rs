pub mod dispatcher;
pub mod message;
pub mod secrets;

pub use dispatcher::{Dispatcher, Outcome};
pub use message::{Action, Request, Response};
pub use secrets::{Authorization, SecretRegistry};
