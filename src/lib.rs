// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{
    accounts,
    admin_tool,
    client,
    config,
    error,
    protocol,
    server,
    service,
    sessions,
    utils,
};

// Re-export commonly used types
pub use modules::accounts::{Account, AccountStore, JsonAccountStore, Profile};
pub use modules::client::RemoteClient;
pub use modules::error::{AuthError, AuthResult};
pub use modules::protocol::{Action, Dispatcher, Outcome, Request, Response, SecretRegistry};
pub use modules::service::{AccountService, AdminService};
pub use modules::sessions::SessionTokenManager;

// Constants
pub const ACCOUNTS_FILE: &str = "accounts.json";
pub const DEFAULT_PASSWORD: &str = "none";
pub const DEFAULT_TOKEN_TTL: u64 = 86_400;
pub const DEFAULT_SWEEP_INTERVAL: u64 = 60;
/// Upper bound for token lifetimes and sweep intervals, about 100 years
pub const MAX_TOKEN_TTL: u64 = 100 * 365 * 86_400;
pub const TOKEN_LENGTH: usize = 48;

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
