pub mod tokens;

pub use tokens::SessionTokenManager;
