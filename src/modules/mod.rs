// Declare all modules
pub mod accounts;
pub mod admin_tool;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod service;
pub mod sessions;
pub mod utils;

// No re-exports here as they're handled in lib.rs
