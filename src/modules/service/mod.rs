pub mod admin;
pub mod app;

pub use admin::AdminService;
pub use app::AccountService;
