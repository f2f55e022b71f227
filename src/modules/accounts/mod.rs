pub mod model;
pub mod password;
pub mod store;

pub use model::{Account, Profile};
pub use password::{PasswordHasher, Pbkdf2Hasher};
pub use store::{AccountStore, JsonAccountStore};
