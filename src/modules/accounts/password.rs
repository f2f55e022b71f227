use pbkdf2::pbkdf2;
use rand::Rng;
use std::num::NonZeroU32;

use crate::modules::error::{AuthError, AuthResult};
use crate::modules::utils::constant_time_eq;
use crate::HmacSha256;

/// Work factor used by `Pbkdf2Hasher::new`
pub const DEFAULT_ITERATIONS: u32 = 100_000;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// One-way transform for credentials.
///
/// Implementations must be usable from many request threads at once.
pub trait PasswordHasher: Send + Sync {
    /// Produce a storable hash of `password`
    fn hash(&self, password: &str) -> AuthResult<String>;

    /// Return true only when `password` produces `hash`
    fn verify(&self, hash: &str, password: &str) -> bool;
}

/// PBKDF2-HMAC-SHA256 with a fresh random salt per hash.
///
/// Hashes are encoded as `pbkdf2-sha256$<iterations>$<salt hex>$<key hex>`, so
/// changing the work factor leaves existing hashes verifiable.
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    iterations: NonZeroU32,
}

impl Pbkdf2Hasher {
    pub fn new() -> Self {
        Self {
            iterations: NonZeroU32::new(DEFAULT_ITERATIONS).unwrap_or(NonZeroU32::MIN),
        }
    }

    /// Hasher with a custom work factor; zero is rejected
    pub fn with_iterations(iterations: u32) -> AuthResult<Self> {
        let iterations = NonZeroU32::new(iterations)
            .ok_or_else(|| AuthError::Hashing("iteration count must be positive".to_string()))?;
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Function to generate a random salt for PBKDF2
fn generate_random_salt() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..SALT_LEN).map(|_| rng.gen()).collect()
}

/// Derive a 32-byte key from the password using PBKDF2
fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut key = vec![0u8; KEY_LEN];
    pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> AuthResult<String> {
        if password.is_empty() {
            return Err(AuthError::Hashing("refusing to hash empty password".to_string()));
        }
        let salt = generate_random_salt();
        let key = derive_key(password, &salt, self.iterations.get());
        Ok(format!(
            "{}${}${}${}",
            SCHEME,
            self.iterations.get(),
            hex::encode(salt),
            hex::encode(key)
        ))
    }

    fn verify(&self, hash: &str, password: &str) -> bool {
        let parts: Vec<&str> = hash.split('$').collect();
        if parts.len() != 4 || parts[0] != SCHEME {
            return false;
        }
        let iterations = match parts[1].parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => return false,
        };
        let (salt, expected) = match (hex::decode(parts[2]), hex::decode(parts[3])) {
            (Ok(salt), Ok(expected)) => (salt, expected),
            _ => return false,
        };
        let key = derive_key(password, &salt, iterations);
        constant_time_eq(&key, &expected)
    }
}
