use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::modules::error::{AuthError, AuthResult};
use crate::modules::utils::constant_time_eq;
use crate::{MAX_TOKEN_TTL, TOKEN_LENGTH};

struct SessionEntry {
    token: String,
    expires_at: Instant,
    // Distinguishes this issuance from any later one for the same user
    seq: u64,
}

#[derive(Default)]
struct SessionState {
    sessions: HashMap<String, SessionEntry>,
    // Expiry-ordered index over `sessions`, kept in lockstep with it
    expiries: BTreeSet<(Instant, u64, String)>,
    next_seq: u64,
}

impl SessionState {
    fn remove(&mut self, username: &str) -> Option<SessionEntry> {
        let entry = self.sessions.remove(username)?;
        self.expiries
            .remove(&(entry.expires_at, entry.seq, username.to_string()));
        Some(entry)
    }
}

/// In-memory keeper of one session token per user.
///
/// Tokens live for a fixed time-to-live. An expired token is treated as absent
/// the moment its deadline passes; the periodic sweep only reclaims memory.
pub struct SessionTokenManager {
    ttl: Duration,
    state: Mutex<SessionState>,
}

/// Generate a cryptographically random session token
fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

impl SessionTokenManager {
    /// Lifetimes beyond `MAX_TOKEN_TTL` seconds are clamped to it
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: ttl.min(Duration::from_secs(MAX_TOKEN_TTL)),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token for `username`, replacing any previous one
    pub fn issue(&self, username: &str) -> String {
        let token = generate_token();
        let now = Instant::now();
        let expires_at = now.checked_add(self.ttl).unwrap_or(now);

        let mut state = self.state.lock();
        state.remove(username);
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .expiries
            .insert((expires_at, seq, username.to_string()));
        state.sessions.insert(
            username.to_string(),
            SessionEntry {
                token: token.clone(),
                expires_at,
                seq,
            },
        );
        token
    }

    /// Check `token` against the live token for `username`
    pub fn validate(&self, username: &str, token: &str) -> AuthResult<()> {
        let mut state = self.state.lock();
        let expires_at = match state.sessions.get(username) {
            Some(entry) => entry.expires_at,
            None => return Err(AuthError::NoSuchSession),
        };
        if expires_at <= Instant::now() {
            state.remove(username);
            return Err(AuthError::NoSuchSession);
        }
        match state.sessions.get(username) {
            Some(entry) if constant_time_eq(entry.token.as_bytes(), token.as_bytes()) => Ok(()),
            _ => Err(AuthError::InvalidToken),
        }
    }

    /// Drop the live token for `username`
    pub fn revoke(&self, username: &str) -> AuthResult<()> {
        let mut state = self.state.lock();
        match state.remove(username) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(()),
            _ => Err(AuthError::NoSuchSession),
        }
    }

    /// Drop any token for `username`, live or not
    pub fn discard(&self, username: &str) {
        self.state.lock().remove(username);
    }

    /// Number of tokens that have not yet expired
    pub fn active_sessions(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .sessions
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Remove every expired token; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let mut removed = 0;
        while let Some((expires_at, seq, username)) = state.expiries.first().cloned() {
            if expires_at > now {
                break;
            }
            state.expiries.remove(&(expires_at, seq, username.clone()));
            // Only the issuance this deadline belongs to may be removed
            let current = state.sessions.get(&username).map(|entry| entry.seq);
            if current == Some(seq) {
                state.sessions.remove(&username);
                removed += 1;
            }
        }
        removed
    }

    /// Run `sweep_expired` every `every` on the tokio runtime.
    ///
    /// The task stops by itself once the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let removed = manager.sweep_expired();
                if removed > 0 {
                    log::debug!("Swept {} expired session tokens", removed);
                }
            }
        })
    }

    /// Forget every token, used on shutdown
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.sessions.clear();
        state.expiries.clear();
    }
}
