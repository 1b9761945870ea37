use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use skep_types::Result;
use tracing::debug;

/// An authorized session against the remote store.
#[derive(Debug, Clone)]
pub struct Session {
    pub api_url: String,
    pub download_url: String,
    pub auth_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session should be refreshed: true once the clock is
    /// within `margin` of the literal expiry.
    pub fn needs_refresh(&self, margin: Duration) -> bool {
        Utc::now() + margin >= self.expires_at
    }
}

/// Caches the current session and re-authorizes lazily when a caller
/// notices it is within the margin of expiry.
///
/// The store keeps old tokens valid for a grace window, so a worker holding
/// a stale-but-unexpired session concurrently with a refresh is fine; the
/// mutex here only keeps the cache slot itself consistent.
pub struct SessionProvider {
    margin: Duration,
    current: Mutex<Option<Session>>,
}

impl SessionProvider {
    pub fn new(margin_secs: i64) -> Self {
        Self {
            margin: Duration::seconds(margin_secs),
            current: Mutex::new(None),
        }
    }

    /// Return the cached session, authorizing via `authorize` if there is
    /// none yet or the cached one is near expiry.
    pub fn session(&self, authorize: impl FnOnce() -> Result<Session>) -> Result<Session> {
        let mut guard = self.current.lock().unwrap();
        if let Some(current) = guard.as_ref() {
            if !current.needs_refresh(self.margin) {
                return Ok(current.clone());
            }
            debug!(expires_at = %current.expires_at, "session near expiry, re-authorizing");
        }
        let fresh = authorize()?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached session so the next caller re-authorizes, e.g. after
    /// the store rejects a token early.
    pub fn invalidate(&self) {
        *self.current.lock().unwrap() = None;
    }
}
