//! In-memory session store.
//!
//! Each session owns one [`Conversation`]. The per-session mutex is held for
//! the whole exchange, so submissions within a session never overlap.
//!
//! Sessions idle longer than the store's timeout are dropped on access, and
//! creating a session past the cap evicts the least recently used one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use ulid::Ulid;

use crate::conversation::Conversation;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);
const DEFAULT_MAX_SESSIONS: usize = 1000;

/// A chat session held by the UI server.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    conversation: Arc<Mutex<Conversation>>,
    activity: std::sync::Mutex<Activity>,
}

/// When a session was last used, plus a store-wide sequence number that
/// orders sessions touched within the same clock tick.
#[derive(Debug, Clone, Copy)]
struct Activity {
    at: Instant,
    seq: u64,
}

impl Session {
    /// Current conversation snapshot. Waits for an in-flight exchange to finish.
    pub async fn snapshot(&self) -> Conversation {
        self.conversation.lock().await.clone()
    }

    /// Exclusive access for the duration of one exchange.
    pub async fn lock(&self) -> OwnedMutexGuard<Conversation> {
        self.conversation.clone().lock_owned().await
    }

    fn activity(&self) -> Activity {
        *self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self, seq: u64) {
        *self.activity.lock().unwrap_or_else(PoisonError::into_inner) = Activity {
            at: Instant::now(),
            seq,
        };
    }
}

/// Thread-safe map of session id to session.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Arc<Session>>>,
    seq: Arc<AtomicU64>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that drops sessions idle for `idle_timeout` and holds at most
    /// `max_sessions` (minimum one).
    pub fn with_limits(idle_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            seq: Arc::new(AtomicU64::new(0)),
            idle_timeout,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Create a session with an empty conversation.
    pub fn create(&self) -> Arc<Session> {
        self.evict_idle();
        while self.sessions.len() >= self.max_sessions {
            if !self.evict_least_recent() {
                break;
            }
        }

        let session = Arc::new(Session {
            id: format!("session_{}", Ulid::new()),
            created_at: Utc::now(),
            conversation: Arc::new(Mutex::new(Conversation::new())),
            activity: std::sync::Mutex::new(Activity {
                at: Instant::now(),
                seq: self.next_seq(),
            }),
        });
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Look up a session and mark it used. An idle-expired session is
    /// removed and reported as missing.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|s| s.value().clone())?;
        if self.is_expired(&session) {
            self.sessions.remove(id);
            debug!(session_id = %id, "session expired");
            return None;
        }
        session.touch(self.next_seq());
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn is_expired(&self, session: &Session) -> bool {
        session.activity().at.elapsed() >= self.idle_timeout
    }

    fn evict_idle(&self) {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.activity().at.elapsed() < self.idle_timeout);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "idle sessions evicted");
        }
    }

    fn evict_least_recent(&self) -> bool {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.value().activity().seq)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(id) => {
                self.sessions.remove(&id);
                debug!(session_id = %id, "session evicted at capacity");
                true
            }
            None => false,
        }
    }
}
