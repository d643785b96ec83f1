//! Session handles and the process-wide session registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use super::{ConversationStore, DisplayEntry, PrimingPair};

/// Default idle timeout before a session is discarded (30 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A single chat session.
///
/// Cloning is cheap and yields a handle to the same session. Exchanges take
/// the session's exchange slot for their whole duration, so they run one at a
/// time. The conversation itself is only locked for the brief moments it is
/// read or appended to, so rendering never waits on a model call.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    exchange: AsyncMutex<()>,
    conversation: Mutex<ConversationStore>,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

impl Session {
    fn new(id: String, priming: &PrimingPair) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                id,
                exchange: AsyncMutex::new(()),
                conversation: Mutex::new(ConversationStore::new(priming)),
                created_at: now,
                last_activity: RwLock::new(now),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Wait until no other exchange is running on this session.
    ///
    /// The session counts as busy until the returned slot is dropped.
    pub async fn begin_exchange(&self) -> ExchangeSlot<'_> {
        let slot = self.inner.exchange.lock().await;
        self.touch();
        ExchangeSlot { _slot: slot }
    }

    /// Lock the conversation. Never hold the guard across an `.await`.
    pub fn conversation(&self) -> MutexGuard<'_, ConversationStore> {
        self.inner
            .conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Visible history as of now.
    #[must_use]
    pub fn display(&self) -> Vec<DisplayEntry> {
        self.conversation().snapshot_for_display()
    }

    /// Whether an exchange is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.exchange.try_lock().is_err()
    }

    /// Update the last activity timestamp.
    pub fn touch(&self) {
        let mut guard = self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Utc::now();
    }

    /// Check if the session has been idle longer than `timeout`.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        let last = *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        // Negative durations (clock skew) never expire.
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        (Utc::now() - self.inner.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Exclusive right to run an exchange on one session.
#[derive(Debug)]
pub struct ExchangeSlot<'a> {
    _slot: tokio::sync::MutexGuard<'a, ()>,
}

/// Thread-safe registry of live sessions.
///
/// Every session is seeded with the same priming pair.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    priming: PrimingPair,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(PrimingPair::default())
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(priming: PrimingPair) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                priming,
            }),
        }
    }

    /// Priming pair new sessions are seeded with.
    #[must_use]
    pub fn priming(&self) -> &PrimingPair {
        &self.inner.priming
    }

    /// Create a session under a fresh random id.
    #[must_use]
    pub fn create(&self) -> Session {
        self.initialize(&Uuid::new_v4().to_string())
    }

    /// Return the session for `id`, creating and seeding it on first use.
    ///
    /// Repeated calls with the same id return the same session with its
    /// history untouched.
    #[must_use]
    pub fn initialize(&self, id: &str) -> Session {
        if let Some(session) = self.get(id) {
            return session;
        }

        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let session = guard
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, "Seeded new session");
                Session::new(id.to_string(), &self.inner.priming)
            })
            .clone();
        drop(guard);
        session
    }

    /// Look up a live session and mark it active.
    ///
    /// The touch happens under the registry lock, so a concurrent sweep
    /// either removed the session already or sees it as fresh.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|session| {
                session.touch();
                session.clone()
            })
    }

    /// End a session, discarding its history.
    pub fn remove(&self, id: &str) -> Option<Session> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions idle longer than `timeout`.
    ///
    /// Sessions with an exchange in flight are kept. Returns the number of
    /// sessions removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, session| session.is_busy() || !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }

    /// Remove sessions idle longer than [`DEFAULT_IDLE_TIMEOUT`].
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_with_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}
