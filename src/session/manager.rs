//! Session Manager
//!
//! Session CRUD with TTL lifecycle: Active -> Expired -> Destroyed.
//! Expiry is detected lazily on access and proactively by a background sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::CachePort;
use crate::error::{DataError, Result};
use crate::events::{EventBus, Subscription};
use crate::executor::RetryPolicy;
use crate::session::{NewSession, Session, SessionEvent, User};
use crate::store::{Entity, EntityStore, FindOptions};
use crate::tasks::spawn_sweep_task;
use crate::validation::Validator;

// == Session Config ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session lifetime in seconds, also the cache TTL
    pub ttl_secs: u64,
    /// Interval between background sweeps
    pub sweep_interval: StdDuration,
    /// Policy for direct store calls
    pub store_retry: RetryPolicy,
    /// Queue size of each event subscriber
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            sweep_interval: StdDuration::from_secs(300),
            store_retry: RetryPolicy::single(),
            event_capacity: 64,
        }
    }
}

/// Ten years; keeps `now + ttl` far from chrono's range limits.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

fn session_key(id: &str) -> String {
    format!("session:{}", id)
}

/// Clears the running flag when a sweep ends, however it ends.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// == Session Manager ==
pub struct SessionManager {
    sessions: Arc<dyn EntityStore<Session>>,
    users: Arc<dyn EntityStore<User>>,
    cache: Arc<dyn CachePort>,
    config: SessionConfig,
    validator: Validator,
    events: EventBus<SessionEvent>,
    sweeping: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Creates the manager and starts its background sweep.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        sessions: Arc<dyn EntityStore<Session>>,
        users: Arc<dyn EntityStore<User>>,
        cache: Arc<dyn CachePort>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            sessions,
            users,
            cache,
            config,
            validator: Validator::new(Session::meta()),
            events: EventBus::new(config.event_capacity),
            sweeping: AtomicBool::new(false),
            sweeper: Mutex::new(None),
        });

        let handle = spawn_sweep_task(Arc::downgrade(&manager), config.sweep_interval);
        *manager.sweeper_lock() = Some(handle);
        manager
    }

    fn sweeper_lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.config.ttl_secs.min(MAX_TTL_SECS) as i64)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribes to `session.created` / `session.destroyed` events.
    pub fn subscribe(&self) -> Subscription<SessionEvent> {
        self.events.subscribe()
    }

    // == Create ==
    /// Opens a session for an existing user.
    pub async fn create_session(&self, new: NewSession) -> Result<Session> {
        let user = self
            .config
            .store_retry
            .run("find user", || self.users.find_one(&new.user_id))
            .await?
            .ok_or_else(|| DataError::Unauthorized(format!("Unknown user {}", new.user_id)))?;

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            ip: new.ip,
            user_agent: new.user_agent,
            metadata: new.metadata,
            last_activity: now,
            expires_at: now + self.ttl(),
        };
        self.validate(&session)?;

        self.persist(&session).await?;
        self.cache_session(&session).await;

        self.events.publish(SessionEvent::Created {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
        });
        info!("Session {} created for user {}", session.id, session.user_id);
        Ok(session)
    }

    // == Get ==
    /// Returns a live session, destroying it if it has expired.
    pub async fn get_session(&self, id: &str) -> Result<Session> {
        let key = session_key(id);

        if let Some(session) = self.cached(&key).await {
            if session.is_expired() {
                return Err(self.expire(id).await);
            }
            return Ok(session);
        }

        let session = self
            .config
            .store_retry
            .run("find session", || self.sessions.find_one(id))
            .await?
            .ok_or_else(|| DataError::Unauthorized(format!("Unknown session {}", id)))?;
        self.config
            .store_retry
            .run("find user", || self.users.find_one(&session.user_id))
            .await?
            .ok_or_else(|| {
                DataError::Unauthorized(format!("Session {} has no user", session.id))
            })?;

        if session.is_expired() {
            return Err(self.expire(id).await);
        }

        self.cache_session(&session).await;
        Ok(session)
    }

    // == Update ==
    /// Records activity on a live session and extends its expiry.
    pub async fn update_session(&self, id: &str) -> Result<Session> {
        let mut session = self.get_session(id).await?;
        session.touch(Utc::now(), self.ttl());

        self.persist(&session).await?;
        self.cache_session(&session).await;
        Ok(session)
    }

    // == Destroy ==
    /// Removes a session. Destroying an absent session is a no-op.
    pub async fn destroy_session(&self, id: &str) -> Result<()> {
        let existing = self
            .config
            .store_retry
            .run("find session", || self.sessions.find_one(id))
            .await?;

        let key = session_key(id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!("Cache delete failed for {}: {}", key, e);
        }

        if let Some(session) = existing {
            self.config
                .store_retry
                .run("remove session", || self.sessions.remove(&session))
                .await?;
            self.events.publish(SessionEvent::Destroyed {
                session_id: session.id.clone(),
                user_id: session.user_id.clone(),
            });
            debug!("Session {} destroyed", id);
        }
        Ok(())
    }

    // == User Sessions ==
    /// Unexpired sessions of a user, most recently active first.
    pub async fn get_user_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let options = FindOptions::new()
            .where_eq("user_id", user_id)
            .where_gt("expires_at", Value::String(Utc::now().to_rfc3339()))
            .order_desc("last_activity");

        self.config
            .store_retry
            .run("find user sessions", || self.sessions.find(&options))
            .await
    }

    /// Destroys every unexpired session of a user, returning how many.
    pub async fn destroy_user_sessions(&self, user_id: &str) -> Result<usize> {
        let sessions = self.get_user_sessions(user_id).await?;
        for session in &sessions {
            self.destroy_session(&session.id).await?;
        }
        info!("Destroyed {} session(s) for user {}", sessions.len(), user_id);
        Ok(sessions.len())
    }

    // == Sweep ==
    /// Destroys every session whose expiry is already past.
    ///
    /// Returns 0 without doing anything when another sweep is in progress.
    pub async fn sweep_expired(&self) -> Result<usize> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Session sweep already running, skipping");
            return Ok(0);
        }
        let _guard = SweepGuard(&self.sweeping);

        let options = FindOptions::new()
            .where_lt("expires_at", Value::String(Utc::now().to_rfc3339()));
        let expired = self
            .config
            .store_retry
            .run("find expired sessions", || self.sessions.find(&options))
            .await?;

        let mut removed = 0;
        for session in &expired {
            match self.destroy_session(&session.id).await {
                Ok(()) => removed += 1,
                Err(e) => error!("Failed to destroy expired session {}: {}", session.id, e),
            }
        }
        Ok(removed)
    }

    // == Shutdown ==
    /// Stops the background sweep and ends event streams. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper_lock().take() {
            handle.abort();
            info!("Session sweep stopped");
        }
        self.events.close();
    }

    // == Helpers ==
    fn validate(&self, session: &Session) -> Result<()> {
        let value = serde_json::to_value(session)?;
        match value.as_object() {
            Some(map) => self.validator.validate(map).map_err(DataError::Validation),
            None => Ok(()),
        }
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        self.config
            .store_retry
            .run("save session", || self.sessions.save(session))
            .await?;
        Ok(())
    }

    /// Lazily destroys an expired session and yields the error to return.
    async fn expire(&self, id: &str) -> DataError {
        if let Err(e) = self.destroy_session(id).await {
            warn!("Failed to destroy expired session {}: {}", id, e);
        }
        DataError::SessionExpired(id.to_string())
    }

    async fn cached(&self, key: &str) -> Option<Session> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!("Discarding undecodable session cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Session cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn cache_session(&self, session: &Session) {
        let key = session_key(&session.id);
        let raw = match serde_json::to_string(session) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode session {}: {}", session.id, e);
                return;
            }
        };
        if let Err(e) = self.cache.set(&key, raw, self.config.ttl_secs).await {
            warn!("Session cache write failed for {}: {}", key, e);
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper_lock().take() {
            handle.abort();
        }
    }
}
