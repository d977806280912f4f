//! Session Sweep Task
//!
//! Background task that periodically destroys expired sessions.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::session::SessionManager;

/// Spawns a background task that sweeps expired sessions every `interval`.
///
/// Each run completes before the next sleep starts, so runs never overlap.
/// Sweep errors are logged and the loop carries on. The task holds only a
/// weak reference and exits once the manager is dropped.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted by `SessionManager::shutdown`.
pub fn spawn_sweep_task(manager: Weak<SessionManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting session sweep task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let Some(manager) = manager.upgrade() else {
                debug!("Session manager dropped, sweep task exiting");
                break;
            };

            match manager.sweep_expired().await {
                Ok(0) => debug!("Session sweep: no expired sessions found"),
                Ok(removed) => info!("Session sweep: removed {} expired sessions", removed),
                Err(e) => error!("Session sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, Utc};

    use crate::cache::MemoryCache;
    use crate::session::{Session, SessionConfig, User};
    use crate::store::{EntityStore, MemoryStore};

    fn manager(store: &MemoryStore, interval: Duration) -> Arc<SessionManager> {
        let config = SessionConfig {
            sweep_interval: interval,
            ..SessionConfig::default()
        };
        SessionManager::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(MemoryCache::new()),
            config,
        )
    }

    async fn seed_expired(store: &MemoryStore, id: &str) {
        let past = Utc::now() - ChronoDuration::seconds(10);
        let session = Session {
            id: id.to_string(),
            user_id: "u1".to_string(),
            ip: None,
            user_agent: None,
            metadata: Default::default(),
            last_activity: past - ChronoDuration::seconds(60),
            expires_at: past,
        };
        EntityStore::<Session>::save(store, &session).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_sessions() {
        let store = MemoryStore::default();
        EntityStore::<User>::save(
            &store,
            &User {
                id: "u1".to_string(),
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
            },
        )
        .await
        .unwrap();
        seed_expired(&store, "old").await;

        let manager = manager(&store, Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(store.count("sessions").await, 0);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_sweep_task_stops_on_shutdown() {
        let store = MemoryStore::default();
        let manager = manager(&store, Duration::from_millis(50));

        manager.shutdown();
        seed_expired(&store, "late").await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.count("sessions").await, 1);
    }

    #[tokio::test]
    async fn test_sweep_task_exits_when_manager_dropped() {
        let store = MemoryStore::default();
        let manager = manager(&store, Duration::from_millis(20));
        let weak = Arc::downgrade(&manager);
        let handle = spawn_sweep_task(weak, Duration::from_millis(20));

        drop(manager);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should exit once manager is gone");
    }
}
