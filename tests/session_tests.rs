//! Integration Tests for the Session Manager
//!
//! Covers the Active -> Expired -> Destroyed lifecycle, per-user queries,
//! the sweep and lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use data_core::cache::MemoryCache;
use data_core::session::SessionEvent;
use data_core::store::{EntityStore, MemoryStore};
use data_core::{DataError, NewSession, Session, SessionConfig, SessionManager, User};

// == Helper Functions ==

async fn seed_user(store: &MemoryStore, id: &str) {
    let user = User {
        id: id.to_string(),
        username: format!("user-{}", id),
        email: format!("{}@example.com", id),
    };
    EntityStore::<User>::save(store, &user).await.unwrap();
}

fn manager_with(
    store: &MemoryStore,
    cache: Arc<MemoryCache>,
    ttl_secs: u64,
) -> Arc<SessionManager> {
    let config = SessionConfig {
        ttl_secs,
        sweep_interval: Duration::from_secs(3600),
        ..SessionConfig::default()
    };
    SessionManager::new(Arc::new(store.clone()), Arc::new(store.clone()), cache, config)
}

fn manager(store: &MemoryStore, ttl_secs: u64) -> Arc<SessionManager> {
    manager_with(store, Arc::new(MemoryCache::new()), ttl_secs)
}

async fn seed_session(store: &MemoryStore, id: &str, user_id: &str, expires_in: i64) {
    let now = Utc::now();
    let session = Session {
        id: id.to_string(),
        user_id: user_id.to_string(),
        ip: None,
        user_agent: None,
        metadata: Default::default(),
        last_activity: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::seconds(expires_in),
    };
    EntityStore::<Session>::save(store, &session).await.unwrap();
}

// == Create / Get ==

#[tokio::test]
async fn test_create_and_get_session() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    let sessions = manager(&store, 3600);

    let created = sessions
        .create_session(
            NewSession::for_user("u1")
                .ip("10.0.0.7")
                .user_agent("curl/8.0")
                .metadata("device", "laptop"),
        )
        .await
        .unwrap();

    assert_eq!(created.user_id, "u1");
    assert_eq!(
        created.expires_at - created.last_activity,
        ChronoDuration::seconds(3600)
    );

    let fetched = sessions.get_session(&created.id).await.unwrap();
    assert_eq!(fetched, created);
    sessions.shutdown();
}

#[tokio::test]
async fn test_create_for_unknown_user_is_unauthorized() {
    let store = MemoryStore::default();
    let sessions = manager(&store, 3600);

    let result = sessions.create_session(NewSession::for_user("ghost")).await;

    assert!(matches!(result, Err(DataError::Unauthorized(_))));
    assert_eq!(store.count("sessions").await, 0);
    sessions.shutdown();
}

#[tokio::test]
async fn test_create_rejects_oversized_fields() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    let sessions = manager(&store, 3600);

    let result = sessions
        .create_session(NewSession::for_user("u1").ip("x".repeat(100)))
        .await;

    assert!(matches!(result, Err(DataError::Validation(_))));
    sessions.shutdown();
}

#[tokio::test]
async fn test_get_unknown_session_is_unauthorized() {
    let store = MemoryStore::default();
    let sessions = manager(&store, 3600);

    let result = sessions.get_session("missing").await;
    assert!(matches!(result, Err(DataError::Unauthorized(_))));
    sessions.shutdown();
}

#[tokio::test]
async fn test_session_of_deleted_user_is_unauthorized() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    seed_session(&store, "s1", "u1", 3600).await;
    let user = EntityStore::<User>::find_one(&store, "u1").await.unwrap().unwrap();
    EntityStore::<User>::remove(&store, &user).await.unwrap();
    let sessions = manager(&store, 3600);

    let result = sessions.get_session("s1").await;
    assert!(matches!(result, Err(DataError::Unauthorized(_))));
    sessions.shutdown();
}

// == Expiry ==

#[tokio::test]
async fn test_expired_session_is_destroyed_on_access() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    let sessions = manager(&store, 1);

    let created = sessions
        .create_session(NewSession::for_user("u1"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let result = sessions.get_session(&created.id).await;
    assert!(matches!(result, Err(DataError::SessionExpired(_))));

    let live = sessions.get_user_sessions("u1").await.unwrap();
    assert!(live.is_empty());
    assert_eq!(store.count("sessions").await, 0);

    // Once destroyed the session is simply unknown
    let again = sessions.get_session(&created.id).await;
    assert!(matches!(again, Err(DataError::Unauthorized(_))));
    sessions.shutdown();
}

#[tokio::test]
async fn test_update_extends_expiry() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    let sessions = manager(&store, 60);

    let created = sessions
        .create_session(NewSession::for_user("u1"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let updated = sessions.update_session(&created.id).await.unwrap();

    assert!(updated.last_activity > created.last_activity);
    assert!(updated.expires_at > created.expires_at);
    assert_eq!(
        updated.expires_at - updated.last_activity,
        ChronoDuration::seconds(60)
    );
    let stored = EntityStore::<Session>::find_one(&store, &created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.expires_at, updated.expires_at);
    sessions.shutdown();
}

#[tokio::test]
async fn test_update_expired_session_fails() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    seed_session(&store, "old", "u1", -1).await;
    let sessions = manager(&store, 60);

    let result = sessions.update_session("old").await;
    assert!(matches!(result, Err(DataError::SessionExpired(_))));
    sessions.shutdown();
}

#[tokio::test]
async fn test_cached_session_outlives_store_removal() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    let sessions = manager(&store, 3600);
    let created = sessions
        .create_session(NewSession::for_user("u1"))
        .await
        .unwrap();

    // Removed behind the manager's back, so the cache is not told
    EntityStore::<Session>::remove(&store, &created).await.unwrap();

    let served = sessions.get_session(&created.id).await.unwrap();
    assert_eq!(served.id, created.id);
    sessions.shutdown();
}

// == Destroy ==

#[tokio::test]
async fn test_destroy_is_idempotent() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    let sessions = manager(&store, 3600);
    let created = sessions
        .create_session(NewSession::for_user("u1"))
        .await
        .unwrap();

    sessions.destroy_session(&created.id).await.unwrap();
    sessions.destroy_session(&created.id).await.unwrap();

    let result = sessions.get_session(&created.id).await;
    assert!(matches!(result, Err(DataError::Unauthorized(_))));
    sessions.shutdown();
}

#[tokio::test]
async fn test_destroy_evicts_cache() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    let cache = Arc::new(MemoryCache::new());
    let sessions = manager_with(&store, cache.clone(), 3600);
    let created = sessions
        .create_session(NewSession::for_user("u1"))
        .await
        .unwrap();
    let key = format!("session:{}", created.id);
    assert!(cache.contains(&key).await);

    sessions.destroy_session(&created.id).await.unwrap();
    assert!(!cache.contains(&key).await);
    sessions.shutdown();
}

// == Per-User ==

#[tokio::test]
async fn test_user_sessions_most_recent_first() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    seed_user(&store, "u2").await;
    let sessions = manager(&store, 3600);

    let first = sessions.create_session(NewSession::for_user("u1")).await.unwrap();
    let second = sessions.create_session(NewSession::for_user("u1")).await.unwrap();
    sessions.create_session(NewSession::for_user("u2")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    sessions.update_session(&first.id).await.unwrap();
    seed_session(&store, "stale", "u1", -10).await;

    let ids: Vec<String> = sessions
        .get_user_sessions("u1")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();

    assert_eq!(ids, vec![first.id, second.id]);
    sessions.shutdown();
}

#[tokio::test]
async fn test_destroy_user_sessions() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    seed_user(&store, "u2").await;
    let sessions = manager(&store, 3600);
    for user in ["u1", "u1", "u1", "u2"] {
        sessions.create_session(NewSession::for_user(user)).await.unwrap();
    }

    let removed = sessions.destroy_user_sessions("u1").await.unwrap();

    assert_eq!(removed, 3);
    assert!(sessions.get_user_sessions("u1").await.unwrap().is_empty());
    assert_eq!(sessions.get_user_sessions("u2").await.unwrap().len(), 1);
    sessions.shutdown();
}

// == Sweep ==

#[tokio::test]
async fn test_sweep_removes_exactly_the_expired() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    seed_session(&store, "e1", "u1", -30).await;
    seed_session(&store, "e2", "u1", -1).await;
    seed_session(&store, "live1", "u1", 600).await;
    seed_session(&store, "live2", "u1", 600).await;
    let sessions = manager(&store, 3600);

    let removed = sessions.sweep_expired().await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(store.count("sessions").await, 2);
    assert!(sessions.get_session("live1").await.is_ok());
    assert!(sessions.get_session("live2").await.is_ok());
    assert_eq!(sessions.sweep_expired().await.unwrap(), 0);
    sessions.shutdown();
}

#[tokio::test]
async fn test_concurrent_sweeps_do_not_double_count() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    for i in 0..5 {
        seed_session(&store, &format!("e{}", i), "u1", -5).await;
    }
    let sessions = manager(&store, 3600);

    let (a, b) = tokio::join!(sessions.sweep_expired(), sessions.sweep_expired());

    assert_eq!(a.unwrap() + b.unwrap(), 5);
    assert_eq!(store.count("sessions").await, 0);
    sessions.shutdown();
}

// == Events ==

#[tokio::test]
async fn test_lifecycle_events() {
    let store = MemoryStore::default();
    seed_user(&store, "u1").await;
    let sessions = manager(&store, 3600);
    let mut events = sessions.subscribe();

    let created = sessions.create_session(NewSession::for_user("u1")).await.unwrap();
    sessions.destroy_session(&created.id).await.unwrap();
    sessions.destroy_session(&created.id).await.unwrap();

    let first = events.recv().await.unwrap();
    assert_eq!(first.name(), "session.created");
    assert_eq!(first.session_id(), created.id);

    let second = events.recv().await.unwrap();
    assert_eq!(
        second,
        SessionEvent::Destroyed {
            session_id: created.id.clone(),
            user_id: "u1".to_string(),
        }
    );

    // The repeated destroy published nothing
    assert!(events.try_recv().is_none());

    sessions.shutdown();
    assert!(events.recv().await.is_none());
}
