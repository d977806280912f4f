//! Change Notification Bridge
//!
//! Republishes store mutation notifications to in-process subscribers.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{EventBus, Subscription};
use crate::notify::{BridgeEvent, ChangeEvent};
use crate::store::{ChangeNotificationPort, NotificationListener};

// == Change Bridge ==
/// Owns the dedicated listener and the pump task feeding the event bus.
pub struct ChangeBridge {
    bus: Arc<EventBus<BridgeEvent>>,
    shutdown_tx: watch::Sender<bool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeBridge {
    /// Registers publishing on `tables`, opens a listener and starts pumping.
    ///
    /// # Arguments
    /// * `port` - Store-level notification source
    /// * `tables` - Tables whose mutations should be published
    /// * `capacity` - Queue size of each subscriber
    pub async fn start(
        port: Arc<dyn ChangeNotificationPort>,
        tables: &[String],
        capacity: usize,
    ) -> Result<Self> {
        port.register(tables).await?;
        let listener = port.listen().await?;

        let bus = Arc::new(EventBus::new(capacity));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(pump(listener, bus.clone(), shutdown_rx));

        info!("Change bridge listening on {} table(s)", tables.len());

        Ok(Self {
            bus,
            shutdown_tx,
            pump: Mutex::new(Some(handle)),
        })
    }

    /// Subscribes to every bridge event, including decode errors.
    pub fn subscribe(&self) -> Subscription<BridgeEvent> {
        self.bus.subscribe()
    }

    /// Subscribes to change events on `tables`, or on every table when empty.
    pub fn on_database_change<I, S>(&self, tables: I) -> Subscription<BridgeEvent>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wanted: HashSet<String> = tables.into_iter().map(Into::into).collect();
        self.bus.subscribe_filtered(move |event| match event.table() {
            Some(table) => wanted.is_empty() || wanted.contains(table),
            None => false,
        })
    }

    /// Stops the pump and releases the listener. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.pump.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Change bridge pump ended abnormally: {}", e);
            }
            info!("Change bridge stopped");
        }
    }
}

impl Drop for ChangeBridge {
    fn drop(&mut self) {
        // Lets a still-running pump close its listener on its own.
        let _ = self.shutdown_tx.send(true);
    }
}

async fn pump(
    mut listener: Box<dyn NotificationListener>,
    bus: Arc<EventBus<BridgeEvent>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            payload = listener.recv() => match payload {
                Some(payload) => dispatch(&bus, payload),
                None => {
                    warn!("Notification source closed");
                    break;
                }
            },
        }
    }

    if let Err(e) = listener.close().await {
        warn!("Failed to release notification listener: {}", e);
    }
    bus.close();
}

fn dispatch(bus: &EventBus<BridgeEvent>, payload: String) {
    match ChangeEvent::parse(&payload) {
        Ok(event) => {
            debug!("{:?} on {}.{}", event.operation, event.schema, event.table);
            bus.publish(BridgeEvent::Change(event));
        }
        Err(e) => {
            warn!("Malformed change notification: {}", e);
            bus.publish(BridgeEvent::Error {
                payload,
                message: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChangeOperation;
    use crate::store::{MemoryStore, QueryPort};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn start_bridge(store: &MemoryStore, tables: &[&str]) -> ChangeBridge {
        let tables: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        ChangeBridge::start(Arc::new(store.clone()), &tables, 16)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_filtered_subscription_receives_matching_tables() {
        let store = MemoryStore::default();
        let bridge = start_bridge(&store, &["users", "orders"]).await;
        let mut users = bridge.on_database_change(["users"]);

        store
            .query("INSERT INTO orders", &[json!({"id": "o1"})])
            .await
            .unwrap();
        store
            .query("INSERT INTO users", &[json!({"id": "u1"})])
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(1), users.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            BridgeEvent::Change(change) => {
                assert_eq!(change.table, "users");
                assert_eq!(change.operation, ChangeOperation::Insert);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_payload_becomes_error_event() {
        let store = MemoryStore::default();
        let bridge = start_bridge(&store, &["users"]).await;
        let mut all = bridge.subscribe();
        let mut users = bridge.on_database_change(Vec::<String>::new());

        store.publish_raw("not json");

        let event = timeout(Duration::from_secs(1), all.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, BridgeEvent::Error { ref payload, .. } if payload == "not json"));

        // Change-only subscriptions never see decode errors
        store
            .query("DELETE FROM users WHERE id = $1", &[json!("missing")])
            .await
            .unwrap();
        assert!(timeout(Duration::from_millis(100), users.recv()).await.is_err());

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_listener_and_ends_streams() {
        let store = MemoryStore::default();
        let bridge = start_bridge(&store, &["users"]).await;
        let mut sub = bridge.subscribe();
        assert_eq!(store.listener_count(), 1);

        bridge.shutdown().await;
        bridge.shutdown().await;

        assert_eq!(store.listener_count(), 0);
        assert_eq!(sub.recv().await, None);
    }
}
