//! Store Ports
//!
//! Traits the core consumes from an external relational store.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::store::{Entity, FindOptions};

/// A raw result row.
pub type Row = Map<String, Value>;

// == Entity Store ==
/// Typed CRUD over one entity type.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Loads a record by identity.
    async fn find_one(&self, id: &str) -> Result<Option<E>>;

    /// Lists records matching `options`.
    async fn find(&self, options: &FindOptions) -> Result<Vec<E>>;

    /// Inserts or replaces a record, returning what was stored.
    async fn save(&self, entity: &E) -> Result<E>;

    /// Removes a record.
    async fn remove(&self, entity: &E) -> Result<()>;
}

// == Pool Status ==
/// Connection pool utilization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
    pub waiting: u32,
}

// == Query Port ==
/// Raw query execution and dedicated connection checkout.
#[async_trait]
pub trait QueryPort: Send + Sync {
    /// Runs a statement on any pooled connection.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Checks out a dedicated connection for a transaction scope.
    async fn acquire(&self) -> Result<Box<dyn Connection>>;

    fn pool_status(&self) -> PoolStatus;

    fn is_connected(&self) -> bool;
}

/// A dedicated connection bound to one transaction scope.
#[async_trait]
pub trait Connection: Send {
    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Returns the connection to its pool.
    async fn release(self: Box<Self>) -> Result<()>;
}

// == Change Notification Port ==
/// Store-level mutation publishing.
///
/// A Postgres backend would install NOTIFY triggers in `register` and LISTEN on
/// a dedicated connection in `listen`; a queue or polling backend implements
/// the same contract.
#[async_trait]
pub trait ChangeNotificationPort: Send + Sync {
    /// Installs the publish hook for each table.
    async fn register(&self, tables: &[String]) -> Result<()>;

    /// Opens a dedicated listener.
    async fn listen(&self) -> Result<Box<dyn NotificationListener>>;
}

/// Receiving side of a change-notification subscription.
#[async_trait]
pub trait NotificationListener: Send {
    /// Waits for the next raw payload. `None` once the source is closed.
    async fn recv(&mut self) -> Option<String>;

    /// Unsubscribes and releases the underlying connection.
    async fn close(self: Box<Self>) -> Result<()>;
}
