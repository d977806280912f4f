//! In-Memory Store
//!
//! Reference implementation of every store port, backed by per-table maps.
//! Used by the tests and the demo binary; not a storage engine.
//!
//! Raw statements understood by `query`:
//! - `SELECT 1`
//! - `SELECT * FROM <table>` and `SELECT * FROM <table> WHERE id = $1`
//! - `INSERT INTO <table>` with `$1` a JSON object carrying a string `id`
//! - `DELETE FROM <table> WHERE id = $1`

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::error::{DataError, Result};
use crate::notify::{ChangeEvent, ChangeOperation};
use crate::store::{
    ChangeNotificationPort, Connection, Entity, EntityStore, FindOptions, NotificationListener,
    PoolStatus, QueryPort, Row,
};

type Tables = HashMap<String, BTreeMap<String, Value>>;

/// Schema name stamped on published notifications.
const SCHEMA: &str = "public";

// == Statement ==
#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement {
    Probe,
    SelectAll(String),
    SelectById(String),
    Insert(String),
    Delete(String),
}

impl Statement {
    fn parse(sql: &str) -> Result<Self> {
        let tokens: Vec<String> = sql
            .trim()
            .trim_end_matches(';')
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let lower: Vec<String> = tokens.iter().map(|t| t.to_ascii_lowercase()).collect();
        let words: Vec<&str> = lower.iter().map(String::as_str).collect();

        let table = |idx: usize| tokens[idx].clone();
        match words.as_slice() {
            ["select", "1"] => Ok(Statement::Probe),
            ["select", "*", "from", _] => Ok(Statement::SelectAll(table(3))),
            ["select", "*", "from", _, "where", "id", "=", "$1"] => {
                Ok(Statement::SelectById(table(3)))
            }
            ["insert", "into", _] => Ok(Statement::Insert(table(2))),
            ["delete", "from", _, "where", "id", "=", "$1"] => Ok(Statement::Delete(table(2))),
            _ => Err(DataError::Store(format!("Unsupported statement: {}", sql))),
        }
    }

    fn is_write(&self) -> bool {
        matches!(self, Statement::Insert(_) | Statement::Delete(_))
    }
}

fn id_param(params: &[Value]) -> Result<String> {
    match params.first() {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(DataError::Store("Missing parameter $1".to_string())),
    }
}

fn to_row(value: &Value) -> Row {
    match value {
        Value::Object(map) => map.clone(),
        other => {
            let mut row = Row::new();
            row.insert("value".to_string(), other.clone());
            row
        }
    }
}

/// Runs a statement against `tables`, returning rows and the mutation it made.
fn execute(
    tables: &mut Tables,
    stmt: &Statement,
    params: &[Value],
) -> Result<(Vec<Row>, Option<(String, ChangeOperation)>)> {
    match stmt {
        Statement::Probe => {
            let mut row = Row::new();
            row.insert("?column?".to_string(), Value::from(1));
            Ok((vec![row], None))
        }
        Statement::SelectAll(table) => {
            let rows = tables
                .get(table)
                .map(|t| t.values().map(to_row).collect())
                .unwrap_or_default();
            Ok((rows, None))
        }
        Statement::SelectById(table) => {
            let id = id_param(params)?;
            let rows = tables
                .get(table)
                .and_then(|t| t.get(&id))
                .map(|v| vec![to_row(v)])
                .unwrap_or_default();
            Ok((rows, None))
        }
        Statement::Insert(table) => {
            let record = params
                .first()
                .filter(|v| v.is_object())
                .ok_or_else(|| DataError::Store("INSERT expects a JSON object in $1".to_string()))?;
            let id = record
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| DataError::Store("INSERT record has no string id".to_string()))?
                .to_string();
            let rows = tables.entry(table.clone()).or_default();
            let op = if rows.contains_key(&id) {
                ChangeOperation::Update
            } else {
                ChangeOperation::Insert
            };
            rows.insert(id, record.clone());
            Ok((vec![to_row(record)], Some((table.clone(), op))))
        }
        Statement::Delete(table) => {
            let id = id_param(params)?;
            let removed = tables.get_mut(table).and_then(|t| t.remove(&id));
            match removed {
                Some(record) => Ok((
                    vec![to_row(&record)],
                    Some((table.clone(), ChangeOperation::Delete)),
                )),
                None => Ok((Vec::new(), None)),
            }
        }
    }
}

// == Shared State ==
#[derive(Debug)]
struct Inner {
    tables: RwLock<Tables>,
    published: RwLock<HashSet<String>>,
    notifier: broadcast::Sender<String>,
    connected: AtomicBool,
    pool_size: u32,
    active: AtomicU32,
    listeners: AtomicU32,
}

impl Inner {
    async fn publish(&self, table: &str, operation: ChangeOperation) {
        if !self.published.read().await.contains(table) {
            return;
        }
        let event = ChangeEvent {
            table: table.to_string(),
            operation,
            schema: SCHEMA.to_string(),
            timestamp: Utc::now(),
        };
        match serde_json::to_string(&event) {
            // No receivers is not an error for a publisher
            Ok(payload) => {
                let _ = self.notifier.send(payload);
            }
            Err(e) => warn!("Failed to encode change notification: {}", e),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DataError::Store("Store is not connected".to_string()))
        }
    }

    async fn run(&self, stmt: &Statement, params: &[Value]) -> Result<Vec<Row>> {
        self.ensure_connected()?;
        let (rows, change) = {
            let mut tables = self.tables.write().await;
            execute(&mut tables, stmt, params)?
        };
        if let Some((table, op)) = change {
            self.publish(&table, op).await;
        }
        Ok(rows)
    }
}

// == Memory Store ==
/// In-memory store implementing every store port.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store with the given pool size.
    pub fn new(pool_size: u32) -> Self {
        let (notifier, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(HashMap::new()),
                published: RwLock::new(HashSet::new()),
                notifier,
                connected: AtomicBool::new(true),
                pool_size,
                active: AtomicU32::new(0),
                listeners: AtomicU32::new(0),
            }),
        }
    }

    /// Simulates losing or regaining the backing connection.
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    /// Publishes an arbitrary payload to every listener.
    pub fn publish_raw(&self, payload: impl Into<String>) {
        let _ = self.inner.notifier.send(payload.into());
    }

    /// Number of rows currently stored in `table`.
    pub async fn count(&self, table: &str) -> usize {
        self.inner
            .tables
            .read()
            .await
            .get(table)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Number of open notification listeners.
    pub fn listener_count(&self) -> u32 {
        self.inner.listeners.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10)
    }
}

// == Entity Store ==
#[async_trait]
impl<E: Entity> EntityStore<E> for MemoryStore {
    async fn find_one(&self, id: &str) -> Result<Option<E>> {
        self.inner.ensure_connected()?;
        let tables = self.inner.tables.read().await;
        match tables.get(E::meta().name).and_then(|t| t.get(id)) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn find(&self, options: &FindOptions) -> Result<Vec<E>> {
        self.inner.ensure_connected()?;
        let records: Vec<Value> = {
            let tables = self.inner.tables.read().await;
            tables
                .get(E::meta().name)
                .map(|t| t.values().cloned().collect())
                .unwrap_or_default()
        };
        options
            .apply(records)
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(DataError::from))
            .collect()
    }

    async fn save(&self, entity: &E) -> Result<E> {
        let record = serde_json::to_value(entity)?;
        let stmt = Statement::Insert(E::meta().name.to_string());
        self.inner.run(&stmt, &[record]).await?;
        Ok(entity.clone())
    }

    async fn remove(&self, entity: &E) -> Result<()> {
        let stmt = Statement::Delete(E::meta().name.to_string());
        self.inner.run(&stmt, &[Value::String(entity.id())]).await?;
        Ok(())
    }
}

// == Query Port ==
#[async_trait]
impl QueryPort for MemoryStore {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let stmt = Statement::parse(sql)?;
        self.inner.run(&stmt, params).await
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        self.inner.ensure_connected()?;
        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        if active > self.inner.pool_size {
            self.inner.active.fetch_sub(1, Ordering::SeqCst);
            return Err(DataError::Store("Connection pool exhausted".to_string()));
        }
        Ok(Box::new(MemoryConnection {
            inner: self.inner.clone(),
            scope: None,
        }))
    }

    fn pool_status(&self) -> PoolStatus {
        let active = self.inner.active.load(Ordering::SeqCst);
        PoolStatus {
            total: self.inner.pool_size,
            active,
            idle: self.inner.pool_size.saturating_sub(active),
            waiting: 0,
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

// == Connection ==
/// Open transaction: a private working copy plus the writes to replay.
struct TxScope {
    working: Tables,
    writes: Vec<(Statement, Vec<Value>)>,
}

/// Dedicated connection; returned to the pool when dropped.
struct MemoryConnection {
    inner: Arc<Inner>,
    scope: Option<TxScope>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn begin(&mut self) -> Result<()> {
        self.inner.ensure_connected()?;
        if self.scope.is_some() {
            return Err(DataError::Store("Transaction already open".to_string()));
        }
        let working = self.inner.tables.read().await.clone();
        self.scope = Some(TxScope {
            working,
            writes: Vec::new(),
        });
        debug!("Transaction opened");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let scope = self
            .scope
            .take()
            .ok_or_else(|| DataError::Store("No open transaction".to_string()))?;
        self.inner.ensure_connected()?;

        let changes = {
            let mut tables = self.inner.tables.write().await;
            let mut changes = Vec::new();
            for (stmt, params) in &scope.writes {
                let (_, change) = execute(&mut tables, stmt, params)?;
                changes.extend(change);
            }
            changes
        };
        for (table, op) in changes {
            self.inner.publish(&table, op).await;
        }
        debug!("Transaction committed ({} writes)", scope.writes.len());
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.scope.take() {
            Some(scope) => {
                debug!("Transaction rolled back ({} writes discarded)", scope.writes.len());
                Ok(())
            }
            None => Err(DataError::Store("No open transaction".to_string())),
        }
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let stmt = Statement::parse(sql)?;
        match self.scope.as_mut() {
            Some(scope) => {
                self.inner.ensure_connected()?;
                let (rows, _) = execute(&mut scope.working, &stmt, params)?;
                if stmt.is_write() {
                    scope.writes.push((stmt, params.to_vec()));
                }
                Ok(rows)
            }
            None => self.inner.run(&stmt, params).await,
        }
    }

    async fn release(self: Box<Self>) -> Result<()> {
        drop(self);
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// == Change Notifications ==
#[async_trait]
impl ChangeNotificationPort for MemoryStore {
    async fn register(&self, tables: &[String]) -> Result<()> {
        self.inner.ensure_connected()?;
        let mut published = self.inner.published.write().await;
        published.extend(tables.iter().cloned());
        debug!("Change publishing registered for {:?}", tables);
        Ok(())
    }

    async fn listen(&self) -> Result<Box<dyn NotificationListener>> {
        self.inner.ensure_connected()?;
        self.inner.listeners.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryListener {
            inner: self.inner.clone(),
            receiver: self.inner.notifier.subscribe(),
        }))
    }
}

struct MemoryListener {
    inner: Arc<Inner>,
    receiver: broadcast::Receiver<String>,
}

#[async_trait]
impl NotificationListener for MemoryListener {
    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Notification listener lagged, {} payloads dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.inner.listeners.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
