//! Query Executor
//!
//! Retrying raw-query execution, scoped transactions and connectivity
//! diagnostics over a `QueryPort`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{DataError, Result};
use crate::executor::{QueryStats, RetryPolicy};
use crate::store::{Connection, PoolStatus, QueryPort, Row};

/// Statement used by `check_connection`.
const PROBE_QUERY: &str = "SELECT 1";

/// Default deadline for `check_connection`.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// == Query Options ==
/// Per-call settings for `execute_query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub retry_attempts: u32,
    /// Deadline for each attempt
    pub timeout: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            timeout: None,
        }
    }
}

// == Executor Status ==
/// Read-only connectivity and pool snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutorStatus {
    pub connected: bool,
    pub pool: PoolStatus,
}

// == Query Executor ==
pub struct QueryExecutor {
    port: Arc<dyn QueryPort>,
    base_delay: Duration,
    probe_timeout: Duration,
    stats: Mutex<QueryStats>,
}

impl QueryExecutor {
    /// Creates an executor whose retries back off by `base_delay * attempt`.
    pub fn new(port: Arc<dyn QueryPort>, base_delay: Duration) -> Self {
        Self {
            port,
            base_delay,
            probe_timeout: PROBE_TIMEOUT,
            stats: Mutex::new(QueryStats::new()),
        }
    }

    /// Overrides the deadline applied to `check_connection`.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn stats_lock(&self) -> MutexGuard<'_, QueryStats> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, duration: Duration, success: bool) {
        self.stats_lock().record(duration, success);
    }

    // == Execute Query ==
    /// Runs a raw statement, retrying up to `options.retry_attempts` times.
    ///
    /// Returns on the first success. Once every attempt has failed the last
    /// error is wrapped in `DataError::Database`.
    pub async fn execute_query(
        &self,
        query: &str,
        params: &[Value],
        options: QueryOptions,
    ) -> Result<Vec<Row>> {
        let policy = RetryPolicy::new(options.retry_attempts, self.base_delay);
        let max = policy.max_attempts();
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let outcome = match options.timeout {
                Some(limit) => tokio::time::timeout(limit, self.port.query(query, params))
                    .await
                    .unwrap_or(Err(DataError::Timeout(limit))),
                None => self.port.query(query, params).await,
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(rows) => {
                    self.record(elapsed, true);
                    debug!(
                        "Query succeeded in {:?} (attempt {}/{}): {}",
                        elapsed, attempt, max, query
                    );
                    return Ok(rows);
                }
                Err(e) => {
                    self.record(elapsed, false);
                    warn!(
                        "Query failed (attempt {}/{}) after {:?}: {}",
                        attempt, max, elapsed, e
                    );
                    if attempt >= max {
                        error!("Query gave up after {} attempt(s): {}", attempt, query);
                        return Err(DataError::Database {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    // == Execute Transaction ==
    /// Runs `callback` inside a transaction on a dedicated connection.
    ///
    /// Commits when the callback returns `Ok`, rolls back and returns the
    /// callback's error otherwise. The connection is released on every path;
    /// a failed release is logged and does not replace the outcome. If the
    /// returned future is dropped mid-scope, the open transaction is rolled
    /// back and the connection released on a background task.
    ///
    /// # Example
    /// ```ignore
    /// executor
    ///     .execute_transaction(|tx| Box::pin(async move {
    ///         tx.query("INSERT INTO ledger", &[entry]).await?;
    ///         Ok(())
    ///     }))
    ///     .await?;
    /// ```
    pub async fn execute_transaction<T, F>(&self, callback: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut dyn Connection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut scope = ScopedConnection::new(self.port.acquire().await?);
        let outcome = run_scoped(&mut scope, callback).await;
        scope.release().await;
        outcome
    }

    // == Status ==
    /// Connectivity flag and pool utilization.
    pub fn get_status(&self) -> ExecutorStatus {
        ExecutorStatus {
            connected: self.port.is_connected(),
            pool: self.port.pool_status(),
        }
    }

    /// Probes the store with a trivial query. Never fails; a probe that
    /// outlives the probe deadline counts as disconnected.
    pub async fn check_connection(&self) -> bool {
        let probe = self.port.query(PROBE_QUERY, &[]);
        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                error!("Connection check failed: {}", e);
                false
            }
            Err(_) => {
                error!("Connection check timed out after {:?}", self.probe_timeout);
                false
            }
        }
    }

    /// Snapshot of the per-attempt counters.
    pub fn metrics(&self) -> QueryStats {
        self.stats_lock().clone()
    }
}

// == Scoped Connection ==
/// Owns a checked-out connection for the length of one transaction scope.
///
/// Dropped while still holding the connection (the caller cancelled the
/// transaction future), it rolls back any open transaction and releases the
/// connection on a spawned task.
struct ScopedConnection {
    conn: Option<Box<dyn Connection>>,
    in_transaction: bool,
}

impl ScopedConnection {
    fn new(conn: Box<dyn Connection>) -> Self {
        Self {
            conn: Some(conn),
            in_transaction: false,
        }
    }

    fn conn(&mut self) -> Result<&mut (dyn Connection + 'static)> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| DataError::Store("Connection already released".to_string()))
    }

    async fn begin(&mut self) -> Result<()> {
        self.conn()?.begin().await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let result = self.conn()?.commit().await;
        if result.is_ok() {
            self.in_transaction = false;
        }
        result
    }

    async fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.conn()?.rollback().await
    }

    /// Returns the connection to its pool, logging a failed release.
    async fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.release().await {
                warn!("Failed to release transaction connection: {}", e);
            }
        }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let in_transaction = self.in_transaction;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Transaction scope abandoned, rolling back and releasing connection");
                handle.spawn(async move {
                    if in_transaction {
                        if let Err(e) = conn.rollback().await {
                            error!("Rollback of abandoned transaction failed: {}", e);
                        }
                    }
                    if let Err(e) = conn.release().await {
                        warn!("Failed to release abandoned connection: {}", e);
                    }
                });
            }
            Err(_) => error!("No runtime to release abandoned connection; dropping it"),
        }
    }
}

async fn run_scoped<T, F>(scope: &mut ScopedConnection, callback: F) -> Result<T>
where
    F: for<'c> FnOnce(&'c mut dyn Connection) -> BoxFuture<'c, Result<T>>,
{
    scope.begin().await?;

    let outcome = callback(scope.conn()?).await;
    match outcome {
        Ok(value) => match scope.commit().await {
            Ok(()) => {
                debug!("Transaction committed");
                Ok(value)
            }
            Err(e) => {
                error!("Commit failed: {}", e);
                if let Err(rb) = scope.rollback().await {
                    debug!("Rollback after failed commit: {}", rb);
                }
                Err(e)
            }
        },
        Err(e) => {
            warn!("Transaction rolled back: {}", e);
            if let Err(rb) = scope.rollback().await {
                error!("Rollback failed: {}", rb);
            }
            Err(e)
        }
    }
}
