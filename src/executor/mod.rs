//! Executor Module
//!
//! Resilient raw-query execution and transaction scoping.
//!
//! # Components
//! - `QueryExecutor`: retries, per-attempt timeouts, transactions, status probes
//! - `RetryPolicy`: linear backoff, also used for direct store calls
//! - `QueryStats`: per-attempt counters

mod query;
mod retry;
mod stats;

pub use query::{ExecutorStatus, QueryExecutor, QueryOptions};
pub use retry::RetryPolicy;
pub use stats::QueryStats;
