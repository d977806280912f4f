//! Data Core - cache-aware data access over abstract store and cache ports
//!
//! Provides a validating CRUD repository, a retrying query executor with
//! transaction scoping and change notifications, and a TTL session manager.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod notify;
pub mod repository;
pub mod session;
pub mod store;
pub mod tasks;
pub mod validation;

pub use cache::{CachePort, MemoryCache};
pub use config::Config;
pub use error::{DataError, Result};
pub use executor::{QueryExecutor, QueryOptions, RetryPolicy};
pub use notify::{BridgeEvent, ChangeBridge, ChangeEvent};
pub use repository::{Repository, RepositoryConfig};
pub use session::{NewSession, Session, SessionConfig, SessionManager, User};
pub use store::{Entity, EntityStore, FindOptions, MemoryStore};
