//! Session Module
//!
//! TTL-based session lifecycle on top of the entity store and cache ports.

mod manager;
mod model;

pub use manager::{SessionConfig, SessionManager};
pub use model::{NewSession, Session, SessionEvent, User};
