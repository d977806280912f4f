//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the core is up.
//!
//! # Tasks
//! - Session sweep: destroys sessions whose expiry has passed

mod sweep;

pub use sweep::spawn_sweep_task;
