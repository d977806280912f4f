//! Store Module
//!
//! Entity metadata, list query options and the ports the core consumes from a
//! relational store, plus an in-memory implementation of those ports.

mod entity;
mod memory;
mod options;
mod ports;

pub use entity::{Entity, EntityMeta, FieldDef, FieldKind};
pub use memory::MemoryStore;
pub use options::{compare_values, Filter, FilterOp, FindOptions, OrderBy};
pub use ports::{
    ChangeNotificationPort, Connection, EntityStore, NotificationListener, PoolStatus, QueryPort,
    Row,
};
