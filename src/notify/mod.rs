//! Change Notification Module
//!
//! Bridges store-level mutation notifications to filtered in-process
//! subscribers. Delivery is best-effort and at-most-once per notification.

mod bridge;
mod event;

pub use bridge::ChangeBridge;
pub use event::{BridgeEvent, ChangeEvent, ChangeOperation};
