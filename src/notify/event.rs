//! Change Event Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of mutation reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOperation {
    #[serde(rename = "INSERT", alias = "insert")]
    Insert,
    #[serde(rename = "UPDATE", alias = "update")]
    Update,
    #[serde(rename = "DELETE", alias = "delete")]
    Delete,
}

/// A single store mutation, as carried in a notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub operation: ChangeOperation,
    pub schema: String,
    /// Stamped on receipt when the payload omits it
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Decodes a raw notification payload.
    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// What subscribers of the bridge receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Change(ChangeEvent),
    /// A payload that could not be decoded
    Error { payload: String, message: String },
}

impl BridgeEvent {
    /// Table name for change events.
    pub fn table(&self) -> Option<&str> {
        match self {
            BridgeEvent::Change(event) => Some(&event.table),
            BridgeEvent::Error { .. } => None,
        }
    }
}
