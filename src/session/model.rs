//! Session Model
//!
//! Session and user records plus the lifecycle events the manager publishes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{Entity, EntityMeta, FieldDef, FieldKind};

// == Session ==
/// An authenticated session. `expires_at == last_activity + TTL` after every
/// successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Marks activity at `now` and pushes expiry out by `ttl`.
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.last_activity = now;
        self.expires_at = now + ttl;
    }
}

static SESSION_FIELDS: [FieldDef; 6] = [
    FieldDef::required("id", FieldKind::String).max_length(64),
    FieldDef::required("user_id", FieldKind::String).max_length(64),
    FieldDef::optional("ip", FieldKind::String).max_length(45),
    FieldDef::optional("user_agent", FieldKind::String).max_length(512),
    FieldDef::required("last_activity", FieldKind::Date),
    FieldDef::required("expires_at", FieldKind::Date),
];

static SESSION_META: EntityMeta = EntityMeta {
    name: "sessions",
    id_field: "id",
    fields: &SESSION_FIELDS,
};

impl Entity for Session {
    fn meta() -> &'static EntityMeta {
        &SESSION_META
    }

    fn id(&self) -> String {
        self.id.clone()
    }
}

// == User ==
/// The account a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
}

static USER_FIELDS: [FieldDef; 3] = [
    FieldDef::optional("id", FieldKind::String).max_length(64),
    FieldDef::required("username", FieldKind::String).max_length(64),
    FieldDef::required("email", FieldKind::String).max_length(254),
];

static USER_META: EntityMeta = EntityMeta {
    name: "users",
    id_field: "id",
    fields: &USER_FIELDS,
};

impl Entity for User {
    fn meta() -> &'static EntityMeta {
        &USER_META
    }

    fn id(&self) -> String {
        self.id.clone()
    }
}

// == New Session ==
/// Input to `SessionManager::create_session`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NewSession {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// == Session Event ==
/// Lifecycle signal published by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created { session_id: String, user_id: String },
    Destroyed { session_id: String, user_id: String },
}

impl SessionEvent {
    /// Dotted event name, e.g. `session.created`.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Created { .. } => "session.created",
            SessionEvent::Destroyed { .. } => "session.destroyed",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Created { session_id, .. } | SessionEvent::Destroyed { session_id, .. } => {
                session_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Validator;

    fn session(expires_in: i64) -> Session {
        let now = Utc::now();
        Session {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            ip: Some("10.0.0.1".to_string()),
            user_agent: None,
            metadata: Map::new(),
            last_activity: now,
            expires_at: now + Duration::seconds(expires_in),
        }
    }

    #[test]
    fn test_expiry() {
        assert!(!session(60).is_expired());
        assert!(session(-1).is_expired());
        let s = session(0);
        assert!(s.is_expired_at(s.expires_at));
    }

    #[test]
    fn test_touch_keeps_ttl_invariant() {
        let mut s = session(5);
        let later = s.last_activity + Duration::seconds(30);
        s.touch(later, Duration::seconds(3600));

        assert_eq!(s.last_activity, later);
        assert_eq!(s.expires_at - s.last_activity, Duration::seconds(3600));
    }

    #[test]
    fn test_serialized_session_validates() {
        let value = serde_json::to_value(session(60)).unwrap();
        let map = value.as_object().unwrap();
        assert!(Validator::new(Session::meta()).validate(map).is_ok());
    }

    #[test]
    fn test_event_names() {
        let created = SessionEvent::Created {
            session_id: "s".to_string(),
            user_id: "u".to_string(),
        };
        assert_eq!(created.name(), "session.created");
        assert_eq!(created.session_id(), "s");
    }
}
