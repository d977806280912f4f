//! Entity Metadata Module
//!
//! Declares the closed field table every stored record type carries.

use serde::{de::DeserializeOwned, Serialize};

// == Field Kind ==
/// The closed set of field kinds a record may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// RFC 3339 timestamp carried as a JSON string
    Date,
}

impl FieldKind {
    /// Human readable name used in violation messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
        }
    }
}

// == Field Definition ==
/// A single declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Absent or null values are a violation
    pub required: bool,
    /// Upper bound in characters, strings only
    pub max_length: Option<usize>,
}

impl FieldDef {
    /// Declares a required field of the given kind.
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            max_length: None,
        }
    }

    /// Declares a nullable field of the given kind.
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            max_length: None,
        }
    }

    /// Caps the length of a string field.
    pub const fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }
}

// == Entity Metadata ==
/// Static description of a record type, fixed at registration.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityMeta {
    /// Table/entity name, also used as the cache key prefix
    pub name: &'static str,
    /// Name of the identity field
    pub id_field: &'static str,
    pub fields: &'static [FieldDef],
}

impl EntityMeta {
    /// Looks up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// == Entity Trait ==
/// A typed record with declared field metadata and an identity.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the immutable metadata for this type.
    fn meta() -> &'static EntityMeta;

    /// Returns the identity of this record.
    fn id(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    static FIELDS: [FieldDef; 2] = [
        FieldDef::required("name", FieldKind::String).max_length(10),
        FieldDef::optional("age", FieldKind::Number),
    ];

    static META: EntityMeta = EntityMeta {
        name: "people",
        id_field: "id",
        fields: &FIELDS,
    };

    #[test]
    fn test_field_lookup() {
        let name = META.field("name").unwrap();
        assert!(name.required);
        assert_eq!(name.max_length, Some(10));
        assert!(!META.field("age").unwrap().required);
        assert!(META.field("missing").is_none());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(FieldKind::Date.as_str(), "date");
        assert_eq!(FieldKind::Boolean.as_str(), "boolean");
    }
}
