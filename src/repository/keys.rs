//! Cache Key Derivation
//!
//! Entity keys live under `"{entity}:id:"` and list keys under
//! `"{entity}:list:"`, so no record id can collide with a list key and a
//! single pattern delete invalidates every list.

use sha2::{Digest, Sha256};

use crate::store::{EntityMeta, FindOptions};

pub fn entity_key(meta: &EntityMeta, id: &str) -> String {
    format!("{}:id:{}", meta.name, id)
}

/// Pattern matching every list key of the entity type.
pub fn list_pattern(meta: &EntityMeta) -> String {
    format!("{}:list:*", meta.name)
}

/// Deterministic list key for `options`.
pub fn list_key(meta: &EntityMeta, options: &FindOptions) -> String {
    let digest = Sha256::digest(options.canonical_json().as_bytes());
    format!("{}:list:{}", meta.name, hex::encode(digest))
}

/// Caller-supplied list key, namespaced so invalidation still reaches it.
pub fn named_list_key(meta: &EntityMeta, name: &str) -> String {
    format!("{}:list:{}", meta.name, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::pattern_matches;

    static META: EntityMeta = EntityMeta {
        name: "orders",
        id_field: "id",
        fields: &[],
    };

    #[test]
    fn test_list_keys_are_deterministic() {
        let a = FindOptions::new().where_eq("status", "open").limit(10);
        let b = FindOptions::new().where_eq("status", "open").limit(10);
        let c = FindOptions::new().where_eq("status", "closed").limit(10);

        assert_eq!(list_key(&META, &a), list_key(&META, &b));
        assert_ne!(list_key(&META, &a), list_key(&META, &c));
    }

    #[test]
    fn test_list_pattern_covers_list_keys_only() {
        let pattern = list_pattern(&META);

        assert!(pattern_matches(&pattern, &list_key(&META, &FindOptions::new())));
        assert!(pattern_matches(&pattern, &named_list_key(&META, "recent")));
        assert!(!pattern_matches(&pattern, &entity_key(&META, "42")));
    }

    #[test]
    fn test_list_like_ids_stay_out_of_list_namespace() {
        let key = entity_key(&META, "list:recent");

        assert_eq!(key, "orders:id:list:recent");
        assert_ne!(key, named_list_key(&META, "recent"));
        assert!(!pattern_matches(&list_pattern(&META), &key));
    }
}
