//! Storage key derivation
//!
//! Deterministic, side-effect-free mapping from (namespace, entity type,
//! property, value) onto the flat key space of the store:
//!
//! - record:       `ns:widget:1`
//! - collection:   `ns:widget`            (set of live ids)
//! - id counter:   `ns:widget:ids`
//! - membership:   `ns:i:widget:name:a`   (set of ids where name == "a")
//! - score index:  `ns:i:widget:value`    (sorted set, score per id)
//!
//! Property and value fragments are percent-escaped (`%` and `:`) so
//! two distinct `(type, property, value)` triples never derive the same
//! key, and a membership key never aliases a score-index key.
//!
//! Ephemeral result keys come from [`EphemeralKeys`], kept behind a
//! trait so collision freedom is testable independently of the clock.

use crate::schema::IndexDefinition;
use crate::value::{AttrValue, RecordId};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Escape a value fragment for use inside a key
///
/// `%` must be escaped first so escaping is reversible and injective.
fn escape_fragment(raw: &str) -> String {
    raw.replace('%', "%25").replace(':', "%3A")
}

/// Namespaced key derivation for one store
///
/// Pure functions, no I/O. An empty namespace produces unprefixed keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    /// Create a key space with the given namespace prefix
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// The namespace this key space prefixes keys with
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Prefix an arbitrary key with the namespace
    pub fn prefix(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }

    /// Key holding one record's primary data
    pub fn record_key(&self, entity: &str, id: &RecordId) -> String {
        self.prefix(&format!("{}:{}", entity, id))
    }

    /// Substitution pattern matching every record key of an entity
    ///
    /// Used by the external-sort primitive: `ns:widget:*->field` reads
    /// `field` from the hash stored at each candidate's record key.
    pub fn record_key_pattern(&self, entity: &str) -> String {
        self.prefix(&format!("{}:*", entity))
    }

    /// Key of the set holding an entity type's live record ids
    pub fn collection_key(&self, entity: &str) -> String {
        self.prefix(entity)
    }

    /// Key of the counter used to mint integer record ids
    pub fn id_counter_key(&self, entity: &str) -> String {
        self.prefix(&format!("{}:ids", entity))
    }

    /// Key of the membership set for one (property, value) pair
    pub fn value_set_key(&self, entity: &str, property: &str, value: &AttrValue) -> String {
        self.prefix(&format!(
            "i:{}:{}:{}",
            entity,
            escape_fragment(property),
            escape_fragment(&value.key_fragment())
        ))
    }

    /// Key of the score-ordered index for one property
    pub fn sort_key(&self, entity: &str, property: &str) -> String {
        self.prefix(&format!("i:{}:{}", entity, escape_fragment(property)))
    }

    /// Score-ordered index key for a definition, honoring its override
    pub fn sort_key_for(&self, entity: &str, def: &IndexDefinition) -> String {
        match def.key.as_deref() {
            Some(explicit) => self.prefix(explicit),
            None => self.sort_key(entity, &def.property),
        }
    }
}

/// Generator of unique ephemeral result-set keys
///
/// Each query that intersects or unions indexes materializes into a
/// fresh key from this generator; keys must never collide between
/// concurrent queries.
pub trait EphemeralKeys: Send + Sync {
    /// Produce a fresh, never-before-returned key
    fn temp_key(&self) -> String;
}

/// Clock-plus-uuid ephemeral key generator
///
/// `temp:<micros>:<uuid>` — the timestamp keeps keys roughly sortable
/// for debugging, the uuid carries the uniqueness.
#[derive(Debug, Clone, Default)]
pub struct ClockEphemeralKeys;

impl EphemeralKeys for ClockEphemeralKeys {
    fn temp_key(&self) -> String {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        format!("temp:{}:{}", micros, Uuid::new_v4().simple())
    }
}
