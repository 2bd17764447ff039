//! Lattice: secondary indexes and queries over a key-value/set store
//!
//! The store itself only knows strings, hashes, sets and sorted sets.
//! Lattice layers record storage, secondary-index maintenance and a
//! declarative query pipeline on top, entirely client-side: every
//! guarantee comes from the command sequences the engine issues, not
//! from the store.
//!
//! [`Lattice`] is the facade. Register entity definitions, then write
//! and query records through it:
//!
//! ```
//! use latticedb::{EntityDef, IndexDefinition, Lattice, QueryRequest, WhereClause};
//! use latticedb::value::AttrValue;
//!
//! let db = Lattice::in_memory("app");
//! db.define_entity(
//!     EntityDef::new("widget")
//!         .hash_encoded()
//!         .with_index(IndexDefinition::new("value").sorted())
//!         .with_index(IndexDefinition::new("name")),
//! );
//!
//! let record = db
//!     .create("widget", [("value", AttrValue::Int(2)), ("name", "a".into())])
//!     .unwrap();
//! let found = db
//!     .query(
//!         "widget",
//!         &QueryRequest::new().filter(WhereClause::new().eq("value", 2i64)),
//!     )
//!     .unwrap();
//! assert_eq!(found[0].id, record.id);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub use lattice_core::error::{Error, Result};
pub use lattice_core::keys::{ClockEphemeralKeys, EphemeralKeys, KeySpace};
pub use lattice_core::schema::{
    Dependency, EntityDef, IndexDefinition, IndexSort, ScoreFn, StorageEncoding,
};
pub use lattice_core::traits::{Aggregate, Command, SortBy, SortOrder, StoreClient};
pub use lattice_core::value::{AttrMap, AttrValue, Record, RecordId};
pub use lattice_index::{IndexHandle, IndexMaintainer, IndexOp};
pub use lattice_query::{
    FederateMode, FederateRequest, Federator, IndexEntry, IndexReadOptions, QueryExecutor,
    QueryRequest, ScoreConversion, SortSpec, WhereClause, DEFAULT_LIMIT,
};
pub use lattice_store::MemoryStore;

/// Re-exported core modules for callers that want the full surface
pub mod value {
    pub use lattice_core::value::*;
}

/// The engine facade: entity registry plus every operation surface
///
/// Stateless apart from the entity registry; all data lives in the
/// store. Cheap to share behind an `Arc`.
pub struct Lattice {
    store: Arc<dyn StoreClient>,
    keys: KeySpace,
    entities: RwLock<HashMap<String, Arc<EntityDef>>>,
    maintainer: IndexMaintainer,
    executor: QueryExecutor,
    federator: Federator,
}

impl Lattice {
    /// Create an engine over a store, namespacing every key
    pub fn new(store: Arc<dyn StoreClient>, namespace: impl Into<String>) -> Self {
        Self::with_ephemeral_keys(store, namespace, Arc::new(ClockEphemeralKeys))
    }

    /// Create an engine with a custom ephemeral-key generator
    pub fn with_ephemeral_keys(
        store: Arc<dyn StoreClient>,
        namespace: impl Into<String>,
        ephemeral: Arc<dyn EphemeralKeys>,
    ) -> Self {
        let keys = KeySpace::new(namespace);
        let maintainer = IndexMaintainer::new(store.clone(), keys.clone());
        let executor = QueryExecutor::new(store.clone(), keys.clone(), ephemeral);
        let federator = Federator::new(store.clone(), executor.clone());
        Self {
            store,
            keys,
            entities: RwLock::new(HashMap::new()),
            maintainer,
            executor,
            federator,
        }
    }

    /// Engine over a fresh in-memory store
    pub fn in_memory(namespace: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryStore::new()), namespace)
    }

    /// The key space this engine derives keys with
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    /// Register (or replace) an entity definition
    pub fn define_entity(&self, def: EntityDef) {
        debug!(entity = %def.name, indexes = def.indexes.len(), "defining entity");
        self.entities.write().insert(def.name.clone(), Arc::new(def));
    }

    /// Look up a registered entity definition
    pub fn entity(&self, name: &str) -> Result<Arc<EntityDef>> {
        self.entities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Mint the next integer id for an entity type
    pub fn next_id(&self, entity: &str) -> Result<RecordId> {
        let def = self.entity(entity)?;
        let next = self.store.increment_by(&self.keys.id_counter_key(&def.name), 1)?;
        Ok(RecordId::Int(next))
    }

    /// Create a record with a freshly minted id
    pub fn create<K, I>(&self, entity: &str, attrs: I) -> Result<Record>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, AttrValue)>,
    {
        let id = self.next_id(entity)?;
        let attrs: AttrMap = attrs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let record = Record { id, attrs };
        self.save(entity, &record)?;
        Ok(record)
    }

    /// Write a record and bring its indexes up to date
    ///
    /// Upserts: an existing record's changed attribute values move their
    /// index entries. The primary write lands before index maintenance,
    /// so a maintenance failure leaves a readable record with stale
    /// indexes rather than the reverse.
    pub fn save(&self, entity: &str, record: &Record) -> Result<()> {
        let def = self.entity(entity)?;
        let prev = self.fetch_attrs(&def, &record.id)?;

        let mut attrs = record.attrs.clone();
        attrs
            .entry("id".to_string())
            .or_insert_with(|| id_attr(&record.id));

        let key = self.keys.record_key(&def.name, &record.id);
        match def.encoding {
            StorageEncoding::Hash => {
                let fields = encode_fields(&attrs)?;
                self.store.hash_set_multi(&key, &fields)?;
            }
            StorageEncoding::Str => {
                let doc = encode_document(&attrs)?;
                self.store.set(&key, &doc)?;
            }
        }
        self.store
            .set_add(&self.keys.collection_key(&def.name), &record.id.to_string())?;

        // Hash writes merge fields, so the indexed snapshot must be the
        // merge too; a save that omits an attribute leaves its entries
        let current = match (&def.encoding, &prev) {
            (StorageEncoding::Hash, Some(stored)) => {
                let mut merged = stored.clone();
                merged.extend(attrs);
                merged
            }
            _ => attrs,
        };
        self.maintainer
            .update_indexes(&def, prev.as_ref(), &current, IndexOp::Add, &record.id)
    }

    /// Read one record; `None` when it does not exist
    pub fn fetch(&self, entity: &str, id: &RecordId) -> Result<Option<Record>> {
        let def = self.entity(entity)?;
        let mut records = self.executor.resolve(&def, std::slice::from_ref(id))?;
        Ok(records.pop())
    }

    /// Delete a record, its index entries and its collection membership
    ///
    /// Returns whether the record existed.
    pub fn destroy(&self, entity: &str, id: &RecordId) -> Result<bool> {
        let def = self.entity(entity)?;
        let Some(attrs) = self.fetch_attrs(&def, id)? else {
            return Ok(false);
        };
        self.maintainer
            .update_indexes(&def, Some(&attrs), &attrs, IndexOp::Delete, id)?;
        self.store
            .set_remove(&self.keys.collection_key(&def.name), &id.to_string())?;
        self.store.delete(&self.keys.record_key(&def.name, id))?;
        Ok(true)
    }

    /// Atomically add `amount` to an integer attribute
    ///
    /// Only hash-encoded entities support field increments; the store
    /// cannot increment inside an opaque document.
    pub fn increment(
        &self,
        entity: &str,
        id: &RecordId,
        attribute: &str,
        amount: i64,
    ) -> Result<i64> {
        let def = self.entity(entity)?;
        if def.encoding != StorageEncoding::Hash {
            return Err(Error::UnsupportedEncoding {
                entity: def.name.clone(),
                encoding: def.encoding.as_str(),
                operation: "increment",
            });
        }
        self.store
            .hash_increment_by(&self.keys.record_key(&def.name, id), attribute, amount)
    }

    /// Find the single record with `attribute == value`
    ///
    /// The attribute must carry a unique-marked index; the first member
    /// of its membership set wins if uniqueness was ever violated.
    pub fn find_by_unique(
        &self,
        entity: &str,
        attribute: &str,
        value: &AttrValue,
    ) -> Result<Option<Record>> {
        let def = self.entity(entity)?;
        let is_unique = def
            .index_for(attribute)
            .map(|i| i.unique)
            .unwrap_or(false);
        if !is_unique {
            return Err(Error::InvalidQuery(format!(
                "attribute '{}' of '{}' has no unique index",
                attribute, def.name
            )));
        }
        let key = self.keys.value_set_key(&def.name, attribute, value);
        let members = self.store.set_members(&key)?;
        match members.first() {
            None => Ok(None),
            Some(member) => {
                let id = RecordId::parse(member);
                self.fetch(entity, &id)
            }
        }
    }

    /// Run a declarative query
    pub fn query(&self, entity: &str, request: &QueryRequest) -> Result<Vec<Record>> {
        let def = self.entity(entity)?;
        self.executor.run(&def, request)
    }

    /// Combine index keys and resolve the resulting records
    pub fn federate(&self, entity: &str, request: &FederateRequest) -> Result<Vec<Record>> {
        let def = self.entity(entity)?;
        self.federator.federate(&def, request)
    }

    /// Read entries from one index key without resolving records
    pub fn read_index(
        &self,
        key: &str,
        sorted: bool,
        opts: &IndexReadOptions,
    ) -> Result<Vec<IndexEntry>> {
        self.executor.read_index(key, sorted, opts)
    }

    /// Handle to a hand-rolled index under this engine's namespace
    pub fn index_handle(&self, key: &str, sorted: bool) -> IndexHandle {
        let key = self.keys.prefix(key);
        if sorted {
            IndexHandle::sorted(self.store.clone(), key)
        } else {
            IndexHandle::plain(self.store.clone(), key)
        }
    }

    /// Current attribute snapshot of a record, if it exists
    fn fetch_attrs(&self, def: &EntityDef, id: &RecordId) -> Result<Option<AttrMap>> {
        let mut records = self.executor.resolve(def, std::slice::from_ref(id))?;
        Ok(records.pop().map(|r| r.attrs))
    }
}

fn id_attr(id: &RecordId) -> AttrValue {
    match id {
        RecordId::Int(i) => AttrValue::Int(*i),
        RecordId::Str(s) => AttrValue::String(s.clone()),
    }
}

/// Encode attributes as hash fields, one JSON value per field
fn encode_fields(attrs: &AttrMap) -> Result<Vec<(String, String)>> {
    attrs
        .iter()
        .map(|(k, v)| Ok((k.clone(), serde_json::to_string(v)?)))
        .collect()
}

/// Encode attributes as one JSON document
fn encode_document(attrs: &AttrMap) -> Result<String> {
    let fields: serde_json::Map<String, serde_json::Value> = attrs
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    Ok(serde_json::to_string(&serde_json::Value::Object(fields))?)
}
