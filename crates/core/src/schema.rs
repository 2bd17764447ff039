//! Entity and index definitions
//!
//! An [`EntityDef`] describes one entity type: its name, its storage
//! encoding, and the secondary indexes maintained for it. Definitions
//! are immutable after registration; the index layer and the query
//! compiler both read them.

use crate::value::AttrMap;
use std::fmt;
use std::sync::Arc;

/// How an entity type's records are stored
///
/// A closed set of storage-encoding strategies, selected per entity
/// type. The choice affects how attribute values read back: hash fields
/// are individual JSON strings, while string encoding round-trips the
/// whole record as one JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageEncoding {
    /// One opaque JSON document per record (`GET`/`SET`)
    #[default]
    Str,
    /// One field map per record (`HGETALL`/`HMSET`); supports atomic
    /// field increments
    Hash,
}

impl StorageEncoding {
    /// Encoding name for error messages
    pub fn as_str(self) -> &'static str {
        match self {
            StorageEncoding::Str => "string",
            StorageEncoding::Hash => "hash",
        }
    }
}

/// Condition gating a record's presence in an index
///
/// The record is indexed only when `attribute` equals `required` on the
/// current attribute snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Attribute the condition reads
    pub attribute: String,
    /// Value the attribute must equal
    pub required: crate::value::AttrValue,
}

/// Score function evaluated at write time for score-ordered indexes
#[derive(Clone)]
pub struct ScoreFn(Arc<dyn Fn(&AttrMap) -> f64 + Send + Sync>);

impl ScoreFn {
    /// Wrap a score function
    pub fn new(f: impl Fn(&AttrMap) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Evaluate the score for a record's current attributes
    pub fn score(&self, attrs: &AttrMap) -> f64 {
        (self.0)(attrs)
    }
}

impl fmt::Debug for ScoreFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScoreFn(..)")
    }
}

/// Sorting behavior of an index definition
#[derive(Debug, Clone, Default)]
pub enum IndexSort {
    /// Membership sets only, no score-ordered structure
    #[default]
    Unsorted,
    /// Score-ordered structure keyed by the attribute's own value
    ByValue,
    /// Score-ordered structure keyed by a caller-supplied function
    /// (e.g. a write timestamp)
    ByScore(ScoreFn),
}

impl IndexSort {
    /// Whether this definition maintains a score-ordered structure
    pub fn is_sorted(&self) -> bool {
        !matches!(self, IndexSort::Unsorted)
    }
}

/// Declaration of one secondary index on an entity type
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    /// Attribute this index covers
    pub property: String,
    /// Sorting behavior
    pub sort: IndexSort,
    /// Informational uniqueness marker; enables single-record lookup by
    /// this attribute, not enforced by the engine
    pub unique: bool,
    /// Conditions gating the record's presence in this index
    pub dependencies: Vec<Dependency>,
    /// Explicit structure-name override for the score-ordered key
    pub key: Option<String>,
}

impl IndexDefinition {
    /// Plain membership index on `property`
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            sort: IndexSort::Unsorted,
            unique: false,
            dependencies: Vec::new(),
            key: None,
        }
    }

    /// Maintain a score-ordered structure keyed by the attribute value
    pub fn sorted(mut self) -> Self {
        self.sort = IndexSort::ByValue;
        self
    }

    /// Maintain a score-ordered structure keyed by a score function
    pub fn sorted_by(mut self, f: impl Fn(&AttrMap) -> f64 + Send + Sync + 'static) -> Self {
        self.sort = IndexSort::ByScore(ScoreFn::new(f));
        self
    }

    /// Mark the indexed attribute as unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Gate this index on `attribute == required`
    pub fn dependent_on(
        mut self,
        attribute: impl Into<String>,
        required: impl Into<crate::value::AttrValue>,
    ) -> Self {
        self.dependencies.push(Dependency {
            attribute: attribute.into(),
            required: required.into(),
        });
        self
    }

    /// Override the score-ordered structure's key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Whether all dependency conditions hold on the given snapshot
    ///
    /// True when there are no dependencies. Conditions always read the
    /// current snapshot, never the previous one.
    pub fn dependencies_met(&self, attrs: &AttrMap) -> bool {
        self.dependencies
            .iter()
            .all(|dep| attrs.get(&dep.attribute) == Some(&dep.required))
    }
}

/// Definition of one entity type
#[derive(Debug, Clone, Default)]
pub struct EntityDef {
    /// Entity type name (also the collection key stem)
    pub name: String,
    /// Storage encoding for primary record data
    pub encoding: StorageEncoding,
    /// Secondary indexes maintained for this type
    pub indexes: Vec<IndexDefinition>,
}

impl EntityDef {
    /// String-encoded entity with no indexes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encoding: StorageEncoding::Str,
            indexes: Vec::new(),
        }
    }

    /// Switch to hash encoding
    pub fn hash_encoded(mut self) -> Self {
        self.encoding = StorageEncoding::Hash;
        self
    }

    /// Add an index definition
    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    /// Find the index covering `property`, if any
    pub fn index_for(&self, property: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.property == property)
    }

    /// Whether a score-ordered structure exists for `property`
    pub fn has_sorted_index_on(&self, property: &str) -> bool {
        self.index_for(property)
            .map(|i| i.sort.is_sorted())
            .unwrap_or(false)
    }

    /// Properties marked unique, for single-record attribute lookup
    pub fn unique_properties(&self) -> impl Iterator<Item = &str> {
        self.indexes
            .iter()
            .filter(|i| i.unique)
            .map(|i| i.property.as_str())
    }
}
