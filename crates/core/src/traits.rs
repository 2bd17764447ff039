//! Store client trait
//!
//! The engine is a logic layer over a key-value/set store exposing
//! Redis-shaped primitives. [`StoreClient`] is the full surface the
//! engine consumes; implementations own connection management, timeouts
//! and retries — the engine issues each call once and propagates
//! failures unchanged.
//!
//! Rank ranges use the store's index convention: `stop = -1` means "to
//! the last element", and negative indices count from the end.

use crate::error::Result;
use std::collections::BTreeMap;
use std::time::Duration;

/// Traversal order for sorted reads and rank lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Lowest score / rank 0 first
    Asc,
    /// Highest score first
    Desc,
}

impl SortOrder {
    /// The opposite traversal order
    pub fn reversed(self) -> SortOrder {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Score aggregation when an id appears in several source structures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    /// Sum of source scores (the store's native default)
    Sum,
    /// Lowest source score wins
    Min,
    /// Highest source score wins (the engine's default for federation)
    #[default]
    Max,
}

/// What the external-sort primitive orders candidates by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortBy {
    /// No ordering; return members as stored (`BY nosort`)
    Unsorted,
    /// Order by the members' own values
    Natural,
    /// Order by an external field: `prefix:*->field` substitutes each
    /// member for `*` and reads `field` from the hash at that key
    Pattern(String),
}

/// One mutation inside an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Add a member to a membership set
    SetAdd {
        /// Set key
        key: String,
        /// Member to add
        member: String,
    },
    /// Remove a member from a membership set
    SetRemove {
        /// Set key
        key: String,
        /// Member to remove
        member: String,
    },
    /// Add a member with a score to a score-ordered structure
    SortedSetAdd {
        /// Sorted-set key
        key: String,
        /// Member to add
        member: String,
        /// Score determining rank order
        score: f64,
    },
    /// Remove a member from a score-ordered structure
    SortedSetRemove {
        /// Sorted-set key
        key: String,
        /// Member to remove
        member: String,
    },
    /// Delete a key outright
    Delete {
        /// Key to delete
        key: String,
    },
    /// Set a time-to-live on a key
    Expire {
        /// Key to expire
        key: String,
        /// Time until the key vanishes
        ttl: Duration,
    },
}

/// The store primitives the engine consumes
///
/// Every call is one round trip; `execute_batch` is the store's
/// transaction primitive and applies its commands all-or-nothing.
/// Implementations must be shareable across threads.
pub trait StoreClient: Send + Sync {
    // ---- strings ----

    /// Read a string value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Read several string values in one round trip; order matches
    /// `keys`, missing keys yield `None`
    fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Atomically add `amount` to an integer string value, creating it
    /// at zero first; returns the new value
    fn increment_by(&self, key: &str, amount: i64) -> Result<i64>;

    /// Delete a key of any kind; returns whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    // ---- hashes ----

    /// Read all fields of a hash; `None` when the key is absent
    fn hash_get_all(&self, key: &str) -> Result<Option<BTreeMap<String, String>>>;

    /// Read all fields of several hashes in one round trip; order
    /// matches `keys`, absent keys yield `None`
    fn multi_hash_get(&self, keys: &[String]) -> Result<Vec<Option<BTreeMap<String, String>>>>;

    /// Write several hash fields at once
    fn hash_set_multi(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// Atomically add `amount` to an integer hash field, returning the
    /// new value
    fn hash_increment_by(&self, key: &str, field: &str, amount: i64) -> Result<i64>;

    // ---- sets ----

    /// Add a member; returns whether it was newly added
    fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member; returns whether it was present
    fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// All members, in unspecified order
    fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Number of members
    fn set_cardinality(&self, key: &str) -> Result<usize>;

    /// Membership test
    fn set_is_member(&self, key: &str, member: &str) -> Result<bool>;

    /// Store the union of `sources` into `dest`, returning its size
    fn set_union_into(&self, dest: &str, sources: &[String]) -> Result<usize>;

    /// Store the intersection of `sources` into `dest`, returning its
    /// size
    fn set_intersect_into(&self, dest: &str, sources: &[String]) -> Result<usize>;

    // ---- sorted sets ----

    /// Add or update a member with a score; returns whether it was new
    fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<bool>;

    /// Remove a member; returns whether it was present
    fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// Members in rank range `[start, stop]` under `order`
    fn sorted_set_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: SortOrder,
    ) -> Result<Vec<String>>;

    /// Like [`sorted_set_range`](Self::sorted_set_range) but with each
    /// member's score
    fn sorted_set_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: SortOrder,
    ) -> Result<Vec<(String, f64)>>;

    /// Members with scores in `[min, max]` (unbounded when `None`),
    /// traversed under `order`, with optional `(offset, count)` paging
    fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: Option<f64>,
        max: Option<f64>,
        page: Option<(usize, usize)>,
        order: SortOrder,
    ) -> Result<Vec<(String, f64)>>;

    /// Zero-based rank of a member under `order`; `None` when absent
    fn sorted_set_rank(&self, key: &str, member: &str, order: SortOrder)
        -> Result<Option<usize>>;

    /// Number of members
    fn sorted_set_cardinality(&self, key: &str) -> Result<usize>;

    /// A member's score; `None` when absent
    fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<f64>>;

    /// Store the union of sorted `sources` into `dest` with optional
    /// per-source weights and the given score aggregation
    fn sorted_set_union_into(
        &self,
        dest: &str,
        sources: &[String],
        weights: Option<&[f64]>,
        aggregate: Aggregate,
    ) -> Result<usize>;

    /// Store the intersection of sorted `sources` into `dest`; plain
    /// sets among the sources participate with score 1
    fn sorted_set_intersect_into(
        &self,
        dest: &str,
        sources: &[String],
        weights: Option<&[f64]>,
        aggregate: Aggregate,
    ) -> Result<usize>;

    // ---- generic sort ----

    /// Sort the members of a set by an external field (or their own
    /// values), with optional `(offset, count)` paging pushed into the
    /// store
    fn external_sort(
        &self,
        key: &str,
        by: &SortBy,
        page: Option<(usize, usize)>,
        order: SortOrder,
    ) -> Result<Vec<String>>;

    // ---- housekeeping ----

    /// Set a time-to-live; returns false when the key does not exist
    fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// All live keys starting with `prefix`
    fn keys_matching_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Apply a command list atomically, all-or-nothing
    fn execute_batch(&self, commands: &[Command]) -> Result<()>;
}
