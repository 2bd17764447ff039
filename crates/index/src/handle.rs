//! Direct operations on a single index structure
//!
//! [`IndexHandle`] addresses one index key explicitly, outside the
//! per-entity maintenance flow: membership checks, counts, bulk
//! removal, score reads and whole-index removal. Callers that maintain
//! hand-rolled indexes (e.g. activity feeds keyed by a timestamp score)
//! drive them through this type.

use lattice_core::error::{Error, Result};
use lattice_core::traits::{Command, SortOrder, StoreClient};
use lattice_core::value::RecordId;
use std::sync::Arc;
use tracing::debug;

/// Handle to one explicit index key, plain or score-ordered
#[derive(Clone)]
pub struct IndexHandle {
    store: Arc<dyn StoreClient>,
    key: String,
    sorted: bool,
}

impl IndexHandle {
    /// Handle to a plain membership set
    pub fn plain(store: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            sorted: false,
        }
    }

    /// Handle to a score-ordered index
    pub fn sorted(store: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            sorted: true,
        }
    }

    /// The index key this handle addresses
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the index is score-ordered
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Add an id to the index
    ///
    /// Score-ordered indexes require a score; plain sets ignore it.
    pub fn add(&self, id: &RecordId, score: Option<f64>) -> Result<()> {
        let member = id.to_string();
        debug!(key = %self.key, id = %member, "adding to index");
        if self.sorted {
            let score = score.ok_or_else(|| {
                Error::MissingConfiguration(format!(
                    "index {} is score-ordered and needs a score",
                    self.key
                ))
            })?;
            self.store.sorted_set_add(&self.key, &member, score)?;
        } else {
            self.store.set_add(&self.key, &member)?;
        }
        Ok(())
    }

    /// Remove several ids from the index in one batch
    pub fn remove(&self, ids: &[RecordId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        debug!(key = %self.key, count = ids.len(), "removing from index");
        let commands: Vec<Command> = ids
            .iter()
            .map(|id| {
                let member = id.to_string();
                if self.sorted {
                    Command::SortedSetRemove {
                        key: self.key.clone(),
                        member,
                    }
                } else {
                    Command::SetRemove {
                        key: self.key.clone(),
                        member,
                    }
                }
            })
            .collect();
        self.store.execute_batch(&commands)
    }

    /// Whether an id is present in the index
    pub fn exists(&self, id: &RecordId) -> Result<bool> {
        let member = id.to_string();
        if self.sorted {
            Ok(self
                .store
                .sorted_set_rank(&self.key, &member, SortOrder::Asc)?
                .is_some())
        } else {
            self.store.set_is_member(&self.key, &member)
        }
    }

    /// Number of ids in the index
    pub fn count(&self) -> Result<usize> {
        if self.sorted {
            self.store.sorted_set_cardinality(&self.key)
        } else {
            self.store.set_cardinality(&self.key)
        }
    }

    /// Score of an id; only meaningful for score-ordered indexes
    pub fn score(&self, id: &RecordId) -> Result<Option<f64>> {
        if !self.sorted {
            return Err(Error::InvalidQuery(format!(
                "cannot read score from non-sorted index {}",
                self.key
            )));
        }
        self.store.sorted_set_score(&self.key, &id.to_string())
    }

    /// Drop the entire index structure
    pub fn remove_index(&self) -> Result<()> {
        debug!(key = %self.key, "removing index");
        self.store.delete(&self.key)?;
        Ok(())
    }
}
