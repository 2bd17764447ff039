//! Multi-index federation
//!
//! Combines several index keys — feeds, hand-rolled indexes, value
//! sets — into one ephemeral score-ordered result, reads it, and
//! resolves the records. Plain sets among the sources participate with
//! score 1, so mixed federations work without caller bookkeeping.
//!
//! Per-source weights and the score aggregation are passed through to
//! the store's combine primitive; the default aggregation keeps the
//! highest source score, so an id present in a fresh feed and a stale
//! one surfaces with its fresh rank.

use crate::executor::{IndexReadOptions, QueryExecutor, EPHEMERAL_TTL};
use lattice_core::error::{Error, Result};
use lattice_core::schema::EntityDef;
use lattice_core::traits::{Aggregate, SortOrder, StoreClient};
use lattice_core::value::{AttrValue, Record, RecordId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// How source indexes combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FederateMode {
    /// Ids present in any source
    #[default]
    Union,
    /// Ids present in every source
    Intersect,
}

/// Turns each record's combined score into an attribute
///
/// Feeds often score by timestamp; a conversion surfaces that score on
/// the resolved record (e.g. as an ISO timestamp string) without
/// storing it in the record itself.
#[derive(Clone)]
pub struct ScoreConversion {
    attribute: String,
    convert: Arc<dyn Fn(f64) -> AttrValue + Send + Sync>,
}

impl ScoreConversion {
    /// Attach `convert(score)` to each record under `attribute`
    pub fn new(
        attribute: impl Into<String>,
        convert: impl Fn(f64) -> AttrValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            convert: Arc::new(convert),
        }
    }

    fn apply(&self, record: &mut Record, score: f64) {
        record
            .attrs
            .insert(self.attribute.clone(), (self.convert)(score));
    }
}

impl fmt::Debug for ScoreConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoreConversion")
            .field("attribute", &self.attribute)
            .finish()
    }
}

/// A federated read over several index keys
#[derive(Debug, Clone)]
pub struct FederateRequest {
    /// Index keys to combine, plain or score-ordered
    pub sources: Vec<String>,
    /// Union or intersection
    pub mode: FederateMode,
    /// Per-source score weights, aligned with `sources`
    pub weights: Option<Vec<f64>>,
    /// Score aggregation for ids in several sources
    pub aggregate: Aggregate,
    /// Traversal order over the combined result
    pub order: SortOrder,
    /// Maximum records to return
    pub limit: Option<usize>,
    /// Records to skip
    pub offset: usize,
    /// Restrict to combined scores within `[min, max]`
    pub score_range: Option<(Option<f64>, Option<f64>)>,
    /// Surface each record's combined score as an attribute
    pub score_conversion: Option<ScoreConversion>,
}

impl FederateRequest {
    /// Federate the given sources with default settings: union,
    /// highest-score aggregation, descending traversal
    pub fn new(sources: impl IntoIterator<Item = String>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
            mode: FederateMode::Union,
            weights: None,
            aggregate: Aggregate::Max,
            order: SortOrder::Desc,
            limit: None,
            offset: 0,
            score_range: None,
            score_conversion: None,
        }
    }

    /// Require ids to be present in every source
    pub fn intersect(mut self) -> Self {
        self.mode = FederateMode::Intersect;
        self
    }

    /// Weight each source's scores
    pub fn weights(mut self, weights: impl IntoIterator<Item = f64>) -> Self {
        self.weights = Some(weights.into_iter().collect());
        self
    }

    /// Set the score aggregation
    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Set the traversal order
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Set the page size
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the number of records to skip
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Restrict to combined scores within `[min, max]`
    pub fn score_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.score_range = Some((min, max));
        self
    }

    /// Surface combined scores through a conversion
    pub fn with_score_conversion(mut self, conversion: ScoreConversion) -> Self {
        self.score_conversion = Some(conversion);
        self
    }
}

/// Runs federated reads
#[derive(Clone)]
pub struct Federator {
    store: Arc<dyn StoreClient>,
    executor: QueryExecutor,
}

impl Federator {
    /// Create a federator sharing the executor's store and key space
    pub fn new(store: Arc<dyn StoreClient>, executor: QueryExecutor) -> Self {
        Self { store, executor }
    }

    /// Combine the sources and resolve the resulting records
    ///
    /// The ephemeral combined key is deleted before returning, whether
    /// the read succeeds or not.
    pub fn federate(&self, entity: &EntityDef, request: &FederateRequest) -> Result<Vec<Record>> {
        if request.sources.is_empty() {
            return Err(Error::InvalidQuery(
                "federation requires at least one source index".to_string(),
            ));
        }
        if let Some(weights) = &request.weights {
            if weights.len() != request.sources.len() {
                return Err(Error::InvalidQuery(format!(
                    "{} weights given for {} sources",
                    weights.len(),
                    request.sources.len()
                )));
            }
        }

        let dest = self.executor.fresh_key();
        let result = self.combine_and_read(entity, request, &dest);
        if let Err(err) = self.store.delete(&dest) {
            warn!(key = %dest, error = %err, "failed to delete federated result key");
        }
        result
    }

    fn combine_and_read(
        &self,
        entity: &EntityDef,
        request: &FederateRequest,
        dest: &str,
    ) -> Result<Vec<Record>> {
        let weights = request.weights.as_deref();
        let size = match request.mode {
            FederateMode::Union => self.store.sorted_set_union_into(
                dest,
                &request.sources,
                weights,
                request.aggregate,
            )?,
            FederateMode::Intersect => self.store.sorted_set_intersect_into(
                dest,
                &request.sources,
                weights,
                request.aggregate,
            )?,
        };
        self.store.expire(dest, EPHEMERAL_TTL)?;
        debug!(
            dest = %dest,
            sources = request.sources.len(),
            mode = ?request.mode,
            size,
            "federated indexes"
        );

        let entries = self.executor.read_index(
            dest,
            true,
            &IndexReadOptions {
                order: request.order,
                limit: request.limit,
                offset: request.offset,
                score_range: request.score_range,
                ..IndexReadOptions::default()
            },
        )?;

        let ids: Vec<RecordId> = entries.iter().map(|e| e.id.clone()).collect();
        let mut records = self.executor.resolve(entity, &ids)?;

        if let Some(conversion) = &request.score_conversion {
            for record in &mut records {
                let score = entries
                    .iter()
                    .find(|e| e.id == record.id)
                    .and_then(|e| e.score);
                if let Some(score) = score {
                    conversion.apply(record, score);
                }
            }
        }
        Ok(records)
    }
}
