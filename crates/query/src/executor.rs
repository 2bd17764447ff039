//! Plan execution and record resolution
//!
//! [`QueryExecutor`] runs compiled plans against the store. Plans that
//! combine several sources materialize the intersection into an
//! ephemeral key; those keys are deleted as soon as the result is read,
//! with a TTL as a safety net in case the process dies in between.
//!
//! Resolution turns member ids back into [`Record`]s. Hash-encoded
//! records read each field as its own JSON value; a field that fails to
//! parse passes through as a raw string rather than failing the whole
//! read. String-encoded records are one JSON document each.

use crate::plan::{compile, Operand, PostSort, QueryPlan};
use crate::request::QueryRequest;
use lattice_core::error::{Error, Result};
use lattice_core::keys::{EphemeralKeys, KeySpace};
use lattice_core::schema::{EntityDef, StorageEncoding};
use lattice_core::traits::{Aggregate, SortBy, SortOrder, StoreClient};
use lattice_core::value::{AttrMap, AttrValue, Record, RecordId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Page size applied when a request carries no limit
pub const DEFAULT_LIMIT: usize = 50;

/// Safety-net TTL on ephemeral result keys
pub const EPHEMERAL_TTL: Duration = Duration::from_secs(300);

/// Options for a direct index read
///
/// Used by federation and by rank-cursor traversal; the defaults match
/// the feed-reading case: descending, whole index, limits pushed into
/// the store.
#[derive(Clone, Debug)]
pub struct IndexReadOptions {
    /// Traversal order
    pub order: SortOrder,
    /// Maximum entries to return
    pub limit: Option<usize>,
    /// Entries to skip
    pub offset: usize,
    /// Rank cursor: entries strictly before this id
    pub before_id: Option<RecordId>,
    /// Rank cursor: entries strictly after this id
    pub after_id: Option<RecordId>,
    /// Restrict to scores within `[min, max]`
    pub score_range: Option<(Option<f64>, Option<f64>)>,
    /// External-sort pattern for plain membership sets
    pub sort_pattern: Option<String>,
    /// Push offset/limit into the store read; disable when the caller
    /// paginates afterwards
    pub push_limit: bool,
}

impl Default for IndexReadOptions {
    fn default() -> Self {
        Self {
            order: SortOrder::Desc,
            limit: None,
            offset: 0,
            before_id: None,
            after_id: None,
            score_range: None,
            sort_pattern: None,
            push_limit: true,
        }
    }
}

/// One entry read from an index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Record id
    pub id: RecordId,
    /// Score, when the index is score-ordered
    pub score: Option<f64>,
}

/// Executes compiled plans and resolves records
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn StoreClient>,
    keys: KeySpace,
    ephemeral: Arc<dyn EphemeralKeys>,
}

impl QueryExecutor {
    /// Create an executor over a store and key space
    pub fn new(
        store: Arc<dyn StoreClient>,
        keys: KeySpace,
        ephemeral: Arc<dyn EphemeralKeys>,
    ) -> Self {
        Self {
            store,
            keys,
            ephemeral,
        }
    }

    /// Compile and run a request, returning resolved records
    ///
    /// Ephemeral keys created along the way are deleted before this
    /// returns, on success and on failure alike.
    pub fn run(&self, entity: &EntityDef, request: &QueryRequest) -> Result<Vec<Record>> {
        let plan = compile(entity, &self.keys, request)?;
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT);

        let mut scratch = Vec::new();
        let members = self.members_for_plan(request, &plan, limit, &mut scratch);
        for key in &scratch {
            if let Err(err) = self.store.delete(key) {
                warn!(key = %key, error = %err, "failed to delete ephemeral result key");
            }
        }
        let members = members?;

        let ids: Vec<RecordId> = members.iter().map(|m| RecordId::parse(m)).collect();
        self.resolve(entity, &ids)
    }

    /// Produce the paginated member list a plan selects
    fn members_for_plan(
        &self,
        request: &QueryRequest,
        plan: &QueryPlan,
        limit: usize,
        scratch: &mut Vec<String>,
    ) -> Result<Vec<String>> {
        let offset = request.offset;
        match plan {
            QueryPlan::ByIds { ids } => Ok(ids
                .iter()
                .skip(offset)
                .take(limit)
                .map(|id| id.to_string())
                .collect()),

            QueryPlan::SingleSet { key } => {
                let members = self.store.set_members(key)?;
                Ok(members.into_iter().skip(offset).take(limit).collect())
            }

            QueryPlan::SortedScan { key, order } => {
                if request.before_id.is_some() || request.after_id.is_some() {
                    return self.rank_window(key, request, limit, *order);
                }
                let start = offset as i64;
                let stop = (offset + limit - 1) as i64;
                self.store.sorted_set_range(key, start, stop, *order)
            }

            QueryPlan::CollectionScan { key, by } => {
                let (sort_by, order) = match by {
                    None => (SortBy::Unsorted, SortOrder::Asc),
                    Some((pattern, order)) => (SortBy::Pattern(pattern.clone()), *order),
                };
                self.store
                    .external_sort(key, &sort_by, Some((offset, limit)), order)
            }

            QueryPlan::Combined {
                operands,
                rank_source,
                post,
            } => {
                let mut sources = Vec::with_capacity(operands.len() + 1);
                for operand in operands {
                    match operand {
                        Operand::Key(key) => sources.push(key.clone()),
                        Operand::UnionOf(keys) => {
                            let merged = self.fresh_ephemeral(scratch);
                            self.store.set_union_into(&merged, keys)?;
                            self.store.expire(&merged, EPHEMERAL_TTL)?;
                            sources.push(merged);
                        }
                    }
                }
                // membership operands carry score 1; zero-weight them
                // and sum so the rank source's scores pass through
                // unchanged, sub-unit and negative values included
                let mut weights = vec![0.0; sources.len()];
                if let Some(key) = rank_source {
                    sources.push(key.clone());
                    weights.push(1.0);
                }

                let dest = self.fresh_ephemeral(scratch);
                let size = self.store.sorted_set_intersect_into(
                    &dest,
                    &sources,
                    Some(&weights),
                    Aggregate::Sum,
                )?;
                self.store.expire(&dest, EPHEMERAL_TTL)?;
                debug!(dest = %dest, sources = sources.len(), size, "materialized intersection");

                match post {
                    PostSort::Score { order } => {
                        let start = offset as i64;
                        let stop = (offset + limit - 1) as i64;
                        self.store.sorted_set_range(&dest, start, stop, *order)
                    }
                    PostSort::External { pattern, order } => self.store.external_sort(
                        &dest,
                        &SortBy::Pattern(pattern.clone()),
                        Some((offset, limit)),
                        *order,
                    ),
                }
            }
        }
    }

    /// Rank-cursor window on a score-ordered index
    fn rank_window(
        &self,
        key: &str,
        request: &QueryRequest,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<String>> {
        if let Some(cursor) = &request.after_id {
            let rank = self.cursor_rank(key, cursor, order)?;
            let start = (rank + 1) as i64;
            let stop = start + limit as i64 - 1;
            return self.store.sorted_set_range(key, start, stop, order);
        }
        if let Some(cursor) = &request.before_id {
            let rank = self.cursor_rank(key, cursor, order)?;
            if rank == 0 {
                return Ok(Vec::new());
            }
            let stop = (rank - 1) as i64;
            let start = (stop + 1).saturating_sub(limit as i64).max(0);
            return self.store.sorted_set_range(key, start, stop, order);
        }
        Ok(Vec::new())
    }

    fn cursor_rank(&self, key: &str, cursor: &RecordId, order: SortOrder) -> Result<usize> {
        self.store
            .sorted_set_rank(key, &cursor.to_string(), order)?
            .ok_or_else(|| {
                Error::InvalidQuery(format!("cursor id {} is not in index {}", cursor, key))
            })
    }

    fn fresh_ephemeral(&self, scratch: &mut Vec<String>) -> String {
        let key = self.fresh_key();
        scratch.push(key.clone());
        key
    }

    /// A fresh namespaced ephemeral key
    pub fn fresh_key(&self) -> String {
        self.keys.prefix(&self.ephemeral.temp_key())
    }

    /// Read entries from one index key directly
    ///
    /// `sorted` selects the structure kind. Rank cursors and score
    /// ranges require a score-ordered index.
    pub fn read_index(
        &self,
        key: &str,
        sorted: bool,
        opts: &IndexReadOptions,
    ) -> Result<Vec<IndexEntry>> {
        if opts.before_id.is_some() || opts.after_id.is_some() {
            if !sorted {
                return Err(Error::InvalidQuery(format!(
                    "rank cursors require a score-ordered index, {} is a plain set",
                    key
                )));
            }
            return self.read_rank_window(key, opts);
        }

        if let Some((min, max)) = opts.score_range {
            if !sorted {
                return Err(Error::InvalidQuery(format!(
                    "score ranges require a score-ordered index, {} is a plain set",
                    key
                )));
            }
            let page = if opts.push_limit {
                opts.limit.map(|l| (opts.offset, l))
            } else {
                None
            };
            let scored = self
                .store
                .sorted_set_range_by_score(key, min, max, page, opts.order)?;
            let entries = scored_entries(scored);
            return Ok(slice_unless_pushed(entries, opts, page.is_some()));
        }

        if sorted {
            let (start, stop) = if opts.push_limit {
                (
                    opts.offset as i64,
                    opts.limit
                        .map(|l| (opts.offset + l - 1) as i64)
                        .unwrap_or(-1),
                )
            } else {
                (0, -1)
            };
            let scored = self
                .store
                .sorted_set_range_with_scores(key, start, stop, opts.order)?;
            let entries = scored_entries(scored);
            return Ok(slice_unless_pushed(entries, opts, opts.push_limit));
        }

        let members = match &opts.sort_pattern {
            Some(pattern) => {
                let page = if opts.push_limit {
                    Some((opts.offset, opts.limit.unwrap_or(usize::MAX)))
                } else {
                    None
                };
                self.store.external_sort(
                    key,
                    &SortBy::Pattern(pattern.clone()),
                    page,
                    opts.order,
                )?
            }
            None => self.store.set_members(key)?,
        };
        let entries: Vec<IndexEntry> = members
            .into_iter()
            .map(|m| IndexEntry {
                id: RecordId::parse(&m),
                score: None,
            })
            .collect();
        let pushed = opts.sort_pattern.is_some() && opts.push_limit;
        Ok(slice_unless_pushed(entries, opts, pushed))
    }

    fn read_rank_window(&self, key: &str, opts: &IndexReadOptions) -> Result<Vec<IndexEntry>> {
        let order = opts.order;
        let (start, stop) = if let Some(cursor) = &opts.after_id {
            let rank = self.cursor_rank(key, cursor, order)?;
            let start = (rank + 1) as i64;
            let stop = opts
                .limit
                .map(|l| start + l as i64 - 1)
                .unwrap_or(-1);
            (start, stop)
        } else if let Some(cursor) = &opts.before_id {
            let rank = self.cursor_rank(key, cursor, order)?;
            if rank == 0 {
                return Ok(Vec::new());
            }
            let stop = (rank - 1) as i64;
            let start = opts
                .limit
                .map(|l| (stop + 1).saturating_sub(l as i64).max(0))
                .unwrap_or(0);
            (start, stop)
        } else {
            return Ok(Vec::new());
        };
        let scored = self
            .store
            .sorted_set_range_with_scores(key, start, stop, order)?;
        Ok(scored_entries(scored))
    }

    /// Resolve ids into records, preserving order and dropping ids
    /// whose primary data has vanished
    pub fn resolve(&self, entity: &EntityDef, ids: &[RecordId]) -> Result<Vec<Record>> {
        match entity.encoding {
            StorageEncoding::Hash => {
                let keys: Vec<String> = ids
                    .iter()
                    .map(|id| self.keys.record_key(&entity.name, id))
                    .collect();
                let hashes = self.store.multi_hash_get(&keys)?;
                let mut records = Vec::with_capacity(ids.len());
                for (id, fields) in ids.iter().zip(hashes) {
                    if let Some(fields) = fields {
                        let attrs: AttrMap = fields
                            .into_iter()
                            .map(|(field, raw)| (field, parse_field(&raw)))
                            .collect();
                        records.push(Record {
                            id: id.clone(),
                            attrs,
                        });
                    }
                }
                Ok(records)
            }
            StorageEncoding::Str => {
                let keys: Vec<String> = ids
                    .iter()
                    .map(|id| self.keys.record_key(&entity.name, id))
                    .collect();
                let docs = self.store.multi_get(&keys)?;
                let mut records = Vec::with_capacity(ids.len());
                for (id, doc) in ids.iter().zip(docs) {
                    if let Some(doc) = doc {
                        records.push(Record {
                            id: id.clone(),
                            attrs: parse_document(&doc)?,
                        });
                    }
                }
                Ok(records)
            }
        }
    }
}

fn scored_entries(scored: Vec<(String, f64)>) -> Vec<IndexEntry> {
    scored
        .into_iter()
        .map(|(member, score)| IndexEntry {
            id: RecordId::parse(&member),
            score: Some(score),
        })
        .collect()
}

fn slice_unless_pushed(
    entries: Vec<IndexEntry>,
    opts: &IndexReadOptions,
    pushed: bool,
) -> Vec<IndexEntry> {
    if pushed {
        return entries;
    }
    entries
        .into_iter()
        .skip(opts.offset)
        .take(opts.limit.unwrap_or(usize::MAX))
        .collect()
}

/// Parse one hash field back into an attribute value
///
/// Fields are written as JSON; anything that fails to parse (or parses
/// to a shape attributes cannot hold) passes through as a raw string.
fn parse_field(raw: &str) -> AttrValue {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| AttrValue::from_json(&v))
        .unwrap_or_else(|| AttrValue::from(raw))
}

/// Parse a string-encoded record document into attributes
fn parse_document(doc: &str) -> Result<AttrMap> {
    let value: serde_json::Value = serde_json::from_str(doc)?;
    let serde_json::Value::Object(fields) = value else {
        return Err(Error::Encoding(format!(
            "record document is not a JSON object: {}",
            doc
        )));
    };
    Ok(fields
        .into_iter()
        .map(|(field, v)| {
            let parsed = AttrValue::from_json(&v)
                .unwrap_or_else(|| AttrValue::from(v.to_string()));
            (field, parsed)
        })
        .collect())
}
