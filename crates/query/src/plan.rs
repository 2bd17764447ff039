//! Query compilation
//!
//! [`compile`] turns a [`QueryRequest`] into a [`QueryPlan`]: the set
//! algebra and the sort path, decided purely from the entity definition
//! and the key space. No store I/O happens here, so plans are cheap to
//! inspect and test.
//!
//! Sort-path selection, in order of preference:
//! 1. a caller-supplied pattern from `custom_sort`
//! 2. the property's own score-ordered index (only when the definition
//!    carries no key override, since an override means the structure's
//!    scores are not the property values)
//! 3. dynamic sort over the record hashes, for hash-encoded entities
//!
//! A sort with none of the three paths is rejected as invalid rather
//! than silently returning records in storage order.

use crate::request::{Filter, QueryRequest, SortSpec};
use lattice_core::error::{Error, Result};
use lattice_core::keys::KeySpace;
use lattice_core::schema::{EntityDef, StorageEncoding};
use lattice_core::traits::SortOrder;
use lattice_core::value::RecordId;
use tracing::debug;

/// One source of the candidate intersection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A single membership key
    Key(String),
    /// Several membership keys unioned into one candidate set before
    /// the intersection (the `In` filter)
    UnionOf(Vec<String>),
}

/// How combined candidates get ordered before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostSort {
    /// Read the combined score-ordered result in score order
    Score {
        /// Traversal order
        order: SortOrder,
    },
    /// Sort candidates by an external field pattern
    External {
        /// Substitution pattern, `prefix:*->field`
        pattern: String,
        /// Traversal order
        order: SortOrder,
    },
}

/// Compiled execution plan for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// The result set is exactly these ids
    ByIds {
        /// Requested ids, in request order
        ids: Vec<RecordId>,
    },
    /// One membership set, read directly
    SingleSet {
        /// Membership key
        key: String,
    },
    /// Intersect several operands into an ephemeral result structure
    Combined {
        /// Candidate sources, all intersected
        operands: Vec<Operand>,
        /// Score-ordered index joined into the intersection so the
        /// result carries real sort scores
        rank_source: Option<String>,
        /// How the combined result gets ordered
        post: PostSort,
    },
    /// The full collection set, optionally externally sorted
    CollectionScan {
        /// Collection key
        key: String,
        /// External sort pattern and order; `None` reads storage order
        by: Option<(String, SortOrder)>,
    },
    /// A score-ordered index read whole; the only plan that supports
    /// rank-cursor pagination
    SortedScan {
        /// Score-ordered index key
        key: String,
        /// Traversal order
        order: SortOrder,
    },
}

/// Resolved sort path for a request
enum SortPath {
    Custom(String, SortOrder),
    Indexed(String, SortOrder),
    Dynamic(String, SortOrder),
}

fn resolve_sort(
    entity: &EntityDef,
    keys: &KeySpace,
    request: &QueryRequest,
    sort: &SortSpec,
) -> Result<SortPath> {
    if let Some(pattern) = request
        .custom_sort
        .as_ref()
        .and_then(|m| m.get(&sort.property))
    {
        return Ok(SortPath::Custom(pattern.clone(), sort.order));
    }
    let index_usable = entity
        .index_for(&sort.property)
        .map(|def| def.sort.is_sorted() && def.key.is_none())
        .unwrap_or(false);
    if index_usable {
        return Ok(SortPath::Indexed(
            keys.sort_key(&entity.name, &sort.property),
            sort.order,
        ));
    }
    if entity.encoding == StorageEncoding::Hash {
        let pattern = format!(
            "{}->{}",
            keys.record_key_pattern(&entity.name),
            sort.property
        );
        return Ok(SortPath::Dynamic(pattern, sort.order));
    }
    Err(Error::InvalidQuery(format!(
        "no sort path for property '{}' on entity '{}'",
        sort.property, entity.name
    )))
}

fn filter_operands(
    entity: &EntityDef,
    keys: &KeySpace,
    request: &QueryRequest,
) -> Result<Vec<Operand>> {
    if let Some(explicit) = &request.custom_indexes {
        return Ok(explicit.iter().cloned().map(Operand::Key).collect());
    }
    let Some(clause) = &request.where_clause else {
        return Ok(Vec::new());
    };
    let mut operands = Vec::with_capacity(clause.filters.len());
    for (attribute, filter) in &clause.filters {
        if entity.index_for(attribute).is_none() {
            return Err(Error::InvalidQuery(format!(
                "attribute '{}' is not indexed on entity '{}'",
                attribute, entity.name
            )));
        }
        match filter {
            Filter::Eq(value) => {
                operands.push(Operand::Key(keys.value_set_key(
                    &entity.name,
                    attribute,
                    value,
                )));
            }
            Filter::In(values) if values.len() == 1 => {
                operands.push(Operand::Key(keys.value_set_key(
                    &entity.name,
                    attribute,
                    &values[0],
                )));
            }
            Filter::In(values) => {
                if values.is_empty() {
                    return Err(Error::InvalidQuery(format!(
                        "empty value list for attribute '{}'",
                        attribute
                    )));
                }
                operands.push(Operand::UnionOf(
                    values
                        .iter()
                        .map(|v| keys.value_set_key(&entity.name, attribute, v))
                        .collect(),
                ));
            }
        }
    }
    Ok(operands)
}

/// Compile a request into a plan
pub fn compile(entity: &EntityDef, keys: &KeySpace, request: &QueryRequest) -> Result<QueryPlan> {
    if request.before_id.is_some() && request.after_id.is_some() {
        return Err(Error::InvalidQuery(
            "before and after cursors are mutually exclusive".to_string(),
        ));
    }
    if request.limit == Some(0) {
        return Err(Error::InvalidQuery("limit must be positive".to_string()));
    }

    if let Some(ids) = request.where_clause.as_ref().and_then(|c| c.ids.clone()) {
        return Ok(QueryPlan::ByIds { ids });
    }

    let operands = filter_operands(entity, keys, request)?;
    let plan = if operands.is_empty() {
        match &request.sort {
            None => QueryPlan::CollectionScan {
                key: keys.collection_key(&entity.name),
                by: None,
            },
            Some(sort) => match resolve_sort(entity, keys, request, sort)? {
                SortPath::Indexed(key, order) => QueryPlan::SortedScan { key, order },
                SortPath::Custom(pattern, order) | SortPath::Dynamic(pattern, order) => {
                    QueryPlan::CollectionScan {
                        key: keys.collection_key(&entity.name),
                        by: Some((pattern, order)),
                    }
                }
            },
        }
    } else if let ([Operand::Key(key)], None) = (operands.as_slice(), &request.sort) {
        QueryPlan::SingleSet { key: key.clone() }
    } else {
        let (rank_source, post) = match &request.sort {
            None => (None, PostSort::Score { order: SortOrder::Asc }),
            Some(sort) => match resolve_sort(entity, keys, request, sort)? {
                SortPath::Indexed(key, order) => (Some(key), PostSort::Score { order }),
                SortPath::Custom(pattern, order) | SortPath::Dynamic(pattern, order) => {
                    (None, PostSort::External { pattern, order })
                }
            },
        };
        QueryPlan::Combined {
            operands,
            rank_source,
            post,
        }
    };

    if (request.before_id.is_some() || request.after_id.is_some())
        && !matches!(plan, QueryPlan::SortedScan { .. })
    {
        return Err(Error::InvalidQuery(
            "rank cursors require a sort on a score-ordered index and no filters".to_string(),
        ));
    }

    debug!(entity = %entity.name, ?plan, "compiled query plan");
    Ok(plan)
}
