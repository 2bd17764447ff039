//! Declarative query requests
//!
//! A [`QueryRequest`] describes what the caller wants — filters, sort,
//! pagination — without naming any store structure. The compiler in
//! [`crate::plan`] turns it into a plan of set-algebra operations.

use lattice_core::traits::SortOrder;
use lattice_core::value::{AttrValue, RecordId};
use std::collections::BTreeMap;

/// One attribute filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Attribute equals the value (array attributes: contains it)
    Eq(AttrValue),
    /// Attribute equals any of the values; the corresponding membership
    /// sets are unioned into one intersection operand
    In(Vec<AttrValue>),
}

/// Conjunctive where clause
///
/// All filters must hold. The special `ids` form short-circuits index
/// lookup entirely: the result set is exactly those ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    /// Explicit result ids; excludes all other filtering
    pub ids: Option<Vec<RecordId>>,
    /// Attribute → filter, intersected
    pub filters: BTreeMap<String, Filter>,
}

impl WhereClause {
    /// Empty clause
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `attribute == value`
    pub fn eq(mut self, attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.filters.insert(attribute.into(), Filter::Eq(value.into()));
        self
    }

    /// Require `attribute` to equal any of `values`
    pub fn any_of<V: Into<AttrValue>>(
        mut self,
        attribute: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filters.insert(
            attribute.into(),
            Filter::In(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Fix the result set to exactly these ids
    pub fn ids<I: Into<RecordId>>(mut self, ids: impl IntoIterator<Item = I>) -> Self {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the clause constrains anything
    pub fn is_empty(&self) -> bool {
        self.ids.is_none() && self.filters.is_empty()
    }
}

/// Requested result ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Attribute to order by
    pub property: String,
    /// Traversal order
    pub order: SortOrder,
}

impl SortSpec {
    /// Ascending sort on `property`
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            order: SortOrder::Asc,
        }
    }

    /// Descending sort on `property`
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            order: SortOrder::Desc,
        }
    }

    /// Parse the string form: `"value"` ascending, `"-value"` descending
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(property) => Self::desc(property),
            None => Self::asc(spec),
        }
    }
}

/// A filter/sort/pagination request over one entity type
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Conjunctive filters, or explicit ids
    pub where_clause: Option<WhereClause>,
    /// Result ordering
    pub sort: Option<SortSpec>,
    /// Maximum records to return (engine default applies when absent)
    pub limit: Option<usize>,
    /// Records to skip
    pub offset: usize,
    /// Rank cursor: the page strictly before this id
    pub before_id: Option<RecordId>,
    /// Rank cursor: the page strictly after this id
    pub after_id: Option<RecordId>,
    /// Sort-property → key pattern overriding the dynamic-sort field
    /// lookup (e.g. sort by a value kept in a different structure)
    pub custom_sort: Option<BTreeMap<String, String>>,
    /// Explicit index keys replacing the where-clause derivation
    pub custom_indexes: Option<Vec<String>>,
}

impl QueryRequest {
    /// Empty request: the whole collection, engine default page size
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the where clause
    pub fn filter(mut self, clause: WhereClause) -> Self {
        self.where_clause = Some(clause);
        self
    }

    /// Set the sort from its string form (`"prop"` / `"-prop"`)
    pub fn sort_by(mut self, spec: &str) -> Self {
        self.sort = Some(SortSpec::parse(spec));
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

    /// Page strictly before the given id's rank
    pub fn before(mut self, id: impl Into<RecordId>) -> Self {
        self.before_id = Some(id.into());
        self
    }

    /// Page strictly after the given id's rank
    pub fn after(mut self, id: impl Into<RecordId>) -> Self {
        self.after_id = Some(id.into());
        self
    }

    /// Override the dynamic-sort key pattern for a sort property
    pub fn custom_sort(
        mut self,
        property: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        self.custom_sort
            .get_or_insert_with(BTreeMap::new)
            .insert(property.into(), pattern.into());
        self
    }

    /// Replace where-clause derivation with explicit index keys
    pub fn custom_indexes(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.custom_indexes = Some(keys.into_iter().collect());
        self
    }
}
