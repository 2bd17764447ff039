//! Core types and traits for Lattice
//!
//! This crate defines the foundational pieces used throughout the
//! engine:
//! - AttrValue / AttrMap / Record: attribute values and materialized
//!   records
//! - EntityDef / IndexDefinition: per-type index declarations
//! - KeySpace / EphemeralKeys: deterministic key naming
//! - StoreClient: the store primitive surface the engine consumes
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod keys;
pub mod schema;
pub mod traits;
pub mod value;

pub use error::{Error, Result};
pub use keys::{ClockEphemeralKeys, EphemeralKeys, KeySpace};
pub use schema::{Dependency, EntityDef, IndexDefinition, IndexSort, ScoreFn, StorageEncoding};
pub use traits::{Aggregate, Command, SortBy, SortOrder, StoreClient};
pub use value::{AttrMap, AttrValue, Record, RecordId};
