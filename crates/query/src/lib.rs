//! Query compilation and execution for Lattice
//!
//! A request flows through three stages:
//! 1. [`request`]: the declarative form callers build
//! 2. [`plan`]: pure compilation into set algebra and a sort path
//! 3. [`executor`]: plan execution, ephemeral materialization, record
//!    resolution
//!
//! [`federate`] sits beside the pipeline: it combines arbitrary index
//! keys rather than compiling from filters, and reuses the executor for
//! reading and resolution.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod executor;
pub mod federate;
pub mod plan;
pub mod request;

pub use executor::{IndexEntry, IndexReadOptions, QueryExecutor, DEFAULT_LIMIT, EPHEMERAL_TTL};
pub use federate::{FederateMode, FederateRequest, Federator, ScoreConversion};
pub use plan::{compile, Operand, PostSort, QueryPlan};
pub use request::{Filter, QueryRequest, SortSpec, WhereClause};
