//! Index maintenance for Lattice
//!
//! Two surfaces:
//! - [`IndexMaintainer`]: declarative per-entity maintenance driven by
//!   attribute snapshots and the entity's index definitions
//! - [`IndexHandle`]: imperative operations against one explicit index
//!   key

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handle;
pub mod maintainer;

pub use handle::IndexHandle;
pub use maintainer::{IndexMaintainer, IndexOp};
