//! In-memory store for Lattice
//!
//! Reference implementation of the [`StoreClient`] trait from
//! `lattice-core`. The whole engine is exercised against this store in
//! tests; a networked client would live beside it implementing the same
//! trait.
//!
//! [`StoreClient`]: lattice_core::traits::StoreClient

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;

pub use memory::MemoryStore;
