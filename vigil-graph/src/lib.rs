//! NetVigil graph persistence layer
//!
//! The belief engine persists host and connection likelihoods to a graph
//! store every cycle. This crate provides:
//! - The `GraphStore` trait and upsert payload types
//! - A Neo4j implementation over the transactional HTTP API
//! - An in-memory store for tests and dry runs

pub mod memory;
pub mod neo4j;
pub mod store;

pub use memory::*;
pub use neo4j::*;
pub use store::*;
