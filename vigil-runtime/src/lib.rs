//! NetVigil runtime
//!
//! The update scheduler: a periodic engine that drains the evidence
//! queue, routes it through the belief registry, advances every filter,
//! and pushes the resulting snapshot to the graph store.

pub mod engine;

pub use engine::*;
