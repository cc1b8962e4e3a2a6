//! NetVigil Core - belief filters and evidence domain model
//!
//! This crate provides the foundational primitives:
//! - Two-state Bayesian existence filters for hosts and connections
//! - Host and connection identities with flow-record parsing
//! - The fixed-frame sensor wire codec
//! - The shared evidence queue and the belief registry

pub mod belief;
pub mod flow;
pub mod queue;
pub mod registry;
pub mod wire;

pub use belief::*;
pub use flow::*;
pub use queue::*;
pub use registry::*;
pub use wire::*;

/// Seconds between belief update cycles
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 5;

/// Seconds a sensor connection may stay idle before it is closed
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Likelihood above which an entity is considered to exist
pub const LIKELY_THRESHOLD: f64 = 0.5;
