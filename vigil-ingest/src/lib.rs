//! NetVigil evidence ingestion
//!
//! Accepts sensor connections over TCP, decodes the fixed-frame wire
//! protocol, and appends decoded flow summaries to the shared evidence
//! queue. One worker task per connection; faults are local to the
//! connection that raised them.

pub mod server;

pub use server::*;
