//! # pg-core
//!
//! Pure logic for stateless process groups (no I/O, instant tests).
//!
//! This crate holds the bookkeeping a group keeps between store round trips:
//! per-peer sequence counters and the ledger of keys awaiting expiration.
//! Nothing here touches the network or the clock; callers pass instants in.
//!
//! The actual store I/O is performed by `pg-client`, which consults these
//! structures to build keys and decide what to delete.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counters;
pub mod ledger;

pub use counters::{CounterError, GroupCounters, PeerCounters};
pub use ledger::ExpiryLedger;
