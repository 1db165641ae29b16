//! # pg-store
//!
//! In-memory key-value store that stateless process groups rendezvous on.
//!
//! Rank 0 of a group usually hosts the store in-process; every rank
//! (including rank 0) then talks to it over TCP. The store is a plain
//! linearizable map with one twist: `GET` on a missing key waits until some
//! client writes it.
//!
//! ## Architecture
//!
//! ```text
//! rank 1 ──┐                     ┌── rank 2
//!          │   TCP (framed       │
//!          │   MessagePack)      │
//!      ┌───┴─────────────────────┴───┐
//!      │          pg-store           │
//!      │  ┌───────────────────────┐  │
//!      │  │  KeyTable (DashMap)   │  │
//!      │  └───────────────────────┘  │
//!      └─────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! One request per frame, one response per request:
//! - SET → DONE
//! - GET → VALUE (deferred until the key exists)
//! - DELETE → DELETED
//! - CHECK → EXISTS
//! - ADD → COUNTER
//! - PING → PONG

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod server;
pub mod session;
pub mod table;

pub use config::Config;
pub use error::{ProtocolError, ServerError};
pub use server::{ServerHandle, StoreMetrics, StoreServer};
pub use table::KeyTable;
