//! # pg-types
//!
//! Wire types for the stateless process group rendezvous protocol.
//!
//! This crate provides the foundational types used across all crates:
//! - [`Rank`], [`Seq`], [`UniqueId`] - Identity and ordering types
//! - [`StoreKey`] - The key namespace shared by every peer
//! - [`StoreRequest`], [`StoreResponse`] - Key-value store protocol messages
//! - [`frame`] - Length-prefixed framing for the store protocol
//! - [`payload`] - MessagePack encoding of user values
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod frame;
mod ids;
mod key;
mod messages;
pub mod payload;

pub use error::WireError;
pub use frame::MAX_FRAME_SIZE;
pub use ids::{Rank, Seq, UniqueId};
pub use key::StoreKey;
pub use messages::{StoreRequest, StoreResponse};
