//! Process group errors.

use crate::store::StoreError;
use pg_core::CounterError;
use pg_types::{Rank, WireError};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by process group operations.
#[derive(Debug, Error)]
pub enum GroupError {
    /// Rank outside `0..world_size`, or an empty group.
    #[error("rank {rank} is not valid for world size {world_size}")]
    InvalidRank {
        /// The offending rank.
        rank: u32,
        /// Size of the group.
        world_size: u32,
    },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] WireError),

    /// A bounded wait expired before the peer wrote the key.
    #[error("timed out after {waited:?} waiting for {key}")]
    Timeout {
        /// Key that never appeared.
        key: String,
        /// The bound that was exceeded.
        waited: Duration,
    },

    /// Only the source rank may originate a broadcast.
    #[error("rank {rank} cannot broadcast on behalf of rank {src}")]
    NotBroadcastSource {
        /// This rank.
        rank: Rank,
        /// The declared source.
        src: Rank,
    },

    /// The source rank of a broadcast does not receive it.
    #[error("rank {rank} is the broadcast source and cannot receive from itself")]
    BroadcastToSelf {
        /// This rank.
        rank: Rank,
    },

    /// The broadcast source supplied no value.
    #[error("rank {src} is the broadcast source but supplied no value")]
    MissingBroadcastValue {
        /// The source rank.
        src: Rank,
    },

    /// An interrupted collective must be finished before broadcast
    /// channels can be used for anything else.
    #[error("{pending} was interrupted and must be resumed before {requested}")]
    CollectiveInProgress {
        /// The interrupted collective.
        pending: &'static str,
        /// The operation that was refused.
        requested: &'static str,
    },

    /// Could not host the store on rank 0.
    #[error("store server error: {0}")]
    Server(#[from] pg_store::ServerError),

    /// Data-plane communicator failure.
    #[error("communicator error: {0}")]
    Communicator(String),
}

impl From<CounterError> for GroupError {
    fn from(e: CounterError) -> Self {
        match e {
            CounterError::PeerOutOfRange { peer, world_size } => GroupError::InvalidRank {
                rank: peer.value(),
                world_size,
            },
        }
    }
}

/// Result type alias for group operations.
pub type Result<T> = std::result::Result<T, GroupError>;
