//! The store key namespace.
//!
//! Every value exchanged through the store lives under one of two key shapes:
//!
//! ```text
//! send_to/{dst_rank}/{seq}          point-to-point payload for dst_rank
//! broadcast_from/{src_rank}/{seq}   broadcast payload from src_rank
//! ```
//!
//! Peers built elsewhere read and write the same strings, so the format is
//! fixed.

use std::fmt;

use crate::{Rank, Seq};

const SEND_TO: &str = "send_to";
const BROADCAST_FROM: &str = "broadcast_from";

/// A key in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Point-to-point payload addressed to `dst`.
    SendTo {
        /// Receiving rank.
        dst: Rank,
        /// Sequence number on the channel into `dst`.
        seq: Seq,
    },
    /// Broadcast payload published by `src`.
    BroadcastFrom {
        /// Broadcasting rank.
        src: Rank,
        /// Sequence number of the broadcast round.
        seq: Seq,
    },
}

impl StoreKey {
    /// Key for the `seq`-th point-to-point value into `dst`.
    pub fn send_to(dst: Rank, seq: Seq) -> Self {
        StoreKey::SendTo { dst, seq }
    }

    /// Key for the `seq`-th broadcast published by `src`.
    pub fn broadcast_from(src: Rank, seq: Seq) -> Self {
        StoreKey::BroadcastFrom { src, seq }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::SendTo { dst, seq } => write!(f, "{SEND_TO}/{dst}/{seq}"),
            StoreKey::BroadcastFrom { src, seq } => write!(f, "{BROADCAST_FROM}/{src}/{seq}"),
        }
    }
}
