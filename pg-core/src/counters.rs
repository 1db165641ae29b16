//! Per-peer sequence counters.
//!
//! Every exchange channel (point-to-point into a destination, out of a
//! source, or a broadcast source) carries a sequence number that starts at
//! zero and advances by exactly one per completed operation. Both ends of a
//! channel walk the same sequence, so the n-th value written is the n-th
//! value read.
//!
//! Counters are only advanced after the store round trip succeeds, so an
//! operation that fails or is cancelled can be retried on the same key.

use pg_types::{Rank, Seq};
use thiserror::Error;

/// Counter lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    /// Peer rank outside `0..world_size`.
    #[error("rank {peer} out of range for world size {world_size}")]
    PeerOutOfRange {
        /// The offending rank.
        peer: Rank,
        /// Size of the group.
        world_size: u32,
    },
}

/// One sequence counter per peer rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCounters {
    next: Vec<Seq>,
}

impl PeerCounters {
    /// Create counters for `world_size` peers, all at zero.
    pub fn new(world_size: u32) -> Self {
        Self {
            next: vec![Seq::zero(); world_size as usize],
        }
    }

    /// Number of peers tracked.
    pub fn world_size(&self) -> u32 {
        self.next.len() as u32
    }

    /// The sequence number the next operation with `peer` will use.
    pub fn current(&self, peer: Rank) -> Result<Seq, CounterError> {
        self.next
            .get(peer.index())
            .copied()
            .ok_or(CounterError::PeerOutOfRange {
                peer,
                world_size: self.world_size(),
            })
    }

    /// Record a completed operation with `peer`.
    pub fn advance(&mut self, peer: Rank) -> Result<Seq, CounterError> {
        let world_size = self.world_size();
        let slot = self
            .next
            .get_mut(peer.index())
            .ok_or(CounterError::PeerOutOfRange { peer, world_size })?;
        *slot = slot.next();
        Ok(*slot)
    }

    /// True when no operation has completed with any peer.
    pub fn all_zero(&self) -> bool {
        self.next.iter().all(|s| *s == Seq::zero())
    }
}

/// Every counter a group member keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCounters {
    /// Destination rank → next sequence number for sends to it.
    pub send_dst: PeerCounters,
    /// Source rank → next sequence number expected from it.
    pub recv_src: PeerCounters,
    /// Next sequence number for broadcasts this rank originates.
    pub broadcast_send: Seq,
    /// Source rank → next broadcast sequence number expected from it.
    pub broadcast_recv_src: PeerCounters,
}

impl GroupCounters {
    /// Fresh counters for a group of `world_size` ranks.
    pub fn new(world_size: u32) -> Self {
        Self {
            send_dst: PeerCounters::new(world_size),
            recv_src: PeerCounters::new(world_size),
            broadcast_send: Seq::zero(),
            broadcast_recv_src: PeerCounters::new(world_size),
        }
    }

    /// Record a completed broadcast originated by this rank.
    pub fn advance_broadcast_send(&mut self) -> Seq {
        self.broadcast_send = self.broadcast_send.next();
        self.broadcast_send
    }

    /// True when nothing has been exchanged yet.
    pub fn is_fresh(&self) -> bool {
        self.send_dst.all_zero()
            && self.recv_src.all_zero()
            && self.broadcast_send == Seq::zero()
            && self.broadcast_recv_src.all_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let counters = PeerCounters::new(4);
        for rank in Rank::all(4) {
            assert_eq!(counters.current(rank).unwrap(), Seq::zero());
        }
        assert!(counters.all_zero());
    }

    #[test]
    fn advance_moves_only_that_peer() {
        let mut counters = PeerCounters::new(3);

        counters.advance(Rank::new(1)).unwrap();
        counters.advance(Rank::new(1)).unwrap();

        assert_eq!(counters.current(Rank::new(0)).unwrap(), Seq::new(0));
        assert_eq!(counters.current(Rank::new(1)).unwrap(), Seq::new(2));
        assert_eq!(counters.current(Rank::new(2)).unwrap(), Seq::new(0));
    }

    #[test]
    fn advance_returns_new_value() {
        let mut counters = PeerCounters::new(1);
        assert_eq!(counters.advance(Rank::new(0)).unwrap(), Seq::new(1));
        assert_eq!(counters.advance(Rank::new(0)).unwrap(), Seq::new(2));
    }

    #[test]
    fn out_of_range_peer_is_rejected() {
        let mut counters = PeerCounters::new(2);
        let expected = CounterError::PeerOutOfRange {
            peer: Rank::new(2),
            world_size: 2,
        };

        assert_eq!(counters.current(Rank::new(2)), Err(expected.clone()));
        assert_eq!(counters.advance(Rank::new(2)), Err(expected));
        assert!(counters.all_zero());
    }

    #[test]
    fn group_counters_are_independent() {
        let mut counters = GroupCounters::new(2);
        assert!(counters.is_fresh());

        counters.send_dst.advance(Rank::new(1)).unwrap();
        assert_eq!(counters.recv_src.current(Rank::new(1)).unwrap(), Seq::zero());
        assert_eq!(
            counters.broadcast_recv_src.current(Rank::new(1)).unwrap(),
            Seq::zero()
        );
        assert!(!counters.is_fresh());
    }

    #[test]
    fn broadcast_send_counter_advances() {
        let mut counters = GroupCounters::new(1);
        assert_eq!(counters.advance_broadcast_send(), Seq::new(1));
        assert_eq!(counters.advance_broadcast_send(), Seq::new(2));
        assert_eq!(counters.broadcast_send, Seq::new(2));
    }

    #[test]
    fn single_rank_group() {
        let counters = GroupCounters::new(1);
        assert_eq!(counters.send_dst.world_size(), 1);
        assert!(counters.send_dst.current(Rank::new(0)).is_ok());
    }
}
