//! Identity and ordering types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a process within a group, `0..world_size`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank(u32);

impl Rank {
    /// Create a rank from its index.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw rank value.
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Index form, for addressing per-peer tables.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Iterate over every rank of a group of `world_size` processes.
    pub fn all(world_size: u32) -> impl Iterator<Item = Rank> {
        (0..world_size).map(Rank)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rank({})", self.0)
    }
}

/// Per-channel sequence number.
///
/// Sequence numbers start at zero and increase by one per exchanged value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Seq(u64);

impl Seq {
    /// Create a sequence number.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The first sequence number of every channel.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Get the raw value.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The sequence number that follows this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

/// Identifier handed to a data-plane communicator during bootstrap.
///
/// UUID v4 format (16 bytes). Rank 0 generates one and broadcasts it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueId(uuid::Uuid);

impl UniqueId {
    /// Create a new random UniqueId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({})", &self.to_string()[..8])
    }
}
