//! # pg-client
//!
//! Stateless process groups: rendezvous and metadata exchange for a fixed
//! set of cooperating processes, built on nothing but a shared key-value
//! store.
//!
//! ## Features
//!
//! - **Point-to-point**: FIFO `send_obj` / `recv_obj` between any two ranks
//! - **Collectives**: broadcast, all-gather and barrier over the same keys
//! - **No global state**: any number of groups per process
//! - **Bounded memory**: each rank expires the keys it wrote
//! - **Pluggable stores**: TCP (`pg-store`), in-memory, prefixed
//!
//! ## Example
//!
//! ```ignore
//! use stateless_pg_client::{GroupOptions, StatelessProcessGroup};
//!
//! let mut group =
//!     StatelessProcessGroup::create("10.0.0.1", 29500, rank, world_size, GroupOptions::default())
//!         .await?;
//!
//! if rank == 0 {
//!     group.send_obj(&42u32, 2).await?;
//! } else if rank == 2 {
//!     let answer: u32 = group.recv_obj(0).await?;
//! }
//! group.barrier().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod communicator;
pub mod error;
pub mod group;
pub mod options;
pub mod store;

pub use communicator::{Communicator, Element, HostCommunicator, ReduceOp};
pub use error::GroupError;
pub use group::StatelessProcessGroup;
pub use options::GroupOptions;
pub use pg_types::{Rank, UniqueId};
pub use store::{MemoryStore, PrefixStore, Store, StoreError, TcpStore};
