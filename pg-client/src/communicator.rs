//! Data-plane communicator boundary.
//!
//! A process group only exchanges small metadata. Bulk collectives belong
//! to a separate communicator (GPU collective library, MPI, ...) that the
//! group bootstraps by broadcasting a [`UniqueId`] from rank 0.
//!
//! [`HostCommunicator`] implements the boundary on top of the group itself.
//! It is meant for tests and metadata-sized buffers, not for tensors.

use crate::error::{GroupError, Result};
use crate::group::StatelessProcessGroup;
use crate::store::{PrefixStore, Store};
use async_trait::async_trait;
use pg_types::UniqueId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Elementwise reduction applied by [`Communicator::all_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceOp {
    /// Sum of all contributions.
    Sum,
    /// Product of all contributions.
    Prod,
    /// Smallest contribution.
    Min,
    /// Largest contribution.
    Max,
}

/// Scalar types a communicator can reduce.
pub trait Element: Copy + PartialOrd + Serialize + DeserializeOwned + Send + Sync {
    /// Combine two values under `op`.
    fn reduce(self, other: Self, op: ReduceOp) -> Self;
}

// Integer arithmetic wraps, matching what collective libraries do.
macro_rules! int_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                fn reduce(self, other: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => self.wrapping_add(other),
                        ReduceOp::Prod => self.wrapping_mul(other),
                        ReduceOp::Min => self.min(other),
                        ReduceOp::Max => self.max(other),
                    }
                }
            }
        )*
    };
}

macro_rules! float_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                fn reduce(self, other: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => self + other,
                        ReduceOp::Prod => self * other,
                        ReduceOp::Min => self.min(other),
                        ReduceOp::Max => self.max(other),
                    }
                }
            }
        )*
    };
}

int_element!(i8, i16, i32, i64, u8, u16, u32, u64);
float_element!(f32, f64);

/// Collective operations over a fixed set of ranks.
#[async_trait]
pub trait Communicator: Send {
    /// This process's rank.
    fn rank(&self) -> u32;

    /// Number of participating ranks.
    fn world_size(&self) -> u32;

    /// Reduce `buffer` elementwise across every rank, in place.
    ///
    /// Every rank must call this with a buffer of the same length.
    async fn all_reduce<T: Element>(&mut self, buffer: &mut [T], op: ReduceOp) -> Result<()>;
}

/// Communicator that moves data through the group's own store.
#[derive(Debug)]
pub struct HostCommunicator<S> {
    group: StatelessProcessGroup<PrefixStore<S>>,
    unique_id: UniqueId,
}

impl<S: Store + Clone> HostCommunicator<S> {
    /// Set up a communicator for every rank of `group`.
    ///
    /// Collective: all ranks must call it at the same point. Rank 0 draws
    /// the [`UniqueId`] and broadcasts it; subsequent traffic is namespaced
    /// under that id so it never collides with the parent group's keys.
    pub async fn new(group: &mut StatelessProcessGroup<S>) -> Result<Self> {
        let proposal = (group.rank().value() == 0).then(UniqueId::new);
        let unique_id = group.broadcast_obj(proposal, 0).await?;

        let store = PrefixStore::new(format!("comm/{unique_id}"), group.store().clone());
        tracing::debug!("rank {} joined communicator under {}", group.rank(), store.prefix());
        let inner = StatelessProcessGroup::new(
            store,
            group.rank().value(),
            group.world_size(),
            group.options().clone(),
        )?;

        Ok(Self {
            group: inner,
            unique_id,
        })
    }

    /// The id rank 0 broadcast during setup.
    pub fn unique_id(&self) -> UniqueId {
        self.unique_id
    }
}

#[async_trait]
impl<S: Store + Clone> Communicator for HostCommunicator<S> {
    fn rank(&self) -> u32 {
        self.group.rank().value()
    }

    fn world_size(&self) -> u32 {
        self.group.world_size()
    }

    async fn all_reduce<T: Element>(&mut self, buffer: &mut [T], op: ReduceOp) -> Result<()> {
        let gathered: Vec<Vec<T>> = self.group.all_gather_obj(&buffer.to_vec()).await?;

        if let Some((rank, contribution)) = gathered
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != buffer.len())
        {
            return Err(GroupError::Communicator(format!(
                "rank {} contributed {} elements, expected {}",
                rank,
                contribution.len(),
                buffer.len()
            )));
        }

        // Fold in rank order so every rank computes bit-identical results.
        let mut contributions = gathered.into_iter();
        if let Some(first) = contributions.next() {
            buffer.copy_from_slice(&first);
        }
        for contribution in contributions {
            for (slot, value) in buffer.iter_mut().zip(contribution) {
                *slot = slot.reduce(value, op);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::GroupOptions;
    use crate::store::MemoryStore;

    /// Run one all_reduce per rank concurrently and collect the buffers.
    async fn all_reduce_on_every_rank<T>(inputs: Vec<Vec<T>>, op: ReduceOp) -> Vec<Result<Vec<T>>>
    where
        T: Element + 'static,
    {
        let store = MemoryStore::new();
        let world_size = inputs.len() as u32;

        let tasks: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(rank, mut buffer)| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut group = StatelessProcessGroup::new(
                        store,
                        rank as u32,
                        world_size,
                        GroupOptions::default(),
                    )?;
                    let mut comm = HostCommunicator::new(&mut group).await?;
                    comm.all_reduce(&mut buffer, op).await?;
                    Ok::<_, GroupError>(buffer)
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        results
    }

    #[test]
    fn element_reductions() {
        assert_eq!(3i32.reduce(4, ReduceOp::Sum), 7);
        assert_eq!(3i32.reduce(4, ReduceOp::Prod), 12);
        assert_eq!(3i32.reduce(-4, ReduceOp::Min), -4);
        assert_eq!(3u8.reduce(4, ReduceOp::Max), 4);
        assert_eq!(u8::MAX.reduce(1, ReduceOp::Sum), 0);
        assert_eq!(1.5f64.reduce(2.0, ReduceOp::Prod), 3.0);
        assert_eq!(1.5f32.reduce(-2.0, ReduceOp::Min), -2.0);
    }

    #[tokio::test]
    async fn sum_across_three_ranks() {
        let results =
            all_reduce_on_every_rank(vec![vec![1i64, 10], vec![2, 20], vec![3, 30]], ReduceOp::Sum)
                .await;

        for result in results {
            assert_eq!(result.unwrap(), vec![6, 60]);
        }
    }

    #[tokio::test]
    async fn max_and_min() {
        let results =
            all_reduce_on_every_rank(vec![vec![5u32, 1], vec![2, 9]], ReduceOp::Max).await;
        for result in results {
            assert_eq!(result.unwrap(), vec![5, 9]);
        }

        let results =
            all_reduce_on_every_rank(vec![vec![0.5f64], vec![-1.5], vec![2.0]], ReduceOp::Min)
                .await;
        for result in results {
            assert_eq!(result.unwrap(), vec![-1.5]);
        }
    }

    #[tokio::test]
    async fn mismatched_lengths_fail_everywhere() {
        let results =
            all_reduce_on_every_rank(vec![vec![1i32, 2], vec![3]], ReduceOp::Sum).await;

        for result in results {
            assert!(matches!(result, Err(GroupError::Communicator(_))));
        }
    }

    #[tokio::test]
    async fn ranks_share_the_unique_id() {
        let store = MemoryStore::new();
        let mut g0 = StatelessProcessGroup::new(store.clone(), 0, 2, GroupOptions::default()).unwrap();
        let mut g1 = StatelessProcessGroup::new(store.clone(), 1, 2, GroupOptions::default()).unwrap();

        let (c0, c1) = tokio::join!(HostCommunicator::new(&mut g0), HostCommunicator::new(&mut g1));
        let (mut c0, mut c1) = (c0.unwrap(), c1.unwrap());

        assert_eq!(c0.unique_id(), c1.unique_id());
        assert_eq!(c1.rank(), 1);
        assert_eq!(c0.world_size(), 2);

        let mut a = [1.0f32, 2.0];
        let mut b = [3.0f32, 4.0];
        let (r0, r1) = tokio::join!(
            c0.all_reduce(&mut a, ReduceOp::Sum),
            c1.all_reduce(&mut b, ReduceOp::Sum)
        );
        r0.unwrap();
        r1.unwrap();
        assert_eq!(a, [4.0, 6.0]);
        assert_eq!(b, [4.0, 6.0]);

        let prefix = format!("comm/{}/", c0.unique_id());
        assert!(store.keys().iter().any(|k| k.starts_with(&prefix)));
        // Parent group only carries the id broadcast.
        assert_eq!(g0.counters().broadcast_send.value(), 1);
        assert_eq!(g1.counters().broadcast_recv_src.current(pg_types::Rank::new(0)).unwrap().value(), 1);
    }
}
