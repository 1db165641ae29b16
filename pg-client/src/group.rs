//! StatelessProcessGroup - rendezvous and metadata exchange over a store.
//!
//! A group is `world_size` processes that know their own rank and share a
//! key-value store. Every exchange is a key write by one rank and a
//! blocking key read by another; keys carry per-peer sequence numbers so
//! both sides agree on which value is which without talking to each other.
//!
//! ```text
//!  rank 0                       store                      rank 2
//!  send_obj(42, 2) ──set──▶ send_to/2/0 ◀──get (waits)── recv_obj(0)
//!  broadcast_send  ──set──▶ broadcast_from/0/0 ◀──get──── broadcast_recv(0)
//! ```
//!
//! Nothing here touches process-global state: several groups (with
//! different stores or key prefixes) can coexist in one process.
//!
//! # Example
//!
//! ```ignore
//! use stateless_pg_client::{GroupOptions, StatelessProcessGroup};
//!
//! let mut group =
//!     StatelessProcessGroup::create("10.0.0.1", 29500, rank, 3, GroupOptions::default()).await?;
//!
//! let ranks: Vec<u32> = group.all_gather_obj(&rank).await?;
//! group.barrier().await?;
//! ```

use crate::error::{GroupError, Result};
use crate::options::GroupOptions;
use crate::store::{Store, TcpStore};
use pg_core::{ExpiryLedger, GroupCounters};
use pg_store::{Config, ServerHandle, StoreServer};
use pg_types::{payload, Rank, Seq, StoreKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One member of a stateless process group.
///
/// Operations take `&mut self` and are meant to be called in the same order
/// on every rank.
///
/// A point-to-point or broadcast operation that fails, times out or is
/// dropped before completing leaves the sequence counters untouched and can
/// simply be retried. Collectives span several rounds: an interrupted
/// `all_gather_obj` or `barrier` keeps the rounds it already finished, and
/// the next call of the same collective resumes at the round that failed.
/// Until then, broadcasts and the other collective are refused with
/// [`GroupError::CollectiveInProgress`].
#[derive(Debug)]
pub struct StatelessProcessGroup<S = Arc<TcpStore>> {
    rank: Rank,
    world_size: u32,
    store: S,
    options: GroupOptions,
    counters: GroupCounters,
    ledger: ExpiryLedger,
    collective: Option<PendingCollective>,
    /// Store server hosted by rank 0 when built with [`create`](Self::create).
    server: Option<ServerHandle>,
}

impl StatelessProcessGroup<Arc<TcpStore>> {
    /// Join a group whose store lives at `host:port`.
    ///
    /// Rank 0 starts a store server on that address in this process; every
    /// rank (rank 0 included) then connects to it. Non-hosting ranks retry
    /// until `options.connect_timeout()`, so start order does not matter.
    pub async fn create(
        host: &str,
        port: u16,
        rank: u32,
        world_size: u32,
        options: GroupOptions,
    ) -> Result<Self> {
        validate(rank, world_size)?;

        let address = format!("{host}:{port}");
        let (server, connect_to) = if rank == 0 {
            let handle = StoreServer::start(Config::for_address(address)).await?;
            let local = reachable(handle.local_addr()).to_string();
            (Some(handle), local)
        } else {
            (None, address)
        };

        let store = TcpStore::connect(connect_to, options.connect_timeout()).await?;
        let mut group = Self::new(Arc::new(store), rank, world_size, options)?;
        group.server = server;

        tracing::info!(
            "Rank {} joined group of {} via store at {}",
            rank,
            world_size,
            group.store.address()
        );
        Ok(group)
    }

    /// Address of the store server this rank hosts, if it is rank 0.
    pub fn hosted_store_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::local_addr)
    }
}

impl<S: Store> StatelessProcessGroup<S> {
    /// Build a group member over an existing store.
    pub fn new(store: S, rank: u32, world_size: u32, options: GroupOptions) -> Result<Self> {
        validate(rank, world_size)?;

        Ok(Self {
            rank: Rank::new(rank),
            world_size,
            store,
            counters: GroupCounters::new(world_size),
            ledger: ExpiryLedger::new(options.data_expiration()),
            options,
            collective: None,
            server: None,
        })
    }

    /// This process's rank.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Number of processes in the group.
    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Options the group was built with.
    pub fn options(&self) -> &GroupOptions {
        &self.options
    }

    /// Current sequence counters.
    pub fn counters(&self) -> &GroupCounters {
        &self.counters
    }

    /// Keys this rank wrote that have not been expired yet, oldest first.
    pub fn pending_keys(&self) -> impl Iterator<Item = &str> {
        self.ledger.keys()
    }

    /// True while an interrupted collective is waiting to be resumed.
    pub fn collective_in_progress(&self) -> bool {
        self.collective.is_some()
    }

    // =========================================================================
    // Point-to-point
    // =========================================================================

    /// Send `value` to `dst`. Returns once the store holds it.
    ///
    /// Values sent to the same destination are received in send order.
    pub async fn send_obj<T: Serialize + ?Sized>(&mut self, value: &T, dst: u32) -> Result<()> {
        let dst = self.check_peer(Rank::new(dst))?;
        let bytes = payload::encode(value)?;

        self.expire_data().await?;

        let seq = self.counters.send_dst.current(dst)?;
        let key = self.scoped(&StoreKey::send_to(dst, seq));
        self.store.set(&key, &bytes).await?;

        self.counters.send_dst.advance(dst)?;
        self.ledger.record(key, now());
        tracing::debug!("rank {} send_obj -> {} seq {}", self.rank, dst, seq);
        Ok(())
    }

    /// Receive the next value `src` sent to this rank.
    ///
    /// Waits indefinitely unless the group has a default receive timeout.
    pub async fn recv_obj<T: DeserializeOwned>(&mut self, src: u32) -> Result<T> {
        let limit = self.options.recv_timeout();
        self.recv_within(Rank::new(src), limit).await
    }

    /// [`recv_obj`](Self::recv_obj) bounded by `timeout`.
    pub async fn recv_obj_timeout<T: DeserializeOwned>(
        &mut self,
        src: u32,
        timeout: Duration,
    ) -> Result<T> {
        self.recv_within(Rank::new(src), Some(timeout)).await
    }

    async fn recv_within<T: DeserializeOwned>(&mut self, src: Rank, limit: Option<Duration>) -> Result<T> {
        let src = self.check_peer(src)?;

        // The key names only the destination, so every sender to this rank
        // draws from one sequence. Concurrent senders must coordinate.
        let seq = self.counters.recv_src.current(src)?;
        let key = self.scoped(&StoreKey::send_to(self.rank, seq));
        let bytes = self.fetch(key, limit).await?;
        let value = payload::decode(&bytes)?;

        self.counters.recv_src.advance(src)?;
        tracing::debug!("rank {} recv_obj <- {} seq {}", self.rank, src, seq);
        Ok(value)
    }

    // =========================================================================
    // Broadcast
    // =========================================================================

    /// Publish `value` as broadcast source `src`, which must be this rank.
    ///
    /// Returns the value so the source ends up holding the same thing as
    /// every receiver.
    pub async fn broadcast_send<T: Serialize>(&mut self, value: T, src: u32) -> Result<T> {
        let src = self.check_peer(Rank::new(src))?;
        if src != self.rank {
            return Err(GroupError::NotBroadcastSource {
                rank: self.rank,
                src,
            });
        }
        self.ensure_no_collective("broadcast_send")?;
        let bytes = payload::encode(&value)?;

        let seq = self.publish_broadcast(&bytes).await?;
        tracing::debug!("rank {} broadcast_send seq {}", self.rank, seq);
        Ok(value)
    }

    /// Receive the next broadcast from `src`, which must not be this rank.
    pub async fn broadcast_recv<T: DeserializeOwned>(&mut self, src: u32) -> Result<T> {
        let limit = self.options.recv_timeout();
        self.broadcast_recv_within(Rank::new(src), limit).await
    }

    /// [`broadcast_recv`](Self::broadcast_recv) bounded by `timeout`.
    pub async fn broadcast_recv_timeout<T: DeserializeOwned>(
        &mut self,
        src: u32,
        timeout: Duration,
    ) -> Result<T> {
        self.broadcast_recv_within(Rank::new(src), Some(timeout)).await
    }

    async fn broadcast_recv_within<T: DeserializeOwned>(
        &mut self,
        src: Rank,
        limit: Option<Duration>,
    ) -> Result<T> {
        let src = self.check_peer(src)?;
        if src == self.rank {
            return Err(GroupError::BroadcastToSelf { rank: self.rank });
        }
        self.ensure_no_collective("broadcast_recv")?;

        let (bytes, seq) = self.fetch_broadcast(src, limit).await?;
        let value = payload::decode(&bytes)?;

        self.counters.broadcast_recv_src.advance(src)?;
        tracing::debug!("rank {} broadcast_recv <- {} seq {}", self.rank, src, seq);
        Ok(value)
    }

    /// Broadcast in one call for every rank.
    ///
    /// The source passes `Some(value)`; everyone else may pass `None`. A
    /// value supplied by a non-source rank is ignored.
    pub async fn broadcast_obj<T>(&mut self, value: Option<T>, src: u32) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if src == self.rank.value() {
            let value = value.ok_or(GroupError::MissingBroadcastValue {
                src: Rank::new(src),
            })?;
            self.broadcast_send(value, src).await
        } else {
            if value.is_some() {
                tracing::debug!(
                    "rank {} ignoring value passed to broadcast_obj from {}",
                    self.rank,
                    src
                );
            }
            self.broadcast_recv(src).await
        }
    }

    // =========================================================================
    // Collectives
    // =========================================================================

    /// Gather one value from every rank, ordered by rank.
    pub async fn all_gather_obj<T>(&mut self, value: &T) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let limit = self.options.recv_timeout();
        self.all_gather_within(value, limit).await
    }

    /// [`all_gather_obj`](Self::all_gather_obj) with each wait bounded by `timeout`.
    pub async fn all_gather_obj_timeout<T>(&mut self, value: &T, timeout: Duration) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        self.all_gather_within(value, Some(timeout)).await
    }

    async fn all_gather_within<T>(&mut self, value: &T, limit: Option<Duration>) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let own = payload::encode(value)?;
        let gathered = self.run_collective(Collective::AllGather, own, limit).await?;
        gathered
            .iter()
            .map(|bytes| payload::decode(bytes).map_err(GroupError::from))
            .collect()
    }

    /// Block until every rank has entered the barrier.
    pub async fn barrier(&mut self) -> Result<()> {
        let limit = self.options.recv_timeout();
        self.barrier_within(limit).await
    }

    /// [`barrier`](Self::barrier) with each wait bounded by `timeout`.
    pub async fn barrier_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.barrier_within(Some(timeout)).await
    }

    async fn barrier_within(&mut self, limit: Option<Duration>) -> Result<()> {
        let own = payload::encode(&())?;
        self.run_collective(Collective::Barrier, own, limit).await?;
        tracing::debug!("rank {} passed barrier", self.rank);
        Ok(())
    }

    /// One broadcast round per rank, in rank order.
    ///
    /// Progress is written into `self.collective` after every round, so an
    /// error or a dropped future leaves the finished rounds recorded and the
    /// next call of the same kind picks up where this one stopped. `own` is
    /// only published if this rank's round has not happened yet.
    async fn run_collective(
        &mut self,
        kind: Collective,
        own: Vec<u8>,
        limit: Option<Duration>,
    ) -> Result<Vec<Vec<u8>>> {
        match self.collective.as_ref().map(|p| (p.kind, p.gathered.len())) {
            Some((pending, _)) if pending != kind => {
                return Err(GroupError::CollectiveInProgress {
                    pending: pending.name(),
                    requested: kind.name(),
                })
            }
            Some((_, round)) => tracing::debug!(
                "rank {} resuming {} at round {}",
                self.rank,
                kind.name(),
                round
            ),
            None => {
                self.collective = Some(PendingCollective {
                    kind,
                    gathered: Vec::with_capacity(self.world_size as usize),
                })
            }
        }

        while let Some(src) = self.next_round() {
            let bytes = if src == self.rank {
                self.publish_broadcast(&own).await?;
                own.clone()
            } else {
                let (bytes, _) = self.fetch_broadcast(src, limit).await?;
                self.counters.broadcast_recv_src.advance(src)?;
                bytes
            };
            if let Some(pending) = self.collective.as_mut() {
                pending.gathered.push(bytes);
            }
        }

        Ok(self
            .collective
            .take()
            .map(|pending| pending.gathered)
            .unwrap_or_default())
    }

    fn next_round(&self) -> Option<Rank> {
        let pending = self.collective.as_ref()?;
        let round = pending.gathered.len() as u32;
        (round < self.world_size).then(|| Rank::new(round))
    }

    // =========================================================================
    // Expiration
    // =========================================================================

    /// Delete keys this rank wrote more than `data_expiration` ago.
    ///
    /// Runs automatically before every send. Returns how many keys were
    /// removed. A failed delete stops the sweep and leaves the key queued.
    pub async fn expire_data(&mut self) -> Result<usize> {
        if self.ledger.is_empty() {
            return Ok(0);
        }

        let now = now();
        let mut removed = 0;

        while let Some(key) = self.ledger.oldest_expired(now).map(str::to_owned) {
            self.store.delete_key(&key).await?;
            self.ledger.pop_oldest();
            removed += 1;
            tracing::debug!("rank {} expired {}", self.rank, key);
        }

        if removed > 0 {
            tracing::trace!("rank {} still tracks {} keys", self.rank, self.ledger.len());
        }
        Ok(removed)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Write the next broadcast key of this rank. Advances the counter only
    /// once the store has acknowledged the write.
    async fn publish_broadcast(&mut self, bytes: &[u8]) -> Result<Seq> {
        self.expire_data().await?;

        let seq = self.counters.broadcast_send;
        let key = self.scoped(&StoreKey::broadcast_from(self.rank, seq));
        self.store.set(&key, bytes).await?;

        self.counters.advance_broadcast_send();
        self.ledger.record(key, now());
        Ok(seq)
    }

    /// Wait for the next broadcast from `src`. The caller advances the
    /// counter once it has accepted the value.
    async fn fetch_broadcast(&self, src: Rank, limit: Option<Duration>) -> Result<(Vec<u8>, Seq)> {
        let seq = self.counters.broadcast_recv_src.current(src)?;
        let key = self.scoped(&StoreKey::broadcast_from(src, seq));
        Ok((self.fetch(key, limit).await?, seq))
    }

    fn ensure_no_collective(&self, requested: &'static str) -> Result<()> {
        match &self.collective {
            Some(pending) => Err(GroupError::CollectiveInProgress {
                pending: pending.kind.name(),
                requested,
            }),
            None => Ok(()),
        }
    }

    fn check_peer(&self, peer: Rank) -> Result<Rank> {
        if peer.value() < self.world_size {
            Ok(peer)
        } else {
            Err(GroupError::InvalidRank {
                rank: peer.value(),
                world_size: self.world_size,
            })
        }
    }

    /// Store key for `key`, namespaced when a key prefix is configured.
    /// Produces the same layout as wrapping the store in a `PrefixStore`.
    fn scoped(&self, key: &StoreKey) -> String {
        match self.options.key_prefix() {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    async fn fetch(&self, key: String, limit: Option<Duration>) -> Result<Vec<u8>> {
        tracing::trace!("rank {} waiting for {}", self.rank, key);
        match limit {
            None => Ok(self.store.get(&key).await?),
            Some(waited) => match tokio::time::timeout(waited, self.store.get(&key)).await {
                Ok(value) => Ok(value?),
                Err(_) => Err(GroupError::Timeout { key, waited }),
            },
        }
    }
}

/// Multi-round operations built from broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collective {
    AllGather,
    Barrier,
}

impl Collective {
    fn name(self) -> &'static str {
        match self {
            Collective::AllGather => "all_gather",
            Collective::Barrier => "barrier",
        }
    }
}

/// Rounds of an interrupted collective, one encoded value per finished
/// round. The next round is `gathered.len()`.
#[derive(Debug)]
struct PendingCollective {
    kind: Collective,
    gathered: Vec<Vec<u8>>,
}

fn validate(rank: u32, world_size: u32) -> Result<()> {
    if rank < world_size {
        Ok(())
    } else {
        Err(GroupError::InvalidRank { rank, world_size })
    }
}

/// Current instant on the tokio clock, so paused-time tests can age keys.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Turn a wildcard listen address into one a client can dial.
fn reachable(mut addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => addr.set_ip(Ipv4Addr::LOCALHOST.into()),
        IpAddr::V6(ip) if ip.is_unspecified() => addr.set_ip(Ipv6Addr::LOCALHOST.into()),
        _ => {}
    }
    addr
}
