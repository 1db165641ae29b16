//! Store server: owns the key table and accepts client connections.

use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::session::Session;
use crate::table::KeyTable;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};

/// Operational metrics for monitoring store activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Total requests handled (any kind).
    pub requests_total: AtomicU64,
    /// Total SET requests applied.
    pub sets_total: AtomicU64,
    /// Total GET requests answered.
    pub gets_total: AtomicU64,
    /// GET requests that had to wait for their key.
    pub gets_waited: AtomicU64,
    /// Total DELETE requests handled.
    pub deletes_total: AtomicU64,
    /// Total connections accepted.
    pub connections_total: AtomicU64,
    /// Connections refused because `max_connections` was reached.
    pub connections_rejected: AtomicU64,
    /// Value bytes received in SET requests.
    pub bytes_received: AtomicU64,
    /// Value bytes sent in GET responses.
    pub bytes_sent: AtomicU64,
    /// Requests rejected or connections dropped for protocol errors.
    pub errors_total: AtomicU64,
}

impl StoreMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, amount: usize) {
        counter.fetch_add(amount as u64, Ordering::Relaxed);
    }
}

/// The key-value store server.
#[derive(Debug)]
pub struct StoreServer {
    config: Config,
    table: KeyTable,
    metrics: StoreMetrics,
    active: AtomicUsize,
    started: Instant,
}

impl StoreServer {
    /// Create a server with an empty table.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            table: KeyTable::new(),
            metrics: StoreMetrics::default(),
            active: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared key table.
    pub fn table(&self) -> &KeyTable {
        &self.table
    }

    /// Operational metrics.
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Number of currently open client connections.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Time since this server was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// The returned handle stops the server when dropped.
    pub async fn start(config: Config) -> Result<ServerHandle> {
        let server = Arc::new(Self::new(config));
        let listener = server.bind().await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("pg-store listening on {}", local_addr);

        let task = tokio::spawn({
            let server = server.clone();
            async move {
                server.serve(listener).await;
            }
        });

        Ok(ServerHandle {
            local_addr,
            server,
            task,
        })
    }

    /// Bind the configured address and serve until the task is cancelled.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = self.bind().await?;
        tracing::info!("pg-store listening on {}", listener.local_addr()?);
        self.serve(listener).await;
        Ok(())
    }

    async fn bind(&self) -> Result<TcpListener> {
        let address = &self.config.server.bind_address;
        TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })
    }

    /// Accept loop. Sessions live in a `JoinSet` so they are aborted
    /// together with this future.
    async fn serve(self: Arc<Self>, listener: TcpListener) {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };

                    let Some(guard) = self.try_admit() else {
                        tracing::warn!(
                            "Rejecting {}: connection limit ({}) reached",
                            peer,
                            self.config.server.max_connections
                        );
                        StoreMetrics::incr(&self.metrics.connections_rejected);
                        continue;
                    };

                    StoreMetrics::incr(&self.metrics.connections_total);
                    tracing::info!("Accepted connection from {}", peer);

                    let session = Session::new(self.clone(), peer);
                    sessions.spawn(async move {
                        let _guard = guard;
                        session.run(stream).await;
                    });
                }
                Some(finished) = sessions.join_next() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            tracing::error!("Session task panicked: {}", e);
                        }
                    }
                }
            }
        }
    }

    fn try_admit(self: &Arc<Self>) -> Option<ConnectionGuard> {
        let limit = self.config.server.max_connections;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()?;
        Some(ConnectionGuard {
            server: self.clone(),
        })
    }
}

/// Decrements the active connection count when a session ends.
struct ConnectionGuard {
    server: Arc<StoreServer>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.server.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A running server. Dropping the handle stops it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    server: Arc<StoreServer>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The running server.
    pub fn server(&self) -> &Arc<StoreServer> {
        &self.server
    }

    /// Stop accepting connections and close every session.
    pub fn shutdown(self) {
        // Drop does the work.
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
