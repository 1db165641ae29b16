//! TCP client for a `pg-store` server.
//!
//! The server answers one request at a time per connection, and a blocking
//! `get` holds its connection until the key appears. The client therefore
//! keeps a small pool: each request checks out an idle connection (or opens
//! a new one when none is idle) and returns it only once the response has
//! been read. A waiting `get` ties up its own connection and nothing else,
//! so groups sharing one `TcpStore` never queue behind each other.
//!
//! If a request future is dropped halfway (a timeout, a cancelled task) its
//! half-used connection goes with it, so a late response can never be
//! mistaken for the answer to a later request.

use super::{Store, StoreError};
use async_trait::async_trait;
use pg_types::{frame, StoreRequest, StoreResponse};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout_at, Instant};

/// First delay between connection attempts.
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Upper bound on the delay between connection attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Idle connections kept for reuse. Extra ones are closed on return.
const MAX_IDLE: usize = 8;

/// Network client of a `pg-store` server.
///
/// Safe to share (`Arc<TcpStore>`) between tasks and groups; concurrent
/// requests run on separate connections.
#[derive(Debug)]
pub struct TcpStore {
    address: String,
    idle: Mutex<Vec<TcpStream>>,
}

impl TcpStore {
    /// Connect to the store at `address` (`host:port`).
    ///
    /// Retries with exponential backoff until `timeout` has elapsed, so
    /// ranks may start before the rank hosting the store is listening.
    pub async fn connect(address: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let address = address.into();
        let stream = connect_with_retry(&address, timeout).await?;
        tracing::debug!("Connected to store at {}", address);

        Ok(Self {
            address,
            idle: Mutex::new(vec![stream]),
        })
    }

    /// Address of the store server.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Atomically add `amount` to the integer counter under `key`.
    ///
    /// A missing key counts as zero. Returns the new value.
    pub async fn add(&self, key: &str, amount: i64) -> Result<i64, StoreError> {
        let request = StoreRequest::Add {
            key: key.to_string(),
            amount,
        };
        match self.request(&request).await? {
            StoreResponse::Counter { value } => Ok(value),
            other => Err(unexpected(&request, other)),
        }
    }

    /// Round-trip a liveness probe.
    pub async fn ping(&self) -> Result<(), StoreError> {
        match self.request(&StoreRequest::Ping).await? {
            StoreResponse::Pong => Ok(()),
            other => Err(unexpected(&StoreRequest::Ping, other)),
        }
    }

    async fn request(&self, request: &StoreRequest) -> Result<StoreResponse, StoreError> {
        let mut stream = self.checkout().await?;

        tracing::trace!("store {} -> {}", request.kind(), self.address);
        let response = round_trip(&mut stream, request).await?;
        self.checkin(stream).await;

        match response {
            StoreResponse::Error { message } => Err(StoreError::Server(message)),
            response => Ok(response),
        }
    }

    async fn checkout(&self) -> Result<TcpStream, StoreError> {
        let idle = self.idle.lock().await.pop();
        match idle {
            Some(stream) => Ok(stream),
            None => {
                tracing::debug!("Opening connection to store at {}", self.address);
                open(&self.address)
                    .await
                    .map_err(|source| StoreError::ConnectionFailed {
                        address: self.address.clone(),
                        source,
                    })
            }
        }
    }

    async fn checkin(&self, stream: TcpStream) {
        let mut idle = self.idle.lock().await;
        if idle.len() < MAX_IDLE {
            idle.push(stream);
        }
    }
}

#[async_trait]
impl Store for TcpStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let request = StoreRequest::Set {
            key: key.to_string(),
            value: value.to_vec(),
        };
        match self.request(&request).await? {
            StoreResponse::Done => Ok(()),
            other => Err(unexpected(&request, other)),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let request = StoreRequest::Get {
            key: key.to_string(),
        };
        match self.request(&request).await? {
            StoreResponse::Value { value } => Ok(value),
            other => Err(unexpected(&request, other)),
        }
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        let request = StoreRequest::Delete {
            key: key.to_string(),
        };
        match self.request(&request).await? {
            StoreResponse::Deleted { existed } => Ok(existed),
            other => Err(unexpected(&request, other)),
        }
    }

    async fn check(&self, key: &str) -> Result<bool, StoreError> {
        let request = StoreRequest::Check {
            key: key.to_string(),
        };
        match self.request(&request).await? {
            StoreResponse::Exists { exists } => Ok(exists),
            other => Err(unexpected(&request, other)),
        }
    }
}

fn unexpected(request: &StoreRequest, response: StoreResponse) -> StoreError {
    StoreError::UnexpectedResponse {
        request: request.kind(),
        response: format!("{response:?}"),
    }
}

async fn open(address: &str) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn connect_with_retry(address: &str, timeout: Duration) -> Result<TcpStream, StoreError> {
    let deadline = Instant::now() + timeout;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let error = match timeout_at(deadline, open(address)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "connect attempt timed out".to_string(),
        };

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!("Giving up on store at {}: {}", address, error);
            return Err(StoreError::Timeout {
                address: address.to_string(),
                waited: timeout,
            });
        }

        let remaining = deadline - now;
        backoff = backoff.min(remaining).min(MAX_BACKOFF);
        tracing::debug!(
            "Store at {} not reachable ({}), retrying in {:?}",
            address,
            error,
            backoff
        );
        sleep(backoff).await;
        backoff *= 2;
    }
}

async fn round_trip(
    stream: &mut TcpStream,
    request: &StoreRequest,
) -> Result<StoreResponse, StoreError> {
    let bytes = frame::encode(&request.to_bytes()?)?;
    stream.write_all(&bytes).await?;

    let mut header = [0u8; frame::HEADER_LEN];
    stream.read_exact(&mut header).await.map_err(closed_on_eof)?;
    let mut body = vec![0u8; frame::body_len(header)?];
    stream.read_exact(&mut body).await.map_err(closed_on_eof)?;

    Ok(StoreResponse::from_bytes(&body)?)
}

fn closed_on_eof(e: std::io::Error) -> StoreError {
    if e.kind() == ErrorKind::UnexpectedEof {
        StoreError::ConnectionClosed
    } else {
        StoreError::Io(e)
    }
}
