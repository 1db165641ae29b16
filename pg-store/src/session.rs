//! Per-connection session handling.
//!
//! A session reads one framed [`StoreRequest`] at a time and writes exactly
//! one [`StoreResponse`] back. A `GET` for a missing key parks the session
//! until the key is written or the client goes away.

use crate::error::{ProtocolError, ProtocolResult};
use crate::limits;
use crate::server::{StoreMetrics, StoreServer};
use pg_types::{frame, StoreRequest, StoreResponse};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Outcome of handling one request.
enum Reply {
    Respond(StoreResponse),
    /// Client disconnected while a GET was outstanding.
    ClientGone,
}

/// A per-connection session.
pub struct Session {
    server: Arc<StoreServer>,
    peer: SocketAddr,
}

impl Session {
    /// Create a new session for a connection from `peer`.
    pub fn new(server: Arc<StoreServer>, peer: SocketAddr) -> Self {
        Self { server, peer }
    }

    /// Serve the connection until the client disconnects or misbehaves.
    pub async fn run(self, stream: TcpStream) {
        match self.serve(stream).await {
            Ok(()) => tracing::debug!("Connection from {} closed", self.peer),
            Err(e) => {
                StoreMetrics::incr(&self.server.metrics().errors_total);
                tracing::warn!("Dropping connection from {}: {}", self.peer, e);
            }
        }
    }

    async fn serve(&self, stream: TcpStream) -> ProtocolResult<()> {
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        while let Some(request) = read_request(&mut reader).await? {
            StoreMetrics::incr(&self.server.metrics().requests_total);
            tracing::trace!("{} -> {}", self.peer, request.kind());

            match self.handle(request, &mut reader).await? {
                Reply::Respond(response) => write_response(&mut writer, &response).await?,
                Reply::ClientGone => {
                    tracing::debug!("{} disconnected during a blocking get", self.peer);
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn handle(
        &self,
        request: StoreRequest,
        reader: &mut OwnedReadHalf,
    ) -> ProtocolResult<Reply> {
        if let Err(e) = limits::check_request(&self.server.config().limits, &request) {
            tracing::warn!("Rejected {} from {}: {}", request.kind(), self.peer, e);
            StoreMetrics::incr(&self.server.metrics().errors_total);
            return Ok(Reply::Respond(StoreResponse::Error {
                message: e.to_string(),
            }));
        }

        let table = self.server.table();
        let metrics = self.server.metrics();

        let response = match request {
            StoreRequest::Set { key, value } => {
                StoreMetrics::incr(&metrics.sets_total);
                StoreMetrics::add(&metrics.bytes_received, value.len());
                table.set(key, value);
                StoreResponse::Done
            }
            StoreRequest::Get { key } => {
                let value = match table.get(&key) {
                    Some(value) => value,
                    None => {
                        StoreMetrics::incr(&metrics.gets_waited);
                        tokio::select! {
                            value = table.wait_for(&key) => value,
                            gone = wait_for_disconnect(reader) => {
                                gone?;
                                return Ok(Reply::ClientGone);
                            }
                        }
                    }
                };
                StoreMetrics::incr(&metrics.gets_total);
                StoreMetrics::add(&metrics.bytes_sent, value.len());
                StoreResponse::Value { value }
            }
            StoreRequest::Delete { key } => {
                StoreMetrics::incr(&metrics.deletes_total);
                StoreResponse::Deleted {
                    existed: table.delete(&key),
                }
            }
            StoreRequest::Check { key } => StoreResponse::Exists {
                exists: table.contains(&key),
            },
            StoreRequest::Add { key, amount } => match table.add(&key, amount) {
                Ok(value) => StoreResponse::Counter { value },
                Err(e) => {
                    StoreMetrics::incr(&metrics.errors_total);
                    StoreResponse::Error {
                        message: e.to_string(),
                    }
                }
            },
            StoreRequest::Ping => StoreResponse::Pong,
        };

        Ok(Reply::Respond(response))
    }
}

/// Read one request. Returns `Ok(None)` on a clean EOF between frames.
async fn read_request(reader: &mut OwnedReadHalf) -> ProtocolResult<Option<StoreRequest>> {
    let mut header = [0u8; frame::HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = frame::body_len(header)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(StoreRequest::from_bytes(&body)?))
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &StoreResponse) -> ProtocolResult<()> {
    let bytes = frame::encode(&response.to_bytes()?)?;
    writer.write_all(&bytes).await?;
    Ok(())
}

/// Resolves when the client closes its side. Clients never pipeline, so any
/// byte arriving while a GET is pending is a protocol violation.
async fn wait_for_disconnect(reader: &mut OwnedReadHalf) -> ProtocolResult<()> {
    let mut probe = [0u8; 1];
    match reader.read(&mut probe).await? {
        0 => Ok(()),
        _ => Err(ProtocolError::UnexpectedData),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::server::{ServerHandle, StoreServer};
    use pg_types::{frame, StoreRequest, StoreResponse};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start() -> ServerHandle {
        StoreServer::start(Config::for_address("127.0.0.1:0"))
            .await
            .unwrap()
    }

    async fn send(stream: &mut TcpStream, request: &StoreRequest) {
        let bytes = frame::encode(&request.to_bytes().unwrap()).unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    async fn recv(stream: &mut TcpStream) -> StoreResponse {
        let mut header = [0u8; frame::HEADER_LEN];
        stream.read_exact(&mut header).await.unwrap();
        let mut body = vec![0u8; frame::body_len(header).unwrap()];
        stream.read_exact(&mut body).await.unwrap();
        StoreResponse::from_bytes(&body).unwrap()
    }

    async fn call(stream: &mut TcpStream, request: StoreRequest) -> StoreResponse {
        send(stream, &request).await;
        recv(stream).await
    }

    fn set(key: &str, value: &[u8]) -> StoreRequest {
        StoreRequest::Set {
            key: key.into(),
            value: value.to_vec(),
        }
    }

    fn get(key: &str) -> StoreRequest {
        StoreRequest::Get { key: key.into() }
    }

    // =========================================================================
    // Basic requests
    // =========================================================================

    #[tokio::test]
    async fn set_then_get() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        assert_eq!(call(&mut client, set("k", b"v")).await, StoreResponse::Done);
        assert_eq!(
            call(&mut client, get("k")).await,
            StoreResponse::Value {
                value: b"v".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn check_and_delete() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        let check = StoreRequest::Check { key: "k".into() };
        let delete = StoreRequest::Delete { key: "k".into() };

        assert_eq!(
            call(&mut client, check.clone()).await,
            StoreResponse::Exists { exists: false }
        );
        call(&mut client, set("k", b"v")).await;
        assert_eq!(
            call(&mut client, check.clone()).await,
            StoreResponse::Exists { exists: true }
        );
        assert_eq!(
            call(&mut client, delete.clone()).await,
            StoreResponse::Deleted { existed: true }
        );
        assert_eq!(
            call(&mut client, delete).await,
            StoreResponse::Deleted { existed: false }
        );
        assert_eq!(
            call(&mut client, check).await,
            StoreResponse::Exists { exists: false }
        );
    }

    #[tokio::test]
    async fn add_and_ping() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        let add = |amount| StoreRequest::Add {
            key: "counter".into(),
            amount,
        };
        assert_eq!(
            call(&mut client, add(2)).await,
            StoreResponse::Counter { value: 2 }
        );
        assert_eq!(
            call(&mut client, add(3)).await,
            StoreResponse::Counter { value: 5 }
        );
        assert_eq!(call(&mut client, StoreRequest::Ping).await, StoreResponse::Pong);
    }

    // =========================================================================
    // Blocking get
    // =========================================================================

    #[tokio::test]
    async fn get_waits_for_another_client() {
        let handle = start().await;
        let mut reader = TcpStream::connect(handle.local_addr()).await.unwrap();
        let mut writer = TcpStream::connect(handle.local_addr()).await.unwrap();

        send(&mut reader, &get("late")).await;

        let pending = tokio::time::timeout(Duration::from_millis(100), recv(&mut reader)).await;
        assert!(pending.is_err(), "get must not answer before the key exists");

        assert_eq!(call(&mut writer, set("late", b"now")).await, StoreResponse::Done);

        let response = tokio::time::timeout(Duration::from_secs(2), recv(&mut reader))
            .await
            .expect("get should complete after set");
        assert_eq!(
            response,
            StoreResponse::Value {
                value: b"now".to_vec()
            }
        );
        assert_eq!(
            handle.server().metrics().gets_waited.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn disconnect_abandons_pending_get() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        send(&mut client, &get("never")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.server().active_connections(), 1);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.server().active_connections(), 0);
        assert_eq!(handle.server().metrics().errors_total.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn pipelined_request_during_get_closes_connection() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        send(&mut client, &get("never")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        send(&mut client, &StoreRequest::Ping).await;

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(handle.server().metrics().errors_total.load(Ordering::Relaxed), 1);
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[tokio::test]
    async fn oversized_value_is_rejected_but_connection_survives() {
        let mut config = Config::for_address("127.0.0.1:0");
        config.limits.max_value_size = 4;
        let handle = StoreServer::start(config).await.unwrap();
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        let response = call(&mut client, set("k", b"too long")).await;
        assert!(matches!(response, StoreResponse::Error { .. }));

        assert_eq!(call(&mut client, StoreRequest::Ping).await, StoreResponse::Pong);
        assert!(!handle.server().table().contains("k"));
    }

    #[tokio::test]
    async fn add_on_non_counter_reports_error() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        call(&mut client, set("k", b"not a number")).await;
        let response = call(
            &mut client,
            StoreRequest::Add {
                key: "k".into(),
                amount: 1,
            },
        )
        .await;
        assert!(matches!(response, StoreResponse::Error { .. }));
    }

    #[tokio::test]
    async fn garbage_frame_closes_connection() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        let bytes = frame::encode(&[0xC1, 0xC1, 0xC1]).unwrap();
        client.write_all(&bytes).await.unwrap();

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
