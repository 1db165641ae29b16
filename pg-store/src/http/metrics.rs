//! Prometheus metrics endpoint.

use crate::server::StoreServer;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges reflect current state; counters are monotonic since startup.
pub async fn metrics_handler(Extension(server): Extension<Arc<StoreServer>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&server),
    )
}

fn render(server: &StoreServer) -> String {
    let m = server.metrics();

    // Gauges
    let connections = server.active_connections();
    let keys = server.table().len();
    let value_bytes = server.table().total_value_bytes();

    // Counters
    let requests = m.requests_total.load(Ordering::Relaxed);
    let sets = m.sets_total.load(Ordering::Relaxed);
    let gets = m.gets_total.load(Ordering::Relaxed);
    let gets_waited = m.gets_waited.load(Ordering::Relaxed);
    let deletes = m.deletes_total.load(Ordering::Relaxed);
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let conns_rejected = m.connections_rejected.load(Ordering::Relaxed);
    let bytes_rx = m.bytes_received.load(Ordering::Relaxed);
    let bytes_tx = m.bytes_sent.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    format!(
        r#"# HELP pg_store_connections_active Number of open client connections
# TYPE pg_store_connections_active gauge
pg_store_connections_active {connections}

# HELP pg_store_keys Number of keys in the table
# TYPE pg_store_keys gauge
pg_store_keys {keys}

# HELP pg_store_value_bytes Total bytes held in values
# TYPE pg_store_value_bytes gauge
pg_store_value_bytes {value_bytes}

# HELP pg_store_info Server information
# TYPE pg_store_info gauge
pg_store_info{{version="{version}"}} 1

# HELP pg_store_requests_total Total requests handled
# TYPE pg_store_requests_total counter
pg_store_requests_total {requests}

# HELP pg_store_sets_total Total SET requests applied
# TYPE pg_store_sets_total counter
pg_store_sets_total {sets}

# HELP pg_store_gets_total Total GET requests answered
# TYPE pg_store_gets_total counter
pg_store_gets_total {gets}

# HELP pg_store_gets_waited_total GET requests that waited for their key
# TYPE pg_store_gets_waited_total counter
pg_store_gets_waited_total {gets_waited}

# HELP pg_store_deletes_total Total DELETE requests handled
# TYPE pg_store_deletes_total counter
pg_store_deletes_total {deletes}

# HELP pg_store_connections_total Total connections accepted
# TYPE pg_store_connections_total counter
pg_store_connections_total {conns_total}

# HELP pg_store_connections_rejected_total Connections refused at the limit
# TYPE pg_store_connections_rejected_total counter
pg_store_connections_rejected_total {conns_rejected}

# HELP pg_store_bytes_received_total Value bytes received in SET requests
# TYPE pg_store_bytes_received_total counter
pg_store_bytes_received_total {bytes_rx}

# HELP pg_store_bytes_sent_total Value bytes sent in GET responses
# TYPE pg_store_bytes_sent_total counter
pg_store_bytes_sent_total {bytes_tx}

# HELP pg_store_errors_total Total protocol errors
# TYPE pg_store_errors_total counter
pg_store_errors_total {errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn render_reports_table_state() {
        let server = StoreServer::new(Config::default());
        server.table().set("send_to/1/0".into(), vec![0; 10]);
        server.metrics().sets_total.fetch_add(1, Ordering::Relaxed);

        let body = render(&server);
        assert!(body.contains("pg_store_keys 1\n"));
        assert!(body.contains("pg_store_value_bytes 10\n"));
        assert!(body.contains("pg_store_sets_total 1\n"));
        assert!(body.contains("# TYPE pg_store_requests_total counter"));
    }
}
