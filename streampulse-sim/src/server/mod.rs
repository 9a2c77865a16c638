//! Network transports for a [`Hub`].
//!
//! - [`serve_ndjson`]: one JSON message per line over raw TCP.
//! - [`serve_http`] (feature `http`): Server-Sent Events on `/events`,
//!   Prometheus exposition on `/metrics`, a JSON `/health` check and batch
//!   ingestion on `/ingest`.
//!
//! Both accept connections until the listener fails and give every client
//! its own [`ClientFeed`](crate::ClientFeed).

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::{Hub, SimError};

#[cfg(feature = "http")]
mod http;
mod prometheus;

#[cfg(feature = "http")]
pub use http::{serve_http, HttpConfig, HttpConfigBuilder};
pub use prometheus::{format_prometheus, format_worker_prometheus};

/// Serve newline-delimited JSON to every client that connects.
///
/// Runs until accepting a connection fails.
pub async fn serve_ndjson(hub: Arc<Hub>, listener: TcpListener) -> Result<(), SimError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "serving NDJSON stream");
    }

    loop {
        let (stream, peer) = listener.accept().await?;
        let label = peer.to_string();
        let hub = hub.clone();
        tokio::spawn(async move {
            pump_ndjson(hub, stream, &label).await;
        });
    }
}

async fn pump_ndjson(hub: Arc<Hub>, mut stream: TcpStream, label: &str) {
    let mut feed = hub.connect_client(Some(label));

    while let Some(message) = feed.next().await {
        let mut line = match serde_json::to_vec(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, kind = message.kind(), "failed to encode message");
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = stream.write_all(&line).await {
            debug!(client_id = feed.client_id(), error = %e, "client write failed");
            break;
        }
        feed.mark_delivered();
    }
}
