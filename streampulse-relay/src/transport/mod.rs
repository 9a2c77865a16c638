//! Transports that turn an address into a stream of text frames.
//!
//! A frame is one serialized message: a line of newline-delimited JSON, or the
//! `data` of one Server-Sent Event. Decoding frames into messages is left to
//! the [`Relay`](crate::Relay).

mod channel;
mod ndjson;
mod sse;

pub use channel::ChannelConnector;
pub use ndjson::ndjson_frames;
pub use sse::{sse_frames, SseDecoder, SseEvent};

use std::fmt::Debug;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::RelayError;

/// Frames read from one connection.
///
/// The stream ends after yielding an error: a transport error, or
/// [`RelayError::Closed`] when the peer hangs up.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Opens connections for a relay.
///
/// Implement this to feed a relay from somewhere other than the network.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Open a connection to `address`.
    async fn open(&self, address: &str) -> Result<FrameStream, RelayError>;
}

/// A parsed network address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Newline-delimited JSON over TCP, as `host:port`.
    Tcp(String),
    /// Server-Sent Events over HTTP(S), as a full URL.
    Sse(String),
}

impl Endpoint {
    /// Parse an address.
    ///
    /// ```rust
    /// use streampulse_relay::transport::Endpoint;
    ///
    /// assert_eq!(
    ///     Endpoint::parse("tcp://localhost:8001").unwrap(),
    ///     Endpoint::Tcp("localhost:8001".into())
    /// );
    /// assert_eq!(
    ///     Endpoint::parse("127.0.0.1:8001").unwrap(),
    ///     Endpoint::Tcp("127.0.0.1:8001".into())
    /// );
    /// assert!(matches!(
    ///     Endpoint::parse("http://localhost:8000/events").unwrap(),
    ///     Endpoint::Sse(_)
    /// ));
    /// assert!(Endpoint::parse("ws://localhost").is_err());
    /// ```
    pub fn parse(address: &str) -> Result<Self, RelayError> {
        let address = address.trim();
        let invalid = || RelayError::InvalidAddress(address.to_string());

        if address.starts_with("http://") || address.starts_with("https://") {
            return Ok(Endpoint::Sse(address.to_string()));
        }

        let host_port = match address.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some(_) => return Err(invalid()),
            None => address,
        };

        let (host, port) = host_port.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(invalid());
        }
        Ok(Endpoint::Tcp(host_port.to_string()))
    }
}

/// Connects over the network, choosing the transport from the address.
///
/// - `tcp://host:port` or `host:port`: newline-delimited JSON
/// - `http://...` or `https://...`: Server-Sent Events
#[derive(Debug, Clone, Default)]
pub struct NetConnector {
    client: reqwest::Client,
}

impl NetConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing HTTP client for SSE connections.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for NetConnector {
    async fn open(&self, address: &str) -> Result<FrameStream, RelayError> {
        match Endpoint::parse(address)? {
            Endpoint::Tcp(host_port) => {
                let stream = tokio::net::TcpStream::connect(&host_port)
                    .await
                    .map_err(|e| RelayError::connect(address, e))?;
                Ok(ndjson_frames(stream))
            }
            Endpoint::Sse(url) => sse::open(&self.client, &url).await,
        }
    }
}
