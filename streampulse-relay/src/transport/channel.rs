use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{Connector, FrameStream};
use crate::RelayError;

/// In-memory connector for embedding and tests.
///
/// Addresses must be registered with [`listen`](Self::listen) before a relay
/// can connect to them; unknown addresses fail like a refused connection.
/// Every open connection receives every frame sent to its address.
///
/// ```
/// use streampulse_relay::transport::ChannelConnector;
///
/// let connector = ChannelConnector::new();
/// connector.listen("mem://metrics");
/// assert_eq!(connector.send("mem://metrics", "{}"), 0); // nobody connected yet
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChannelConnector {
    routes: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl ChannelConnector {
    const CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::default()
    }

    /// Accept connections on `address`.
    pub fn listen(&self, address: &str) {
        self.routes
            .lock()
            .entry(address.to_string())
            .or_insert_with(|| broadcast::channel(Self::CAPACITY).0);
    }

    /// Send a frame to every connection on `address`.
    ///
    /// Returns the number of connections reached.
    pub fn send(&self, address: &str, frame: impl Into<String>) -> usize {
        match self.routes.lock().get(address) {
            Some(tx) => tx.send(frame.into()).unwrap_or(0),
            None => 0,
        }
    }

    /// Stop listening on `address`, closing its open connections.
    pub fn close(&self, address: &str) {
        self.routes.lock().remove(address);
    }

    /// Number of open connections on `address`.
    pub fn connections(&self, address: &str) -> usize {
        self.routes
            .lock()
            .get(address)
            .map_or(0, |tx| tx.receiver_count())
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn open(&self, address: &str) -> Result<FrameStream, RelayError> {
        let rx = self
            .routes
            .lock()
            .get(address)
            .map(|tx| tx.subscribe())
            .ok_or_else(|| RelayError::connect(address, "connection refused"))?;

        Ok(futures_util::stream::unfold(Some(rx), |state| async move {
            let mut rx = state?;
            loop {
                match rx.recv().await {
                    Ok(frame) => return Some((Ok(frame), Some(rx))),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Some((Err(RelayError::Closed), None))
                    }
                }
            }
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_address_is_refused() {
        let connector = ChannelConnector::new();
        assert!(matches!(
            connector.open("mem://nowhere").await,
            Err(RelayError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn frames_then_closed() {
        let connector = ChannelConnector::new();
        connector.listen("mem://a");
        let mut frames = connector.open("mem://a").await.unwrap();
        assert_eq!(connector.connections("mem://a"), 1);

        assert_eq!(connector.send("mem://a", "one"), 1);
        connector.close("mem://a");

        assert_eq!(frames.next().await, Some(Ok("one".to_string())));
        assert_eq!(frames.next().await, Some(Err(RelayError::Closed)));
        assert_eq!(frames.next().await, None);
    }
}
