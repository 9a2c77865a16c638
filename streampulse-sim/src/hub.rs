//! Fan-out of stream messages to connected clients.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use streampulse_types::{MetricsSnapshot, StreamMessage};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug)]
struct ClientEntry {
    client_id: String,
    connected_at: Instant,
    message_count: AtomicU64,
}

/// Per-client statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientStats {
    pub client_id: String,
    pub message_count: u64,
    pub connected_for: Duration,
}

/// Aggregate hub statistics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HubStats {
    pub active_connections: usize,
    /// Messages written to clients, summed over current connections.
    pub total_messages_sent: u64,
    /// Messages handed to [`Hub::publish`] since creation.
    pub messages_published: u64,
    pub connections: Vec<ClientStats>,
}

/// Broadcasts [`StreamMessage`]s to every connected client.
///
/// Transports (see [`crate::server`]) call [`Hub::connect_client`] for each
/// accepted connection and pump the returned [`ClientFeed`] until it ends.
/// The hub also remembers the latest metrics snapshot for scrapers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use streampulse_sim::{Hub, MetricsSnapshot};
///
/// let hub = Arc::new(Hub::new(64));
/// let feed = hub.connect_client(Some("dashboard"));
/// assert_eq!(hub.active_connections(), 1);
///
/// hub.publish(MetricsSnapshot::with_timestamp(1000).into());
/// assert_eq!(hub.latest_snapshot().map(|s| s.timestamp), Some(1000));
///
/// drop(feed);
/// assert_eq!(hub.active_connections(), 0);
/// ```
#[derive(Debug)]
pub struct Hub {
    sender: broadcast::Sender<StreamMessage>,
    clients: RwLock<BTreeMap<u64, ClientEntry>>,
    next_client: AtomicU64,
    published: AtomicU64,
    latest: RwLock<Option<MetricsSnapshot>>,
}

impl Hub {
    /// Create a hub that buffers up to `capacity` messages per slow client.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            clients: RwLock::new(BTreeMap::new()),
            next_client: AtomicU64::new(1),
            published: AtomicU64::new(0),
            latest: RwLock::new(None),
        }
    }

    /// Publish a message to all clients. Returns how many clients were reached.
    pub fn publish(&self, message: StreamMessage) -> usize {
        if let StreamMessage::Metrics(snapshot) = &message {
            *self.latest.write() = Some(snapshot.clone());
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        // No receivers is fine
        self.sender.send(message).unwrap_or(0)
    }

    /// Register a client and return its message feed.
    ///
    /// The first message on the feed is always `connected`. The client is
    /// unregistered when the feed is dropped.
    pub fn connect_client(self: &Arc<Self>, label: Option<&str>) -> ClientFeed {
        let id = self.next_client.fetch_add(1, Ordering::Relaxed);
        let client_id = match label {
            Some(label) => format!("client_{}@{}", id, label),
            None => format!("client_{}", id),
        };

        let receiver = self.sender.subscribe();
        let total = {
            let mut clients = self.clients.write();
            clients.insert(
                id,
                ClientEntry {
                    client_id: client_id.clone(),
                    connected_at: Instant::now(),
                    message_count: AtomicU64::new(0),
                },
            );
            clients.len()
        };
        info!(client_id = %client_id, total_connections = total, "client connected");

        ClientFeed {
            hub: self.clone(),
            id,
            greeting: Some(StreamMessage::Connected {
                client_id: client_id.clone(),
                message: "Connected to StreamPulse real-time stream".to_string(),
            }),
            client_id,
            receiver,
        }
    }

    pub fn active_connections(&self) -> usize {
        self.clients.read().len()
    }

    pub fn messages_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn latest_snapshot(&self) -> Option<MetricsSnapshot> {
        self.latest.read().clone()
    }

    pub fn stats(&self) -> HubStats {
        let clients = self.clients.read();
        let connections: Vec<ClientStats> = clients
            .values()
            .map(|entry| ClientStats {
                client_id: entry.client_id.clone(),
                message_count: entry.message_count.load(Ordering::Relaxed),
                connected_for: entry.connected_at.elapsed(),
            })
            .collect();

        HubStats {
            active_connections: connections.len(),
            total_messages_sent: connections.iter().map(|c| c.message_count).sum(),
            messages_published: self.messages_published(),
            connections,
        }
    }

    fn record_delivery(&self, id: u64) {
        if let Some(entry) = self.clients.read().get(&id) {
            entry.message_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn disconnect(&self, id: u64) {
        let mut clients = self.clients.write();
        if let Some(entry) = clients.remove(&id) {
            info!(
                client_id = %entry.client_id,
                total_connections = clients.len(),
                "client disconnected"
            );
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// A single client's view of the hub.
#[derive(Debug)]
pub struct ClientFeed {
    hub: Arc<Hub>,
    id: u64,
    client_id: String,
    greeting: Option<StreamMessage>,
    receiver: broadcast::Receiver<StreamMessage>,
}

impl ClientFeed {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Wait for the next message.
    ///
    /// A client that falls behind skips the messages it missed. Returns
    /// `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<StreamMessage> {
        if let Some(greeting) = self.greeting.take() {
            return Some(greeting);
        }
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(client_id = %self.client_id, skipped, "client lagging, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Count a message as written to this client.
    pub fn mark_delivered(&self) {
        self.hub.record_delivery(self.id);
    }
}

impl Drop for ClientFeed {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}
