//! Single-connection, multi-observer relay.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::StreamExt;
use parking_lot::Mutex;
use streampulse_types::MetricsSnapshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::{Connector, NetConnector};
use crate::{Inbound, RelayError};

/// A relay of metrics snapshots, sent bare or inside `metrics` messages.
pub type MetricsRelay = Relay<MetricsSnapshot>;

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Connection {
    address: String,
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Connection {
    fn close(self) {
        self.active.store(false, Ordering::Release);
        self.task.abort();
    }
}

struct Inner<T> {
    connector: Arc<dyn Connector>,
    observers: Mutex<Vec<(u64, Observer<T>)>>,
    next_observer: AtomicU64,
    connection: Mutex<Option<Connection>>,
    last_error: Mutex<Option<RelayError>>,
    delivered: AtomicU64,
}

impl<T> Inner<T> {
    fn deliver(&self, message: &T, active: &AtomicBool) {
        // Copy so observers may subscribe or unsubscribe from inside a callback
        let observers: Vec<Observer<T>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in observers {
            if !active.load(Ordering::Acquire) {
                return;
            }
            observer(message);
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, error: RelayError, active: &AtomicBool) {
        if active.load(Ordering::Acquire) {
            *self.last_error.lock() = Some(error);
        }
    }
}

trait Registry: Send + Sync {
    fn remove(&self, id: u64) -> bool;
    fn contains(&self, id: u64) -> bool;
}

impl<T: Send + Sync> Registry for Inner<T> {
    fn remove(&self, id: u64) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    fn contains(&self, id: u64) -> bool {
        self.observers.lock().iter().any(|(observer_id, _)| *observer_id == id)
    }
}

/// Keeps one connection to a metrics source and hands every decoded message
/// to all current observers, in arrival order.
///
/// Observers run on the connection task, one after another in subscription
/// order. How a frame becomes a `T` is up to its [`Inbound`] impl; a frame
/// that fails to decode is logged and skipped. Transport
/// failures are logged and kept in [`last_error`](Self::last_error); the
/// relay does not reconnect on its own.
///
/// Must be connected from within a tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use streampulse_relay::MetricsRelay;
///
/// #[tokio::main]
/// async fn main() {
///     // `streampulse serve` sends tagged messages; only `metrics` reach
///     // a snapshot relay
///     let relay = MetricsRelay::new();
///     let subscription = relay.subscribe(|snapshot| {
///         println!("[{}] response time: {:.1}ms", snapshot.timestamp, snapshot.response_time);
///     });
///
///     relay.connect("tcp://localhost:8001");
///     tokio::signal::ctrl_c().await.ok();
///
///     subscription.unsubscribe();
///     relay.disconnect();
/// }
/// ```
pub struct Relay<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Inbound> Relay<T> {
    /// A relay that connects over the network.
    pub fn new() -> Self {
        Self::with_connector(NetConnector::new())
    }

    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Arc::new(connector),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                connection: Mutex::new(None),
                last_error: Mutex::new(None),
                delivered: AtomicU64::new(0),
            }),
        }
    }

    /// Connect to `address`, replacing any current connection.
    ///
    /// The connection is opened on a background task; failures are logged
    /// and reported through [`last_error`](Self::last_error).
    pub fn connect(&self, address: &str) {
        let mut connection = self.inner.connection.lock();
        if let Some(previous) = connection.take() {
            debug!(address = %previous.address, "replacing connection");
            previous.close();
        }
        *self.inner.last_error.lock() = None;

        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run(
            self.inner.clone(),
            address.to_string(),
            active.clone(),
        ));

        *connection = Some(Connection {
            address: address.to_string(),
            active,
            task,
        });
    }

    /// Close the current connection, if any.
    ///
    /// No observer is called for this connection once this returns, except
    /// one already running on another thread.
    pub fn disconnect(&self) {
        if let Some(connection) = self.inner.connection.lock().take() {
            info!(address = %connection.address, "disconnecting");
            connection.close();
        }
    }

    /// Register an observer for every future message.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer.fetch_add(1, Ordering::Relaxed);
        self.inner.observers.lock().push((id, Arc::new(observer)));

        let registry: Arc<dyn Registry> = self.inner.clone();
        Subscription {
            registry: Arc::downgrade(&registry),
            id,
        }
    }
}

impl<T> Relay<T> {
    /// True between `connect` and `disconnect`, even if the transport has
    /// since failed.
    pub fn is_connected(&self) -> bool {
        self.inner.connection.lock().is_some()
    }

    /// Address of the current connection.
    pub fn address(&self) -> Option<String> {
        self.inner
            .connection
            .lock()
            .as_ref()
            .map(|c| c.address.clone())
    }

    /// Most recent parse or transport error on the current connection.
    pub fn last_error(&self) -> Option<RelayError> {
        self.inner.last_error.lock().clone()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Messages handed to observers since the relay was created.
    pub fn messages_delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }
}

impl<T: Inbound> Default for Relay<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Relay<T> {
    fn drop(&mut self) {
        if let Some(connection) = self.inner.connection.lock().take() {
            connection.close();
        }
    }
}

impl<T> fmt::Debug for Relay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("connector", &self.inner.connector)
            .field("address", &self.address())
            .field("observers", &self.observer_count())
            .field("last_error", &self.last_error())
            .finish()
    }
}

async fn run<T: Inbound>(inner: Arc<Inner<T>>, address: String, active: Arc<AtomicBool>) {
    let mut frames = match inner.connector.open(&address).await {
        Ok(frames) => frames,
        Err(e) => {
            warn!(%address, error = %e, "failed to connect");
            inner.record_error(e, &active);
            return;
        }
    };
    info!(%address, "connected");

    while let Some(frame) = frames.next().await {
        if !active.load(Ordering::Acquire) {
            break;
        }
        match frame.and_then(|text| T::decode(&text)) {
            Ok(Some(message)) => inner.deliver(&message, &active),
            Ok(None) => debug!(%address, "skipping frame with no payload for this relay"),
            Err(e) if e.is_transport() => {
                warn!(%address, error = %e, "connection lost");
                inner.record_error(e, &active);
                break;
            }
            Err(e) => {
                warn!(%address, error = %e, "skipping malformed message");
                inner.record_error(e, &active);
            }
        }
    }
}

/// Handle returned by [`Relay::subscribe`].
///
/// Dropping the handle leaves the observer registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "the observer stays registered until `unsubscribe` is called"]
pub struct Subscription {
    registry: Weak<dyn Registry>,
    id: u64,
}

impl Subscription {
    /// Remove the observer. Calling this again, or after the relay is gone,
    /// does nothing.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                debug!(observer = self.id, "observer removed");
            }
        }
    }

    /// True while the observer is registered with a live relay.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
