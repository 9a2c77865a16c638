//! # streampulse-relay
//!
//! The consuming side of StreamPulse. A [`Relay`] keeps one connection to a
//! metrics source and fans every decoded message out to its observers.
//!
//! ```rust,no_run
//! use streampulse_relay::{MetricsHistory, Relay, StreamMessage, Thresholds};
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! #[tokio::main]
//! async fn main() {
//!     let history = Arc::new(Mutex::new(MetricsHistory::default()));
//!     let thresholds = Thresholds::default();
//!
//!     let relay = Relay::<StreamMessage>::new();
//!     let window = history.clone();
//!     let _subscription = relay.subscribe(move |message| {
//!         if let StreamMessage::Metrics(snapshot) = message {
//!             println!("{}", thresholds.assess(snapshot).overall);
//!             window.lock().record(snapshot.clone());
//!         }
//!     });
//!
//!     relay.connect("http://localhost:8000/events");
//!     tokio::signal::ctrl_c().await.ok();
//! }
//! ```
//!
//! Addresses select the transport: `tcp://host:port` (or bare `host:port`)
//! reads newline-delimited JSON, `http(s)://` reads Server-Sent Events.

pub mod config;
mod decode;
pub mod duration;
mod error;
mod health;
mod history;
mod relay;
pub mod transport;

pub use decode::Inbound;
pub use error::RelayError;
pub use health::{HealthReport, RegionHealth, Thresholds};
pub use history::{sparkline, sparkline_bars, AnomalyLog, MetricsHistory};
pub use relay::{MetricsRelay, Relay, Subscription};

// Re-export types for convenience
pub use streampulse_types::{
    AnomalyEvent, AnomalyType, MetricsSnapshot, RegionMetrics, RegionStatus, ServerHealth,
    Severity, StreamMessage, ThroughputWarning,
};
