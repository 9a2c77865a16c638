//! # streampulse-sim
//!
//! The producing side of StreamPulse: synthetic metrics, anomaly detection
//! and a hub that publishes everything to network clients.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use streampulse_sim::{server, Emitter, Hub, Output};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Arc::new(Hub::default());
//!
//!     // Publish a snapshot (plus alerts) every two seconds
//!     let emitter = Emitter::builder()
//!         .output(Output::hub(hub.clone()))
//!         .interval(Duration::from_secs(2))
//!         .build();
//!     let _emission = emitter.start();
//!
//!     // Serve newline-delimited JSON to anyone who connects
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8001").await?;
//!     server::serve_ndjson(hub, listener).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Components
//!
//! - [`MockGenerator`]: one random [`MetricsSnapshot`] per interval
//! - [`AnomalySimulator`]: random [`AnomalyEvent`]s
//! - [`ZScoreDetector`]: rolling z-score outlier detection
//! - [`Hub`]: fan-out of [`StreamMessage`]s to connected clients
//! - [`Emitter`]: the periodic loop tying the above together
//! - [`IngestWorker`]: scores externally ingested events and publishes alerts

mod anomaly;
mod detector;
mod emitter;
mod error;
mod generator;
mod hub;
mod ingest;
mod output;

pub mod server;

pub use anomaly::AnomalySimulator;
pub use detector::{Detection, ZScoreDetector};
pub use emitter::{throughput_warning, EmissionHandle, Emitter, EmitterBuilder};
pub use error::{IngestError, SimError};
pub use generator::{ranges, GeneratorHandle, MockGenerator, MockGeneratorBuilder};
pub use hub::{ClientFeed, ClientStats, Hub, HubStats};
pub use ingest::{
    DeadLetter, IngestBatch, IngestEvent, IngestResponse, IngestWorker, WorkerStats,
    DEAD_LETTER_CAPACITY, MAX_BATCH_SIZE,
};
pub use output::Output;

// Re-export types for convenience
pub use streampulse_types::{
    AnomalyEvent, AnomalyType, MetricsSnapshot, RegionMetrics, RegionStatus, ServerHealth,
    Severity, StreamMessage, ThroughputWarning,
};

/// Regions reported when none are configured.
pub const DEFAULT_REGIONS: [&str; 4] = ["us-east", "us-west", "eu-central", "ap-southeast"];
