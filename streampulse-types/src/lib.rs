//! # streampulse-types
//!
//! Wire records for StreamPulse real-time infrastructure metrics. These are
//! the types exchanged between the emitter (`streampulse-sim`) and any
//! consumer, most notably the metrics relay in `streampulse-relay`.
//!
//! ## Features
//!
//! - `serde`: JSON (or any serde format) support. Field names follow the
//!   camelCase shape dashboards expect (`responseTime`, `errorRate`, ...).
//!
//! ## Example
//!
//! ```rust
//! use streampulse_types::{MetricsSnapshot, RegionStatus, ServerHealth};
//!
//! let snapshot = MetricsSnapshot::builder()
//!     .timestamp(1_700_000_000_000)
//!     .response_time(42.0)
//!     .throughput(5120.0)
//!     .server_health(ServerHealth::Healthy)
//!     .region("us-east", |r| r.latency(18.5))
//!     .region("eu-central", |r| r.latency(96.0).status(RegionStatus::Degraded))
//!     .build();
//!
//! assert_eq!(snapshot.regions.len(), 2);
//! assert_eq!(snapshot.degraded_regions().count(), 1);
//! ```

mod anomaly;
mod message;
mod snapshot;

pub use anomaly::*;
pub use message::*;
pub use snapshot::*;

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
