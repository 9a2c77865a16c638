//! Metrics snapshot - one reading of the whole system at a point in time.

use std::fmt;

/// Overall health reported alongside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ServerHealth {
    #[default]
    Healthy,
    Warning,
    Critical,
}

impl ServerHealth {
    /// All variants, in increasing order of severity.
    pub const ALL: [ServerHealth; 3] = [
        ServerHealth::Healthy,
        ServerHealth::Warning,
        ServerHealth::Critical,
    ];

    /// Short label for terminal output.
    pub fn symbol(&self) -> &'static str {
        match self {
            ServerHealth::Healthy => "OK",
            ServerHealth::Warning => "WARN",
            ServerHealth::Critical => "CRIT",
        }
    }
}

impl fmt::Display for ServerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServerHealth::Healthy => "healthy",
            ServerHealth::Warning => "warning",
            ServerHealth::Critical => "critical",
        })
    }
}

/// Availability of a single region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RegionStatus {
    #[default]
    Online,
    Degraded,
    Offline,
}

impl RegionStatus {
    pub const ALL: [RegionStatus; 3] = [
        RegionStatus::Online,
        RegionStatus::Degraded,
        RegionStatus::Offline,
    ];
}

impl fmt::Display for RegionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegionStatus::Online => "online",
            RegionStatus::Degraded => "degraded",
            RegionStatus::Offline => "offline",
        })
    }
}

/// Latency and availability of one region.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegionMetrics {
    pub name: String,
    /// Round-trip latency in milliseconds.
    pub latency: f64,
    pub status: RegionStatus,
}

impl RegionMetrics {
    pub fn new(name: impl Into<String>, latency: f64, status: RegionStatus) -> Self {
        Self {
            name: name.into(),
            latency,
            status,
        }
    }
}

/// A point-in-time reading of the monitored infrastructure.
///
/// Snapshots carry no identity beyond their timestamp and are superseded
/// entirely by the next one. Every field is optional on the wire; missing
/// fields decode to their zero value.
///
/// ```rust
/// use streampulse_types::MetricsSnapshot;
///
/// let snapshot = MetricsSnapshot::builder()
///     .timestamp(1000)
///     .response_time(42.0)
///     .build();
/// assert_eq!(snapshot.timestamp, 1000);
/// assert!(snapshot.regions.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct MetricsSnapshot {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Mean response time in milliseconds.
    pub response_time: f64,
    /// Events per second.
    pub throughput: f64,
    /// Percentage of failed requests (0-100).
    pub error_rate: f64,
    /// Number of anomalies observed in the reporting period.
    pub anomalies: u32,
    pub active_users: u64,
    pub server_health: ServerHealth,
    pub regions: Vec<RegionMetrics>,
}

impl MetricsSnapshot {
    /// Create an empty snapshot stamped with the current time.
    pub fn new() -> Self {
        Self::with_timestamp(crate::now_ms())
    }

    /// Create an empty snapshot with a specific timestamp.
    pub fn with_timestamp(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    /// Look up a region by name.
    pub fn region(&self, name: &str) -> Option<&RegionMetrics> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Regions that are not fully online.
    pub fn degraded_regions(&self) -> impl Iterator<Item = &RegionMetrics> {
        self.regions
            .iter()
            .filter(|r| r.status != RegionStatus::Online)
    }

    /// Mean latency across all regions, if any are reported.
    pub fn mean_region_latency(&self) -> Option<f64> {
        if self.regions.is_empty() {
            return None;
        }
        let total: f64 = self.regions.iter().map(|r| r.latency).sum();
        Some(total / self.regions.len() as f64)
    }
}

/// Builder for [`RegionMetrics`], used by [`SnapshotBuilder::region`].
#[derive(Debug, Default)]
pub struct RegionBuilder {
    latency: f64,
    status: RegionStatus,
}

impl RegionBuilder {
    pub fn latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    pub fn status(mut self, status: RegionStatus) -> Self {
        self.status = status;
        self
    }
}

/// Builder for constructing [`MetricsSnapshot`] instances.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    timestamp: Option<u64>,
    snapshot: MetricsSnapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp(mut self, ts: u64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn response_time(mut self, ms: f64) -> Self {
        self.snapshot.response_time = ms;
        self
    }

    pub fn throughput(mut self, per_second: f64) -> Self {
        self.snapshot.throughput = per_second;
        self
    }

    pub fn error_rate(mut self, percent: f64) -> Self {
        self.snapshot.error_rate = percent;
        self
    }

    pub fn anomalies(mut self, count: u32) -> Self {
        self.snapshot.anomalies = count;
        self
    }

    pub fn active_users(mut self, count: u64) -> Self {
        self.snapshot.active_users = count;
        self
    }

    pub fn server_health(mut self, health: ServerHealth) -> Self {
        self.snapshot.server_health = health;
        self
    }

    /// Add a region configured through a closure.
    pub fn region<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(RegionBuilder) -> RegionBuilder,
    {
        let built = f(RegionBuilder::default());
        self.snapshot
            .regions
            .push(RegionMetrics::new(name, built.latency, built.status));
        self
    }

    /// Build the snapshot. Without an explicit timestamp, the current time is used.
    pub fn build(self) -> MetricsSnapshot {
        let mut snapshot = self.snapshot;
        snapshot.timestamp = self.timestamp.unwrap_or_else(crate::now_ms);
        snapshot
    }
}
