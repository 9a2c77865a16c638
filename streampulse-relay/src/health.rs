//! Threshold-based health assessment of snapshots.

use streampulse_types::{MetricsSnapshot, RegionStatus, ServerHealth};

/// Thresholds for health status computation.
///
/// Values at or beyond a threshold are in that state; throughput is
/// judged by how far it falls below its target.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Response time (ms) that triggers a warning.
    pub latency_warning_ms: f64,
    /// Response time (ms) that triggers critical status.
    pub latency_critical_ms: f64,
    /// Error rate (percent) that triggers a warning.
    pub error_rate_warning: f64,
    /// Error rate (percent) that triggers critical status.
    pub error_rate_critical: f64,
    /// Expected throughput in events/s.
    pub throughput_target: f64,
    /// Fraction of the target below which throughput is a warning.
    pub throughput_warning_ratio: f64,
    /// Fraction of the target below which throughput is critical.
    pub throughput_critical_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::for_latency_target(Self::LATENCY_TARGET_MS)
    }
}

impl Thresholds {
    /// Target p95 response time.
    pub const LATENCY_TARGET_MS: f64 = 50.0;

    /// Default thresholds around a latency target: warning at the target,
    /// critical at twice the target.
    pub fn for_latency_target(target_ms: f64) -> Self {
        Self {
            latency_warning_ms: target_ms,
            latency_critical_ms: target_ms * 2.0,
            error_rate_warning: 1.0,
            error_rate_critical: 5.0,
            throughput_target: 5000.0,
            throughput_warning_ratio: 0.8,
            throughput_critical_ratio: 0.5,
        }
    }

    pub fn response_time(&self, ms: f64) -> ServerHealth {
        level(ms, self.latency_warning_ms, self.latency_critical_ms)
    }

    pub fn error_rate(&self, percent: f64) -> ServerHealth {
        level(percent, self.error_rate_warning, self.error_rate_critical)
    }

    pub fn throughput(&self, events_per_sec: f64) -> ServerHealth {
        if self.throughput_target <= 0.0 {
            return ServerHealth::Healthy;
        }
        let ratio = events_per_sec / self.throughput_target;
        if ratio < self.throughput_critical_ratio {
            ServerHealth::Critical
        } else if ratio < self.throughput_warning_ratio {
            ServerHealth::Warning
        } else {
            ServerHealth::Healthy
        }
    }

    /// Offline regions are critical and degraded ones at least a warning;
    /// latency is judged like response time.
    pub fn region(&self, status: RegionStatus, latency_ms: f64) -> ServerHealth {
        let from_status = match status {
            RegionStatus::Online => ServerHealth::Healthy,
            RegionStatus::Degraded => ServerHealth::Warning,
            RegionStatus::Offline => ServerHealth::Critical,
        };
        from_status.max(self.response_time(latency_ms))
    }

    pub fn assess(&self, snapshot: &MetricsSnapshot) -> HealthReport {
        let response_time = self.response_time(snapshot.response_time);
        let error_rate = self.error_rate(snapshot.error_rate);
        let throughput = self.throughput(snapshot.throughput);

        let mut regions: Vec<RegionHealth> = snapshot
            .regions
            .iter()
            .map(|r| RegionHealth {
                name: r.name.clone(),
                health: self.region(r.status, r.latency),
            })
            .collect();
        // Worst first, then by name
        regions.sort_by(|a, b| b.health.cmp(&a.health).then_with(|| a.name.cmp(&b.name)));

        HealthReport {
            overall: response_time.max(error_rate).max(throughput),
            response_time,
            error_rate,
            throughput,
            reported: snapshot.server_health,
            regions,
        }
    }
}

fn level(value: f64, warning: f64, critical: f64) -> ServerHealth {
    if value >= critical {
        ServerHealth::Critical
    } else if value >= warning {
        ServerHealth::Warning
    } else {
        ServerHealth::Healthy
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionHealth {
    pub name: String,
    pub health: ServerHealth,
}

/// Health of one snapshot, per component.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    /// The worst of response time, error rate and throughput.
    pub overall: ServerHealth,
    pub response_time: ServerHealth,
    pub error_rate: ServerHealth,
    pub throughput: ServerHealth,
    /// Health as reported by the source itself.
    pub reported: ServerHealth,
    pub regions: Vec<RegionHealth>,
}

impl HealthReport {
    pub fn unhealthy_regions(&self) -> impl Iterator<Item = &RegionHealth> {
        self.regions
            .iter()
            .filter(|r| r.health != ServerHealth::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(response_time: f64, error_rate: f64, throughput: f64) -> MetricsSnapshot {
        MetricsSnapshot::builder()
            .response_time(response_time)
            .error_rate(error_rate)
            .throughput(throughput)
            .build()
    }

    #[test]
    fn healthy_snapshot() {
        let report = Thresholds::default().assess(&snapshot(30.0, 0.5, 5200.0));
        assert_eq!(report.overall, ServerHealth::Healthy);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let t = Thresholds::default();
        assert_eq!(t.response_time(49.9), ServerHealth::Healthy);
        assert_eq!(t.response_time(50.0), ServerHealth::Warning);
        assert_eq!(t.response_time(100.0), ServerHealth::Critical);
        assert_eq!(t.error_rate(1.0), ServerHealth::Warning);
        assert_eq!(t.error_rate(5.0), ServerHealth::Critical);
    }

    #[test]
    fn throughput_below_target() {
        let t = Thresholds::default();
        assert_eq!(t.throughput(4000.0), ServerHealth::Healthy);
        assert_eq!(t.throughput(3999.0), ServerHealth::Warning);
        assert_eq!(t.throughput(2000.0), ServerHealth::Critical);

        let no_target = Thresholds {
            throughput_target: 0.0,
            ..Thresholds::default()
        };
        assert_eq!(no_target.throughput(0.0), ServerHealth::Healthy);
    }

    #[test]
    fn overall_is_worst_component() {
        let t = Thresholds::default();
        let report = t.assess(&snapshot(30.0, 2.0, 5000.0));
        assert_eq!(report.error_rate, ServerHealth::Warning);
        assert_eq!(report.overall, ServerHealth::Warning);

        let report = t.assess(&snapshot(150.0, 2.0, 5000.0));
        assert_eq!(report.overall, ServerHealth::Critical);
    }

    #[test]
    fn regions_sorted_worst_first() {
        let snapshot = MetricsSnapshot::builder()
            .region("us-east", |r| r.latency(20.0))
            .region("eu-central", |r| r.latency(20.0).status(RegionStatus::Offline))
            .region("us-west", |r| r.latency(60.0))
            .build();

        let report = Thresholds::default().assess(&snapshot);
        let names: Vec<&str> = report.regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["eu-central", "us-west", "us-east"]);
        assert_eq!(report.unhealthy_regions().count(), 2);
    }

    #[test]
    fn custom_latency_target() {
        let t = Thresholds::for_latency_target(200.0);
        assert_eq!(t.response_time(150.0), ServerHealth::Healthy);
        assert_eq!(t.latency_critical_ms, 400.0);
    }
}
