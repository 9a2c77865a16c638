//! Bounded windows over received snapshots and anomaly events.

use std::collections::{BTreeMap, VecDeque};

use streampulse_types::{AnomalyEvent, MetricsSnapshot, Severity};

/// The last `capacity` snapshots, oldest first.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    snapshots: VecDeque<MetricsSnapshot>,
    capacity: usize,
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl MetricsHistory {
    pub const DEFAULT_CAPACITY: usize = 100;

    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a snapshot, discarding the oldest one when full.
    pub fn record(&mut self, snapshot: MetricsSnapshot) {
        self.snapshots.push_back(snapshot);
        if self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.snapshots.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricsSnapshot> {
        self.snapshots.iter()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn response_times(&self) -> Vec<f64> {
        self.series(|s| s.response_time)
    }

    pub fn throughputs(&self) -> Vec<f64> {
        self.series(|s| s.throughput)
    }

    pub fn error_rates(&self) -> Vec<f64> {
        self.series(|s| s.error_rate)
    }

    /// Latency of one region over time. Snapshots without the region are skipped.
    pub fn region_latencies(&self, region: &str) -> Vec<f64> {
        self.snapshots
            .iter()
            .filter_map(|s| s.region(region).map(|r| r.latency))
            .collect()
    }

    fn series(&self, field: impl Fn(&MetricsSnapshot) -> f64) -> Vec<f64> {
        self.snapshots.iter().map(field).collect()
    }

    pub fn average_response_time(&self) -> Option<f64> {
        mean(&self.response_times())
    }

    pub fn average_throughput(&self) -> Option<f64> {
        mean(&self.throughputs())
    }

    pub fn average_error_rate(&self) -> Option<f64> {
        mean(&self.error_rates())
    }

    /// Change in throughput per second between the two most recent snapshots.
    ///
    /// Returns None if there's not enough history or the timestamps do not
    /// advance.
    pub fn throughput_trend(&self) -> Option<f64> {
        let len = self.snapshots.len();
        if len < 2 {
            return None;
        }
        let current = &self.snapshots[len - 1];
        let previous = &self.snapshots[len - 2];

        let elapsed = current.timestamp.checked_sub(previous.timestamp)? as f64 / 1000.0;
        if elapsed > 0.0 {
            Some((current.throughput - previous.throughput) / elapsed)
        } else {
            None
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Normalize values to 0-7 range for sparkline display.
///
/// The smallest value maps to 0 and the largest to 7; a flat series is all
/// zeros.
///
/// ```
/// use streampulse_relay::sparkline;
///
/// assert_eq!(sparkline(&[10.0, 20.0, 15.0]), vec![0, 7, 3]);
/// ```
pub fn sparkline(values: &[f64]) -> Vec<u8> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values
        .iter()
        .map(|&v| {
            if range > 0.0 {
                (((v - min) / range * 7.0) as u8).min(7)
            } else {
                0
            }
        })
        .collect()
}

/// Render a sparkline with block characters.
pub fn sparkline_bars(values: &[f64]) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    sparkline(values)
        .into_iter()
        .map(|level| BARS[level as usize])
        .collect()
}

/// The last `capacity` anomaly events, newest first.
#[derive(Debug, Clone)]
pub struct AnomalyLog {
    events: VecDeque<AnomalyEvent>,
    capacity: usize,
}

impl Default for AnomalyLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl AnomalyLog {
    pub const DEFAULT_CAPACITY: usize = 20;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, event: AnomalyEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest(&self) -> Option<&AnomalyEvent> {
        self.events.front()
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &AnomalyEvent> {
        self.events.iter()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.events.iter().filter(|e| e.severity == severity).count()
    }

    /// Event counts for every severity, including zeros.
    pub fn counts(&self) -> BTreeMap<Severity, usize> {
        Severity::ALL.iter().map(|&s| (s, self.count(s))).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streampulse_types::AnomalyType;

    fn snapshot(ts: u64, response_time: f64, throughput: f64) -> MetricsSnapshot {
        MetricsSnapshot::builder()
            .timestamp(ts)
            .response_time(response_time)
            .throughput(throughput)
            .build()
    }

    fn event(id: &str, severity: Severity) -> AnomalyEvent {
        AnomalyEvent {
            id: id.to_string(),
            kind: AnomalyType::Spike,
            severity,
            location: "us-east".into(),
            metric: "response_time".into(),
            value: 10.0,
            threshold: 5.0,
            timestamp: 0,
            description: String::new(),
        }
    }

    #[test]
    fn history_never_exceeds_capacity() {
        let mut history = MetricsHistory::new(3);
        for ts in 0..10 {
            history.record(snapshot(ts, ts as f64, 0.0));
            assert!(history.len() <= 3);
        }
        assert_eq!(history.response_times(), vec![7.0, 8.0, 9.0]);
        assert_eq!(history.latest().map(|s| s.timestamp), Some(9));
    }

    #[test]
    fn default_history_keeps_one_hundred() {
        let mut history = MetricsHistory::default();
        for ts in 0..150 {
            history.record(snapshot(ts, 0.0, 0.0));
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.iter().next().map(|s| s.timestamp), Some(50));
    }

    #[test]
    fn averages() {
        let mut history = MetricsHistory::default();
        assert_eq!(history.average_response_time(), None);

        history.record(snapshot(0, 20.0, 3000.0));
        history.record(snapshot(1, 40.0, 5000.0));
        assert_eq!(history.average_response_time(), Some(30.0));
        assert_eq!(history.average_throughput(), Some(4000.0));
    }

    #[test]
    fn throughput_trend_uses_timestamps() {
        let mut history = MetricsHistory::default();
        history.record(snapshot(1_000, 0.0, 4000.0));
        assert_eq!(history.throughput_trend(), None);

        history.record(snapshot(3_000, 0.0, 5000.0));
        assert_eq!(history.throughput_trend(), Some(500.0));

        // Same timestamp: no rate
        history.record(snapshot(3_000, 0.0, 6000.0));
        assert_eq!(history.throughput_trend(), None);
    }

    #[test]
    fn region_series_skips_missing_regions() {
        let mut history = MetricsHistory::default();
        history.record(
            MetricsSnapshot::builder()
                .region("us-east", |r| r.latency(12.0))
                .build(),
        );
        history.record(MetricsSnapshot::builder().build());
        history.record(
            MetricsSnapshot::builder()
                .region("us-east", |r| r.latency(30.0))
                .build(),
        );
        assert_eq!(history.region_latencies("us-east"), vec![12.0, 30.0]);
    }

    #[test]
    fn sparkline_levels() {
        assert!(sparkline(&[]).is_empty());
        assert_eq!(sparkline(&[5.0, 5.0]), vec![0, 0]);
        assert_eq!(sparkline(&[0.0, 7.0, 3.5]), vec![0, 7, 3]);
        assert_eq!(sparkline_bars(&[0.0, 1.0]), "▁█");
    }

    #[test]
    fn anomaly_log_is_newest_first_and_bounded() {
        let mut log = AnomalyLog::new(2);
        log.record(event("a", Severity::Low));
        log.record(event("b", Severity::High));
        log.record(event("c", Severity::High));

        let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(log.latest().map(|e| e.id.as_str()), Some("c"));
    }

    #[test]
    fn anomaly_counts_by_severity() {
        let mut log = AnomalyLog::default();
        for (i, severity) in [Severity::Low, Severity::High, Severity::High]
            .into_iter()
            .enumerate()
        {
            log.record(event(&i.to_string(), severity));
        }

        let counts = log.counts();
        assert_eq!(counts[&Severity::Low], 1);
        assert_eq!(counts[&Severity::High], 2);
        assert_eq!(counts[&Severity::Critical], 0);
        assert_eq!(counts.len(), 4);
    }
}
