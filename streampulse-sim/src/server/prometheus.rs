//! Prometheus text exposition of the latest snapshot and hub statistics.

use std::fmt::Write;

use streampulse_types::{MetricsSnapshot, RegionStatus, ServerHealth};

use crate::{HubStats, WorkerStats};

/// Render `snapshot` (if any) and `stats` in the Prometheus text format.
///
/// Every metric name is prefixed with `streampulse_`, and with
/// `{namespace}_` before that when a namespace is given.
pub fn format_prometheus(
    snapshot: Option<&MetricsSnapshot>,
    stats: &HubStats,
    namespace: Option<&str>,
) -> String {
    let mut out = Exposition::new(namespace);

    if let Some(snapshot) = snapshot {
        out.family("response_time_ms", "gauge", "Average response time in milliseconds");
        out.sample("response_time_ms", "", snapshot.response_time);

        out.family("throughput", "gauge", "Processed events per second");
        out.sample("throughput", "", snapshot.throughput);

        out.family("error_rate_percent", "gauge", "Failed requests as a percentage");
        out.sample("error_rate_percent", "", snapshot.error_rate);

        out.family("anomalies", "gauge", "Anomalies reported in the latest snapshot");
        out.sample("anomalies", "", snapshot.anomalies as f64);

        out.family("active_users", "gauge", "Currently active users");
        out.sample("active_users", "", snapshot.active_users as f64);

        out.family(
            "server_health",
            "gauge",
            "1 for the current overall health state, 0 otherwise",
        );
        for health in ServerHealth::ALL {
            let labels = format!("state=\"{}\"", health);
            let value = if health == snapshot.server_health { 1.0 } else { 0.0 };
            out.sample("server_health", &labels, value);
        }

        if !snapshot.regions.is_empty() {
            out.family("region_latency_ms", "gauge", "Per-region latency in milliseconds");
            for region in &snapshot.regions {
                let labels = format!("region=\"{}\"", escape_label_value(&region.name));
                out.sample("region_latency_ms", &labels, region.latency);
            }

            out.family(
                "region_status",
                "gauge",
                "1 for the current region status, 0 otherwise",
            );
            for region in &snapshot.regions {
                let name = escape_label_value(&region.name);
                for status in RegionStatus::ALL {
                    let labels = format!("region=\"{}\",status=\"{}\"", name, status);
                    let value = if status == region.status { 1.0 } else { 0.0 };
                    out.sample("region_status", &labels, value);
                }
            }
        }

        out.family(
            "snapshot_timestamp_seconds",
            "gauge",
            "Unix timestamp of the latest snapshot",
        );
        let _ = writeln!(
            out.out,
            "{}snapshot_timestamp_seconds {:.3}",
            out.prefix,
            snapshot.timestamp as f64 / 1000.0
        );
    }

    out.family("active_connections", "gauge", "Connected stream clients");
    out.sample("active_connections", "", stats.active_connections as f64);

    out.family(
        "messages_published_total",
        "counter",
        "Messages published to the hub",
    );
    out.sample("messages_published_total", "", stats.messages_published as f64);

    out.family(
        "messages_sent_total",
        "counter",
        "Messages written to currently connected clients",
    );
    out.sample("messages_sent_total", "", stats.total_messages_sent as f64);

    out.out
}

/// Render ingest worker counters in the Prometheus text format, with the
/// same prefix rules as [`format_prometheus`].
pub fn format_worker_prometheus(stats: &WorkerStats, namespace: Option<&str>) -> String {
    let mut out = Exposition::new(namespace);

    out.family("ingest_processed_total", "counter", "Ingested events scored by the detector");
    out.sample("ingest_processed_total", "", stats.processed_count as f64);

    out.family("ingest_failed_total", "counter", "Ingested events that failed validation");
    out.sample("ingest_failed_total", "", stats.failed_count as f64);

    out.family("ingest_dead_letters_total", "counter", "Events sent to the dead letter queue");
    out.sample("ingest_dead_letters_total", "", stats.dlq_count as f64);

    out.family(
        "ingest_anomalies_total",
        "counter",
        "Anomalies detected in ingested events",
    );
    out.sample("ingest_anomalies_total", "", stats.anomalies_detected as f64);

    out.family("ingest_batches_total", "counter", "Accepted ingest batches");
    out.sample("ingest_batches_total", "", stats.batches as f64);

    out.family("ingest_success_ratio", "gauge", "Processed share of attempted events");
    out.sample("ingest_success_ratio", "", stats.success_rate);

    out.out
}

struct Exposition {
    out: String,
    prefix: String,
}

impl Exposition {
    fn new(namespace: Option<&str>) -> Self {
        let prefix = match namespace {
            Some(ns) => format!("{}_streampulse_", ns),
            None => "streampulse_".to_string(),
        };
        Self {
            out: String::new(),
            prefix,
        }
    }

    fn family(&mut self, name: &str, kind: &str, help: &str) {
        let _ = writeln!(self.out, "# HELP {}{} {}", self.prefix, name, help);
        let _ = writeln!(self.out, "# TYPE {}{} {}", self.prefix, name, kind);
    }

    fn sample(&mut self, name: &str, labels: &str, value: f64) {
        if labels.is_empty() {
            let _ = writeln!(self.out, "{}{} {}", self.prefix, name, value);
        } else {
            let _ = writeln!(self.out, "{}{}{{{}}} {}", self.prefix, name, labels, value);
        }
    }
}

/// Escape a label value for Prometheus format.
/// Backslash, double-quote, and newline must be escaped.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot::builder()
            .timestamp(1_703_160_000_000)
            .response_time(42.5)
            .throughput(4800.0)
            .error_rate(1.25)
            .anomalies(3)
            .active_users(1500)
            .server_health(ServerHealth::Warning)
            .region("us-east", |r| r.latency(80.0).status(RegionStatus::Degraded))
            .build()
    }

    #[test]
    fn renders_snapshot_gauges() {
        let output = format_prometheus(Some(&snapshot()), &HubStats::default(), None);

        assert!(output.contains("streampulse_response_time_ms 42.5\n"));
        assert!(output.contains("streampulse_throughput 4800\n"));
        assert!(output.contains("streampulse_error_rate_percent 1.25\n"));
        assert!(output.contains("streampulse_active_users 1500\n"));
        assert!(output.contains("streampulse_server_health{state=\"warning\"} 1\n"));
        assert!(output.contains("streampulse_server_health{state=\"healthy\"} 0\n"));
        assert!(output.contains("streampulse_region_latency_ms{region=\"us-east\"} 80\n"));
        assert!(output
            .contains("streampulse_region_status{region=\"us-east\",status=\"degraded\"} 1\n"));
        assert!(output.contains("streampulse_snapshot_timestamp_seconds 1703160000.000"));
    }

    #[test]
    fn includes_help_and_type() {
        let output = format_prometheus(Some(&snapshot()), &HubStats::default(), None);
        assert!(output.contains("# HELP streampulse_response_time_ms"));
        assert!(output.contains("# TYPE streampulse_response_time_ms gauge"));
        assert!(output.contains("# TYPE streampulse_messages_published_total counter"));
    }

    #[test]
    fn hub_stats_without_snapshot() {
        let stats = HubStats {
            active_connections: 2,
            total_messages_sent: 10,
            messages_published: 6,
            connections: Vec::new(),
        };
        let output = format_prometheus(None, &stats, Some("prod"));

        assert!(!output.contains("response_time_ms"));
        assert!(output.contains("prod_streampulse_active_connections 2\n"));
        assert!(output.contains("prod_streampulse_messages_published_total 6\n"));
        assert!(output.contains("prod_streampulse_messages_sent_total 10\n"));
    }

    #[test]
    fn worker_counters() {
        let stats = WorkerStats {
            processed_count: 9,
            failed_count: 1,
            dlq_count: 1,
            anomalies_detected: 2,
            batches: 3,
            success_rate: 0.9,
        };
        let output = format_worker_prometheus(&stats, Some("prod"));

        assert!(output.contains("# TYPE prod_streampulse_ingest_processed_total counter"));
        assert!(output.contains("prod_streampulse_ingest_processed_total 9\n"));
        assert!(output.contains("prod_streampulse_ingest_dead_letters_total 1\n"));
        assert!(output.contains("prod_streampulse_ingest_anomalies_total 2\n"));
        assert!(output.contains("prod_streampulse_ingest_success_ratio 0.9\n"));
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }
}
