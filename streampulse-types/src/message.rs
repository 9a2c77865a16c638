//! Envelope for everything the emitter puts on the wire.

use crate::{AnomalyEvent, MetricsSnapshot};

/// Raised when throughput falls below a fraction of its target.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThroughputWarning {
    pub current_throughput: f64,
    pub target_throughput: f64,
    pub threshold: f64,
    /// `current_throughput / target_throughput`.
    pub performance_ratio: f64,
}

/// A message published by the emitter.
///
/// Encoded as `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", content = "data", rename_all = "snake_case")
)]
pub enum StreamMessage {
    /// First message on every client connection.
    Connected { client_id: String, message: String },
    Metrics(MetricsSnapshot),
    AnomalyAlert(AnomalyEvent),
    ThroughputWarning(ThroughputWarning),
}

impl StreamMessage {
    /// The `type` tag used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Connected { .. } => "connected",
            StreamMessage::Metrics(_) => "metrics",
            StreamMessage::AnomalyAlert(_) => "anomaly_alert",
            StreamMessage::ThroughputWarning(_) => "throughput_warning",
        }
    }

    pub fn as_metrics(&self) -> Option<&MetricsSnapshot> {
        match self {
            StreamMessage::Metrics(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

impl From<MetricsSnapshot> for StreamMessage {
    fn from(snapshot: MetricsSnapshot) -> Self {
        StreamMessage::Metrics(snapshot)
    }
}

impl From<AnomalyEvent> for StreamMessage {
    fn from(event: AnomalyEvent) -> Self {
        StreamMessage::AnomalyAlert(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags() {
        let msg: StreamMessage = MetricsSnapshot::with_timestamp(5).into();
        assert_eq!(msg.kind(), "metrics");
        assert_eq!(msg.as_metrics().map(|s| s.timestamp), Some(5));

        let connected = StreamMessage::Connected {
            client_id: "client_1".into(),
            message: "hello".into(),
        };
        assert_eq!(connected.kind(), "connected");
        assert!(connected.as_metrics().is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn adjacently_tagged_encoding() {
        let msg = StreamMessage::ThroughputWarning(ThroughputWarning {
            current_throughput: 3000.0,
            target_throughput: 5000.0,
            threshold: 4000.0,
            performance_ratio: 0.6,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "throughput_warning");
        assert_eq!(value["data"]["target_throughput"], 5000.0);

        let decoded: StreamMessage = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, msg);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn metrics_payload_keeps_camel_case() {
        let json = r#"{"type":"metrics","data":{"timestamp":1000,"responseTime":42}}"#;
        let msg: StreamMessage = serde_json::from_str(json).unwrap();
        let snapshot = msg.as_metrics().unwrap();
        assert_eq!(snapshot.response_time, 42.0);
    }
}
