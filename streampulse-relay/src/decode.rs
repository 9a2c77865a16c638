//! Turning one transport frame into a relayed message.

use serde_json::Value;
use streampulse_types::{MetricsSnapshot, StreamMessage};

use crate::RelayError;

/// A message type a [`Relay`](crate::Relay) can decode from a frame.
///
/// `Ok(None)` means the frame is well formed but carries nothing of this
/// type; it is skipped without touching [`last_error`](crate::Relay::last_error).
pub trait Inbound: Sized + Send + Sync + 'static {
    fn decode(frame: &str) -> Result<Option<Self>, RelayError>;
}

impl Inbound for StreamMessage {
    fn decode(frame: &str) -> Result<Option<Self>, RelayError> {
        Ok(Some(serde_json::from_str(frame)?))
    }
}

/// Accepts bare snapshots as well as `{"type": .., "data": ..}` envelopes,
/// of which only `metrics` is kept.
impl Inbound for MetricsSnapshot {
    fn decode(frame: &str) -> Result<Option<Self>, RelayError> {
        let value: Value = serde_json::from_str(frame)?;
        if !is_envelope(&value) {
            return Ok(Some(serde_json::from_value(value)?));
        }
        match serde_json::from_value::<StreamMessage>(value)? {
            StreamMessage::Metrics(snapshot) => Ok(Some(snapshot)),
            _ => Ok(None),
        }
    }
}

impl Inbound for Value {
    fn decode(frame: &str) -> Result<Option<Self>, RelayError> {
        Ok(Some(serde_json::from_str(frame)?))
    }
}

fn is_envelope(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.get("type").is_some_and(Value::is_string) && o.contains_key("data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_snapshot() {
        let snapshot = MetricsSnapshot::decode(r#"{"timestamp":1000,"responseTime":42}"#)
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.timestamp, 1000);
        assert_eq!(snapshot.response_time, 42.0);
    }

    #[test]
    fn metrics_envelope_is_unwrapped() {
        let frame = serde_json::to_string(&StreamMessage::from(
            MetricsSnapshot::builder().timestamp(1000).response_time(42.0).build(),
        ))
        .unwrap();

        let snapshot = MetricsSnapshot::decode(&frame).unwrap().unwrap();
        assert_eq!(snapshot.timestamp, 1000);
        assert_eq!(snapshot.response_time, 42.0);
    }

    #[test]
    fn other_envelopes_are_skipped() {
        let greeting = r#"{"type":"connected","data":{"client_id":"c1","message":"hi"}}"#;
        assert_eq!(MetricsSnapshot::decode(greeting).unwrap(), None);
    }

    #[test]
    fn unknown_envelope_is_a_parse_error() {
        let frame = r#"{"type":"mystery","data":{}}"#;
        assert!(matches!(
            MetricsSnapshot::decode(frame),
            Err(RelayError::Parse(_))
        ));
    }

    #[test]
    fn stream_message_keeps_everything() {
        let greeting = r#"{"type":"connected","data":{"client_id":"c1","message":"hi"}}"#;
        let message = StreamMessage::decode(greeting).unwrap().unwrap();
        assert_eq!(message.kind(), "connected");
        assert!(StreamMessage::decode("{}").is_err());
    }
}
