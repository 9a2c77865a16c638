//! In-memory event ingestion scored by the z-score detector.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use streampulse_types::{now_ms, StreamMessage};
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::{Hub, ZScoreDetector};

/// Largest batch accepted by [`IngestWorker::ingest`].
pub const MAX_BATCH_SIZE: usize = 1000;

/// Dead letters kept for inspection; older ones are discarded.
pub const DEAD_LETTER_CAPACITY: usize = 1000;

/// Location given to anomalies whose event has no `metadata.location`.
const DEFAULT_LOCATION: &str = "ingest";

/// One externally reported measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestEvent {
    /// Event time as sent by the producer (ISO 8601 by convention).
    pub timestamp: String,
    /// Event type, used as the metric name of any anomaly it triggers.
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl IngestEvent {
    pub fn new(kind: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: now_ms().to_string(),
            kind: kind.into(),
            value,
            metadata: Map::new(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.timestamp.trim().is_empty() {
            return Err("missing timestamp".to_string());
        }
        if self.kind.trim().is_empty() {
            return Err("missing type".to_string());
        }
        if !self.value.is_finite() {
            return Err(format!("value {} is not finite", self.value));
        }
        Ok(())
    }

    fn location(&self) -> &str {
        self.metadata
            .get("location")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_LOCATION)
    }
}

/// Request body of the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestBatch {
    pub events: Vec<IngestEvent>,
}

/// Outcome of one accepted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    /// True when every event in the batch was processed.
    pub success: bool,
    pub ingested: usize,
    pub total: usize,
    pub processing_time_ms: f64,
    pub batch_id: String,
}

/// An event that failed processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub event: IngestEvent,
    pub reason: String,
    pub failed_at: u64,
}

/// Counters since the worker was created.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WorkerStats {
    pub processed_count: u64,
    pub failed_count: u64,
    pub dlq_count: u64,
    pub anomalies_detected: u64,
    pub batches: u64,
    /// processed / (processed + failed), or 0 before any event.
    pub success_rate: f64,
}

/// Scores ingested values with a [`ZScoreDetector`] and publishes an
/// `anomaly_alert` to the hub for every outlier.
///
/// Batches are checked as a whole first (1 to [`MAX_BATCH_SIZE`] events).
/// Within an accepted batch, each event is validated on its own; invalid
/// events are counted as failed and kept as [`DeadLetter`]s instead of
/// failing the batch.
///
/// ```rust
/// use std::sync::Arc;
/// use streampulse_sim::{Hub, IngestEvent, IngestWorker};
///
/// let hub = Arc::new(Hub::default());
/// let worker = IngestWorker::new(hub);
///
/// let response = worker.ingest(vec![IngestEvent::new("cpu_usage", 42.0)]).unwrap();
/// assert!(response.success);
/// assert_eq!(worker.stats().processed_count, 1);
/// ```
#[derive(Debug)]
pub struct IngestWorker {
    hub: Arc<Hub>,
    detector: Mutex<ZScoreDetector>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    processed: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
    anomalies: AtomicU64,
    batches: AtomicU64,
}

impl IngestWorker {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self::with_detector(hub, ZScoreDetector::new())
    }

    pub fn with_detector(hub: Arc<Hub>, detector: ZScoreDetector) -> Self {
        Self {
            hub,
            detector: Mutex::new(detector),
            dead_letters: Mutex::new(VecDeque::new()),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        }
    }

    /// Decode an [`IngestBatch`] from JSON and ingest it.
    pub fn ingest_json(&self, body: &[u8]) -> Result<IngestResponse, IngestError> {
        let batch: IngestBatch =
            serde_json::from_slice(body).map_err(|e| IngestError::Malformed(e.to_string()))?;
        self.ingest(batch.events)
    }

    pub fn ingest(&self, events: Vec<IngestEvent>) -> Result<IngestResponse, IngestError> {
        if events.is_empty() {
            return Err(IngestError::EmptyBatch);
        }
        if events.len() > MAX_BATCH_SIZE {
            return Err(IngestError::BatchTooLarge {
                size: events.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        let started = Instant::now();
        let total = events.len();
        let mut ingested = 0;
        for event in events {
            if self.process(event) {
                ingested += 1;
            }
        }

        let batch = self.batches.fetch_add(1, Ordering::Relaxed) + 1;
        let response = IngestResponse {
            success: ingested == total,
            ingested,
            total,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            batch_id: format!("batch_{}_{}", now_ms(), batch),
        };
        debug!(
            batch_id = %response.batch_id,
            ingested,
            total,
            "batch ingested"
        );
        Ok(response)
    }

    fn process(&self, event: IngestEvent) -> bool {
        if let Err(reason) = event.validate() {
            self.dead_letter(event, reason);
            return false;
        }

        let detection = self.detector.lock().detect(event.value);
        self.processed.fetch_add(1, Ordering::Relaxed);

        if let Some(anomaly) = detection.to_event(&event.kind, event.location(), now_ms()) {
            info!(
                metric = %anomaly.metric,
                value = anomaly.value,
                z_score = detection.z_score,
                "anomaly detected in ingested event"
            );
            self.anomalies.fetch_add(1, Ordering::Relaxed);
            self.hub.publish(StreamMessage::AnomalyAlert(anomaly));
        }
        true
    }

    fn dead_letter(&self, event: IngestEvent, reason: String) {
        warn!(kind = %event.kind, reason = %reason, "event sent to dead letter queue");
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);

        let mut dead_letters = self.dead_letters.lock();
        if dead_letters.len() == DEAD_LETTER_CAPACITY {
            dead_letters.pop_back();
        }
        dead_letters.push_front(DeadLetter {
            event,
            reason,
            failed_at: now_ms(),
        });
    }

    /// Up to `limit` dead letters, newest first.
    pub fn dead_letters(&self, limit: usize) -> Vec<DeadLetter> {
        self.dead_letters.lock().iter().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> WorkerStats {
        let processed = self.processed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let attempted = processed + failed;
        WorkerStats {
            processed_count: processed,
            failed_count: failed,
            dlq_count: self.dead_lettered.load(Ordering::Relaxed),
            anomalies_detected: self.anomalies.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            success_rate: if attempted > 0 {
                processed as f64 / attempted as f64
            } else {
                0.0
            },
        }
    }
}
