//! The periodic broadcast loop.

use std::time::Duration;

use streampulse_types::{StreamMessage, ThroughputWarning};
use tracing::{debug, info, warn};

use crate::{AnomalySimulator, MockGenerator, Output, ZScoreDetector};

/// Location attached to anomalies found by the detector.
const DETECTOR_LOCATION: &str = "global";

/// Build a warning if `current` is below `ratio * target`.
///
/// ```rust
/// use streampulse_sim::throughput_warning;
///
/// assert!(throughput_warning(4500.0, 5000.0, 0.8).is_none());
/// let warning = throughput_warning(3000.0, 5000.0, 0.8).unwrap();
/// assert_eq!(warning.threshold, 4000.0);
/// ```
pub fn throughput_warning(current: f64, target: f64, ratio: f64) -> Option<ThroughputWarning> {
    let threshold = target * ratio;
    if target <= 0.0 || current >= threshold {
        return None;
    }
    Some(ThroughputWarning {
        current_throughput: current,
        target_throughput: target,
        threshold,
        performance_ratio: current / target,
    })
}

/// Generates a snapshot every interval and emits it, along with any alerts,
/// to the configured outputs.
///
/// Each tick produces, in order:
/// 1. a `metrics` message,
/// 2. an `anomaly_alert` if the response time is a z-score outlier,
/// 3. a simulated `anomaly_alert` with the configured probability,
/// 4. a `throughput_warning` if throughput is under the warning ratio.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use streampulse_sim::{Emitter, Output};
///
/// #[tokio::main]
/// async fn main() {
///     let (output, mut rx) = Output::channel(64);
///     let emitter = Emitter::builder()
///         .output(output)
///         .interval(Duration::from_secs(1))
///         .build();
///
///     let handle = emitter.start();
///     while let Some(message) = rx.recv().await {
///         println!("{}", message.kind());
///     }
///     handle.stop();
/// }
/// ```
#[derive(Debug)]
pub struct Emitter {
    generator: MockGenerator,
    simulator: AnomalySimulator,
    detector: ZScoreDetector,
    outputs: Vec<Output>,
    interval: Duration,
    anomaly_probability: f64,
    throughput_target: f64,
    warning_ratio: f64,
}

impl Emitter {
    pub const DEFAULT_THROUGHPUT_TARGET: f64 = 5000.0;
    pub const DEFAULT_WARNING_RATIO: f64 = 0.8;
    pub const DEFAULT_ANOMALY_PROBABILITY: f64 = 0.1;

    pub fn builder() -> EmitterBuilder {
        EmitterBuilder::new()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Produce the messages for one tick without emitting them.
    pub fn tick(&mut self) -> Vec<StreamMessage> {
        let snapshot = self.generator.next_snapshot();
        let mut messages = Vec::with_capacity(4);

        let detection = self.detector.detect(snapshot.response_time);
        let detected =
            detection.to_event("response_time", DETECTOR_LOCATION, snapshot.timestamp);
        let warning = throughput_warning(
            snapshot.throughput,
            self.throughput_target,
            self.warning_ratio,
        );

        messages.push(StreamMessage::Metrics(snapshot));

        if let Some(event) = detected {
            info!(
                z_score = detection.z_score,
                value = detection.value,
                "anomaly detected"
            );
            messages.push(StreamMessage::AnomalyAlert(event));
        }

        if self.simulator.roll(self.anomaly_probability) {
            messages.push(StreamMessage::AnomalyAlert(self.simulator.next_event()));
        }

        if let Some(warning) = warning {
            warn!(
                current = warning.current_throughput,
                target = warning.target_throughput,
                "throughput below target"
            );
            messages.push(StreamMessage::ThroughputWarning(warning));
        }

        messages
    }

    /// Run one tick and emit its messages to every output.
    pub async fn emit_now(&mut self) {
        let messages = self.tick();
        emit_all(&self.outputs, &messages).await;
    }

    /// Start the broadcast loop on a background task.
    ///
    /// The first tick happens one interval after the call.
    pub fn start(mut self) -> EmissionHandle {
        use tokio::sync::watch;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let period = self.interval;

        let task = tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "starting broadcast loop");
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let messages = self.tick();
                        debug!(count = messages.len(), "emitting messages");
                        emit_all(&self.outputs, &messages).await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("broadcast loop stopped");
        });

        EmissionHandle { stop_tx, task }
    }
}

async fn emit_all(outputs: &[Output], messages: &[StreamMessage]) {
    for message in messages {
        for output in outputs {
            if let Err(e) = output.emit(message).await {
                warn!(error = %e, kind = message.kind(), "failed to emit message");
            }
        }
    }
}

/// Builder for configuring an [`Emitter`].
#[derive(Debug, Default)]
pub struct EmitterBuilder {
    outputs: Vec<Output>,
    interval: Option<Duration>,
    seed: Option<u64>,
    regions: Option<Vec<String>>,
    anomaly_probability: Option<f64>,
    throughput_target: Option<f64>,
    warning_ratio: Option<f64>,
    detector: Option<ZScoreDetector>,
}

impl EmitterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output. Messages are emitted to all of them.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Defaults to two seconds.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Seed both the metrics generator and the anomaly simulator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    /// Chance per tick of a simulated anomaly alert. Defaults to 0.1.
    pub fn anomaly_probability(mut self, probability: f64) -> Self {
        self.anomaly_probability = Some(probability);
        self
    }

    /// Target throughput in events/s. Defaults to 5000.
    pub fn throughput_target(mut self, target: f64) -> Self {
        self.throughput_target = Some(target);
        self
    }

    /// Fraction of the target below which a warning is emitted. Defaults to 0.8.
    pub fn warning_ratio(mut self, ratio: f64) -> Self {
        self.warning_ratio = Some(ratio);
        self
    }

    pub fn detector(mut self, detector: ZScoreDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn build(self) -> Emitter {
        let interval = self.interval.unwrap_or(MockGenerator::DEFAULT_INTERVAL);

        let mut generator = MockGenerator::builder().interval(interval);
        if let Some(seed) = self.seed {
            generator = generator.seed(seed);
        }
        if let Some(regions) = self.regions.clone() {
            generator = generator.regions(regions);
        }

        let mut simulator = match self.seed {
            Some(seed) => AnomalySimulator::seeded(seed.wrapping_add(1)),
            None => AnomalySimulator::new(),
        };
        if let Some(regions) = self.regions {
            simulator = simulator.with_locations(regions);
        }

        Emitter {
            generator: generator.build(),
            simulator,
            detector: self.detector.unwrap_or_default(),
            outputs: self.outputs,
            interval,
            anomaly_probability: self
                .anomaly_probability
                .unwrap_or(Emitter::DEFAULT_ANOMALY_PROBABILITY),
            throughput_target: self
                .throughput_target
                .unwrap_or(Emitter::DEFAULT_THROUGHPUT_TARGET),
            warning_ratio: self.warning_ratio.unwrap_or(Emitter::DEFAULT_WARNING_RATIO),
        }
    }
}

/// Handle for controlling background emission.
///
/// Drop this handle to stop emission, or call `stop()` explicitly.
#[derive(Debug)]
pub struct EmissionHandle {
    stop_tx: tokio::sync::watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl EmissionHandle {
    /// Stop background emission.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for EmissionHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        self.task.abort();
    }
}
