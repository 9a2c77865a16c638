//! Rolling z-score anomaly detection.

use std::collections::VecDeque;

use streampulse_types::{AnomalyEvent, AnomalyType, Severity};

/// Outcome of feeding one value to a [`ZScoreDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub value: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Absolute distance from the mean, in standard deviations.
    pub z_score: f64,
    pub is_anomaly: bool,
    /// The detector threshold in effect, in standard deviations.
    pub sigmas: f64,
}

impl Detection {
    fn normal(value: f64, sigmas: f64) -> Self {
        Self {
            value,
            mean: 0.0,
            std_dev: 0.0,
            z_score: 0.0,
            is_anomaly: false,
            sigmas,
        }
    }

    /// Turn a positive detection into an anomaly event.
    ///
    /// Values above the mean become spikes and values below become drops.
    /// Severity is `high` beyond four standard deviations and `medium`
    /// otherwise. Returns `None` if the value was not anomalous.
    pub fn to_event(&self, metric: &str, location: &str, timestamp: u64) -> Option<AnomalyEvent> {
        if !self.is_anomaly {
            return None;
        }

        let above = self.value >= self.mean;
        let (kind, threshold) = if above {
            (AnomalyType::Spike, self.mean + self.sigmas * self.std_dev)
        } else {
            (AnomalyType::Drop, self.mean - self.sigmas * self.std_dev)
        };
        let severity = if self.z_score > 4.0 {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(AnomalyEvent {
            id: format!("zscore-{}-{}", metric, timestamp),
            kind,
            severity,
            location: location.to_string(),
            metric: metric.to_string(),
            value: self.value,
            threshold,
            timestamp,
            description: format!(
                "{} {} {:.1}σ from rolling mean {:.2}",
                metric,
                if above { "rose" } else { "fell" },
                self.z_score,
                self.mean
            ),
        })
    }
}

/// Flags values that sit more than `threshold` standard deviations away from
/// the mean of a rolling window.
///
/// Nothing is flagged until [`ZScoreDetector::MIN_SAMPLES`] values have been
/// seen, or while the window has zero variance.
///
/// ```rust
/// use streampulse_sim::ZScoreDetector;
///
/// let mut detector = ZScoreDetector::new();
/// for i in 0..50 {
///     detector.detect(100.0 + (i % 5) as f64);
/// }
/// assert!(detector.detect(400.0).is_anomaly);
/// ```
#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    window: VecDeque<f64>,
    capacity: usize,
    threshold: f64,
}

impl ZScoreDetector {
    pub const DEFAULT_WINDOW: usize = 100;
    pub const DEFAULT_THRESHOLD: f64 = 3.0;
    /// Samples required before any value can be flagged.
    pub const MIN_SAMPLES: usize = 30;

    pub fn new() -> Self {
        Self::with_params(Self::DEFAULT_WINDOW, Self::DEFAULT_THRESHOLD)
    }

    /// A window smaller than one sample is treated as one.
    pub fn with_params(window: usize, threshold: f64) -> Self {
        let capacity = window.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of values currently in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Add `value` to the window and score it against the window,
    /// including itself.
    pub fn detect(&mut self, value: f64) -> Detection {
        self.window.push_back(value);
        if self.window.len() > self.capacity {
            self.window.pop_front();
        }

        if self.window.len() < Self::MIN_SAMPLES {
            return Detection::normal(value, self.threshold);
        }

        let n = self.window.len() as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let variance = self.window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        if std_dev == 0.0 {
            return Detection {
                mean,
                ..Detection::normal(value, self.threshold)
            };
        }

        let z_score = ((value - mean) / std_dev).abs();
        Detection {
            value,
            mean,
            std_dev,
            z_score,
            is_anomaly: z_score > self.threshold,
            sigmas: self.threshold,
        }
    }
}

impl Default for ZScoreDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warmed(detector: &mut ZScoreDetector, n: usize) {
        for i in 0..n {
            detector.detect(50.0 + (i % 7) as f64);
        }
    }

    #[test]
    fn silent_until_min_samples() {
        let mut detector = ZScoreDetector::new();
        for _ in 0..ZScoreDetector::MIN_SAMPLES - 1 {
            let d = detector.detect(1.0);
            assert!(!d.is_anomaly);
            assert_eq!(d.z_score, 0.0);
        }
        // Even an extreme value is ignored while warming up
        let mut cold = ZScoreDetector::new();
        assert!(!cold.detect(1e9).is_anomaly);
    }

    #[test]
    fn constant_window_never_flags() {
        let mut detector = ZScoreDetector::new();
        for _ in 0..40 {
            let d = detector.detect(10.0);
            assert!(!d.is_anomaly);
            assert_eq!(d.z_score, 0.0);
        }
    }

    #[test]
    fn flags_outlier_after_stable_window() {
        let mut detector = ZScoreDetector::new();
        warmed(&mut detector, 60);

        let d = detector.detect(500.0);
        assert!(d.is_anomaly);
        assert!(d.z_score > 3.0);

        let normal = detector.detect(53.0);
        assert!(!normal.is_anomaly);
    }

    #[test]
    fn window_is_bounded() {
        let mut detector = ZScoreDetector::with_params(10, 3.0);
        for i in 0..25 {
            detector.detect(i as f64);
        }
        assert_eq!(detector.len(), 10);

        detector.reset();
        assert!(detector.is_empty());
    }

    #[test]
    fn z_score_matches_population_std_dev() {
        let mut detector = ZScoreDetector::new();
        // 15 zeros and 15 twos: mean 1, population std dev 1
        for i in 0..29 {
            detector.detect(if i % 2 == 0 { 0.0 } else { 2.0 });
        }
        let d = detector.detect(2.0);
        assert!((d.mean - 1.0).abs() < 1e-9);
        assert!((d.std_dev - 1.0).abs() < 1e-9);
        assert!((d.z_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn spike_and_drop_events() {
        let mut detector = ZScoreDetector::new();
        warmed(&mut detector, 60);

        let spike = detector.detect(900.0);
        let event = spike.to_event("response_time", "us-east", 1000).unwrap();
        assert_eq!(event.kind, AnomalyType::Spike);
        assert_eq!(event.severity, Severity::High);
        assert!(event.threshold > spike.mean);
        assert_eq!(event.location, "us-east");

        let mut detector = ZScoreDetector::new();
        warmed(&mut detector, 60);
        let drop = detector.detect(-900.0);
        let event = drop.to_event("throughput", "eu-central", 2000).unwrap();
        assert_eq!(event.kind, AnomalyType::Drop);
        assert!(event.threshold < drop.mean);
    }

    #[test]
    fn normal_values_produce_no_event() {
        let mut detector = ZScoreDetector::new();
        warmed(&mut detector, 40);
        assert!(detector.detect(52.0).to_event("x", "y", 0).is_none());
    }
}
