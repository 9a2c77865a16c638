//! Random anomaly events.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use streampulse_types::{AnomalyEvent, AnomalyType, Severity};

use crate::DEFAULT_REGIONS;

/// Metrics an anomaly can be attributed to.
pub const METRICS: [&str; 5] = [
    "response_time",
    "throughput",
    "error_rate",
    "cpu_usage",
    "memory_usage",
];

/// Produces synthetic [`AnomalyEvent`]s.
///
/// Type and severity are uniform; the observed value is drawn from
/// `0..1000` and the threshold from `0..=value`.
#[derive(Debug)]
pub struct AnomalySimulator {
    rng: StdRng,
    locations: Vec<String>,
    sequence: u64,
}

impl AnomalySimulator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            locations: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            sequence: 0,
        }
    }

    /// Replace the locations events are attributed to. Empty input is ignored.
    pub fn with_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let locations: Vec<String> = locations.into_iter().map(Into::into).collect();
        if !locations.is_empty() {
            self.locations = locations;
        }
        self
    }

    /// Returns true with the given probability (clamped to `0.0..=1.0`).
    pub fn roll(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    pub fn next_event(&mut self) -> AnomalyEvent {
        self.sequence += 1;
        let timestamp = streampulse_types::now_ms();

        let kind = AnomalyType::ALL[self.rng.gen_range(0..AnomalyType::ALL.len())];
        let severity = Severity::ALL[self.rng.gen_range(0..Severity::ALL.len())];
        let location = self.locations[self.rng.gen_range(0..self.locations.len())].clone();
        let metric = METRICS[self.rng.gen_range(0..METRICS.len())];
        let value: f64 = self.rng.gen_range(0.0..1000.0);
        let threshold: f64 = self.rng.gen_range(0.0..=value);

        AnomalyEvent {
            id: format!("anomaly-{}-{}", timestamp, self.sequence),
            kind,
            severity,
            description: describe(kind, metric, &location, value, threshold),
            location,
            metric: metric.to_string(),
            value,
            threshold,
            timestamp,
        }
    }
}

impl Default for AnomalySimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(kind: AnomalyType, metric: &str, location: &str, value: f64, threshold: f64) -> String {
    let what = match kind {
        AnomalyType::Spike => "Sudden spike",
        AnomalyType::Drop => "Sharp drop",
        AnomalyType::Pattern => "Unusual pattern",
        AnomalyType::Outlier => "Statistical outlier",
    };
    format!(
        "{} in {} at {}: observed {:.1} against threshold {:.1}",
        what, metric, location, value, threshold
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn events_are_well_formed() {
        let mut sim = AnomalySimulator::seeded(11);
        for _ in 0..200 {
            let event = sim.next_event();
            assert!(event.threshold <= event.value);
            assert!((0.0..1000.0).contains(&event.value));
            assert!(METRICS.contains(&event.metric.as_str()));
            assert!(DEFAULT_REGIONS.contains(&event.location.as_str()));
            assert!(event.description.contains(&event.metric));
        }
    }

    #[test]
    fn ids_are_unique() {
        let mut sim = AnomalySimulator::seeded(5);
        let ids: HashSet<_> = (0..100).map(|_| sim.next_event().id).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn every_type_and_severity_shows_up() {
        let mut sim = AnomalySimulator::seeded(2);
        let events: Vec<_> = (0..400).map(|_| sim.next_event()).collect();
        for kind in AnomalyType::ALL {
            assert!(events.iter().any(|e| e.kind == kind), "missing {kind}");
        }
        for severity in Severity::ALL {
            assert!(events.iter().any(|e| e.severity == severity), "missing {severity}");
        }
    }

    #[test]
    fn custom_locations() {
        let mut sim = AnomalySimulator::seeded(1).with_locations(["db-1"]);
        assert_eq!(sim.next_event().location, "db-1");

        let mut unchanged = AnomalySimulator::seeded(1).with_locations(Vec::<String>::new());
        assert!(DEFAULT_REGIONS.contains(&unchanged.next_event().location.as_str()));
    }

    #[test]
    fn roll_extremes() {
        let mut sim = AnomalySimulator::seeded(3);
        assert!(!sim.roll(0.0));
        assert!(sim.roll(1.0));
        assert!(sim.roll(7.5));
    }
}
