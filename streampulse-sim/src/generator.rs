//! Synthetic metrics generator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use streampulse_types::{MetricsSnapshot, RegionMetrics, RegionStatus, ServerHealth};
use tracing::debug;

use crate::DEFAULT_REGIONS;

/// Value ranges drawn by [`MockGenerator`]. Each field is independent and uniform.
pub mod ranges {
    use std::ops::{Range, RangeInclusive};

    /// Response time in milliseconds.
    pub const RESPONSE_TIME_MS: Range<f64> = 20.0..120.0;
    /// Events per second.
    pub const THROUGHPUT: Range<f64> = 3000.0..6000.0;
    /// Error rate in percent.
    pub const ERROR_RATE: Range<f64> = 0.0..5.0;
    pub const ANOMALIES: RangeInclusive<u32> = 0..=10;
    pub const ACTIVE_USERS: RangeInclusive<u64> = 1000..=5000;
    /// Per-region latency in milliseconds.
    pub const REGION_LATENCY_MS: Range<f64> = 10.0..200.0;
}

/// Produces one random [`MetricsSnapshot`] per interval.
///
/// # Example
///
/// ```rust
/// use streampulse_sim::MockGenerator;
///
/// let mut generator = MockGenerator::builder().seed(7).build();
/// let snapshot = generator.next_snapshot();
/// assert_eq!(snapshot.regions.len(), 4);
/// ```
#[derive(Debug)]
pub struct MockGenerator {
    rng: StdRng,
    regions: Vec<String>,
    interval: Duration,
}

impl MockGenerator {
    /// Default tick interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    /// Create a generator with the default regions and interval.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MockGeneratorBuilder {
        MockGeneratorBuilder::new()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Draw the next snapshot, stamped with the current time.
    pub fn next_snapshot(&mut self) -> MetricsSnapshot {
        let rng = &mut self.rng;

        let regions = self
            .regions
            .iter()
            .map(|name| {
                RegionMetrics::new(
                    name.clone(),
                    rng.gen_range(ranges::REGION_LATENCY_MS),
                    RegionStatus::ALL[rng.gen_range(0..RegionStatus::ALL.len())],
                )
            })
            .collect();

        MetricsSnapshot {
            timestamp: streampulse_types::now_ms(),
            response_time: rng.gen_range(ranges::RESPONSE_TIME_MS),
            throughput: rng.gen_range(ranges::THROUGHPUT),
            error_rate: rng.gen_range(ranges::ERROR_RATE),
            anomalies: rng.gen_range(ranges::ANOMALIES),
            active_users: rng.gen_range(ranges::ACTIVE_USERS),
            server_health: ServerHealth::ALL[rng.gen_range(0..ServerHealth::ALL.len())],
            regions,
        }
    }

    /// Invoke `callback` with a fresh snapshot every interval.
    ///
    /// The first snapshot is produced one full interval after the call. The
    /// returned handle stops the timer when cancelled or dropped; once
    /// cancelled, the callback is never invoked again.
    pub fn start<F>(mut self, mut callback: F) -> GeneratorHandle
    where
        F: FnMut(MetricsSnapshot) + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                let snapshot = self.next_snapshot();
                debug!(timestamp = snapshot.timestamp, "generated snapshot");
                callback(snapshot);
            }
        });

        GeneratorHandle { cancelled, task }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`MockGenerator`].
#[derive(Debug, Default)]
pub struct MockGeneratorBuilder {
    interval: Option<Duration>,
    seed: Option<u64>,
    regions: Option<Vec<String>>,
}

impl MockGeneratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval. Defaults to two seconds.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Seed the random source for reproducible output.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Replace the default region list.
    pub fn regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> MockGenerator {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        MockGenerator {
            rng,
            regions: self
                .regions
                .unwrap_or_else(|| DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect()),
            interval: self.interval.unwrap_or(MockGenerator::DEFAULT_INTERVAL),
        }
    }
}

/// Cancellation handle for a running [`MockGenerator`].
///
/// Dropping the handle cancels the generator.
#[derive(Debug)]
pub struct GeneratorHandle {
    cancelled: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl GeneratorHandle {
    /// Stop the generator. Safe to call more than once.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for GeneratorHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
