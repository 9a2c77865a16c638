use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Unknown duration format: {0}")]
pub struct DurationError(String);

/// Suffix to nanoseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("µs", 1_000.0),
    ("us", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
    ("m", 60_000_000_000.0),
];

/// Parse duration strings like "2s", "500ms", "1.5m" or "250us".
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();
    let invalid = || DurationError(s.to_string());

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str.trim().parse().map_err(|_| invalid())?;
            if !val.is_finite() || val < 0.0 {
                return Err(invalid());
            }
            return Ok(Duration::from_nanos((val * multiplier) as u64));
        }
    }

    Err(invalid())
}

/// Format a duration for display
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        "0s".to_string()
    } else if nanos < 1_000_000 {
        format!("{:.2}µs", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.0}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
