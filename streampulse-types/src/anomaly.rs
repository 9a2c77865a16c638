//! Anomaly events.

use std::fmt;

/// Shape of the irregularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AnomalyType {
    Spike,
    Drop,
    Pattern,
    Outlier,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 4] = [
        AnomalyType::Spike,
        AnomalyType::Drop,
        AnomalyType::Pattern,
        AnomalyType::Outlier,
    ];
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnomalyType::Spike => "spike",
            AnomalyType::Drop => "drop",
            AnomalyType::Pattern => "pattern",
            AnomalyType::Outlier => "outlier",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

/// A detected (or simulated) irregularity in one metric at one location.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AnomalyEvent {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: AnomalyType,
    pub severity: Severity,
    /// Region or host where the anomaly was observed.
    pub location: String,
    /// Name of the affected metric, e.g. `response_time`.
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub description: String,
}

impl AnomalyEvent {
    /// How far the observed value sits from its threshold, as a ratio.
    ///
    /// Returns `None` when the threshold is zero.
    pub fn deviation_ratio(&self) -> Option<f64> {
        if self.threshold == 0.0 {
            None
        } else {
            Some(self.value / self.threshold)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> AnomalyEvent {
        AnomalyEvent {
            id: "anomaly-1".to_string(),
            kind: AnomalyType::Spike,
            severity: Severity::High,
            location: "us-east".to_string(),
            metric: "response_time".to_string(),
            value: 300.0,
            threshold: 150.0,
            timestamp: 1000,
            description: "response_time spike".to_string(),
        }
    }

    #[test]
    fn deviation_ratio() {
        assert_eq!(event().deviation_ratio(), Some(2.0));

        let mut zero = event();
        zero.threshold = 0.0;
        assert_eq!(zero.deviation_ratio(), None);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn kind_is_serialized_as_type() {
        let value = serde_json::to_value(event()).unwrap();
        assert_eq!(value["type"], "spike");
        assert_eq!(value["severity"], "high");
        assert!(value.get("kind").is_none());
    }
}
