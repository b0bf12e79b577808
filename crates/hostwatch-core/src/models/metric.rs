//! Metric data models

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// CPU load over the last sampling interval, 0-100
pub const CPU_USAGE_PERCENT: &str = "cpu_usage_percent";
/// Physical memory load reported by the OS, 0-100
pub const RAM_LOAD_PERCENT: &str = "ram_load_percent";
/// Physical memory in use, bytes
pub const RAM_USED_BYTES: &str = "ram_used_bytes";
/// Installed physical memory, bytes
pub const RAM_TOTAL_BYTES: &str = "ram_total_bytes";
/// Number of running processes
pub const PROCESS_COUNT: &str = "process_count";
/// Executable name of the process with the largest resident set
pub const TOP_MEM_PROCESS_NAME: &str = "top_mem_process_name";
/// Resident memory of that process, bytes
pub const TOP_MEM_BYTES: &str = "top_mem_bytes";

/// Every metric key produced by the built-in sources
pub const KNOWN_METRICS: &[&str] = &[
    CPU_USAGE_PERCENT,
    RAM_LOAD_PERCENT,
    RAM_USED_BYTES,
    RAM_TOTAL_BYTES,
    PROCESS_COUNT,
    TOP_MEM_PROCESS_NAME,
    TOP_MEM_BYTES,
];

/// Built-in metrics whose values are text and therefore never comparable
pub const TEXT_METRICS: &[&str] = &[TOP_MEM_PROCESS_NAME];

/// A single sampled value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Counts and byte sizes
    Integer(i64),
    /// Percentages and ratios
    Float(f64),
    /// Names and labels
    Text(String),
}

impl MetricValue {
    /// Numeric view of the value; integers are widened, text has none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.1}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// The metrics one source currently knows about
pub type MetricFragment = HashMap<String, MetricValue>;

/// All metrics merged for one tick
///
/// Built once per tick and then only read; the agent replaces the published
/// snapshot wholesale instead of patching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// When the tick that produced this snapshot started
    pub captured_at: DateTime<Utc>,

    /// Metric name to value
    pub values: HashMap<String, MetricValue>,
}

impl Default for MetricSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl MetricSnapshot {
    /// A snapshot with no metrics, captured now
    pub fn empty() -> Self {
        Self {
            captured_at: Utc::now(),
            values: HashMap::new(),
        }
    }

    /// Build a snapshot from name/value pairs
    pub fn from_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MetricValue>,
    {
        Self {
            captured_at: Utc::now(),
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a metric by name
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values.get(name)
    }

    /// Numeric value of a metric, if present and numeric
    pub fn numeric(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(MetricValue::as_f64)
    }

    /// Number of metrics in the snapshot
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no metrics
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Metric names in sorted order, for stable display
    pub fn sorted(&self) -> Vec<(&str, &MetricValue)> {
        let mut entries: Vec<_> = self.values.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

/// Accumulates source fragments for the tick being built
#[derive(Debug)]
pub struct SnapshotBuilder {
    captured_at: DateTime<Utc>,
    values: HashMap<String, MetricValue>,
}

impl SnapshotBuilder {
    /// Start a snapshot stamped with the current time
    pub fn new() -> Self {
        Self {
            captured_at: Utc::now(),
            values: HashMap::new(),
        }
    }

    /// Merge a fragment; later sources win on key collisions
    pub fn merge(&mut self, fragment: MetricFragment) {
        self.values.extend(fragment);
    }

    /// Freeze the accumulated values
    pub fn build(self) -> MetricSnapshot {
        MetricSnapshot {
            captured_at: self.captured_at,
            values: self.values,
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widens_to_float() {
        assert_eq!(MetricValue::Integer(300).as_f64(), Some(300.0));
        assert_eq!(MetricValue::Float(12.5).as_f64(), Some(12.5));
        assert_eq!(MetricValue::Text("init".into()).as_f64(), None);
    }

    #[test]
    fn test_untagged_serialization() {
        let snapshot = MetricSnapshot::from_values([
            (PROCESS_COUNT, MetricValue::Integer(42)),
            (TOP_MEM_PROCESS_NAME, MetricValue::from("firefox")),
        ]);
        let json = serde_json::to_value(&snapshot.values).unwrap();
        assert_eq!(json[PROCESS_COUNT], serde_json::json!(42));
        assert_eq!(json[TOP_MEM_PROCESS_NAME], serde_json::json!("firefox"));
    }

    #[test]
    fn test_builder_merges_fragments() {
        let mut builder = SnapshotBuilder::new();
        builder.merge(MetricFragment::from([(CPU_USAGE_PERCENT.to_string(), 10.0.into())]));
        builder.merge(MetricFragment::from([(PROCESS_COUNT.to_string(), 7_i64.into())]));
        let snapshot = builder.build();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.numeric(CPU_USAGE_PERCENT), Some(10.0));
        assert_eq!(snapshot.numeric(PROCESS_COUNT), Some(7.0));
    }

    #[test]
    fn test_sorted_is_stable() {
        let snapshot = MetricSnapshot::from_values([("b", 1_i64), ("a", 2_i64)]);
        let names: Vec<_> = snapshot.sorted().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
