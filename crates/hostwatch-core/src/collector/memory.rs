//! Physical memory source

use super::MetricSource;
use crate::error::CollectError;
use crate::models::metric::{RAM_LOAD_PERCENT, RAM_TOTAL_BYTES, RAM_USED_BYTES};
use crate::models::{MetricFragment, MetricValue};
use crate::platform::{MemoryProbe, MemoryStats};

const NAME: &str = "ram";

/// Physical memory usage, read directly each tick
pub struct MemorySource {
    probe: Box<dyn MemoryProbe>,
    stats: Option<MemoryStats>,
}

impl MemorySource {
    /// Create a source reading from `probe`
    pub fn new(probe: Box<dyn MemoryProbe>) -> Self {
        Self { probe, stats: None }
    }
}

impl MetricSource for MemorySource {
    fn name(&self) -> &str {
        NAME
    }

    fn collect(&mut self) -> Result<(), CollectError> {
        let stats = self.probe.read().map_err(|e| CollectError::os(NAME, e))?;
        self.stats = Some(stats);
        Ok(())
    }

    fn metrics(&self) -> MetricFragment {
        let Some(stats) = self.stats else {
            return MetricFragment::new();
        };

        MetricFragment::from([
            (RAM_TOTAL_BYTES.to_string(), MetricValue::from(stats.total_bytes)),
            (RAM_USED_BYTES.to_string(), MetricValue::from(stats.used_bytes)),
            (RAM_LOAD_PERCENT.to_string(), MetricValue::Float(stats.load_percent)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedMemory;

    fn stats(used: u64) -> MemoryStats {
        MemoryStats {
            total_bytes: 1000,
            used_bytes: used,
            load_percent: used as f64 / 10.0,
        }
    }

    #[test]
    fn test_no_metrics_before_first_collect() {
        let source = MemorySource::new(Box::new(ScriptedMemory::new(vec![])));
        assert!(source.metrics().is_empty());
    }

    #[test]
    fn test_reports_all_keys() {
        let mut source = MemorySource::new(Box::new(ScriptedMemory::new(vec![Ok(stats(870))])));
        source.collect().unwrap();

        let metrics = source.metrics();
        assert_eq!(metrics[RAM_TOTAL_BYTES], MetricValue::Integer(1000));
        assert_eq!(metrics[RAM_USED_BYTES], MetricValue::Integer(870));
        assert_eq!(metrics[RAM_LOAD_PERCENT], MetricValue::Float(87.0));
    }

    #[test]
    fn test_failure_keeps_previous_values() {
        let mut source = MemorySource::new(Box::new(ScriptedMemory::new(vec![
            Ok(stats(500)),
            Err(std::io::ErrorKind::Other.into()),
        ])));
        source.collect().unwrap();
        assert!(source.collect().is_err());
        assert_eq!(source.metrics()[RAM_USED_BYTES], MetricValue::Integer(500));
    }
}
