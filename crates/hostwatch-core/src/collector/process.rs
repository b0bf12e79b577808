//! Process table source
//!
//! Publishes the process count and the top-K processes by resident memory.

use std::sync::Arc;

use tracing::debug;

use super::MetricSource;
use crate::error::CollectError;
use crate::models::metric::{PROCESS_COUNT, TOP_MEM_BYTES, TOP_MEM_PROCESS_NAME};
use crate::models::{MetricFragment, MetricValue, ProcessInfo};
use crate::platform::ProcessEnumerator;

const NAME: &str = "process";

/// Number of memory-heaviest processes retained
pub const DEFAULT_TOP_K: usize = 5;

/// Process count and the memory-heaviest processes
///
/// A failed or empty enumeration keeps the previous count and top list, so a
/// consumer never sees the inventory drop to nothing mid-run.
pub struct ProcessSource {
    enumerator: Arc<dyn ProcessEnumerator>,
    top_k: usize,
    count: Option<usize>,
    top: Vec<ProcessInfo>,
}

impl ProcessSource {
    /// Create a source keeping the `top_k` largest processes
    pub fn new(enumerator: Arc<dyn ProcessEnumerator>, top_k: usize) -> Self {
        Self {
            enumerator,
            top_k: top_k.max(1),
            count: None,
            top: Vec::new(),
        }
    }
}

impl MetricSource for ProcessSource {
    fn name(&self) -> &str {
        NAME
    }

    fn collect(&mut self) -> Result<(), CollectError> {
        let mut processes = self
            .enumerator
            .processes()
            .map_err(|e| CollectError::os(NAME, e))?;

        if processes.is_empty() {
            return Err(CollectError::Empty {
                source_name: NAME.to_string(),
            });
        }

        processes.sort_by(|a, b| {
            b.memory_bytes
                .cmp(&a.memory_bytes)
                .then_with(|| a.pid.cmp(&b.pid))
        });

        self.count = Some(processes.len());
        processes.truncate(self.top_k);
        self.top = processes;

        debug!(count = self.count, top = ?self.top.first().map(|p| &p.name), "Process table sampled");
        Ok(())
    }

    fn metrics(&self) -> MetricFragment {
        let Some(count) = self.count else {
            return MetricFragment::new();
        };

        let mut fragment = MetricFragment::from([(PROCESS_COUNT.to_string(), MetricValue::from(count))]);
        if let Some(top) = self.top.first() {
            fragment.insert(TOP_MEM_PROCESS_NAME.to_string(), MetricValue::from(top.name.as_str()));
            fragment.insert(TOP_MEM_BYTES.to_string(), MetricValue::from(top.memory_bytes));
        }
        fragment
    }

    fn top_processes(&self) -> Option<Vec<ProcessInfo>> {
        Some(self.top.clone())
    }
}
