//! Metric sources
//!
//! Each [`MetricSource`] samples one area of the host (CPU, memory, process
//! table) and keeps the latest values it managed to read. The agent polls all
//! sources once per tick and merges their fragments into a snapshot.

mod cpu;
mod memory;
mod process;

pub use cpu::CpuSource;
pub use memory::MemorySource;
pub use process::{ProcessSource, DEFAULT_TOP_K};

use std::sync::Arc;

use crate::error::{CollectError, Result};
use crate::models::{MetricFragment, ProcessInfo};
use crate::platform::{ProcessEnumerator, SysinfoMemory};

/// A producer of named metric values
///
/// `initialize` runs once before the first poll. A failure there marks the
/// source degraded for the lifetime of the agent. `collect` failures are
/// transient: the source keeps whatever it held before.
pub trait MetricSource: Send {
    /// Stable name used in logs
    fn name(&self) -> &str;

    /// One-time setup, e.g. capturing counter baselines
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Refresh internal state from the OS
    fn collect(&mut self) -> std::result::Result<(), CollectError>;

    /// The values this source currently knows
    fn metrics(&self) -> MetricFragment;

    /// Memory-heaviest processes, for sources that track them
    fn top_processes(&self) -> Option<Vec<ProcessInfo>> {
        None
    }
}

/// The standard CPU, RAM and process sources over the live host
///
/// `processes` is shared with the kill action so both see the same table.
pub fn default_sources(processes: Arc<dyn ProcessEnumerator>, top_k: usize) -> Vec<Box<dyn MetricSource>> {
    vec![
        Box::new(host_cpu_source()),
        Box::new(MemorySource::new(Box::new(SysinfoMemory::default()))),
        Box::new(ProcessSource::new(processes, top_k)),
    ]
}

/// Counter deltas from procfs where available
#[cfg(target_os = "linux")]
fn host_cpu_source() -> CpuSource {
    CpuSource::new(Box::new(crate::platform::ProcStatReader::default()))
}

/// Usage as computed by `sysinfo` from the OS's own counters
#[cfg(not(target_os = "linux"))]
fn host_cpu_source() -> CpuSource {
    CpuSource::from_usage(Box::new(crate::platform::SysinfoCpu::default()))
}
