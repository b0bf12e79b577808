//! Processor load source
//!
//! Load comes either from the delta of cumulative CPU counters or, where the
//! host has no counter reader, from a reader that reports usage directly. The
//! first collect after `initialize` only re-baselines: the gap since the
//! baseline is too short to give a meaningful figure.

use tracing::debug;

use super::MetricSource;
use crate::error::{CollectError, Error, Result};
use crate::models::metric::CPU_USAGE_PERCENT;
use crate::models::{MetricFragment, MetricValue};
use crate::platform::{CpuTimes, CpuTimesReader, CpuUsageReader};

const NAME: &str = "cpu";

enum Backend {
    Counters {
        reader: Box<dyn CpuTimesReader>,
        baseline: Option<CpuTimes>,
    },
    Usage(Box<dyn CpuUsageReader>),
}

/// Processor load, 0-100
pub struct CpuSource {
    backend: Backend,
    rebaseline: bool,
    load_percent: f64,
}

impl CpuSource {
    /// Create a source reading cumulative counters from `reader`
    pub fn new(reader: Box<dyn CpuTimesReader>) -> Self {
        Self::with_backend(Backend::Counters {
            reader,
            baseline: None,
        })
    }

    /// Create a source over a reader that reports load itself
    pub fn from_usage(reader: Box<dyn CpuUsageReader>) -> Self {
        Self::with_backend(Backend::Usage(reader))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            rebaseline: true,
            load_percent: 0.0,
        }
    }

    /// Load over the last interval, 0 before a valid delta exists
    pub fn load_percent(&self) -> f64 {
        self.load_percent
    }

    /// Take a fresh reading; `None` when it carries no usable load
    fn read(&mut self) -> std::io::Result<Option<f64>> {
        match &mut self.backend {
            Backend::Counters { reader, baseline } => {
                let now = reader.read()?;
                Ok(baseline.replace(now).and_then(|prev| load_between(prev, now)))
            }
            Backend::Usage(reader) => {
                let load = reader.refresh()?;
                Ok(load.is_finite().then(|| load.clamp(0.0, 100.0)))
            }
        }
    }
}

/// Busy share of the time elapsed between two counter readings
///
/// `kernel` includes `idle`, so busy time is `(Δkernel - Δidle) + Δuser` out of
/// `Δkernel + Δuser`. Returns `None` when no time has elapsed.
fn load_between(prev: CpuTimes, now: CpuTimes) -> Option<f64> {
    let idle = now.idle.saturating_sub(prev.idle);
    let kernel = now.kernel.saturating_sub(prev.kernel);
    let user = now.user.saturating_sub(prev.user);

    let total = kernel + user;
    if total == 0 {
        return None;
    }

    let active = kernel.saturating_sub(idle) + user;
    Some((active as f64 * 100.0 / total as f64).clamp(0.0, 100.0))
}

impl MetricSource for CpuSource {
    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self) -> Result<()> {
        self.read().map_err(|e| Error::init(NAME, e.to_string()))?;
        self.rebaseline = true;
        Ok(())
    }

    fn collect(&mut self) -> std::result::Result<(), CollectError> {
        let load = self.read().map_err(|e| CollectError::os(NAME, e))?;

        if std::mem::take(&mut self.rebaseline) {
            debug!(load = self.load_percent, "CPU baseline refreshed, keeping prior load");
            return Ok(());
        }

        if let Some(load) = load {
            self.load_percent = load;
        }
        Ok(())
    }

    fn metrics(&self) -> MetricFragment {
        MetricFragment::from([(
            CPU_USAGE_PERCENT.to_string(),
            MetricValue::Float(self.load_percent),
        )])
    }
}
