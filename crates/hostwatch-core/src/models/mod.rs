//! Data models for Hostwatch

mod log;
pub mod metric;
mod process;
mod rule;

pub use log::*;
pub use metric::{MetricFragment, MetricSnapshot, MetricValue, SnapshotBuilder};
pub use process::*;
pub use rule::*;
