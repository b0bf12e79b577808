//! Rule conditions

use std::fmt;

use crate::models::{MetricSnapshot, Operator};

/// A pure predicate over one snapshot
pub trait Condition: Send + fmt::Debug {
    /// Whether the condition holds for `snapshot`
    fn evaluate(&self, snapshot: &MetricSnapshot) -> bool;

    /// Human-readable form, e.g. `cpu_usage_percent > 90`
    fn describe(&self) -> String;
}

/// Compares one numeric metric against a fixed threshold
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdCondition {
    metric: String,
    operator: Operator,
    threshold: f64,
}

impl ThresholdCondition {
    /// Create a threshold condition
    pub fn new(metric: impl Into<String>, operator: Operator, threshold: f64) -> Self {
        Self {
            metric: metric.into(),
            operator,
            threshold,
        }
    }

    /// The metric this condition reads
    pub fn metric(&self) -> &str {
        &self.metric
    }
}

impl Condition for ThresholdCondition {
    /// Absent and text-valued metrics never satisfy the condition
    fn evaluate(&self, snapshot: &MetricSnapshot) -> bool {
        snapshot
            .numeric(&self.metric)
            .is_some_and(|value| self.operator.compare(value, self.threshold))
    }

    fn describe(&self) -> String {
        format!("{} {} {}", self.metric, self.operator, self.threshold)
    }
}
