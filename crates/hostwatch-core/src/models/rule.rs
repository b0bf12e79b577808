//! Rule definition models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::metric::{
    CPU_USAGE_PERCENT, KNOWN_METRICS, PROCESS_COUNT, RAM_LOAD_PERCENT, TEXT_METRICS,
};

/// Tolerance used by `==` and `!=`
pub const EQUALITY_EPSILON: f64 = 0.001;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Greater than
    #[serde(rename = ">")]
    Gt,
    /// Greater than or equal to
    #[serde(rename = ">=")]
    Gte,
    /// Less than
    #[serde(rename = "<")]
    Lt,
    /// Less than or equal to
    #[serde(rename = "<=")]
    Lte,
    /// Equal to, within [`EQUALITY_EPSILON`]
    #[serde(rename = "==")]
    Eq,
    /// Not equal to, beyond [`EQUALITY_EPSILON`]
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    /// Check `value <op> threshold`
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => (value - threshold).abs() < EQUALITY_EPSILON,
            Self::Ne => (value - threshold).abs() > EQUALITY_EPSILON,
        }
    }

    /// The symbol used in rule files
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" | "gt" => Ok(Self::Gt),
            ">=" | "gte" => Ok(Self::Gte),
            "<" | "lt" => Ok(Self::Lt),
            "<=" | "lte" => Ok(Self::Lte),
            "==" | "eq" => Ok(Self::Eq),
            "!=" | "ne" => Ok(Self::Ne),
            other => Err(Error::validation(format!("unknown operator `{other}`"))),
        }
    }
}

/// What a rule does when it triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Write a line to the log sink
    Log,
    /// Show a desktop notification
    Notify,
    /// Terminate processes by pid or executable name
    #[serde(alias = "KILL_PROCESS")]
    Kill,
    /// Launch a shell command
    #[serde(alias = "RUN_SCRIPT")]
    Script,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Log => "LOG",
            Self::Notify => "NOTIFY",
            Self::Kill => "KILL",
            Self::Script => "SCRIPT",
        })
    }
}

impl FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOG" => Ok(Self::Log),
            "NOTIFY" => Ok(Self::Notify),
            "KILL" | "KILL_PROCESS" => Ok(Self::Kill),
            "SCRIPT" | "RUN_SCRIPT" => Ok(Self::Script),
            other => Err(Error::validation(format!("unknown action type `{other}`"))),
        }
    }
}

/// A persisted rule, as stored in the rules file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    /// Unique name within one rules file
    pub name: String,

    /// Metric key the condition reads
    pub metric: String,

    /// Comparison operator
    #[serde(rename = "oper")]
    pub operator: Operator,

    /// Value compared against
    pub threshold: f64,

    /// Disabled rules stay in the file but never run
    pub enabled: bool,

    /// Action kind
    pub action_type: ActionType,

    /// Message, pid/executable name or command, depending on the action
    #[serde(default)]
    pub action_param: String,
}

impl RuleDefinition {
    /// Create an enabled rule definition
    pub fn new(
        name: impl Into<String>,
        metric: impl Into<String>,
        operator: Operator,
        threshold: f64,
        action_type: ActionType,
        action_param: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            metric: metric.into(),
            operator,
            threshold,
            enabled: true,
            action_type,
            action_param: action_param.into(),
        }
    }

    /// Builder-style toggle of `enabled`
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check a definition before it is accepted by an editor
    ///
    /// Unknown metric names are allowed since sources are pluggable; comparing
    /// a built-in text metric is rejected because it can never be true.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("rule name must not be empty"));
        }
        if self.metric.trim().is_empty() {
            return Err(Error::validation("rule metric must not be empty"));
        }
        if !self.threshold.is_finite() {
            return Err(Error::validation("threshold must be a finite number"));
        }
        if TEXT_METRICS.contains(&self.metric.as_str()) {
            return Err(Error::validation(format!(
                "metric `{}` is text and cannot be compared with `{}`",
                self.metric, self.operator
            )));
        }
        if matches!(self.action_type, ActionType::Kill | ActionType::Script)
            && self.action_param.trim().is_empty()
        {
            return Err(Error::validation(format!(
                "{} action requires a parameter",
                self.action_type
            )));
        }
        Ok(())
    }

    /// Whether the metric is one of the built-in keys
    pub fn is_known_metric(&self) -> bool {
        KNOWN_METRICS.contains(&self.metric.as_str())
    }
}

/// Rules written when the rules file is missing or unreadable
pub fn default_rules() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition::new(
            "HighCPU",
            CPU_USAGE_PERCENT,
            Operator::Gt,
            90.0,
            ActionType::Notify,
            "CPU usage critical",
        ),
        RuleDefinition::new(
            "HighRAM",
            RAM_LOAD_PERCENT,
            Operator::Gt,
            85.0,
            ActionType::Log,
            "RAM usage high",
        ),
        RuleDefinition::new(
            "TooManyProcs",
            PROCESS_COUNT,
            Operator::Gt,
            250.0,
            ActionType::Log,
            "Abnormal process count",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Operator::Gt, 95.0, 90.0, true)]
    #[case(Operator::Gt, 90.0, 90.0, false)]
    #[case(Operator::Gte, 90.0, 90.0, true)]
    #[case(Operator::Lt, 10.0, 20.0, true)]
    #[case(Operator::Lte, 20.0, 20.0, true)]
    #[case(Operator::Lte, 20.1, 20.0, false)]
    #[case(Operator::Eq, 50.0005, 50.0, true)]
    #[case(Operator::Eq, 50.01, 50.0, false)]
    #[case(Operator::Ne, 50.0005, 50.0, false)]
    #[case(Operator::Ne, 50.01, 50.0, true)]
    fn test_operator_compare(
        #[case] op: Operator,
        #[case] value: f64,
        #[case] threshold: f64,
        #[case] expected: bool,
    ) {
        assert_eq!(op.compare(value, threshold), expected);
    }

    #[test]
    fn test_rule_file_field_names() {
        let def = RuleDefinition::new("HighCPU", CPU_USAGE_PERCENT, Operator::Gte, 90.0, ActionType::Kill, "stress");
        let json = serde_json::to_value(&def).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "name": "HighCPU",
                "metric": "cpu_usage_percent",
                "oper": ">=",
                "threshold": 90.0,
                "enabled": true,
                "actionType": "KILL",
                "actionParam": "stress",
            })
        );
    }

    #[test]
    fn test_action_type_aliases() {
        let def: RuleDefinition = serde_json::from_str(
            r#"{"name":"r","metric":"m","oper":"!=","threshold":1,"enabled":false,"actionType":"RUN_SCRIPT","actionParam":"x"}"#,
        )
        .unwrap();
        assert_eq!(def.action_type, ActionType::Script);
        assert_eq!(def.operator, Operator::Ne);
        assert!(!def.enabled);
    }

    #[test]
    fn test_operator_from_str() {
        assert_eq!(">=".parse::<Operator>().unwrap(), Operator::Gte);
        assert_eq!("lt".parse::<Operator>().unwrap(), Operator::Lt);
        assert!("~".parse::<Operator>().is_err());
    }

    #[test]
    fn test_validate_rejects_text_metric() {
        let def = RuleDefinition::new("r", "top_mem_process_name", Operator::Gt, 1.0, ActionType::Log, "");
        assert!(matches!(def.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_requires_kill_target() {
        let def = RuleDefinition::new("r", PROCESS_COUNT, Operator::Gt, 1.0, ActionType::Kill, " ");
        assert!(def.validate().is_err());

        let def = RuleDefinition::new("r", "custom_metric", Operator::Gt, 1.0, ActionType::Log, "");
        assert!(def.validate().is_ok());
        assert!(!def.is_known_metric());
    }

    #[test]
    fn test_default_rules() {
        let rules = default_rules();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["HighCPU", "HighRAM", "TooManyProcs"]);
        assert!(rules.iter().all(|r| r.enabled && r.validate().is_ok()));
        assert_eq!(rules[0].action_type, ActionType::Notify);
    }
}
