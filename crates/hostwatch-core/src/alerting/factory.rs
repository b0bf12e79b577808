//! Runtime rules built from persisted definitions

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::action::{Action, KillProcessAction, KillTarget, LogAction, NotifyAction, RunScriptAction};
use super::condition::ThresholdCondition;
use super::rule::{Rule, RuleSet};
use crate::log_sink::LogSink;
use crate::models::{ActionType, LogLevel, RuleDefinition};
use crate::platform::{CommandLauncher, ProcessEnumerator};

/// Turns definitions into rules wired to the agent's services
#[derive(Clone)]
pub struct RuleFactory {
    sink: Arc<LogSink>,
    launcher: Arc<dyn CommandLauncher>,
    processes: Arc<dyn ProcessEnumerator>,
}

impl RuleFactory {
    /// Create a factory sharing the given services
    pub fn new(
        sink: Arc<LogSink>,
        launcher: Arc<dyn CommandLauncher>,
        processes: Arc<dyn ProcessEnumerator>,
    ) -> Self {
        Self {
            sink,
            launcher,
            processes,
        }
    }

    /// The log sink actions write to
    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    /// Build the runtime rule for `def`; disabled definitions yield `None`
    pub fn build(&self, def: &RuleDefinition) -> Option<Rule> {
        if !def.enabled {
            debug!(rule = %def.name, "Skipping disabled rule");
            return None;
        }

        let condition = ThresholdCondition::new(&def.metric, def.operator, def.threshold);
        Some(Rule::new(&def.name, Box::new(condition), self.action_for(def)))
    }

    /// A fresh rule set holding every enabled definition, in file order
    pub fn build_set(&self, defs: &[RuleDefinition]) -> RuleSet {
        let mut seen = HashSet::new();
        for def in defs {
            if !seen.insert(def.name.as_str()) {
                warn!(rule = %def.name, "Duplicate rule name in definitions");
            }
        }

        let mut set = RuleSet::new(self.sink.clone());
        set.extend(defs.iter().filter_map(|def| self.build(def)));
        set
    }

    fn action_for(&self, def: &RuleDefinition) -> Box<dyn Action> {
        match def.action_type {
            ActionType::Log => {
                let (level, message) = parse_log_param(&def.action_param);
                let message = if message.is_empty() {
                    format!("Rule {} condition met", def.name)
                } else {
                    message
                };
                Box::new(LogAction::new(self.sink.clone(), level, message))
            }
            ActionType::Notify => Box::new(self.notify(&def.name, &def.action_param)),
            ActionType::Kill => Box::new(self.kill(KillTarget::parse(&def.action_param))),
            ActionType::Script => Box::new(self.script(&def.action_param)),
        }
    }

    /// A notification action
    pub fn notify(&self, title: &str, message: &str) -> NotifyAction {
        NotifyAction::new(self.sink.clone(), self.launcher.clone(), title, message)
    }

    /// A kill action
    pub fn kill(&self, target: KillTarget) -> KillProcessAction {
        KillProcessAction::new(self.sink.clone(), self.processes.clone(), target)
    }

    /// A run-script action
    pub fn script(&self, command: &str) -> RunScriptAction {
        RunScriptAction::new(self.sink.clone(), self.launcher.clone(), command)
    }
}

/// Split an optional `level:` prefix off a log action parameter
///
/// `"error: disk full"` logs at error; anything without a recognised prefix
/// is logged whole at warn.
fn parse_log_param(param: &str) -> (LogLevel, String) {
    if let Some((prefix, rest)) = param.split_once(':') {
        if let Ok(level) = prefix.parse::<LogLevel>() {
            return (level, rest.trim().to_string());
        }
    }
    (LogLevel::Warn, param.trim().to_string())
}
