//! Edge-triggered rules
//!
//! A rule remembers whether its condition held on the previous tick. Its
//! action runs only on the false-to-true edge, so a condition that stays true
//! for many ticks fires once.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::action::Action;
use super::condition::Condition;
use crate::log_sink::LogSink;
use crate::models::MetricSnapshot;

/// Edge memory of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleState {
    /// Condition was false on the last evaluation
    #[default]
    Idle,
    /// Condition was true on the last evaluation
    Active,
}

/// What one evaluation did to a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle to Active; the action ran
    Triggered,
    /// Active to Idle
    Cleared,
    /// Still Active; nothing ran
    Held,
    /// Still Idle
    Quiet,
}

/// Name, condition, action and edge memory
pub struct Rule {
    name: String,
    condition: Box<dyn Condition>,
    action: Box<dyn Action>,
    state: RuleState,
}

impl Rule {
    /// Create a rule in the Idle state
    pub fn new(name: impl Into<String>, condition: Box<dyn Condition>, action: Box<dyn Action>) -> Self {
        Self {
            name: name.into(),
            condition,
            action,
            state: RuleState::Idle,
        }
    }

    /// Rule name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current edge state
    pub fn state(&self) -> RuleState {
        self.state
    }

    /// The condition in readable form
    pub fn describe(&self) -> String {
        format!("{} -> {}", self.condition.describe(), self.action.name())
    }

    /// Test the condition and advance the state machine
    pub fn evaluate(&mut self, snapshot: &MetricSnapshot, sink: &LogSink) -> Transition {
        let holds = self.condition.evaluate(snapshot);

        let transition = match (self.state, holds) {
            (RuleState::Idle, true) => {
                sink.info(format!("Rule Triggered: {}", self.name));
                self.action.execute();
                self.state = RuleState::Active;
                Transition::Triggered
            }
            (RuleState::Active, false) => {
                sink.info(format!("Rule Cleared: {}", self.name));
                self.state = RuleState::Idle;
                Transition::Cleared
            }
            (RuleState::Active, true) => Transition::Held,
            (RuleState::Idle, false) => Transition::Quiet,
        };

        debug!(rule = %self.name, holds, ?transition, "Evaluated rule");
        transition
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("condition", &self.condition)
            .field("action", &self.action)
            .field("state", &self.state)
            .finish()
    }
}

/// Ordered rules evaluated once per tick
///
/// Owned by the poll thread. `evaluate` takes `&mut self`, so it cannot run
/// concurrently with itself or with a reload.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
    sink: Arc<LogSink>,
}

impl RuleSet {
    /// An empty rule set logging to `sink`
    pub fn new(sink: Arc<LogSink>) -> Self {
        Self {
            rules: Vec::new(),
            sink,
        }
    }

    /// Append a rule; evaluation follows insertion order
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Drop every rule and its edge state
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Evaluate every rule against `snapshot`, in order
    pub fn evaluate(&mut self, snapshot: &MetricSnapshot) -> Vec<Transition> {
        self.rules
            .iter_mut()
            .map(|rule| rule.evaluate(snapshot, &self.sink))
            .collect()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Extend<Rule> for RuleSet {
    fn extend<T: IntoIterator<Item = Rule>>(&mut self, iter: T) {
        self.rules.extend(iter);
    }
}
