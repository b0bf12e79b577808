//! Rule engine for Hostwatch
//!
//! Threshold conditions, actions, the edge-triggered rule state machine and
//! the persisted rule definitions they are built from.

mod action;
mod condition;
mod factory;
mod rule;
mod store;

pub use action::{
    Action, KillOutcome, KillProcessAction, KillTarget, LogAction, NotifyAction, RunScriptAction,
};
pub use condition::{Condition, ThresholdCondition};
pub use factory::RuleFactory;
pub use rule::{Rule, RuleSet, RuleState, Transition};
pub use store::{ConfigStore, LoadOutcome};
