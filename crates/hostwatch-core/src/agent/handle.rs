//! Cross-thread access to a running agent

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::alerting::{KillOutcome, KillTarget, RuleFactory};
use crate::error::{ActionError, Error, Result};
use crate::models::{LogEntry, MetricSnapshot, ProcessInfo, RuleDefinition};

/// Lifecycle of the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AgentState {
    /// Not running
    Stopped = 0,
    /// Ticking
    Running = 1,
    /// Stop requested; the current tick finishes first
    Stopping = 2,
}

impl AgentState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Requests queued for the poll thread, applied between ticks
#[derive(Debug)]
pub(crate) enum Command {
    Reload,
    ReplaceRules(Vec<RuleDefinition>),
}

/// State shared between the poll thread and its handles
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    pub(crate) snapshot: Mutex<MetricSnapshot>,
    pub(crate) top: Mutex<Vec<ProcessInfo>>,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(AgentState::Stopped as u8),
            snapshot: Mutex::new(MetricSnapshot::empty()),
            top: Mutex::new(Vec::new()),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> AgentState {
        AgentState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: AgentState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Move from `from` to `to`; false if the state was something else
    pub(crate) fn transition(&self, from: AgentState, to: AgentState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn request_stop(&self) {
        if self.transition(AgentState::Running, AgentState::Stopping) {
            debug!("Stop requested");
        }
        let _guard = self.wake_lock.lock();
        self.wake.notify_all();
    }

    /// Sleep up to `timeout`, returning early once a stop is requested
    pub(crate) fn sleep(&self, timeout: Duration) {
        if timeout.is_zero() {
            return;
        }

        let deadline = Instant::now() + timeout;
        let mut guard = self.wake_lock.lock();
        while self.state() == AgentState::Running {
            if self.wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
    }
}

/// Thread-safe view of an agent, cheap to clone
///
/// Reads return independent copies. Reloads are queued for the poll thread.
/// Manual triggers run immediately on the calling thread.
#[derive(Clone)]
pub struct AgentHandle {
    pub(crate) shared: Arc<Shared>,
    pub(crate) commands: Sender<Command>,
    pub(crate) factory: RuleFactory,
}

impl AgentHandle {
    /// Copy of the most recently published snapshot
    pub fn last_snapshot(&self) -> MetricSnapshot {
        self.shared.snapshot.lock().clone()
    }

    /// Copy of the most recently published top-memory process list
    pub fn top_processes(&self) -> Vec<ProcessInfo> {
        self.shared.top.lock().clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> AgentState {
        self.shared.state()
    }

    /// Queue a reload of the rules file
    pub fn reload(&self) {
        self.send(Command::Reload);
    }

    /// Queue a switch to the given definitions without touching the rules file
    pub fn replace_rules(&self, rules: Vec<RuleDefinition>) {
        self.send(Command::ReplaceRules(rules));
    }

    /// Ask the poll loop to exit after the current tick
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Buffered log sink entries, oldest first
    pub fn logs(&self) -> Vec<LogEntry> {
        self.factory.sink().history()
    }

    /// Terminate processes matching a pid or executable name
    pub fn kill(&self, target: &str) -> std::result::Result<Vec<KillOutcome>, ActionError> {
        self.factory.kill(KillTarget::parse(target)).run()
    }

    /// Launch a shell command detached
    pub fn run_script(&self, command: &str) -> std::result::Result<u32, ActionError> {
        self.factory.script(command).launch()
    }

    /// Show a desktop notification
    pub fn notify(&self, title: &str, message: &str) -> std::result::Result<u32, ActionError> {
        self.factory.notify(title, message).send()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Agent is gone, request dropped");
        }
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// An agent ticking on its own thread
///
/// Dropping it stops the loop and joins the thread.
#[derive(Debug)]
pub struct RunningAgent {
    handle: AgentHandle,
    thread: Option<JoinHandle<()>>,
}

impl RunningAgent {
    pub(crate) fn new(handle: AgentHandle, thread: JoinHandle<()>) -> Self {
        Self {
            handle,
            thread: Some(thread),
        }
    }

    /// Handle for reads, reloads and manual triggers
    pub fn handle(&self) -> &AgentHandle {
        &self.handle
    }

    /// Stop the loop and wait for the poll thread to exit
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.handle.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Scheduler("poll thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for RunningAgent {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Agent did not shut down cleanly");
        }
    }
}
