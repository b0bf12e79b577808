//! Agent - the poll loop tying sources to rules
//!
//! Each tick polls every metric source, publishes the merged snapshot and top
//! process list, then evaluates the rule set against the snapshot. The agent
//! runs on its own OS thread; other threads talk to it through an
//! [`AgentHandle`].

mod handle;

pub use handle::{AgentHandle, AgentState, RunningAgent};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::alerting::{ConfigStore, RuleFactory, RuleSet, Transition};
use crate::collector::{default_sources, MetricSource};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::log_sink::LogSink;
use crate::models::{MetricSnapshot, RuleDefinition, SnapshotBuilder};
use crate::platform::{SysinfoHost, SystemLauncher};
use handle::{Command, Shared};

/// Default time between tick starts
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

struct SourceSlot {
    source: Box<dyn MetricSource>,
    degraded: bool,
}

/// Owns the metric sources and the rule set; drives the tick cadence
pub struct Agent {
    sources: Vec<SourceSlot>,
    rules: RuleSet,
    factory: RuleFactory,
    rules_path: PathBuf,
    tick_interval: Duration,
    watch_rules: bool,
    rules_stamp: Option<FileStamp>,
    rules_pending: Option<FileStamp>,
    initialized: bool,
    shared: Arc<Shared>,
    handle: AgentHandle,
    commands: Receiver<Command>,
}

impl Agent {
    /// Create an agent polling `sources`, with rules read from `rules_path`
    pub fn new(sources: Vec<Box<dyn MetricSource>>, factory: RuleFactory, rules_path: impl Into<PathBuf>) -> Self {
        let shared = Arc::new(Shared::new());
        let (sender, commands) = mpsc::channel();
        let handle = AgentHandle {
            shared: shared.clone(),
            commands: sender,
            factory: factory.clone(),
        };

        Self {
            sources: sources
                .into_iter()
                .map(|source| SourceSlot {
                    source,
                    degraded: false,
                })
                .collect(),
            rules: RuleSet::new(factory.sink().clone()),
            factory,
            rules_path: rules_path.into(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            watch_rules: false,
            rules_stamp: None,
            rules_pending: None,
            initialized: false,
            shared,
            handle,
            commands,
        }
    }

    /// An agent over the live host, wired from configuration
    pub fn from_config(config: &AgentConfig) -> Self {
        let sink = Arc::new(LogSink::new(config.logging.capacity));
        let host = Arc::new(SysinfoHost::new());
        let factory = RuleFactory::new(sink, Arc::new(SystemLauncher), host.clone());

        Self::new(
            default_sources(host, config.agent.top_k),
            factory,
            &config.agent.rules_path,
        )
        .with_tick_interval(config.agent.tick_interval)
        .with_rules_watch(config.agent.watch_rules)
    }

    /// Set the time between tick starts
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Reload automatically when the rules file changes on disk
    pub fn with_rules_watch(mut self, enabled: bool) -> Self {
        self.watch_rules = enabled;
        self
    }

    /// Handle for other threads
    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    /// Path of the rules file
    pub fn rules_path(&self) -> &Path {
        &self.rules_path
    }

    /// Number of runtime rules currently installed
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Initialize every source and load the rules file
    ///
    /// Nothing here is fatal.
    pub fn initialize(&mut self) {
        self.initialize_sources();
        self.reload_from_disk();
        self.initialized = true;

        let degraded = self.sources.iter().filter(|s| s.degraded).count();
        info!(
            sources = self.sources.len(),
            degraded,
            rules = self.rules.len(),
            "Agent initialized"
        );
    }

    /// Initialize the sources only, leaving the rule set empty
    ///
    /// A source that fails to initialize is degraded: it is never polled and
    /// contributes no metrics.
    pub fn initialize_sources(&mut self) {
        for slot in &mut self.sources {
            match slot.source.initialize() {
                Ok(()) => {
                    slot.degraded = false;
                    debug!(source = slot.source.name(), "Source initialized");
                }
                Err(e) => {
                    slot.degraded = true;
                    warn!(source = slot.source.name(), error = %e, "Source degraded");
                }
            }
        }
    }

    /// Run one tick: poll, publish, evaluate
    pub fn step(&mut self) -> Vec<Transition> {
        let snapshot = self.sample();
        self.rules.evaluate(&snapshot)
    }

    /// Poll every healthy source and publish the result without evaluating rules
    pub fn sample(&mut self) -> MetricSnapshot {
        let mut builder = SnapshotBuilder::new();
        let mut top = None;

        for slot in self.sources.iter_mut().filter(|s| !s.degraded) {
            match slot.source.collect() {
                Ok(()) => {
                    builder.merge(slot.source.metrics());
                    if let Some(processes) = slot.source.top_processes() {
                        top = Some(processes);
                    }
                }
                Err(e) => {
                    warn!(source = slot.source.name(), error = %e, "Collection failed, keeping previous values");
                }
            }
        }

        let snapshot = builder.build();
        *self.shared.snapshot.lock() = snapshot.clone();
        if let Some(top) = top {
            *self.shared.top.lock() = top;
        }

        debug!(metrics = snapshot.len(), "Snapshot published");
        snapshot
    }

    /// Tick until stopped, on the calling thread
    ///
    /// Initializes first if that has not happened yet. Ticks are due at fixed
    /// multiples of the interval from the first one, so wake-up latency does
    /// not accumulate. A tick that overruns its slot is followed immediately
    /// by the next, and the schedule restarts from there.
    pub fn run(&mut self) {
        // Already Running when started through `spawn`
        self.shared.transition(AgentState::Stopped, AgentState::Running);

        if !self.initialized {
            self.initialize();
        }

        info!(interval = ?self.tick_interval, "Agent running");

        let mut due = Instant::now();
        while self.shared.state() == AgentState::Running {
            self.apply_pending();
            self.check_rules_file();
            self.step();

            let now = Instant::now();
            due = next_due(due, now, self.tick_interval);
            if due == now {
                debug!(interval = ?self.tick_interval, "Tick overran its interval");
            }
            self.shared.sleep(due.saturating_duration_since(now));
        }

        self.shared.set_state(AgentState::Stopped);
        info!("Agent stopped");
    }

    /// Run on a dedicated thread
    ///
    /// Failing to start the thread is the only fatal agent error.
    pub fn spawn(mut self) -> Result<RunningAgent> {
        let handle = self.handle();
        let shared = self.shared.clone();
        shared.set_state(AgentState::Running);

        let thread = thread::Builder::new()
            .name("hostwatch-poll".to_string())
            .spawn(move || self.run())
            .map_err(|e| {
                shared.set_state(AgentState::Stopped);
                Error::Scheduler(format!("failed to start poll thread: {e}"))
            })?;

        Ok(RunningAgent::new(handle, thread))
    }

    fn apply_pending(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Reload => self.reload_from_disk(),
                Command::ReplaceRules(rules) => self.install(&rules),
            }
        }
    }

    /// Reload after the rules file changed and then held still for a tick
    ///
    /// A file that does not parse is left as it is and the current rules stay
    /// installed; it is retried once it changes again.
    fn check_rules_file(&mut self) {
        if !self.watch_rules {
            return;
        }

        let stamp = FileStamp::of(&self.rules_path);
        if stamp.is_none() || stamp == self.rules_stamp {
            self.rules_pending = None;
            return;
        }
        if stamp != self.rules_pending {
            debug!(path = %self.rules_path.display(), "Rules file changing, waiting for it to settle");
            self.rules_pending = stamp;
            return;
        }

        self.rules_pending = None;
        self.rules_stamp = stamp;
        info!(path = %self.rules_path.display(), "Rules file changed");

        match ConfigStore::open(&self.rules_path) {
            Ok(store) => self.install(store.rules()),
            Err(e) => self
                .factory
                .sink()
                .warn(format!("Rules file not reloaded, keeping current rules: {e}")),
        }
    }

    fn reload_from_disk(&mut self) {
        let store = ConfigStore::load(&self.rules_path);
        self.rules_stamp = FileStamp::of(&self.rules_path);
        self.install(store.rules());
    }

    /// Swap in a fresh rule set; every rule starts Idle
    fn install(&mut self, rules: &[RuleDefinition]) {
        self.rules.clear();
        self.rules = self.factory.build_set(rules);
        self.factory
            .sink()
            .info(format!("Rules loaded: {} active of {}", self.rules.len(), rules.len()));
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<_> = self.sources.iter().map(|s| s.source.name()).collect();
        f.debug_struct("Agent")
            .field("sources", &sources)
            .field("rules", &self.rules.len())
            .field("rules_path", &self.rules_path)
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

/// When the tick after the one due at `due` should start
///
/// `now` if that moment has already passed.
fn next_due(due: Instant, now: Instant, interval: Duration) -> Instant {
    let next = due + interval;
    if next <= now {
        now
    } else {
        next
    }
}

/// Modification time and length of a file, to spot edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CpuSource, ProcessSource, DEFAULT_TOP_K};
    use crate::models::metric::{CPU_USAGE_PERCENT, PROCESS_COUNT};
    use crate::models::{default_rules, ActionType, Operator, ProcessInfo};
    use crate::platform::CpuTimes;
    use crate::testing::{FakeProcesses, RecordingLauncher, ScriptedCpu};
    use pretty_assertions::assert_eq;
    use std::io;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        agent: Agent,
        processes: Arc<FakeProcesses>,
        launcher: Arc<RecordingLauncher>,
    }

    fn table() -> Vec<ProcessInfo> {
        vec![
            ProcessInfo::new(1, "init", 10),
            ProcessInfo::new(42, "stress", 900),
            ProcessInfo::new(7, "sshd", 50),
        ]
    }

    /// Cumulative readings where every interval is 97.5% busy
    fn busy_cpu(ticks: u64) -> Vec<io::Result<CpuTimes>> {
        (0..=ticks)
            .map(|i| {
                Ok(CpuTimes {
                    idle: i * 5,
                    kernel: i * 100,
                    user: i * 100,
                })
            })
            .collect()
    }

    fn fixture(cpu: Vec<io::Result<CpuTimes>>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.json");

        let processes = Arc::new(FakeProcesses::new(table()));
        let launcher = Arc::new(RecordingLauncher::default());
        let factory = RuleFactory::new(Arc::new(LogSink::default()), launcher.clone(), processes.clone());
        let sources: Vec<Box<dyn MetricSource>> = vec![
            Box::new(CpuSource::new(Box::new(ScriptedCpu::new(cpu)))),
            Box::new(ProcessSource::new(processes.clone(), DEFAULT_TOP_K)),
        ];

        let mut agent = Agent::new(sources, factory, &path);
        agent.initialize();

        Fixture {
            _dir: dir,
            agent,
            processes,
            launcher,
        }
    }

    #[test]
    fn test_step_publishes_merged_snapshot() {
        let mut fx = fixture(busy_cpu(2));
        fx.agent.step();
        fx.agent.step();

        let snapshot = fx.agent.handle().last_snapshot();
        assert_eq!(snapshot.numeric(CPU_USAGE_PERCENT), Some(97.5));
        assert_eq!(snapshot.numeric(PROCESS_COUNT), Some(3.0));
        assert_eq!(fx.agent.handle().top_processes()[0].name, "stress");
    }

    #[test]
    fn test_sample_does_not_evaluate_rules() {
        let mut fx = fixture(busy_cpu(2));
        fx.agent.sample();
        let snapshot = fx.agent.sample();

        assert_eq!(snapshot.numeric(CPU_USAGE_PERCENT), Some(97.5));
        assert!(fx.launcher.launches().is_empty());
    }

    #[test]
    fn test_snapshot_reads_are_equal_copies() {
        let mut fx = fixture(busy_cpu(1));
        fx.agent.step();
        let handle = fx.agent.handle();

        let first = handle.last_snapshot();
        let second = handle.last_snapshot();
        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_process_poll_keeps_previous_top() {
        let mut fx = fixture(busy_cpu(2));
        let handle = fx.agent.handle();

        fx.agent.step();
        let before = handle.top_processes();

        fx.processes.fail_next(1);
        fx.agent.step();

        assert_eq!(handle.top_processes(), before);
        let snapshot = handle.last_snapshot();
        assert!(snapshot.get(PROCESS_COUNT).is_none());
        assert!(snapshot.get(CPU_USAGE_PERCENT).is_some());
    }

    #[test]
    fn test_degraded_source_is_skipped() {
        let failing = vec![Err(io::Error::new(io::ErrorKind::Unsupported, "no /proc/stat"))];
        let mut fx = fixture(failing);

        fx.agent.step();

        let snapshot = fx.agent.handle().last_snapshot();
        assert!(snapshot.get(CPU_USAGE_PERCENT).is_none());
        assert_eq!(snapshot.numeric(PROCESS_COUNT), Some(3.0));
    }

    #[test]
    fn test_missing_rules_file_loads_defaults() {
        let fx = fixture(busy_cpu(0));
        assert_eq!(fx.agent.rule_count(), default_rules().len());
        assert!(fx.agent.rules_path().exists());
    }

    #[test]
    fn test_first_tick_does_not_fire_on_startup_load() {
        // Fully busy between initialize and the first tick
        let mut fx = fixture(vec![
            Ok(CpuTimes { idle: 0, kernel: 0, user: 0 }),
            Ok(CpuTimes { idle: 0, kernel: 0, user: 1 }),
        ]);

        let transitions = fx.agent.step();

        assert!(!transitions.contains(&Transition::Triggered));
        assert!(fx.launcher.launches().is_empty());
        assert_eq!(fx.agent.handle().last_snapshot().numeric(CPU_USAGE_PERCENT), Some(0.0));
    }

    #[test]
    fn test_notify_once_then_again_after_reload() {
        let mut fx = fixture(busy_cpu(4));
        let handle = fx.agent.handle();

        fx.agent.step();
        fx.agent.step();
        fx.agent.step();
        assert_eq!(fx.launcher.launches().len(), 1);

        handle.reload();
        fx.agent.apply_pending();
        fx.agent.step();
        assert_eq!(fx.launcher.launches().len(), 2);
    }

    #[test]
    fn test_replace_rules_in_memory() {
        let mut fx = fixture(busy_cpu(2));
        let kill = RuleDefinition::new("KillStress", CPU_USAGE_PERCENT, Operator::Gt, 90.0, ActionType::Kill, "stress");

        fx.agent.handle().replace_rules(vec![kill]);
        fx.agent.apply_pending();
        assert_eq!(fx.agent.rule_count(), 1);

        assert_eq!(fx.agent.step(), vec![Transition::Quiet]);
        let transitions = fx.agent.step();
        assert_eq!(transitions, vec![Transition::Triggered]);
        assert_eq!(fx.processes.terminated(), vec![42]);
        assert!(fx.launcher.launches().is_empty());
    }

    fn only_too_many_procs() -> String {
        let rules: Vec<_> = default_rules().into_iter().filter(|r| r.name == "TooManyProcs").collect();
        serde_json::to_string(&rules).unwrap()
    }

    #[test]
    fn test_rules_file_change_reloads_once_settled() {
        let mut fx = fixture(busy_cpu(0));
        fx.agent = fx.agent.with_rules_watch(true);

        fs::write(fx.agent.rules_path(), only_too_many_procs()).unwrap();

        fx.agent.check_rules_file();
        assert_eq!(fx.agent.rule_count(), default_rules().len());

        fx.agent.check_rules_file();
        assert_eq!(fx.agent.rule_count(), 1);
    }

    #[test]
    fn test_partially_written_rules_file_keeps_current_rules() {
        let mut fx = fixture(busy_cpu(0));
        fx.agent = fx.agent.with_rules_watch(true);
        let path = fx.agent.rules_path().to_path_buf();

        let full = only_too_many_procs();
        let partial = &full[..full.len() / 2];
        fs::write(&path, partial).unwrap();

        fx.agent.check_rules_file();
        fx.agent.check_rules_file();
        fx.agent.check_rules_file();
        assert_eq!(fx.agent.rule_count(), default_rules().len());
        assert_eq!(fs::read_to_string(&path).unwrap(), partial);
        assert!(fx
            .agent
            .handle()
            .logs()
            .iter()
            .any(|e| e.message.contains("keeping current rules")));

        fs::write(&path, &full).unwrap();
        fx.agent.check_rules_file();
        fx.agent.check_rules_file();
        assert_eq!(fx.agent.rule_count(), 1);
    }

    #[test]
    fn test_manual_triggers() {
        let fx = fixture(busy_cpu(0));
        let handle = fx.agent.handle();

        let outcomes = handle.kill("stress").unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(fx.processes.terminated(), vec![42]);
        assert!(handle.kill("nginx").is_err());

        handle.run_script("echo hi").unwrap();
        handle.notify("Title", "Body").unwrap();
        assert_eq!(fx.launcher.launches().len(), 2);
        assert!(handle.logs().iter().any(|e| e.message.contains("echo hi")));
    }

    #[test]
    fn test_schedule_does_not_drift() {
        let start = Instant::now();
        let second = Duration::from_secs(1);

        // Each tick wakes 30ms late and takes 200ms
        let mut due = start;
        for _ in 0..10 {
            let finished = due + Duration::from_millis(230);
            due = next_due(due, finished, second);
        }
        assert_eq!(due, start + second * 10);
    }

    #[test]
    fn test_overrun_restarts_schedule() {
        let start = Instant::now();
        let second = Duration::from_secs(1);

        let late = start + Duration::from_millis(1500);
        let due = next_due(start, late, second);
        assert_eq!(due, late);
        assert_eq!(next_due(due, late + Duration::from_millis(100), second), late + second);
    }

    #[test]
    fn test_spawn_and_stop() {
        let fx = fixture(busy_cpu(100));
        let agent = fx.agent.with_tick_interval(Duration::from_secs(3600));

        let running = agent.spawn().unwrap();
        let handle = running.handle().clone();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.last_snapshot().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!handle.last_snapshot().is_empty());
        assert_eq!(handle.state(), AgentState::Running);

        let started = Instant::now();
        running.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(handle.state(), AgentState::Stopped);
    }
}
