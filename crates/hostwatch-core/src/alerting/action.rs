//! Rule actions
//!
//! Actions run on a rule's rising edge or on a manual trigger. Every outcome
//! is written to the log sink. `execute` swallows failures so one broken
//! action cannot stop the rest of a tick; the manual entry points (`send`,
//! `run`, `launch`) also return them.

use std::fmt;
use std::sync::Arc;

use crate::error::ActionError;
use crate::log_sink::LogSink;
use crate::models::LogLevel;
use crate::platform::{shell_command, CommandLauncher, ProcessEnumerator};

/// A side effect bound to a rule
pub trait Action: Send + Sync + fmt::Debug {
    /// Run the action; failures are logged, not returned
    fn execute(&self);

    /// Short label for logs
    fn name(&self) -> String;
}

/// Writes one line to the log sink
pub struct LogAction {
    sink: Arc<LogSink>,
    level: LogLevel,
    message: String,
}

impl LogAction {
    pub fn new(sink: Arc<LogSink>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            sink,
            level,
            message: message.into(),
        }
    }
}

impl fmt::Debug for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogAction")
            .field("level", &self.level)
            .field("message", &self.message)
            .finish()
    }
}

impl Action for LogAction {
    fn execute(&self) {
        self.sink.log(self.level, self.message.clone());
    }

    fn name(&self) -> String {
        "LogAction".to_string()
    }
}

/// Shows a transient desktop notification without waiting for it
pub struct NotifyAction {
    sink: Arc<LogSink>,
    launcher: Arc<dyn CommandLauncher>,
    title: String,
    message: String,
}

impl NotifyAction {
    pub fn new(
        sink: Arc<LogSink>,
        launcher: Arc<dyn CommandLauncher>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            launcher,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Launch the notifier and log the outcome, returning its pid
    pub fn send(&self) -> Result<u32, ActionError> {
        let (program, args) = notification_command(&self.title, &self.message);
        let result = self
            .launcher
            .launch(&program, &args)
            .map_err(|e| ActionError::Launch {
                command: program,
                message: e.to_string(),
            });

        match &result {
            Ok(_) => self.sink.info(format!("Notification sent: {}", self.title)),
            Err(e) => self.sink.error(format!("Failed to send notification: {e}")),
        }
        result
    }
}

impl fmt::Debug for NotifyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyAction")
            .field("title", &self.title)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl Action for NotifyAction {
    fn execute(&self) {
        let _ = self.send();
    }

    fn name(&self) -> String {
        format!("NotifyAction: {}", self.title)
    }
}

/// Program and arguments showing a notification on this platform
fn notification_command(title: &str, message: &str) -> (String, Vec<String>) {
    if cfg!(target_os = "macos") {
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            message.replace('"', "\\\""),
            title.replace('"', "\\\"")
        );
        ("osascript".to_string(), vec!["-e".to_string(), script])
    } else if cfg!(windows) {
        let quote = |s: &str| s.replace('\'', "''");
        let script = format!(
            "Add-Type -AssemblyName System.Windows.Forms; Add-Type -AssemblyName System.Drawing; \
             $n = New-Object System.Windows.Forms.NotifyIcon; \
             $n.Icon = [System.Drawing.SystemIcons]::Warning; $n.Visible = $true; \
             $n.ShowBalloonTip(0, '{}', '{}', [System.Windows.Forms.ToolTipIcon]::Warning); \
             Start-Sleep -s 5; $n.Dispose()",
            quote(title),
            quote(message)
        );
        (
            "powershell".to_string(),
            vec![
                "-WindowStyle".to_string(),
                "Hidden".to_string(),
                "-Command".to_string(),
                script,
            ],
        )
    } else {
        (
            "notify-send".to_string(),
            vec![
                "--app-name=hostwatch".to_string(),
                title.to_string(),
                message.to_string(),
            ],
        )
    }
}

/// What a kill action aims at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillTarget {
    /// One process id
    Pid(u32),
    /// Every process whose executable name matches exactly
    Name(String),
}

impl KillTarget {
    /// Numeric strings are pids, anything else an executable name
    pub fn parse(target: &str) -> Self {
        let target = target.trim();
        match target.parse::<u32>() {
            Ok(pid) => Self::Pid(pid),
            Err(_) => Self::Name(target.to_string()),
        }
    }
}

impl fmt::Display for KillTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pid(pid) => write!(f, "PID:{pid}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Result of terminating one matched process
#[derive(Debug)]
pub struct KillOutcome {
    /// Process id acted on
    pub pid: u32,
    /// Whether termination succeeded
    pub result: Result<(), ActionError>,
}

/// Terminates processes by pid or executable name
pub struct KillProcessAction {
    sink: Arc<LogSink>,
    processes: Arc<dyn ProcessEnumerator>,
    target: KillTarget,
}

impl KillProcessAction {
    pub fn new(sink: Arc<LogSink>, processes: Arc<dyn ProcessEnumerator>, target: KillTarget) -> Self {
        Self {
            sink,
            processes,
            target,
        }
    }

    /// Resolve the target and terminate every match, logging each outcome
    pub fn run(&self) -> Result<Vec<KillOutcome>, ActionError> {
        let result = self.terminate_matches();
        match &result {
            Err(e @ ActionError::TargetNotFound(_)) => self.sink.warn(format!("KillProcess: {e}")),
            Err(e) => self.sink.error(format!("KillProcess: {e}")),
            Ok(_) => {}
        }
        result
    }

    fn terminate_matches(&self) -> Result<Vec<KillOutcome>, ActionError> {
        let pids = match &self.target {
            KillTarget::Pid(pid) => vec![*pid],
            KillTarget::Name(name) => {
                let table = self
                    .processes
                    .processes()
                    .map_err(|e| ActionError::Enumeration(e.to_string()))?;
                table
                    .into_iter()
                    .filter(|p| &p.name == name)
                    .map(|p| p.pid)
                    .collect()
            }
        };

        if pids.is_empty() {
            return Err(ActionError::TargetNotFound(self.target.to_string()));
        }

        let outcomes = pids
            .into_iter()
            .map(|pid| {
                let result = self.terminate(pid);
                KillOutcome { pid, result }
            })
            .collect();
        Ok(outcomes)
    }

    fn terminate(&self, pid: u32) -> Result<(), ActionError> {
        match self.processes.terminate(pid) {
            Ok(()) => {
                self.sink.warn(format!(
                    "KillProcess: terminated {} (PID: {pid})",
                    self.target
                ));
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.sink
                    .warn(format!("KillProcess: {} (PID: {pid}) is not running", self.target));
                Err(ActionError::TargetNotFound(format!("PID:{pid}")))
            }
            Err(e) => {
                let err = ActionError::Terminate {
                    pid,
                    name: self.target.to_string(),
                };
                self.sink.error(format!("KillProcess: {err}: {e}"));
                Err(err)
            }
        }
    }
}

impl fmt::Debug for KillProcessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillProcessAction")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Action for KillProcessAction {
    fn execute(&self) {
        let _ = self.run();
    }

    fn name(&self) -> String {
        format!("KillProcessAction: {}", self.target)
    }
}

/// Launches a shell command detached from the agent
pub struct RunScriptAction {
    sink: Arc<LogSink>,
    launcher: Arc<dyn CommandLauncher>,
    command: String,
}

impl RunScriptAction {
    pub fn new(sink: Arc<LogSink>, launcher: Arc<dyn CommandLauncher>, command: impl Into<String>) -> Self {
        Self {
            sink,
            launcher,
            command: command.into(),
        }
    }

    /// Launch the command through the platform shell and log the outcome
    pub fn launch(&self) -> Result<u32, ActionError> {
        let (program, args) = shell_command(&self.command);
        let result = self
            .launcher
            .launch(&program, &args)
            .map_err(|e| ActionError::Launch {
                command: self.command.clone(),
                message: e.to_string(),
            });

        match &result {
            Ok(pid) => self
                .sink
                .info(format!("RunScript launched: {} (PID: {pid})", self.command)),
            Err(e) => self.sink.error(format!("RunScript failed: {e}")),
        }
        result
    }
}

impl fmt::Debug for RunScriptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunScriptAction")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl Action for RunScriptAction {
    fn execute(&self) {
        let _ = self.launch();
    }

    fn name(&self) -> String {
        format!("RunScriptAction: {}", self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessInfo;
    use crate::testing::{FakeProcesses, RecordingLauncher};

    fn sink() -> Arc<LogSink> {
        Arc::new(LogSink::new(16))
    }

    fn last_line(sink: &LogSink) -> (LogLevel, String) {
        let entry = sink.history().pop().expect("sink has entries");
        (entry.level, entry.message)
    }

    fn host() -> Arc<FakeProcesses> {
        Arc::new(FakeProcesses::new(vec![
            ProcessInfo::new(10, "stress", 100),
            ProcessInfo::new(11, "stress", 200),
            ProcessInfo::new(12, "Stress", 300),
            ProcessInfo::new(13, "sshd", 50),
        ]))
    }

    #[test]
    fn test_log_action_uses_level() {
        let sink = sink();
        LogAction::new(sink.clone(), LogLevel::Error, "disk on fire").execute();
        assert_eq!(last_line(&sink), (LogLevel::Error, "disk on fire".to_string()));
    }

    #[test]
    fn test_kill_by_name_is_case_sensitive() {
        let sink = sink();
        let host = host();
        let action = KillProcessAction::new(sink.clone(), host.clone(), KillTarget::parse("stress"));

        action.execute();

        assert_eq!(host.terminated(), vec![10, 11]);
        assert_eq!(sink.history().len(), 2);
    }

    #[test]
    fn test_kill_by_pid() {
        let host = host();
        let action = KillProcessAction::new(sink(), host.clone(), KillTarget::parse(" 13 "));

        let outcomes = action.run().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(host.terminated(), vec![13]);
    }

    #[test]
    fn test_kill_missing_target_warns() {
        let sink = sink();
        let host = host();
        KillProcessAction::new(sink.clone(), host.clone(), KillTarget::parse("nginx")).execute();

        let (level, message) = last_line(&sink);
        assert_eq!(level, LogLevel::Warn);
        assert!(message.contains("nginx"));
        assert!(host.terminated().is_empty());

        KillProcessAction::new(sink.clone(), host, KillTarget::Pid(999)).execute();
        assert_eq!(last_line(&sink).0, LogLevel::Warn);
    }

    #[test]
    fn test_kill_refused_is_error() {
        let sink = sink();
        let host = host();
        host.refuse(13);
        let outcomes = KillProcessAction::new(sink.clone(), host, KillTarget::Pid(13))
            .run()
            .unwrap();

        assert!(matches!(outcomes[0].result, Err(ActionError::Terminate { pid: 13, .. })));
        assert_eq!(last_line(&sink).0, LogLevel::Error);
    }

    #[test]
    fn test_kill_enumeration_failure() {
        let sink = sink();
        let host = host();
        host.fail_next(1);
        KillProcessAction::new(sink.clone(), host, KillTarget::parse("stress")).execute();
        assert_eq!(last_line(&sink).0, LogLevel::Error);
    }

    #[test]
    fn test_run_script_goes_through_shell() {
        let sink = sink();
        let launcher = Arc::new(RecordingLauncher::default());
        RunScriptAction::new(sink.clone(), launcher.clone(), "echo hi > out.txt").execute();

        let launches = launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].1.last().map(String::as_str), Some("echo hi > out.txt"));
        assert_eq!(last_line(&sink).0, LogLevel::Info);
    }

    #[test]
    fn test_run_script_failure_logged() {
        let sink = sink();
        let launcher = Arc::new(RecordingLauncher::failing());
        let action = RunScriptAction::new(sink.clone(), launcher, "missing-tool");

        action.execute();
        let (level, message) = last_line(&sink);
        assert_eq!(level, LogLevel::Error);
        assert!(message.contains("missing-tool"));
    }

    #[test]
    fn test_notify_passes_title_and_message() {
        let sink = sink();
        let launcher = Arc::new(RecordingLauncher::default());
        NotifyAction::new(sink.clone(), launcher.clone(), "HighCPU", "CPU usage critical").execute();

        let (_, args) = launcher.launches().remove(0);
        assert!(args.iter().any(|a| a.contains("CPU usage critical")));
        assert!(last_line(&sink).1.contains("HighCPU"));
    }
}
