//! Detached process launching

use std::io;
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, warn};

use super::CommandLauncher;

/// Launches real OS processes
///
/// Children are not joined by the caller. A small background thread waits on
/// each one so finished children are reaped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl CommandLauncher for SystemLauncher {
    fn launch(&self, program: &str, args: &[String]) -> io::Result<u32> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id();

        let label = program.to_string();
        let reaper = thread::Builder::new()
            .name("hostwatch-reaper".into())
            .spawn(move || match child.wait() {
                Ok(status) => debug!(program = %label, pid, %status, "Detached process exited"),
                Err(e) => warn!(program = %label, pid, error = %e, "Failed to wait on detached process"),
            });

        if let Err(e) = reaper {
            warn!(program, pid, error = %e, "Could not start reaper thread");
        }

        Ok(pid)
    }
}

/// Program and arguments running `command` through the platform shell
pub fn shell_command(command: &str) -> (String, Vec<String>) {
    if cfg!(windows) {
        ("cmd".to_string(), vec!["/C".to_string(), command.to_string()])
    } else {
        ("sh".to_string(), vec!["-c".to_string(), command.to_string()])
    }
}
