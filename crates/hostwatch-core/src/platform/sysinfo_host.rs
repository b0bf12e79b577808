//! Cross-platform process, memory and CPU access through `sysinfo`
//!
//! On Linux `sysinfo` lists every thread as its own entry; those are dropped
//! here so counts, top lists and kills only see processes.

use std::io;

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

use super::{CpuUsageReader, MemoryProbe, MemoryStats, ProcessEnumerator};
use crate::models::ProcessInfo;

/// Host access backed by a single `sysinfo::System`
pub struct SysinfoHost {
    system: Mutex<System>,
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoHost {
    /// Create a host handle; nothing is refreshed until first use
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl std::fmt::Debug for SysinfoHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoHost").finish_non_exhaustive()
    }
}

impl ProcessEnumerator for SysinfoHost {
    fn processes(&self) -> io::Result<Vec<ProcessInfo>> {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);

        Ok(system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| {
                ProcessInfo::new(
                    pid.as_u32(),
                    process.name().to_string_lossy().into_owned(),
                    process.memory(),
                )
            })
            .collect())
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let process = system
            .process(pid)
            .filter(|p| p.thread_kind().is_none())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no process with pid {pid}"))
            })?;

        if process.kill() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("kill signal to pid {pid} was refused"),
            ))
        }
    }
}

/// Memory probe with its own `System`, owned by the RAM source
pub struct SysinfoMemory {
    system: System,
}

impl Default for SysinfoMemory {
    fn default() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl MemoryProbe for SysinfoMemory {
    fn read(&mut self) -> io::Result<MemoryStats> {
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total == 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "OS reported zero physical memory",
            ));
        }
        let used = self.system.used_memory().min(total);

        Ok(MemoryStats {
            total_bytes: total,
            used_bytes: used,
            load_percent: used as f64 / total as f64 * 100.0,
        })
    }
}

/// Whole-machine CPU usage as computed by `sysinfo`
///
/// Used where no raw counter reader exists. `sysinfo` keeps the previous
/// sample internally, so each refresh reports load since the last one.
pub struct SysinfoCpu {
    system: System,
}

impl Default for SysinfoCpu {
    fn default() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl CpuUsageReader for SysinfoCpu {
    fn refresh(&mut self) -> io::Result<f64> {
        self.system.refresh_cpu_usage();

        if self.system.cpus().is_empty() {
            return Err(io::Error::new(io::ErrorKind::Other, "OS reported no processors"));
        }
        Ok(f64::from(self.system.global_cpu_usage()))
    }
}
