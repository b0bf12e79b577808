//! Narrow interfaces over the host OS
//!
//! Metric sources and actions only talk to the operating system through these
//! traits, so the engine runs against fakes in tests and the OS-specific parts
//! stay in one place.

mod launcher;
mod proc_stat;
mod sysinfo_host;

pub use launcher::{shell_command, SystemLauncher};
pub use proc_stat::ProcStatReader;
pub use sysinfo_host::{SysinfoCpu, SysinfoHost, SysinfoMemory};

use std::io;

use crate::models::ProcessInfo;

/// Cumulative CPU time counters since boot
///
/// Follows the convention where `kernel` already includes `idle`, so
/// `kernel + user` is the total elapsed CPU time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    /// Time spent idle
    pub idle: u64,
    /// Time spent in the kernel, idle included
    pub kernel: u64,
    /// Time spent in user mode
    pub user: u64,
}

/// Reads cumulative CPU time counters
pub trait CpuTimesReader: Send {
    /// Read the current counters
    fn read(&mut self) -> io::Result<CpuTimes>;
}

/// Reports whole-machine CPU load directly, for hosts without a counter reader
pub trait CpuUsageReader: Send {
    /// Refresh and return the busy percentage since the previous refresh
    fn refresh(&mut self) -> io::Result<f64>;
}

/// Physical memory figures
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MemoryStats {
    /// Installed memory, bytes
    pub total_bytes: u64,
    /// Memory in use, bytes
    pub used_bytes: u64,
    /// OS-reported memory load, 0-100
    pub load_percent: f64,
}

/// Reads physical memory usage
pub trait MemoryProbe: Send {
    /// Read current memory figures
    fn read(&mut self) -> io::Result<MemoryStats>;
}

/// Lists and terminates processes
///
/// Shared between the process metric source on the poll thread and kill
/// actions that may run on any thread, hence `&self` and `Sync`.
pub trait ProcessEnumerator: Send + Sync {
    /// Every running process with its resident memory
    fn processes(&self) -> io::Result<Vec<ProcessInfo>>;

    /// Terminate one process; `NotFound` if no such pid is running
    fn terminate(&self, pid: u32) -> io::Result<()>;
}

/// Starts external programs without waiting for them
pub trait CommandLauncher: Send + Sync {
    /// Spawn `program` with `args` detached; returns the child pid
    fn launch(&self, program: &str, args: &[String]) -> io::Result<u32>;
}
