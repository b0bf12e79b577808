//! In-memory platform fakes shared by unit tests

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::models::ProcessInfo;
use crate::platform::{
    CommandLauncher, CpuTimes, CpuTimesReader, CpuUsageReader, MemoryProbe, MemoryStats, ProcessEnumerator,
};

/// Returns queued CPU readings, then `NotFound` once exhausted
pub struct ScriptedCpu {
    readings: VecDeque<io::Result<CpuTimes>>,
}

impl ScriptedCpu {
    pub fn new(readings: Vec<io::Result<CpuTimes>>) -> Self {
        Self {
            readings: readings.into(),
        }
    }
}

impl CpuTimesReader for ScriptedCpu {
    fn read(&mut self) -> io::Result<CpuTimes> {
        self.readings
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::NotFound.into()))
    }
}

/// Returns queued load percentages, then `NotFound` once exhausted
pub struct ScriptedUsage {
    readings: VecDeque<io::Result<f64>>,
}

impl ScriptedUsage {
    pub fn new(readings: Vec<io::Result<f64>>) -> Self {
        Self {
            readings: readings.into(),
        }
    }
}

impl CpuUsageReader for ScriptedUsage {
    fn refresh(&mut self) -> io::Result<f64> {
        self.readings
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::NotFound.into()))
    }
}

/// Returns queued memory readings, then `NotFound` once exhausted
pub struct ScriptedMemory {
    readings: VecDeque<io::Result<MemoryStats>>,
}

impl ScriptedMemory {
    pub fn new(readings: Vec<io::Result<MemoryStats>>) -> Self {
        Self {
            readings: readings.into(),
        }
    }
}

impl MemoryProbe for ScriptedMemory {
    fn read(&mut self) -> io::Result<MemoryStats> {
        self.readings
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::NotFound.into()))
    }
}

/// A mutable fake process table
#[derive(Default)]
pub struct FakeProcesses {
    table: Mutex<Vec<ProcessInfo>>,
    failures: AtomicUsize,
    refused: Mutex<HashSet<u32>>,
    terminated: Mutex<Vec<u32>>,
}

impl FakeProcesses {
    pub fn new(table: Vec<ProcessInfo>) -> Self {
        Self {
            table: Mutex::new(table),
            ..Self::default()
        }
    }

    /// Make the next `n` enumerations fail
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn set_table(&self, table: Vec<ProcessInfo>) {
        *self.table.lock() = table;
    }

    /// Make termination of `pid` fail with `PermissionDenied`
    pub fn refuse(&self, pid: u32) {
        self.refused.lock().insert(pid);
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().clone()
    }
}

impl ProcessEnumerator for FakeProcesses {
    fn processes(&self) -> io::Result<Vec<ProcessInfo>> {
        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::Other, "snapshot failed"));
        }
        Ok(self.table.lock().clone())
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        if self.refused.lock().contains(&pid) {
            return Err(io::ErrorKind::PermissionDenied.into());
        }
        let mut table = self.table.lock();
        let before = table.len();
        table.retain(|p| p.pid != pid);
        if table.len() == before {
            return Err(io::ErrorKind::NotFound.into());
        }
        self.terminated.lock().push(pid);
        Ok(())
    }
}

/// Records launches instead of starting processes
#[derive(Default)]
pub struct RecordingLauncher {
    launches: Mutex<Vec<(String, Vec<String>)>>,
    fail: bool,
}

impl RecordingLauncher {
    /// A launcher whose every launch fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launches(&self) -> Vec<(String, Vec<String>)> {
        self.launches.lock().clone()
    }
}

impl CommandLauncher for RecordingLauncher {
    fn launch(&self, program: &str, args: &[String]) -> io::Result<u32> {
        if self.fail {
            return Err(io::ErrorKind::NotFound.into());
        }
        let mut launches = self.launches.lock();
        launches.push((program.to_string(), args.to_vec()));
        Ok(1000 + u32::try_from(launches.len()).unwrap_or(0))
    }
}
