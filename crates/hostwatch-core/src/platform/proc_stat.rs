//! CPU counters from Linux `/proc/stat`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{CpuTimes, CpuTimesReader};

/// Reads the aggregate `cpu` line of a procfs stat file
#[derive(Debug, Clone)]
pub struct ProcStatReader {
    path: PathBuf,
}

impl Default for ProcStatReader {
    fn default() -> Self {
        Self::new("/proc/stat")
    }
}

impl ProcStatReader {
    /// Read counters from `path` instead of the live procfs
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CpuTimesReader for ProcStatReader {
    fn read(&mut self) -> io::Result<CpuTimes> {
        let content = fs::read_to_string(&self.path)?;
        parse_proc_stat(&content)
    }
}

/// Parse the aggregate line into kernel-includes-idle counters
///
/// procfs reports idle separately from system time, so idle and iowait are
/// folded into `kernel` to keep `kernel + user` equal to total time.
pub(crate) fn parse_proc_stat(content: &str) -> io::Result<CpuTimes> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| invalid("missing aggregate cpu line"))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(&e.to_string()))?;

    if fields.len() < 4 {
        return Err(invalid("cpu line has fewer than 4 counters"));
    }

    let field = |i: usize| fields.get(i).copied().unwrap_or(0);
    let (user, nice, system, idle) = (field(0), field(1), field(2), field(3));
    let (iowait, irq, softirq, steal) = (field(4), field(5), field(6), field(7));

    let idle_all = idle + iowait;
    Ok(CpuTimes {
        idle: idle_all,
        kernel: system + irq + softirq + steal + idle_all,
        user: user + nice,
    })
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("/proc/stat: {msg}"))
}
