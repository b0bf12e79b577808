//! Process inventory models

use serde::{Deserialize, Serialize};

/// One running process, as seen by a process enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// OS process id
    pub pid: u32,

    /// Executable name, e.g. `firefox` or `chrome.exe`
    pub name: String,

    /// Resident memory in bytes
    pub memory_bytes: u64,
}

impl ProcessInfo {
    /// Create a process record
    pub fn new(pid: u32, name: impl Into<String>, memory_bytes: u64) -> Self {
        Self {
            pid,
            name: name.into(),
            memory_bytes,
        }
    }
}
