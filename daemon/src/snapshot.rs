use sysinfo::{ProcessesToUpdate, System};

use crate::error::SnapshotError;

/// One row of a process snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub executable: String,
}

/// Anything that can enumerate the running processes on demand.
///
/// Called once per poll cycle, so implementations should be cheap to call
/// repeatedly.
pub trait ProcessSource {
    fn snapshot(&mut self) -> Result<Vec<ProcessEntry>, SnapshotError>;
}

/// Reads the OS process table through `sysinfo`. The `System` is kept
/// between calls so refreshes only touch what changed.
pub struct SysinfoSource {
    sys: System,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoSource {
    /// Entries come back ordered by PID so first-match scans are stable
    /// across calls.
    fn snapshot(&mut self) -> Result<Vec<ProcessEntry>, SnapshotError> {
        self.sys.refresh_processes(ProcessesToUpdate::All, true);

        let mut entries: Vec<ProcessEntry> = self
            .sys
            .processes()
            .values()
            .map(|p| ProcessEntry {
                pid: p.pid().as_u32(),
                parent_pid: p.parent().map(|pid| pid.as_u32()),
                executable: p.name().to_string_lossy().into_owned(),
            })
            .collect();

        if entries.is_empty() {
            return Err(SnapshotError::Empty);
        }
        entries.sort_by_key(|e| e.pid);
        Ok(entries)
    }
}
