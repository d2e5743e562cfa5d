use chrono::{DateTime, Local};

/// Last known lifecycle condition of the tracked process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing observed yet.
    Unknown,
    /// Running under the PID first seen (or seen again after a stop).
    Normal,
    /// Absent from the last snapshot.
    Stopped,
    /// Still running, but under a different PID than before.
    IdentifierChanged,
}

/// Everything the tracker knows about the one process it watches.
///
/// Mutated only by the polling engine. `pid` is `None` exactly when the
/// process is considered not running, so `Stopped` always pairs with `None`
/// and `Normal`/`IdentifierChanged` always carry a PID.
#[derive(Debug, Clone)]
pub struct TrackedProcess {
    name: String,
    pid: Option<u32>,
    pub(crate) polling: bool,
    stage: Stage,
    /// Set when a stop or PID-change alert goes out; cleared when the
    /// process comes back after a stop. Its presence decides whether a
    /// "back to normal" alert is due.
    last_notified_at: Option<DateTime<Local>>,
}

impl TrackedProcess {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pid: None,
            polling: false,
            stage: Stage::Unknown,
            last_notified_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn last_notified_at(&self) -> Option<DateTime<Local>> {
        self.last_notified_at
    }

    /// Case-insensitive comparison against an executable name.
    pub fn matches(&self, executable: &str) -> bool {
        self.name.to_lowercase() == executable.to_lowercase()
    }

    /// Found running while previously not running. Returns the timestamp of
    /// the alert that announced the earlier stop, if there was one.
    pub(crate) fn mark_running(&mut self, pid: u32) -> Option<DateTime<Local>> {
        self.pid = Some(pid);
        self.stage = Stage::Normal;
        self.last_notified_at.take()
    }

    pub(crate) fn mark_pid_changed(&mut self, pid: u32, at: DateTime<Local>) {
        self.pid = Some(pid);
        self.stage = Stage::IdentifierChanged;
        self.last_notified_at = Some(at);
    }

    pub(crate) fn mark_stopped(&mut self, at: DateTime<Local>) {
        self.pid = None;
        self.stage = Stage::Stopped;
        self.last_notified_at = Some(at);
    }
}
