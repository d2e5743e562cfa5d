use std::io::{self, Write};

use crate::snapshot::ProcessEntry;

const RULE: &str = "----------------------------------------";

/// Which rows `--list` / `--find` print.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Case-insensitive substring of the executable name.
    pub name: Option<String>,
    /// Include every process, not just those whose parent is PID 1.
    pub all: bool,
}

impl ListFilter {
    pub fn accepts(&self, entry: &ProcessEntry) -> bool {
        if !self.all && entry.parent_pid != Some(1) {
            return false;
        }
        match &self.name {
            Some(name) => entry
                .executable
                .to_lowercase()
                .contains(&name.to_lowercase()),
            None => true,
        }
    }
}

/// Prints the process table for `entries`. Returns how many rows matched.
pub fn write_table<W: Write>(
    out: &mut W,
    entries: &[ProcessEntry],
    filter: &ListFilter,
) -> io::Result<usize> {
    writeln!(out, "[+] Total process count {}", entries.len())?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "{:>8}{:>8}    Process name", "PID", "PPID")?;
    writeln!(out, "{RULE}")?;

    let mut shown = 0;
    for entry in entries.iter().filter(|e| filter.accepts(e)) {
        let ppid = entry
            .parent_pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(out, "{:>8}{:>8}    {}", entry.pid, ppid, entry.executable)?;
        shown += 1;
    }
    if shown == 0 {
        writeln!(out, "[x] No process found.")?;
    }

    writeln!(out, "{RULE}")?;
    writeln!(out, "[*] PID = Process ID, PPID = Parent PID")?;
    Ok(shown)
}
