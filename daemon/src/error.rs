use std::path::PathBuf;

use thiserror::Error;

/// The process list could not be read this cycle.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The enumeration came back with no processes at all. A live system
    /// always contains at least the tracker itself, so this means the
    /// platform query failed silently.
    #[error("process enumeration returned no processes")]
    Empty,
    #[cfg_attr(not(test), allow(dead_code))]
    #[error("process enumeration failed: {0}")]
    Platform(String),
}

/// A single channel failed to deliver an alert. Never escapes the
/// dispatch task that produced it.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid {channel} destination: {reason}")]
    InvalidDestination {
        channel: &'static str,
        reason: String,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Fatal startup problems. Each variant has a stable exit code so scripts
/// wrapping the tracker can tell them apart.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("process name must not be empty")]
    EmptyName,
    #[error("interval {0:?} is not in range 10s to 1h")]
    IntervalOutOfRange(String),
}

impl ConfigError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ConfigError::Read { .. } => 1,
            ConfigError::Parse { .. } => 2,
            ConfigError::IntervalOutOfRange(_) => 4,
            ConfigError::EmptyName => 5,
        }
    }
}

/// Exit code used when `--list`/`--find` cannot enumerate processes.
pub const EXIT_LISTING_FAILED: u8 = 3;
