use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_INTERVAL: Duration = Duration::from_secs(10);
pub const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Written by `--gen-config`. Every value is a placeholder to be replaced.
pub const STARTER_CONFIG: &str = r#"[process]
name = "<process name>"
interval = "<duration eg. 10s>"

[alert.line]
to = "<user or group ID>"
token = "<linebot channel access token>"

[alert.discord]
webhook = "<discord webhook url>"
"#;

/// Root configuration structure. Deserialized from `config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub alert: AlertConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessConfig {
    /// Executable name to track, matched case-insensitively.
    #[serde(default)]
    pub name: String,
    /// Poll interval such as "30s" or "1m30s". Unparsable values fall back
    /// to [`DEFAULT_INTERVAL`].
    #[serde(default)]
    pub interval: String,
}

/// Notification destinations. A missing table disables that channel.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct AlertConfig {
    pub line: Option<LineConfig>,
    pub discord: Option<DiscordConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LineConfig {
    /// Recipient user, group, or room ID.
    pub to: String,
    /// Messaging API channel access token.
    pub token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    pub webhook: String,
}

/// Validated startup parameters for the tracker.
#[derive(Debug, Clone)]
pub struct Settings {
    pub name: String,
    pub interval: Duration,
    pub alert: AlertConfig,
}

impl Config {
    /// Checks the startup preconditions and resolves the poll interval.
    ///
    /// Never exits the process; callers decide what a failure means.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let interval = resolve_interval(&self.process.interval)?;
        let name = self.process.name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(Settings {
            name: name.to_string(),
            interval,
            alert: self.alert.clone(),
        })
    }
}

/// Parses `raw` and checks it against [`MIN_INTERVAL`]..=[`MAX_INTERVAL`].
/// Garbage falls back to [`DEFAULT_INTERVAL`]; a parsable value out of range,
/// negative and zero included, is an error.
pub fn resolve_interval(raw: &str) -> Result<Duration, ConfigError> {
    let Some(nanos) = parse_interval(raw) else {
        warn!(
            "[config] Invalid interval {raw:?}, using default {}s",
            DEFAULT_INTERVAL.as_secs()
        );
        return Ok(DEFAULT_INTERVAL);
    };
    let min = MIN_INTERVAL.as_nanos() as i128;
    let max = MAX_INTERVAL.as_nanos() as i128;
    if !(min..=max).contains(&nanos) {
        return Err(ConfigError::IntervalOutOfRange(raw.trim().to_string()));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Parses a signed duration into nanoseconds, e.g. `90s`, `1m30s`, `1.5h`,
/// `.5m`, `-5s`, `0`. An optional sign is followed by one or more
/// `<number><unit>` groups with units `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`.
pub fn parse_interval(raw: &str) -> Option<i128> {
    let mut rest = raw.trim();
    let negative = rest.starts_with('-');
    if let Some(unsigned) = rest.strip_prefix(['-', '+']) {
        rest = unsigned;
    }
    if rest == "0" {
        return Some(0);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let &(scale, unit) = UNITS.iter().find(|(_, unit)| rest.starts_with(*unit))?;
        rest = &rest[unit.len()..];
        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > i64::MAX as f64 {
        return None;
    }
    let nanos = total_nanos.round() as i128;
    Some(if negative { -nanos } else { nanos })
}

/// Longer unit names first so `ms` is not read as `m`.
const UNITS: [(f64, &str); 8] = [
    (1.0, "ns"),
    (1e3, "us"),
    (1e3, "\u{b5}s"),
    (1e3, "\u{3bc}s"),
    (1e6, "ms"),
    (1e9, "s"),
    (60e9, "m"),
    (3_600e9, "h"),
];

/// Loads and parses the config file at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes [`STARTER_CONFIG`] to `path`, replacing any existing file.
pub fn write_starter(path: &Path) -> Result<()> {
    std::fs::write(path, STARTER_CONFIG)
        .with_context(|| format!("Failed to write starter config file: {}", path.display()))
}
