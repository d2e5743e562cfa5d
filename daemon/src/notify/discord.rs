use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;

use super::{post_json, Alert, Severity};
use crate::config::DiscordConfig;
use crate::error::NotifyError;

pub const COLOR_RED: u32 = 0x992D22;
pub const COLOR_ORANGE: u32 = 0xF0B816;
pub const COLOR_GREEN: u32 = 0x2ECC71;

fn webhook_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^https://discord(?:app)?\.com/api/webhooks/[0-9]{18,19}/[A-Za-z0-9_-]+(?:\?\S*)?$",
        )
        .expect("webhook pattern is a valid regex")
    })
}

pub fn is_valid_webhook(url: &str) -> bool {
    webhook_pattern().is_match(url)
}

/// Body of a Discord webhook execution.
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub content: String,
    pub embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub color: u32,
}

fn color_for(severity: Severity) -> u32 {
    match severity {
        Severity::Info => COLOR_GREEN,
        Severity::Warning => COLOR_ORANGE,
        Severity::Error | Severity::Critical => COLOR_RED,
    }
}

/// Renders `alert` as a single-embed webhook message.
pub fn build_message(alert: &Alert, hostname: &str, now: DateTime<Local>) -> DiscordMessage {
    let name = &alert.process.name;
    let status = match (alert.process.pid, alert.severity) {
        (None, _) => "stopped",
        (Some(_), Severity::Info) => "running",
        (Some(_), _) => "changed",
    };
    let title = format!(
        "[{}] {hostname} - {name} process was {status}",
        alert.severity.label().to_uppercase()
    );

    let mut labels = vec![
        format!(": - **_Hostname:_** {hostname}"),
        format!(": - **_Process:_** {name}"),
    ];
    if let Some(pid) = alert.process.pid {
        labels.push(format!(": - **_PID:_** {pid}"));
    }

    let description = [
        format!("**⏰ Event Time:** {}", now.format("%Y-%m-%d %H:%M:%S")),
        format!("**🏷️ Alert labels:**\n{}", labels.join("\n")),
        "------".to_string(),
        format!("**📖 Description:**\n{}", alert.message),
    ]
    .join("\n");

    DiscordMessage {
        content: format!("=== Alert: Process tracker - {name} ==="),
        embeds: vec![DiscordEmbed {
            title,
            description,
            color: color_for(alert.severity),
        }],
    }
}

/// Rich-message channel backed by a Discord webhook.
#[derive(Clone)]
pub struct DiscordChannel {
    client: reqwest::Client,
    webhook: String,
    hostname: Arc<str>,
}

impl DiscordChannel {
    pub fn new(client: reqwest::Client, config: &DiscordConfig, hostname: Arc<str>) -> Self {
        Self {
            client,
            webhook: config.webhook.trim().to_string(),
            hostname,
        }
    }

    pub async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        if !is_valid_webhook(&self.webhook) {
            return Err(NotifyError::InvalidDestination {
                channel: "discord",
                reason: "webhook url is not a discord webhook".to_string(),
            });
        }
        let message = build_message(alert, &self.hostname, Local::now());
        post_json(self.client.post(&self.webhook), &message).await
    }
}
