//! Outbound alerts.
//!
//! The polling engine hands an [`Alert`] to an [`AlertSink`] and moves on.
//! The production sink, [`Notifier`], fans each alert out to every
//! configured channel on its own tokio task. Delivery is best-effort: no
//! retries, and failures end in a log line rather than an error value.

pub mod discord;
pub mod line;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use sysinfo::System;
use tracing::warn;

use crate::config::AlertConfig;
use crate::error::NotifyError;
use discord::DiscordChannel;
use line::LineChannel;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Escalation level of an alert, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    #[allow(dead_code)]
    Error,
    Critical,
}

impl Severity {
    /// Short label shown in alert titles.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "normal",
            Severity::Warning => "warning",
            Severity::Error | Severity::Critical => "critical",
        }
    }
}

/// Who the alert is about, copied out of the tracker at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: Option<u32>,
    pub name: String,
}

/// An owned, immutable alert. Dispatch tasks get their own copy, so the
/// tracker can keep changing while delivery is still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
    pub severity: Severity,
    pub process: ProcessIdentity,
}

/// Receives alerts from the polling engine. Must return without waiting
/// for delivery.
pub trait AlertSink {
    fn dispatch(&self, alert: Alert);
}

/// Sends every alert to each configured channel independently.
pub struct Notifier {
    line: Option<LineChannel>,
    discord: Option<DiscordChannel>,
}

impl Notifier {
    pub fn new(config: &AlertConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        let hostname: Arc<str> = System::host_name()
            .unwrap_or_else(|| "unknown-host".to_string())
            .into();

        Ok(Self {
            line: config
                .line
                .as_ref()
                .map(|c| LineChannel::new(client.clone(), c, Arc::clone(&hostname))),
            discord: config
                .discord
                .as_ref()
                .map(|c| DiscordChannel::new(client.clone(), c, Arc::clone(&hostname))),
        })
    }

    /// Number of channels alerts will be sent to.
    pub fn channel_count(&self) -> usize {
        usize::from(self.line.is_some()) + usize::from(self.discord.is_some())
    }
}

impl AlertSink for Notifier {
    /// Spawns one task per channel; must be called from within a tokio
    /// runtime.
    fn dispatch(&self, alert: Alert) {
        if let Some(line) = &self.line {
            let line = line.clone();
            let alert = alert.clone();
            tokio::spawn(async move {
                if let Err(e) = line.send(&alert).await {
                    warn!("[line] Failed to send notification: {e}");
                }
            });
        }
        if let Some(discord) = &self.discord {
            let discord = discord.clone();
            tokio::spawn(async move {
                if let Err(e) = discord.send(&alert).await {
                    warn!("[discord] Failed to send notification: {e}");
                }
            });
        }
    }
}

/// Sends `body` as JSON and turns a 4xx/5xx answer into
/// [`NotifyError::Rejected`], keeping the response body for the log.
async fn post_json<T: Serialize + ?Sized>(
    request: reqwest::RequestBuilder,
    body: &T,
) -> Result<(), NotifyError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}
