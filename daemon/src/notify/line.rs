use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;

use super::{post_json, Alert};
use crate::config::LineConfig;
use crate::error::NotifyError;

pub const PUSH_ENDPOINT: &str = "https://api.line.me/v2/bot/message/push";

/// User (`U`), group (`C`), or room (`R`) followed by 32 hex digits.
fn recipient_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[UCR][0-9a-f]{32}$").expect("recipient pattern is a valid regex")
    })
}

#[derive(Debug, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub messages: Vec<TextMessage>,
}

#[derive(Debug, Serialize)]
pub struct TextMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

pub fn build_push(to: &str, alert: &Alert, hostname: &str) -> PushMessage {
    PushMessage {
        to: to.to_string(),
        messages: vec![TextMessage {
            kind: "text",
            text: format!(
                "[{}] {hostname}\n{}",
                alert.severity.label().to_uppercase(),
                alert.message
            ),
        }],
    }
}

/// Direct-message channel through the LINE Messaging API push endpoint.
#[derive(Clone)]
pub struct LineChannel {
    client: reqwest::Client,
    to: String,
    token: String,
    hostname: Arc<str>,
    endpoint: String,
}

impl LineChannel {
    pub fn new(client: reqwest::Client, config: &LineConfig, hostname: Arc<str>) -> Self {
        Self {
            client,
            to: config.to.trim().to_string(),
            token: config.token.trim().to_string(),
            hostname,
            endpoint: PUSH_ENDPOINT.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn validate(&self) -> Result<(), NotifyError> {
        if self.token.is_empty() {
            return Err(NotifyError::InvalidDestination {
                channel: "line",
                reason: "channel access token is empty".to_string(),
            });
        }
        if !recipient_pattern().is_match(&self.to) {
            return Err(NotifyError::InvalidDestination {
                channel: "line",
                reason: format!("{:?} is not a user, group, or room ID", self.to),
            });
        }
        Ok(())
    }

    pub async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.validate()?;
        let body = build_push(&self.to, alert, &self.hostname);
        let request = self.client.post(&self.endpoint).bearer_auth(&self.token);
        post_json(request, &body).await
    }
}
