//! Bot bridge: the remote motivational-text generator behind `/motivate`.

use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::AppStateInner;

/// Command prefix that routes a message to the bridge (case-insensitive).
pub const TRIGGER: &str = "/motivate";

/// Prompt used when the command carries no text of its own.
pub const DEFAULT_PROMPT: &str = "Write a short motivational sentence for the team.";

/// Well-known account the bridge replies are posted as.
pub const BOT_EMAIL: &str = "bot@local";
pub const BOT_NAME: &str = "MotivaBot";

/// `generate(text) -> text` on the remote side.
#[async_trait]
pub trait Bridge: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    message: String,
}

/// Bridge that POSTs `{"input": ...}` to an HTTP endpoint and reads
/// `{"message": ...}` back.
pub struct HttpBridge {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBridge {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Bridge for HttpBridge {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest { input: prompt })
            .send()
            .await?
            .error_for_status()?;

        let body: GenerateResponse = response.json().await?;
        let text = body.message.trim();
        if text.is_empty() {
            bail!("bridge returned an empty message");
        }
        Ok(text.to_string())
    }
}

/// Prompt for the bridge when `content` is a trigger command, else `None`.
///
/// The command word ends at the first whitespace; whatever follows is the
/// prompt. `/motivated` still triggers, but with the default prompt.
pub fn trigger_prompt(content: &str) -> Option<String> {
    let text = content.trim();
    let head = text.get(..TRIGGER.len())?;
    if !head.eq_ignore_ascii_case(TRIGGER) {
        return None;
    }

    let rest = text
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default();
    if rest.is_empty() {
        Some(DEFAULT_PROMPT.to_string())
    } else {
        Some(rest.to_string())
    }
}

/// Text posted in place of a bridge reply when the call fails.
pub fn fallback_reply(err: &anyhow::Error) -> String {
    let reason = match err.downcast_ref::<reqwest::Error>() {
        Some(e) if e.is_timeout() => "timed out".to_string(),
        Some(e) if e.is_connect() => "connection failed".to_string(),
        Some(e) => match e.status() {
            Some(status) => format!("HTTP {}", status.as_u16()),
            None => "request failed".to_string(),
        },
        None => err.to_string(),
    };
    format!("({BOT_NAME}) couldn't reach the text generator right now: {reason}")
}

impl AppStateInner {
    /// Ask the bridge for a reply. Never fails: errors become the fallback.
    pub(crate) async fn bot_reply(&self, prompt: &str) -> String {
        let call = self.bridge.generate(prompt);
        match tokio::time::timeout(self.config.bridge_timeout, call).await {
            Ok(Ok(text)) => {
                debug!("bridge replied with {} bytes", text.len());
                text
            }
            Ok(Err(e)) => {
                warn!("Bridge call failed: {:#}", e);
                fallback_reply(&e)
            }
            Err(_) => {
                warn!("Bridge call exceeded {:?}", self.config.bridge_timeout);
                fallback_reply(&anyhow::anyhow!("timed out"))
            }
        }
    }
}
