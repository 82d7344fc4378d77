//! Outbound text messaging.
//!
//! The core only knows the [`Sender`] seam; the concrete implementation
//! talks to a Sendblue-compatible REST API. Replies are cleaned of markdown
//! before sending — text messages don't render it.

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use maestro_agent::heartbeat::FindingSink;
use maestro_core::config::MessagingConfig;
use maestro_core::{MaestroError, Result};

#[async_trait]
pub trait Sender: Send + Sync {
    async fn send_text(&self, to: &str, content: &str) -> Result<()>;

    /// Best-effort "..." bubble while the engine thinks. Failures are
    /// swallowed.
    async fn typing_indicator(&self, to: &str);
}

pub struct HttpSender {
    client: reqwest::Client,
    config: MessagingConfig,
}

impl HttpSender {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("content-type", "application/json")
            .header("sb-api-key-id", &self.config.api_key_id)
            .header("sb-api-secret-key", &self.config.api_secret_key)
    }
}

#[async_trait]
impl Sender for HttpSender {
    async fn send_text(&self, to: &str, content: &str) -> Result<()> {
        let url = format!("{}/send-message", self.config.base_url);
        let body = serde_json::json!({
            "number": to,
            "from_number": self.config.from_number,
            "content": content,
        });
        let resp = self
            .headers(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| MaestroError::Messaging(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(MaestroError::Messaging(format!(
                "send failed ({status}): {text}"
            )));
        }
        debug!(%to, bytes = content.len(), "text sent");
        Ok(())
    }

    async fn typing_indicator(&self, to: &str) {
        let url = format!("{}/send-typing-indicator", self.config.base_url);
        let body = serde_json::json!({
            "number": to,
            "from_number": self.config.from_number,
        });
        let _ = self.headers(self.client.post(&url)).json(&body).send().await;
    }
}

/// Clean up engine output for a text message: strip markdown headers, bold
/// and italics, code fences, and collapse excessive newlines.
pub fn format_for_text(text: &str) -> String {
    let headers = Regex::new(r"(?m)^#{1,6}\s+").expect("static regex");
    let bold = Regex::new(r"\*\*(.+?)\*\*").expect("static regex");
    let italic = Regex::new(r"\*(.+?)\*").expect("static regex");
    let fence = Regex::new(r"```\w*\n?").expect("static regex");
    let inline_code = Regex::new(r"`(.+?)`").expect("static regex");
    let newlines = Regex::new(r"\n{3,}").expect("static regex");

    let out = headers.replace_all(text, "");
    let out = bold.replace_all(&out, "$1");
    let out = italic.replace_all(&out, "$1");
    let out = fence.replace_all(&out, "");
    let out = inline_code.replace_all(&out, "$1");
    let out = newlines.replace_all(&out, "\n\n");
    out.trim().to_string()
}

/// Routes urgent heartbeat findings to the super's phone.
pub struct TextFindingSink {
    pub sender: std::sync::Arc<dyn Sender>,
    pub to: String,
}

#[async_trait]
impl FindingSink for TextFindingSink {
    async fn deliver(&self, text: &str) {
        let formatted = format!("[Maestro] {}", format_for_text(text));
        if let Err(e) = self.sender.send_text(&self.to, &formatted).await {
            warn!(error = %e, "failed to deliver finding");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_is_flattened() {
        let input = "# Heads up\n\n**Pour** is *tomorrow*. See `S-301`.\n\n\n\n```text\ndetail\n```";
        let out = format_for_text(input);
        assert!(!out.contains('#'));
        assert!(!out.contains("**"));
        assert!(!out.contains('`'));
        assert!(out.contains("Pour is tomorrow. See S-301."));
        assert!(!out.contains("\n\n\n"));
    }
}
