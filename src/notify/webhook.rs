use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;

use super::{Listener, NewsAlert};

/// Upper bound on delivery attempts per alert.
pub const MAX_WEBHOOK_RETRIES: u8 = 8;

/// POSTs each alert as JSON to a fixed URL, retrying with exponential backoff.
#[derive(Clone)]
pub struct WebhookListener {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    /// Plain-text line for chat-style webhooks (Slack/Discord ignore the rest).
    text: String,
    #[serde(flatten)]
    alert: &'a NewsAlert,
}

impl WebhookListener {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Clamped to `1..=MAX_WEBHOOK_RETRIES`.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.clamp(1, MAX_WEBHOOK_RETRIES);
        self
    }

    fn backoff(attempt: u8) -> Duration {
        let shift = u32::from(attempt.clamp(1, MAX_WEBHOOK_RETRIES) - 1);
        Duration::from_millis(500u64 << shift)
    }
}

#[async_trait::async_trait]
impl Listener for WebhookListener {
    async fn deliver(&self, alert: &NewsAlert) -> Result<()> {
        let payload = WebhookPayload {
            event: "news-alert",
            text: format!(
                "{} | latest: {} ({})",
                alert.message, alert.latest.title, alert.latest.url
            ),
            alert,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Self::backoff(attempt)).await;
        }
    }

    fn kind(&self) -> &'static str {
        "webhook"
    }

    /// Room for every attempt plus the backoff between them.
    fn delivery_budget(&self) -> Option<Duration> {
        let attempts = u32::from(self.max_retries);
        let backoff: Duration = (1..self.max_retries).map(Self::backoff).sum();
        Some(self.timeout.saturating_mul(attempts).saturating_add(backoff))
    }
}
