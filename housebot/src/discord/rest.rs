//! Discord REST client for posting channel messages.
//!
//! Follows Discord's recommended rate limit handling:
//! - No hardcoded rate limits
//! - Retries on 429 responses respecting Retry-After

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use super::{ChatSink, Embed};
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

const API_BASE_URL: &str = "https://discord.com/api/v10";

/// Upper bound on a single REST request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts messages as the bot user.
pub struct DiscordRestClient {
    client: Client,
    token: String,
    api_base: String,
}

impl DiscordRestClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_timeout(token, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(token: impl Into<String>, timeout: Duration) -> Self {
        helix_api::install_rustls_provider();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            token: token.into(),
            api_base: API_BASE_URL.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Build the create-message payload for an embed.
    pub(crate) fn embed_payload(embed: &Embed) -> serde_json::Value {
        json!({
            "embeds": [{
                "url": embed.url,
                "title": embed.title,
                "color": embed.color,
                "author": {
                    "name": embed.author_name,
                    "icon_url": embed.author_icon_url,
                },
                "image": {
                    "url": embed.image_url,
                    "width": embed.image_width,
                    "height": embed.image_height,
                },
            }]
        })
    }

    /// Send request with rate limit handling.
    async fn post_message(&self, channel_id: &str, payload: &serde_json::Value) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, self.authorization())
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::delivery(format!("Discord request failed: {}", e)))?;

            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(response).await;

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Discord rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::delivery(format!(
                        "Discord rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Discord rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            // Other error - don't retry
            let body = response.text().await.unwrap_or_default();
            return Err(Error::delivery(format!(
                "Discord rejected message for channel {}: {} - {}",
                channel_id, status, body
            )));
        }
    }
}

/// Parse the retry delay from a 429 response.
async fn parse_retry_after(response: reqwest::Response) -> Option<Duration> {
    // Retry-After header first (Discord sets this)
    if let Some(secs) = header_secs(&response, "Retry-After") {
        return Some(secs);
    }

    if let Some(secs) = header_secs(&response, "X-RateLimit-Reset-After") {
        return Some(secs);
    }

    // Fallback: JSON body `{"retry_after": 0.5, ...}`
    let body: serde_json::Value = response.json().await.ok()?;
    body.get("retry_after")
        .and_then(serde_json::Value::as_f64)
        .map(Duration::from_secs_f64)
}

fn header_secs(response: &reqwest::Response, name: &str) -> Option<Duration> {
    let secs = response.headers().get(name)?.to_str().ok()?.parse::<f64>().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

#[async_trait]
impl ChatSink for DiscordRestClient {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<()> {
        self.post_message(channel_id, &json!({ "content": text }))
            .await?;
        debug!(channel_id, "Discord text message sent");
        Ok(())
    }

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()> {
        self.post_message(channel_id, &Self::embed_payload(embed))
            .await?;
        debug!(channel_id, "Discord embed sent");
        Ok(())
    }
}
