//! Discord side of the bot.
//!
//! - [`ChatSink`]: the message-sending seam used by commands and the monitor
//! - [`DiscordRestClient`]: REST implementation of the sink
//! - [`DiscordGateway`]: websocket gateway producing [`GatewayEvent`]s

mod events;
mod gateway;
mod rest;

pub use events::{GatewayEvent, MessageCreate};
pub use gateway::{DiscordGateway, GatewayConfig, intents};
pub use rest::DiscordRestClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Rich message shown for "now live" notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub url: String,
    pub title: String,
    pub color: u32,
    pub author_name: String,
    pub author_icon_url: String,
    pub image_url: String,
    pub image_width: u32,
    pub image_height: u32,
}

/// Sends messages to Discord channels.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<()>;

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()>;
}
