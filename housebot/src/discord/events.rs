//! Gateway dispatch events the bot reacts to.

use serde::Deserialize;
use serde_json::Value;

/// Events emitted by the gateway client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Handshake finished; `user_id` is the bot's own user.
    Ready { session_id: String, user_id: String },
    /// Guild became available. `unavailable` is set during outages.
    GuildCreate { guild_id: String, unavailable: bool },
    /// Guild went away. `unavailable == Some(true)` means an outage;
    /// absent means the bot was removed.
    GuildDelete {
        guild_id: String,
        unavailable: Option<bool>,
    },
    MessageCreate(MessageCreate),
}

/// A message posted in a channel the bot can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCreate {
    pub channel_id: String,
    /// `None` for direct messages.
    pub guild_id: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
}

#[derive(Deserialize)]
struct ReadyData {
    session_id: String,
    user: UserData,
}

#[derive(Deserialize)]
struct UserData {
    id: String,
    #[serde(default)]
    username: String,
}

#[derive(Deserialize)]
struct GuildData {
    id: String,
    #[serde(default)]
    unavailable: Option<bool>,
}

#[derive(Deserialize)]
struct MessageData {
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    author: UserData,
    #[serde(default)]
    content: String,
}

impl GatewayEvent {
    /// Parse a dispatch (`op 0`) payload. Unhandled event types yield `None`.
    pub fn from_dispatch(event_type: &str, data: Value) -> Option<Self> {
        match event_type {
            "READY" => {
                let ready: ReadyData = serde_json::from_value(data).ok()?;
                Some(Self::Ready {
                    session_id: ready.session_id,
                    user_id: ready.user.id,
                })
            }
            "GUILD_CREATE" => {
                let guild: GuildData = serde_json::from_value(data).ok()?;
                Some(Self::GuildCreate {
                    guild_id: guild.id,
                    unavailable: guild.unavailable.unwrap_or(false),
                })
            }
            "GUILD_DELETE" => {
                let guild: GuildData = serde_json::from_value(data).ok()?;
                Some(Self::GuildDelete {
                    guild_id: guild.id,
                    unavailable: guild.unavailable,
                })
            }
            "MESSAGE_CREATE" => {
                let msg: MessageData = serde_json::from_value(data).ok()?;
                Some(Self::MessageCreate(MessageCreate {
                    channel_id: msg.channel_id,
                    guild_id: msg.guild_id,
                    author_id: msg.author.id,
                    author_name: msg.author.username,
                    content: msg.content,
                }))
            }
            _ => None,
        }
    }
}
