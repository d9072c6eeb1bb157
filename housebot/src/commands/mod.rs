//! Chat commands.
//!
//! `housebot channel add <name>` and `housebot channel remove <name>`, scoped
//! to the Discord channel the command was posted in.

use std::sync::Arc;

use tracing::{error, info};

use crate::discord::{ChatSink, MessageCreate};
use crate::domain::RegisterOutcome;
use crate::session::BotContext;

pub const DEFAULT_PREFIX: &str = "housebot";

const USAGE: &str = "Proper usage is housebot channel [add/remove] <Twitch Channel>";
const MONITORING_UNAVAILABLE: &str = "Twitch monitoring is not available right now.";
const GUILD_ONLY: &str = "Channel commands only work inside a server.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Follow a Twitch channel (name already lower-cased).
    ChannelAdd(String),
    ChannelRemove(String),
    /// `channel` with the wrong arguments.
    ChannelUsage,
    /// Prefixed, but not a command we know.
    Unknown,
}

/// Parse a message. `None` when it is not addressed to the bot.
pub fn parse(prefix: &str, content: &str) -> Option<Command> {
    if !content.to_lowercase().starts_with(&prefix.to_lowercase()) {
        return None;
    }

    let params: Vec<&str> = content.split_whitespace().skip(1).collect();
    let command = match params.as_slice() {
        ["channel", "add", name] => Command::ChannelAdd(name.to_lowercase()),
        ["channel", "remove", name] => Command::ChannelRemove(name.to_lowercase()),
        ["channel", ..] => Command::ChannelUsage,
        _ => Command::Unknown,
    };
    Some(command)
}

/// Turns incoming messages into session calls and replies.
pub struct CommandHandler {
    ctx: BotContext,
    chat: Arc<dyn ChatSink>,
    prefix: String,
    /// The bot's own user id; also the key its session is registered under.
    bot_user_id: String,
}

impl CommandHandler {
    pub fn new(
        ctx: BotContext,
        chat: Arc<dyn ChatSink>,
        prefix: impl Into<String>,
        bot_user_id: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            chat,
            prefix: prefix.into(),
            bot_user_id: bot_user_id.into(),
        }
    }

    /// Handle one message, sending the reply (if any) to its channel.
    /// Returns the reply text.
    pub async fn handle(&self, msg: &MessageCreate) -> Option<String> {
        if msg.author_id == self.bot_user_id {
            return None;
        }
        let command = parse(&self.prefix, &msg.content)?;
        let guild_id = msg.guild_id.as_deref().unwrap_or_default();

        info!(
            user = %msg.author_name,
            command = %msg.content,
            channel_id = %msg.channel_id,
            server_id = %guild_id,
            "Command received"
        );

        let reply = match command {
            Command::ChannelAdd(name) => self.add(msg, &name).await,
            Command::ChannelRemove(name) => self.remove(msg, &name).await,
            Command::ChannelUsage => USAGE.to_string(),
            Command::Unknown => {
                info!(
                    user = %msg.author_name,
                    command = %msg.content,
                    channel_id = %msg.channel_id,
                    server_id = %guild_id,
                    "Invalid command"
                );
                return None;
            }
        };

        if let Err(e) = self.chat.send_text(&msg.channel_id, &reply).await {
            error!(channel_id = %msg.channel_id, error = %e, "Failed to send message to Discord");
        }
        Some(reply)
    }

    async fn add(&self, msg: &MessageCreate, twitch_channel: &str) -> String {
        let Some(guild_id) = msg.guild_id.as_deref() else {
            return GUILD_ONLY.to_string();
        };
        let Some(session) = self.ctx.session(&self.bot_user_id) else {
            return MONITORING_UNAVAILABLE.to_string();
        };

        match session
            .register_channel(twitch_channel, guild_id, &msg.channel_id)
            .await
        {
            Ok(RegisterOutcome::Registered) => {
                info!(
                    user = %msg.author_name,
                    twitch_channel,
                    channel_id = %msg.channel_id,
                    server_id = %guild_id,
                    "Succeeded in registering channel"
                );
                format!("{twitch_channel}'s Twitch channel successfully added to this Discord channel.")
            }
            Ok(RegisterOutcome::AlreadyRegistered) => {
                info!(
                    user = %msg.author_name,
                    twitch_channel,
                    channel_id = %msg.channel_id,
                    server_id = %guild_id,
                    "Channel already registered"
                );
                format!("{twitch_channel}'s Twitch channel is already added to this Discord channel.")
            }
            Err(e) => {
                info!(
                    user = %msg.author_name,
                    twitch_channel,
                    channel_id = %msg.channel_id,
                    server_id = %guild_id,
                    error = %e,
                    "Failed to register channel"
                );
                e.user_message()
            }
        }
    }

    async fn remove(&self, msg: &MessageCreate, twitch_channel: &str) -> String {
        let Some(guild_id) = msg.guild_id.as_deref() else {
            return GUILD_ONLY.to_string();
        };
        let Some(session) = self.ctx.session(&self.bot_user_id) else {
            return MONITORING_UNAVAILABLE.to_string();
        };

        if session
            .unregister_channel(twitch_channel, guild_id, &msg.channel_id)
            .await
        {
            info!(
                user = %msg.author_name,
                twitch_channel,
                channel_id = %msg.channel_id,
                server_id = %guild_id,
                "Succeeded in unregistering channel"
            );
            format!("{twitch_channel}'s Twitch channel successfully removed from this Discord channel.")
        } else {
            info!(
                user = %msg.author_name,
                twitch_channel,
                channel_id = %msg.channel_id,
                server_id = %guild_id,
                "Failed to unregister channel"
            );
            format!("{twitch_channel}'s Twitch channel is not added to this Discord channel.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_lowercases_name() {
        assert_eq!(
            parse("housebot", "HouseBot channel add Alice"),
            Some(Command::ChannelAdd("alice".to_string()))
        );
    }

    #[test]
    fn test_parse_remove() {
        assert_eq!(
            parse("housebot", "housebot channel remove bob"),
            Some(Command::ChannelRemove("bob".to_string()))
        );
    }

    #[test]
    fn test_parse_usage_and_unknown() {
        assert_eq!(parse("housebot", "housebot channel"), Some(Command::ChannelUsage));
        assert_eq!(parse("housebot", "housebot channel add"), Some(Command::ChannelUsage));
        assert_eq!(
            parse("housebot", "housebot channel list alice"),
            Some(Command::ChannelUsage)
        );
        assert_eq!(parse("housebot", "housebot dance"), Some(Command::Unknown));
        assert_eq!(parse("housebot", "housebot"), Some(Command::Unknown));
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert_eq!(parse("housebot", "hello housebot channel add alice"), None);
        assert_eq!(parse("housebot", ""), None);
    }

    #[test]
    fn test_parse_custom_prefix() {
        assert_eq!(
            parse("!hb", "!HB channel add x"),
            Some(Command::ChannelAdd("x".to_string()))
        );
    }
}
