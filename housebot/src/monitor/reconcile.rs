//! Pure state transitions for one poll cycle.
//!
//! Two phases: [`apply_streams`] folds a successful stream query into the
//! registry's timestamps, then [`evaluate`] applies the debounce and flips
//! `notification_sent`, returning the messages that should go out.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use helix_api::{Stream, fill_thumbnail_template};

use crate::discord::Embed;
use crate::domain::{ChannelRegistry, StreamingChannelInfo};

const EMBED_COLOR: u32 = 0x808080;
const IMAGE_WIDTH: u32 = 1920;
const IMAGE_HEIGHT: u32 = 1080;

/// Content of one outgoing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Live(Embed),
    Offline(String),
}

/// A message for one Discord channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub twitch_channel: String,
    pub guild_id: String,
    pub channel_id: String,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn is_live(&self) -> bool {
        matches!(self.kind, NotificationKind::Live(_))
    }
}

/// Fold a stream query result into the registry.
///
/// Channels reported live get their stream details and start time; every
/// other channel loses its start time and, on the first such observation,
/// gets an end time of `now`.
pub fn apply_streams(registry: &mut ChannelRegistry, streams: &[Stream], now: DateTime<Utc>) {
    let live: HashMap<String, &Stream> = streams
        .iter()
        .filter(|s| s.is_live())
        .map(|s| (s.user_login.to_lowercase(), s))
        .collect();

    for (name, info) in registry.iter_mut() {
        match live.get(name.as_str()) {
            Some(stream) => {
                info.stream_title = stream.title.clone();
                info.game_id = stream.game_id.clone();
                info.thumbnail_url = stream.thumbnail_url.clone();
                info.start_time = Some(stream.started_at);
                info.end_time = None;
            }
            None => {
                info.start_time = None;
                info.end_time.get_or_insert(now);
            }
        }
    }
}

/// Run the debounce over every channel and collect due notifications.
///
/// Only guilds whose status is present and `true` are considered.
pub fn evaluate(
    registry: &mut ChannelRegistry,
    guilds: &HashMap<String, bool>,
    now: DateTime<Utc>,
    debounce: chrono::Duration,
) -> Vec<Notification> {
    let settled = |since: Option<DateTime<Utc>>| since.is_some_and(|t| now - t >= debounce);
    let mut out = Vec::new();

    for (name, info) in registry.iter_mut() {
        let going_live = settled(info.start_time);
        let going_offline = !going_live && settled(info.end_time);
        if !going_live && !going_offline {
            continue;
        }

        let kind = if going_live {
            NotificationKind::Live(live_embed(info))
        } else {
            NotificationKind::Offline(offline_text(info))
        };

        for (guild_id, subs) in info.discord_channels.iter_mut() {
            if !guilds.get(guild_id).copied().unwrap_or(false) {
                continue;
            }
            for sub in subs.iter_mut() {
                // Live wants sent == false, offline wants sent == true.
                if sub.notification_sent == going_live {
                    continue;
                }
                sub.notification_sent = going_live;
                out.push(Notification {
                    twitch_channel: name.clone(),
                    guild_id: guild_id.clone(),
                    channel_id: sub.channel_id.clone(),
                    kind: kind.clone(),
                });
            }
        }
    }

    out
}

/// Rich "now live" message.
pub fn live_embed(info: &StreamingChannelInfo) -> Embed {
    Embed {
        url: format!("https://www.twitch.tv/{}", info.display_name),
        title: info.stream_title.clone(),
        color: EMBED_COLOR,
        author_name: info.display_name.clone(),
        author_icon_url: info.logo_url.clone(),
        image_url: fill_thumbnail_template(&info.thumbnail_url, IMAGE_WIDTH, IMAGE_HEIGHT),
        image_width: IMAGE_WIDTH,
        image_height: IMAGE_HEIGHT,
    }
}

pub fn offline_text(info: &StreamingChannelInfo) -> String {
    format!("{} is now offline!", info.display_name)
}
