//! Channel registry: which Discord channels follow which Twitch channels.
//!
//! The registry itself is plain data. Callers (the session) serialize
//! access to it behind a single lock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One Discord channel's interest in a Twitch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    /// Discord channel id.
    pub channel_id: String,
    /// Whether the "now live" message went out for the current live session.
    pub notification_sent: bool,
}

impl ChannelSubscription {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            notification_sent: false,
        }
    }
}

/// State kept per followed Twitch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingChannelInfo {
    pub display_name: String,
    pub logo_url: String,
    pub stream_title: String,
    pub game_id: String,
    /// Helix thumbnail template (`{width}` / `{height}` placeholders).
    pub thumbnail_url: String,
    /// Set while the channel is observed live.
    pub start_time: Option<DateTime<Utc>>,
    /// Set on the first offline observation, cleared when live again.
    pub end_time: Option<DateTime<Utc>>,
    /// Discord guild id -> subscribed channels in that guild.
    pub discord_channels: BTreeMap<String, Vec<ChannelSubscription>>,
}

impl StreamingChannelInfo {
    pub fn new(display_name: impl Into<String>, logo_url: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            logo_url: logo_url.into(),
            ..Default::default()
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.discord_channels.values().map(Vec::len).sum()
    }

    fn has_subscriptions(&self) -> bool {
        self.discord_channels.values().any(|subs| !subs.is_empty())
    }
}

/// Result of adding a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    AlreadyRegistered,
}

/// Twitch login -> channel state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelRegistry {
    channels: BTreeMap<String, StreamingChannelInfo>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains(&self, twitch_channel: &str) -> bool {
        self.channels.contains_key(twitch_channel)
    }

    pub fn get(&self, twitch_channel: &str) -> Option<&StreamingChannelInfo> {
        self.channels.get(twitch_channel)
    }

    pub fn get_mut(&mut self, twitch_channel: &str) -> Option<&mut StreamingChannelInfo> {
        self.channels.get_mut(twitch_channel)
    }

    /// Logins of every followed channel.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StreamingChannelInfo)> {
        self.channels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut StreamingChannelInfo)> {
        self.channels.iter_mut()
    }

    pub fn total_subscriptions(&self) -> usize {
        self.channels
            .values()
            .map(StreamingChannelInfo::subscription_count)
            .sum()
    }

    /// Insert state for a channel that is not followed yet. Existing state wins.
    pub fn insert_channel(&mut self, twitch_channel: impl Into<String>, info: StreamingChannelInfo) {
        self.channels.entry(twitch_channel.into()).or_insert(info);
    }

    /// Index of `channel_id` within the guild's subscription list.
    pub fn subscription_index(
        &self,
        twitch_channel: &str,
        guild_id: &str,
        channel_id: &str,
    ) -> Option<usize> {
        self.channels
            .get(twitch_channel)?
            .discord_channels
            .get(guild_id)?
            .iter()
            .position(|sub| sub.channel_id == channel_id)
    }

    /// Add a subscription. The channel must have been inserted first; the
    /// caller is responsible for fetching its profile.
    pub fn subscribe(
        &mut self,
        twitch_channel: &str,
        guild_id: &str,
        channel_id: &str,
    ) -> RegisterOutcome {
        if self
            .subscription_index(twitch_channel, guild_id, channel_id)
            .is_some()
        {
            return RegisterOutcome::AlreadyRegistered;
        }

        self.channels
            .entry(twitch_channel.to_string())
            .or_default()
            .discord_channels
            .entry(guild_id.to_string())
            .or_default()
            .push(ChannelSubscription::new(channel_id));

        RegisterOutcome::Registered
    }

    /// Remove a subscription, dropping the guild and channel entries once
    /// they are empty. Returns false when nothing matched.
    pub fn unsubscribe(&mut self, twitch_channel: &str, guild_id: &str, channel_id: &str) -> bool {
        let Some(idx) = self.subscription_index(twitch_channel, guild_id, channel_id) else {
            return false;
        };

        let Some(info) = self.channels.get_mut(twitch_channel) else {
            return false;
        };

        if let Some(subs) = info.discord_channels.get_mut(guild_id) {
            // Order is irrelevant.
            subs.swap_remove(idx);
            if subs.is_empty() {
                info.discord_channels.remove(guild_id);
            }
        }

        if info.discord_channels.is_empty() {
            self.channels.remove(twitch_channel);
        }

        true
    }

    /// Drop every guild for which `keep` returns false, then every channel
    /// left without subscribers. Returns the number of subscriptions removed.
    pub fn retain_guilds(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let mut removed = 0;

        for info in self.channels.values_mut() {
            info.discord_channels.retain(|guild_id, subs| {
                let kept = keep(guild_id.as_str());
                if !kept {
                    removed += subs.len();
                }
                kept
            });
        }
        self.drop_empty();

        removed
    }

    /// Remove channels that have no subscriptions left (empty guild lists
    /// included).
    pub fn drop_empty(&mut self) -> usize {
        let before = self.channels.len();
        for info in self.channels.values_mut() {
            info.discord_channels.retain(|_, subs| !subs.is_empty());
        }
        self.channels.retain(|_, info| info.has_subscriptions());
        before - self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(twitch: &str, guild: &str, channels: &[&str]) -> ChannelRegistry {
        let mut registry = ChannelRegistry::new();
        registry.insert_channel(twitch, StreamingChannelInfo::new("Alice", "http://a"));
        for channel in channels {
            registry.subscribe(twitch, guild, channel);
        }
        registry
    }

    #[test]
    fn test_subscribe_twice_is_already_registered() {
        let mut registry = registry_with("alice", "g1", &["c1"]);

        assert_eq!(
            registry.subscribe("alice", "g1", "c1"),
            RegisterOutcome::AlreadyRegistered
        );
        assert_eq!(registry.total_subscriptions(), 1);
    }

    #[test]
    fn test_same_channel_in_other_guild_is_distinct() {
        let mut registry = registry_with("alice", "g1", &["c1"]);

        assert_eq!(registry.subscribe("alice", "g2", "c1"), RegisterOutcome::Registered);
        assert_eq!(registry.total_subscriptions(), 2);
    }

    #[test]
    fn test_new_subscription_starts_unnotified() {
        let registry = registry_with("alice", "g1", &["c1"]);
        let info = registry.get("alice").unwrap();

        assert_eq!(info.display_name, "Alice");
        assert_eq!(info.logo_url, "http://a");
        assert_eq!(
            info.discord_channels["g1"],
            vec![ChannelSubscription {
                channel_id: "c1".to_string(),
                notification_sent: false,
            }]
        );
    }

    #[test]
    fn test_subscription_index() {
        let registry = registry_with("alice", "g1", &["c1", "c2", "c3"]);

        assert_eq!(registry.subscription_index("alice", "g1", "c2"), Some(1));
        assert_eq!(registry.subscription_index("alice", "g1", "c9"), None);
        assert_eq!(registry.subscription_index("alice", "g9", "c1"), None);
        assert_eq!(registry.subscription_index("bob", "g1", "c1"), None);
    }

    #[test]
    fn test_unsubscribe_missing_leaves_registry_unchanged() {
        let mut registry = registry_with("alice", "g1", &["c1"]);
        let before = registry.clone();

        assert!(!registry.unsubscribe("alice", "g1", "c2"));
        assert!(!registry.unsubscribe("bob", "g1", "c1"));
        assert_eq!(registry, before);
    }

    #[test]
    fn test_unsubscribe_swaps_with_last() {
        let mut registry = registry_with("alice", "g1", &["c1", "c2", "c3"]);

        assert!(registry.unsubscribe("alice", "g1", "c1"));

        let ids: Vec<&str> = registry.get("alice").unwrap().discord_channels["g1"]
            .iter()
            .map(|s| s.channel_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c3", "c2"]);
    }

    #[test]
    fn test_unsubscribe_cascades() {
        let mut registry = registry_with("alice", "g1", &["c1"]);
        registry.subscribe("alice", "g2", "c5");

        assert!(registry.unsubscribe("alice", "g1", "c1"));
        let info = registry.get("alice").unwrap();
        assert!(!info.discord_channels.contains_key("g1"));

        assert!(registry.unsubscribe("alice", "g2", "c5"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_retain_guilds() {
        let mut registry = registry_with("alice", "g1", &["c1", "c2"]);
        registry.insert_channel("bob", StreamingChannelInfo::new("Bob", ""));
        registry.subscribe("bob", "g2", "c3");
        registry.subscribe("alice", "g2", "c4");

        let removed = registry.retain_guilds(|guild| guild == "g1");

        assert_eq!(removed, 2);
        assert!(!registry.contains("bob"));
        assert_eq!(registry.get("alice").unwrap().subscription_count(), 2);
    }

    #[test]
    fn test_drop_empty() {
        let mut registry = ChannelRegistry::new();
        let mut info = StreamingChannelInfo::new("Ghost", "");
        info.discord_channels.insert("g1".to_string(), Vec::new());
        registry.insert_channel("ghost", info);
        registry.insert_channel("alice", StreamingChannelInfo::new("Alice", ""));
        registry.subscribe("alice", "g1", "c1");

        assert_eq!(registry.drop_empty(), 1);
        assert_eq!(registry.channel_names(), vec!["alice".to_string()]);
    }
}
