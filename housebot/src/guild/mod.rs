//! Discord guild availability.
//!
//! Absent: never seen or permanently gone. `true`: connected.
//! `false`: temporarily unavailable, a reconnect is expected.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::discord::GatewayEvent;

/// Tracks which guilds the bot can currently deliver to.
#[derive(Debug, Default)]
pub struct GuildTracker {
    status: RwLock<HashMap<String, bool>>,
}

impl GuildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, guild_id: &str) {
        debug!(guild_id, "Guild active");
        self.status.write().insert(guild_id.to_string(), true);
    }

    pub fn set_inactive(&self, guild_id: &str) {
        debug!(guild_id, "Guild inactive");
        self.status.write().insert(guild_id.to_string(), false);
    }

    /// Forget the guild entirely (bot removed, guild deleted).
    pub fn set_unavailable(&self, guild_id: &str) {
        debug!(guild_id, "Guild unavailable");
        self.status.write().remove(guild_id);
    }

    pub fn status(&self, guild_id: &str) -> Option<bool> {
        self.status.read().get(guild_id).copied()
    }

    /// Notifications are only delivered to guilds that are present and connected.
    pub fn is_active(&self, guild_id: &str) -> bool {
        self.status(guild_id).unwrap_or(false)
    }

    /// Update from a gateway event. Returns `false` for events that say
    /// nothing about guild availability.
    pub fn apply_event(&self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::GuildCreate {
                guild_id,
                unavailable: false,
            } => self.set_active(guild_id),
            GatewayEvent::GuildCreate { guild_id, .. }
            | GatewayEvent::GuildDelete {
                guild_id,
                unavailable: Some(true),
            } => self.set_inactive(guild_id),
            GatewayEvent::GuildDelete { guild_id, .. } => self.set_unavailable(guild_id),
            _ => return false,
        }
        true
    }

    /// Point-in-time copy, so callers can evaluate many guilds without
    /// holding the lock.
    pub fn snapshot(&self) -> HashMap<String, bool> {
        self.status.read().clone()
    }
}
