//! Process-wide bot state handed to the command layer and the gateway loop.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::TwitchSession;
use crate::guild::GuildTracker;

/// Active sessions keyed by the bot's Discord identity, plus guild status.
#[derive(Clone, Default)]
pub struct BotContext {
    sessions: Arc<RwLock<HashMap<String, Arc<TwitchSession>>>>,
    guilds: Arc<GuildTracker>,
}

impl BotContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guilds(&self) -> &Arc<GuildTracker> {
        &self.guilds
    }

    pub fn register_session(&self, key: impl Into<String>, session: Arc<TwitchSession>) {
        let key = key.into();
        debug!(key = %key, session = %session.name(), "Session registered");
        self.sessions.write().insert(key, session);
    }

    pub fn remove_session(&self, key: &str) -> Option<Arc<TwitchSession>> {
        let removed = self.sessions.write().remove(key);
        if removed.is_some() {
            debug!(key, "Session removed");
        }
        removed
    }

    pub fn session(&self, key: &str) -> Option<Arc<TwitchSession>> {
        self.sessions.read().get(key).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}
