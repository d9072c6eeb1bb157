//! The polling loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher;
use super::reconcile::{self, Notification};
use crate::session::SessionCore;
use crate::{Error, Result};

/// Configuration for the live monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between poll cycles.
    pub poll_interval: Duration,
    /// How long a live or offline observation must hold before notifying.
    pub debounce: Duration,
    /// Notification queue capacity.
    pub dispatch_capacity: usize,
    /// Maximum concurrent deliveries.
    pub dispatch_concurrency: usize,
    /// Token refresh attempts before the monitor gives up.
    pub auth_retry_attempts: u32,
    pub auth_retry_delay: Duration,
    /// How long `close` waits for pending notifications.
    pub shutdown_timeout: Duration,
    /// Log every stream query response at debug level.
    pub debug_upstream: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            debounce: Duration::from_secs(300),
            dispatch_capacity: 256,
            dispatch_concurrency: 8,
            auth_retry_attempts: 3,
            auth_retry_delay: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(10),
            debug_upstream: false,
        }
    }
}

impl MonitorConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_dispatch(mut self, capacity: usize, concurrency: usize) -> Self {
        self.dispatch_capacity = capacity;
        self.dispatch_concurrency = concurrency;
        self
    }

    pub fn with_auth_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.auth_retry_attempts = attempts;
        self.auth_retry_delay = delay;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_debug_upstream(mut self, enabled: bool) -> Self {
        self.debug_upstream = enabled;
        self
    }

    fn debounce_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.debounce).unwrap_or(TimeDelta::MAX)
    }
}

/// Polls Twitch for one session and queues notifications.
pub struct LiveMonitor {
    core: Arc<SessionCore>,
    notifications: mpsc::Sender<Notification>,
    config: MonitorConfig,
}

impl LiveMonitor {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        notifications: mpsc::Sender<Notification>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            core,
            notifications,
            config,
        }
    }

    /// Poll until the session disconnects or `cancel` fires. Cancelling
    /// abandons a cycle that is still waiting on Twitch.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            session = %self.core.name(),
            interval = ?self.config.poll_interval,
            debounce = ?self.config.debounce,
            "Live monitor started"
        );

        while self.core.is_connected() && !cancel.is_cancelled() {
            let result = tokio::select! {
                result = self.poll_once_at(Utc::now()) => result,
                _ = cancel.cancelled() => {
                    debug!("Poll cycle interrupted by shutdown");
                    break;
                }
            };

            match result {
                Ok(queued) if queued > 0 => debug!(queued, "Poll cycle queued notifications"),
                Ok(_) => {}
                Err(Error::InvalidCredential(reason)) => {
                    error!(%reason, "Lost Twitch credentials, stopping live monitor");
                    break;
                }
                Err(e) => warn!(error = %e, "Poll cycle skipped"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        info!(session = %self.core.name(), "Live monitor stopped");
    }

    /// Run one poll cycle as if the current time were `now`.
    ///
    /// Returns the number of notifications queued. A failed stream query
    /// leaves the registry untouched.
    pub async fn poll_once_at(&self, now: DateTime<Utc>) -> Result<usize> {
        self.core
            .ensure_credential(self.config.auth_retry_attempts, self.config.auth_retry_delay)
            .await?;

        let names = self.core.registry().lock().await.channel_names();
        if names.is_empty() {
            return Ok(0);
        }

        let streams = self.core.platform().lookup_streams(&names).await?;
        if self.config.debug_upstream {
            match serde_json::to_string_pretty(&streams) {
                Ok(dump) => debug!(response = %dump, "Twitch stream query response"),
                Err(e) => debug!(error = %e, "Failed to dump stream query response"),
            }
        }

        let guilds = self.core.guilds().snapshot();
        let notifications = {
            let mut registry = self.core.registry().lock().await;
            reconcile::apply_streams(&mut registry, &streams, now);
            let due = reconcile::evaluate(&mut registry, &guilds, now, self.config.debounce_delta());
            if !due.is_empty() {
                self.core.persist(&registry).await;
            }
            due
        };

        let queued = notifications.len();
        for notification in notifications {
            debug!(
                twitch_channel = %notification.twitch_channel,
                guild_id = %notification.guild_id,
                channel_id = %notification.channel_id,
                live = notification.is_live(),
                "Queueing notification"
            );
            dispatcher::enqueue(&self.notifications, notification).await;
        }

        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.debounce, Duration::from_secs(300));
        assert_eq!(config.dispatch_capacity, 256);
        assert_eq!(config.dispatch_concurrency, 8);
        assert!(!config.debug_upstream);
    }

    #[test]
    fn test_config_builders() {
        let config = MonitorConfig::default()
            .with_poll_interval(Duration::from_secs(5))
            .with_debounce(Duration::from_secs(60))
            .with_dispatch(16, 2)
            .with_auth_retry(1, Duration::ZERO)
            .with_debug_upstream(true);

        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.debounce_delta(), TimeDelta::seconds(60));
        assert_eq!((config.dispatch_capacity, config.dispatch_concurrency), (16, 2));
        assert_eq!(config.auth_retry_attempts, 1);
        assert!(config.debug_upstream);
    }
}
