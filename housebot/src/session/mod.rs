//! Twitch session: the registry, its snapshot and the live monitor.
//!
//! [`TwitchSession`] is what the command layer and `main` talk to. The
//! registry sits behind one async mutex, held for the whole of every
//! registry operation including the first-time profile lookup and the
//! snapshot write that follows a mutation.

mod context;

pub use context::BotContext;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discord::ChatSink;
use crate::domain::{ChannelRegistry, RegisterOutcome, StreamingChannelInfo};
use crate::guild::GuildTracker;
use crate::monitor::{LiveMonitor, MonitorConfig, Notification, NotificationDispatcher};
use crate::platform::StreamPlatform;
use crate::snapshot::SnapshotStore;
use crate::{Error, Result};

/// State shared between the facade and its monitor task.
pub(crate) struct SessionCore {
    name: String,
    platform: Arc<dyn StreamPlatform>,
    store: SnapshotStore,
    registry: Mutex<ChannelRegistry>,
    connected: AtomicBool,
    guilds: Arc<GuildTracker>,
}

impl SessionCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn platform(&self) -> &dyn StreamPlatform {
        self.platform.as_ref()
    }

    pub(crate) fn registry(&self) -> &Mutex<ChannelRegistry> {
        &self.registry
    }

    pub(crate) fn guilds(&self) -> &GuildTracker {
        &self.guilds
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make sure the access token is usable, refreshing it when Twitch
    /// rejects it.
    ///
    /// A rejected token marks the session disconnected until a refresh
    /// succeeds. A failed validation request is returned as is and does
    /// not touch the connectivity flag.
    pub(crate) async fn ensure_credential(&self, attempts: u32, delay: Duration) -> Result<()> {
        let validation = self.platform.validate_token().await?;
        if validation.is_valid {
            return Ok(());
        }

        debug!(status = validation.status, "Twitch access token rejected, refreshing");
        self.set_connected(false);

        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match self.platform.exchange_credential().await {
                Ok(_) => {
                    self.set_connected(true);
                    info!(attempt, "Refreshed Twitch access token");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Failed to refresh Twitch access token");
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(Error::InvalidCredential(format!(
            "token refresh failed after {attempts} attempts"
        )))
    }

    /// Write the snapshot. Failures are logged, never returned.
    pub(crate) async fn persist(&self, registry: &ChannelRegistry) {
        if let Err(e) = self.store.save(&self.name, registry).await {
            error!(session = %self.name, error = %e, "Error writing snapshot to disk");
        }
    }
}

struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    dispatcher: NotificationDispatcher,
    ctx: BotContext,
    key: String,
}

impl MonitorHandle {
    /// Cancel the monitor, wait up to `timeout` for it, then drain the
    /// notification queue for at most another `timeout`.
    async fn stop(self, timeout: Duration) {
        let Self {
            cancel,
            mut task,
            dispatcher,
            ctx,
            key,
        } = self;

        cancel.cancel();
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Live monitor task failed"),
            Err(_) => {
                warn!(?timeout, "Live monitor did not stop in time, aborting it");
                task.abort();
                ctx.remove_session(&key);
            }
        }

        dispatcher.shutdown(timeout).await;
    }
}

/// Facade over one Twitch session.
pub struct TwitchSession {
    core: Arc<SessionCore>,
    config: MonitorConfig,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl TwitchSession {
    /// Empty, disconnected session.
    pub fn new(
        name: impl Into<String>,
        platform: Arc<dyn StreamPlatform>,
        store: SnapshotStore,
        guilds: Arc<GuildTracker>,
        config: MonitorConfig,
    ) -> Self {
        Self::with_registry(name.into(), platform, store, guilds, config, ChannelRegistry::new())
    }

    /// Session loaded from the snapshot named `name`.
    ///
    /// A missing snapshot is a first run and yields an empty registry; any
    /// other read failure is returned. The session starts disconnected.
    pub async fn open(
        name: impl Into<String>,
        platform: Arc<dyn StreamPlatform>,
        store: SnapshotStore,
        guilds: Arc<GuildTracker>,
        config: MonitorConfig,
    ) -> Result<Self> {
        let name = name.into();
        let registry = match store.load(&name).await {
            Ok(registry) => {
                info!(
                    session = %name,
                    channels = registry.len(),
                    subscriptions = registry.total_subscriptions(),
                    "Loaded snapshot"
                );
                registry
            }
            Err(e) if e.is_not_found() => {
                warn!(session = %name, "No snapshot on disk yet, it will be created on first save");
                ChannelRegistry::new()
            }
            Err(e) => return Err(e),
        };

        Ok(Self::with_registry(name, platform, store, guilds, config, registry))
    }

    fn with_registry(
        name: String,
        platform: Arc<dyn StreamPlatform>,
        store: SnapshotStore,
        guilds: Arc<GuildTracker>,
        config: MonitorConfig,
        registry: ChannelRegistry,
    ) -> Self {
        Self {
            core: Arc::new(SessionCore {
                name,
                platform,
                store,
                registry: Mutex::new(registry),
                connected: AtomicBool::new(false),
                guilds,
            }),
            config,
            monitor: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Exchange the app credentials for an access token and mark the
    /// session connected.
    pub async fn authenticate(&self) -> Result<()> {
        match self.core.platform.exchange_credential().await {
            Ok(_) => {
                self.core.set_connected(true);
                info!(session = %self.name(), "Authenticated with Twitch");
                Ok(())
            }
            Err(e) => Err(Error::InvalidCredential(e.to_string())),
        }
    }

    /// Subscribe a Discord channel to a Twitch channel.
    ///
    /// Channels followed for the first time are looked up on Twitch, which
    /// needs a valid credential. Nothing is created when the lookup fails.
    pub async fn register_channel(
        &self,
        twitch_channel: &str,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<RegisterOutcome> {
        let mut registry = self.core.registry.lock().await;

        if !registry.contains(twitch_channel) {
            self.core
                .ensure_credential(1, Duration::ZERO)
                .await
                .map_err(|e| match e {
                    Error::UpstreamQueryFailed(_) => Error::InvalidCredential(e.to_string()),
                    other => other,
                })?;

            let users = self
                .core
                .platform
                .lookup_users(&[twitch_channel.to_string()])
                .await?;
            let Some(user) = users.into_iter().next() else {
                return Err(Error::ChannelNotFound(twitch_channel.to_string()));
            };

            debug!(
                twitch_channel,
                display_name = %user.display_name,
                "Following new Twitch channel"
            );
            registry.insert_channel(
                twitch_channel,
                StreamingChannelInfo::new(user.display_name, user.profile_image_url),
            );
        }

        let outcome = registry.subscribe(twitch_channel, guild_id, channel_id);
        if outcome == RegisterOutcome::Registered {
            info!(twitch_channel, guild_id, channel_id, "Registered channel");
            self.core.persist(&registry).await;
        }

        Ok(outcome)
    }

    /// Remove a subscription. Returns `false` when there was none.
    pub async fn unregister_channel(&self, twitch_channel: &str, guild_id: &str, channel_id: &str) -> bool {
        let mut registry = self.core.registry.lock().await;

        if !registry.unsubscribe(twitch_channel, guild_id, channel_id) {
            return false;
        }
        if !registry.contains(twitch_channel) {
            debug!(twitch_channel, "No more subscribers, forgetting Twitch channel");
        }
        info!(twitch_channel, guild_id, channel_id, "Unregistered channel");
        self.core.persist(&registry).await;

        true
    }

    /// Copy of the current registry.
    pub async fn registry_snapshot(&self) -> ChannelRegistry {
        self.core.registry.lock().await.clone()
    }

    /// A monitor bound to this session that queues onto `notifications`.
    ///
    /// [`start_monitoring`](Self::start_monitoring) runs one of these in the
    /// background; driving it by hand with
    /// [`LiveMonitor::poll_once_at`] gives full control over time.
    pub fn monitor(&self, notifications: tokio::sync::mpsc::Sender<Notification>) -> LiveMonitor {
        LiveMonitor::new(self.core.clone(), notifications, self.config.clone())
    }

    /// Register the session under `key` in `ctx` and start the live
    /// monitor. Does nothing unless the session is connected or when a
    /// monitor is already running. A monitor that stopped on its own (lost
    /// credentials) is replaced.
    ///
    /// The monitor removes the session from `ctx` when it stops.
    pub async fn start_monitoring(
        self: &Arc<Self>,
        ctx: &BotContext,
        key: impl Into<String>,
        chat: Arc<dyn ChatSink>,
    ) -> bool {
        if !self.is_connected() {
            warn!(session = %self.name(), "Not connected to Twitch, live monitoring disabled");
            return false;
        }

        let mut slot = self.monitor.lock().await;
        if slot.as_ref().is_some_and(|handle| !handle.task.is_finished()) {
            return false;
        }
        if let Some(finished) = slot.take() {
            debug!(session = %self.name(), "Restarting live monitor");
            finished.stop(self.config.shutdown_timeout).await;
        }

        let key = key.into();
        ctx.register_session(key.clone(), self.clone());

        let dispatcher = NotificationDispatcher::spawn(
            chat,
            self.config.dispatch_capacity,
            self.config.dispatch_concurrency,
        );
        let monitor = self.monitor(dispatcher.sender());
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            let ctx = ctx.clone();
            let key = key.clone();
            async move {
                monitor.run(cancel).await;
                ctx.remove_session(&key);
            }
        });

        *slot = Some(MonitorHandle {
            cancel,
            task,
            dispatcher,
            ctx: ctx.clone(),
            key,
        });
        true
    }

    /// Stop monitoring, prune subscriptions in guilds that are not active
    /// and write the snapshot.
    pub async fn close(&self) -> Result<()> {
        self.core.set_connected(false);

        if let Some(handle) = self.monitor.lock().await.take() {
            handle.stop(self.config.shutdown_timeout).await;
        }

        let mut registry = self.core.registry.lock().await;
        let guilds = self.core.guilds.snapshot();
        let pruned = registry.retain_guilds(|guild_id| guilds.get(guild_id).copied().unwrap_or(false));
        if pruned > 0 {
            info!(pruned, "Pruned subscriptions of inactive guilds");
        }

        self.core.store.save(&self.core.name, &registry).await?;
        info!(session = %self.name(), channels = registry.len(), "Session closed");
        Ok(())
    }
}
