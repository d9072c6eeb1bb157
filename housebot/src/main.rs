use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use helix_api::HelixClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use housebot::commands::CommandHandler;
use housebot::config::AppConfig;
use housebot::discord::{ChatSink, DiscordGateway, DiscordRestClient, GatewayConfig, GatewayEvent};
use housebot::logging;
use housebot::platform::StreamPlatform;
use housebot::session::{BotContext, TwitchSession};
use housebot::snapshot::SnapshotStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    helix_api::install_rustls_provider();

    // Load environment variables before clap reads them
    dotenvy::dotenv().ok();
    let config = AppConfig::parse();

    let (logging, _guard) =
        logging::init_logging(&config.log_dir).context("Failed to initialize logging")?;
    let shutdown = CancellationToken::new();
    logging.start_retention_cleanup(shutdown.child_token());
    if config.debug_upstream {
        if let Err(e) = logging.add_directive(logging::UPSTREAM_DEBUG_DIRECTIVE) {
            warn!(error = %e, "Failed to enable upstream debug logging");
        }
    }

    let token = config
        .resolve_token()
        .context("Discord bot token could not be loaded")?;

    let ctx = BotContext::new();
    let platform: Arc<dyn StreamPlatform> = Arc::new(HelixClient::new(
        &config.twitch_client_id,
        &config.twitch_client_secret,
    ));
    let store = SnapshotStore::new(&config.data_dir);
    let monitor_config = config.monitor_config();

    let session = match TwitchSession::open(
        &config.session_name,
        platform.clone(),
        store.clone(),
        ctx.guilds().clone(),
        monitor_config.clone(),
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Twitch session could not be loaded, starting with no channels");
            TwitchSession::new(
                &config.session_name,
                platform,
                store,
                ctx.guilds().clone(),
                monitor_config,
            )
        }
    };
    let session = Arc::new(session);

    info!("Bot is starting up");

    let chat: Arc<dyn ChatSink> = Arc::new(DiscordRestClient::new(token.clone()));
    let (mut events, gateway_task) =
        DiscordGateway::new(token, GatewayConfig::default()).spawn(shutdown.child_token());

    let signal = shutdown_signal();
    tokio::pin!(signal);

    let ready: anyhow::Result<Option<String>> = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(GatewayEvent::Ready { session_id, user_id }) => {
                    info!(%session_id, %user_id, "Connected to Discord");
                    break Ok(Some(user_id));
                }
                Some(event) => {
                    ctx.guilds().apply_event(&event);
                }
                None => break Err(anyhow::anyhow!("Could not establish connection to Discord")),
            },
            _ = &mut signal => {
                info!("Shutdown requested before Discord was ready");
                break Ok(None);
            }
        }
    };

    if let Ok(Some(bot_user_id)) = &ready {
        info!("Establishing connection to Twitch");
        if let Err(e) = session.authenticate().await {
            error!(error = %e, "Could not establish connection to Twitch");
        }
        session
            .start_monitoring(&ctx, bot_user_id, chat.clone())
            .await;

        let commands = Arc::new(CommandHandler::new(
            ctx.clone(),
            chat,
            config.command_prefix.clone(),
            bot_user_id,
        ));

        info!("Bot is now running");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(GatewayEvent::MessageCreate(msg)) => {
                        let commands = commands.clone();
                        tokio::spawn(async move {
                            commands.handle(&msg).await;
                        });
                    }
                    Some(GatewayEvent::Ready { session_id, .. }) => {
                        debug!(%session_id, "Discord session re-established");
                    }
                    Some(event) => {
                        ctx.guilds().apply_event(&event);
                    }
                    None => {
                        warn!("Discord gateway stopped");
                        break;
                    }
                },
                _ = &mut signal => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }

    info!("Twitch session is shutting down");
    if let Err(e) = session.close().await {
        error!(error = %e, "Failed to close Twitch session cleanly");
    }

    info!("Bot is shutting down");
    shutdown.cancel();
    if let Err(e) = gateway_task.await {
        warn!(error = %e, "Discord gateway task failed");
    }

    info!("Bot has shutdown");
    ready.map(|_| ())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }
}
