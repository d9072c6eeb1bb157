//! Discord gateway client.
//!
//! Keeps one websocket session alive, re-identifying after drops with an
//! exponential backoff, and forwards the dispatch events the bot cares about.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::GatewayEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Gateway intents bit flags.
pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_MESSAGES: u64 = 1 << 9;
    pub const MESSAGE_CONTENT: u64 = 1 << 15;

    /// What the bot needs to see guild lifecycle and read commands.
    pub const DEFAULT: u64 = GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT;
}

mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub intents: u64,
    pub max_reconnect_attempts: u32,
    pub base_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    /// Capacity of the event channel handed to the caller.
    pub event_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            intents: intents::DEFAULT,
            max_reconnect_attempts: 10,
            base_reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 60000,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Why a websocket session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Reconnect,
    Fatal,
    Shutdown,
}

/// Websocket client for the Discord gateway.
pub struct DiscordGateway {
    token: String,
    config: GatewayConfig,
}

impl DiscordGateway {
    pub fn new(token: impl Into<String>, config: GatewayConfig) -> Self {
        Self {
            token: token.into(),
            config,
        }
    }

    /// Start the connection task. Events arrive on the returned receiver,
    /// which closes once the task stops.
    pub fn spawn(self, cancel: CancellationToken) -> (mpsc::Receiver<GatewayEvent>, JoinHandle<()>) {
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer.max(1));

        let handle = tokio::spawn(async move {
            let config = &self.config;
            let mut attempt = 0;
            let mut delay = config.base_reconnect_delay_ms;

            loop {
                if cancel.is_cancelled() {
                    break;
                }

                info!(url = %config.url, "Connecting to Discord gateway");
                let end = match connect_async(config.url.as_str()).await {
                    Ok((mut stream, _)) => {
                        attempt = 0;
                        delay = config.base_reconnect_delay_ms;
                        let end = self.run_session(&mut stream, &event_tx, &cancel).await;
                        let _ = stream.close(None).await;
                        end
                    }
                    Err(e) => {
                        warn!(error = %e, "Gateway connection failed");
                        SessionEnd::Reconnect
                    }
                };

                match end {
                    SessionEnd::Shutdown | SessionEnd::Fatal => break,
                    SessionEnd::Reconnect => {}
                }

                if attempt >= config.max_reconnect_attempts {
                    error!(attempts = attempt, "Max gateway reconnect attempts reached");
                    break;
                }
                attempt += 1;
                debug!(attempt, delay_ms = delay, "Reconnecting to Discord gateway");

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {},
                    _ = cancel.cancelled() => break,
                }

                delay = (delay * 2).min(config.max_reconnect_delay_ms);
            }

            debug!("Discord gateway task stopped");
        });

        (event_rx, handle)
    }

    async fn run_session(
        &self,
        stream: &mut WsStream,
        event_tx: &mpsc::Sender<GatewayEvent>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let heartbeat_interval = tokio::select! {
            hello = wait_for_hello(stream) => match hello {
                Some(interval) => interval,
                None => return SessionEnd::Reconnect,
            },
            _ = cancel.cancelled() => return SessionEnd::Shutdown,
        };

        let identify = identify_payload(&self.token, self.config.intents);
        if let Err(e) = stream.send(Message::text(identify.to_string())).await {
            error!(error = %e, "Failed to send identify");
            return SessionEnd::Reconnect;
        }

        let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut seq: Option<u64> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !acked {
                        warn!("Heartbeat not acknowledged, reconnecting");
                        return SessionEnd::Reconnect;
                    }
                    if let Err(e) = stream.send(Message::text(heartbeat_payload(seq).to_string())).await {
                        error!(error = %e, "Failed to send heartbeat");
                        return SessionEnd::Reconnect;
                    }
                    acked = false;
                    trace!(?seq, "Sent heartbeat");
                }

                msg = stream.next() => {
                    let payload = match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<GatewayPayload>(text.as_str()) {
                                Ok(payload) => payload,
                                Err(e) => {
                                    warn!(error = %e, "Failed to decode gateway payload");
                                    continue;
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.as_ref().map(|f| u16::from(f.code));
                            if code.is_some_and(is_fatal_close) {
                                error!(?code, "Gateway closed the session permanently");
                                return SessionEnd::Fatal;
                            }
                            warn!(?code, "Gateway closed the session");
                            return SessionEnd::Reconnect;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            error!(error = %e, "Gateway websocket error");
                            return SessionEnd::Reconnect;
                        }
                        None => {
                            warn!("Gateway stream closed");
                            return SessionEnd::Reconnect;
                        }
                    };

                    if let Some(s) = payload.s {
                        seq = Some(s);
                    }

                    match payload.op {
                        opcode::DISPATCH => {
                            let Some(event_type) = payload.t.as_deref() else {
                                continue;
                            };
                            if let Some(event) = GatewayEvent::from_dispatch(event_type, payload.d) {
                                if event_tx.send(event).await.is_err() {
                                    // Nobody is listening anymore.
                                    return SessionEnd::Shutdown;
                                }
                            }
                        }
                        opcode::HEARTBEAT => {
                            if let Err(e) = stream.send(Message::text(heartbeat_payload(seq).to_string())).await {
                                error!(error = %e, "Failed to answer heartbeat request");
                                return SessionEnd::Reconnect;
                            }
                        }
                        opcode::HEARTBEAT_ACK => acked = true,
                        opcode::RECONNECT => {
                            info!("Gateway requested a reconnect");
                            return SessionEnd::Reconnect;
                        }
                        opcode::INVALID_SESSION => {
                            warn!("Gateway invalidated the session");
                            return SessionEnd::Reconnect;
                        }
                        other => trace!(op = other, "Ignoring gateway opcode"),
                    }
                }

                _ = cancel.cancelled() => return SessionEnd::Shutdown,
            }
        }
    }
}

/// Read until the Hello payload and return its heartbeat interval.
async fn wait_for_hello(stream: &mut WsStream) -> Option<Duration> {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Some(interval) = parse_hello(text.as_str()) {
                    return Some(interval);
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

fn parse_hello(text: &str) -> Option<Duration> {
    let payload: GatewayPayload = serde_json::from_str(text).ok()?;
    if payload.op != opcode::HELLO {
        return None;
    }
    payload
        .d
        .get("heartbeat_interval")
        .and_then(Value::as_u64)
        .map(Duration::from_millis)
}

fn identify_payload(token: &str, intents: u64) -> Value {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "housebot",
                "device": "housebot",
            },
        },
    })
}

fn heartbeat_payload(seq: Option<u64>) -> Value {
    json!({ "op": opcode::HEARTBEAT, "d": seq })
}

/// Close codes after which reconnecting cannot succeed.
fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010..=4014)
}
