//! In-process fakes for the streaming platform and the chat sink.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use helix_api::{HelixError, Stream, TokenValidation, User};
use parking_lot::Mutex;

use housebot::discord::{ChatSink, Embed};
use housebot::guild::GuildTracker;
use housebot::monitor::MonitorConfig;
use housebot::platform::StreamPlatform;
use housebot::session::TwitchSession;
use housebot::snapshot::SnapshotStore;
use housebot::{Error, Result};

#[derive(Default)]
pub struct FakePlatform {
    users: Mutex<HashMap<String, User>>,
    streams: Mutex<Vec<Stream>>,
    token_valid: AtomicBool,
    pub exchange_fails: AtomicBool,
    pub streams_fail: AtomicBool,
    /// Stream queries never answer.
    pub streams_hang: AtomicBool,
    pub exchanges: AtomicUsize,
    pub user_lookups: AtomicUsize,
    pub stream_lookups: AtomicUsize,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, login: &str, display_name: &str, avatar: &str) {
        self.users.lock().insert(
            login.to_string(),
            User {
                id: format!("id-{login}"),
                login: login.to_string(),
                display_name: display_name.to_string(),
                profile_image_url: avatar.to_string(),
            },
        );
    }

    pub fn set_live(&self, login: &str, title: &str, game_id: &str, started_at: DateTime<Utc>) {
        let mut streams = self.streams.lock();
        streams.retain(|s| s.user_login != login);
        streams.push(Stream {
            id: format!("stream-{login}"),
            user_id: format!("id-{login}"),
            user_login: login.to_string(),
            user_name: login.to_string(),
            game_id: game_id.to_string(),
            game_name: String::new(),
            stream_type: "live".to_string(),
            title: title.to_string(),
            viewer_count: 1,
            started_at,
            thumbnail_url: format!("https://thumbs/{login}-{{width}}x{{height}}.jpg"),
        });
    }

    pub fn set_offline(&self, login: &str) {
        self.streams.lock().retain(|s| s.user_login != login);
    }

    pub fn invalidate_token(&self) {
        self.token_valid.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamPlatform for FakePlatform {
    async fn exchange_credential(&self) -> Result<String> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.exchange_fails.load(Ordering::SeqCst) {
            return Err(Error::UpstreamQueryFailed(HelixError::EmptyAccessToken));
        }
        self.token_valid.store(true, Ordering::SeqCst);
        Ok("token".to_string())
    }

    async fn validate_token(&self) -> Result<TokenValidation> {
        let is_valid = self.token_valid.load(Ordering::SeqCst);
        Ok(TokenValidation {
            is_valid,
            status: if is_valid { 200 } else { 401 },
        })
    }

    async fn lookup_users(&self, logins: &[String]) -> Result<Vec<User>> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let users = self.users.lock();
        Ok(logins.iter().filter_map(|l| users.get(l).cloned()).collect())
    }

    async fn lookup_streams(&self, logins: &[String]) -> Result<Vec<Stream>> {
        self.stream_lookups.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.streams_hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.streams_fail.load(Ordering::SeqCst) {
            return Err(Error::UpstreamQueryFailed(HelixError::UnexpectedStatus {
                status: 503,
                body: "unavailable".to_string(),
            }));
        }
        Ok(self
            .streams
            .lock()
            .iter()
            .filter(|s| logins.contains(&s.user_login))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { channel_id: String, text: String },
    Embed { channel_id: String, embed: Embed },
}

#[derive(Default)]
pub struct FakeChat {
    sent: Mutex<Vec<Sent>>,
}

impl FakeChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChatSink for FakeChat {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<()> {
        self.sent.lock().push(Sent::Text {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()> {
        self.sent.lock().push(Sent::Embed {
            channel_id: channel_id.to_string(),
            embed: embed.clone(),
        });
        Ok(())
    }
}

pub fn test_config() -> MonitorConfig {
    MonitorConfig::default()
        .with_poll_interval(Duration::from_secs(3600))
        .with_debounce(Duration::from_secs(300))
        .with_auth_retry(2, Duration::ZERO)
        .with_shutdown_timeout(Duration::from_secs(5))
}

pub async fn open_session(
    platform: &Arc<FakePlatform>,
    store: &SnapshotStore,
    guilds: &Arc<GuildTracker>,
) -> TwitchSession {
    TwitchSession::open(
        "session1",
        platform.clone(),
        store.clone(),
        guilds.clone(),
        test_config(),
    )
    .await
    .expect("open session")
}
