//! Command line and environment configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::warn;

use crate::commands::DEFAULT_PREFIX;
use crate::monitor::MonitorConfig;
use crate::{Error, Result};

pub const BOT_TOKEN_ENV: &str = "BOT_TOKEN";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Discord bot token
    #[arg(short = 't', long = "token")]
    pub token: Option<String>,

    /// Path to a file holding the Discord bot token
    #[arg(short = 'p', long = "token-path")]
    pub token_path: Option<PathBuf>,

    /// Twitch application client id
    #[arg(long, env = "TWITCH_CLIENT_ID", hide_env_values = true, default_value = "")]
    pub twitch_client_id: String,

    /// Twitch application client secret
    #[arg(long, env = "TWITCH_CLIENT_SECRET", hide_env_values = true, default_value = "")]
    pub twitch_client_secret: String,

    /// Directory holding session snapshots
    #[arg(long, env = "HOUSEBOT_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Snapshot name of the Twitch session
    #[arg(long, default_value = "session1")]
    pub session_name: String,

    /// Directory for log files
    #[arg(long, env = "HOUSEBOT_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Prefix that addresses the bot in chat
    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub command_prefix: String,

    /// Seconds between Twitch polls
    #[arg(long, default_value_t = 30)]
    pub poll_interval_secs: u64,

    /// Seconds a live or offline state must hold before notifying
    #[arg(long, default_value_t = 300)]
    pub debounce_secs: u64,

    /// Log raw Twitch stream responses at debug level
    #[arg(long)]
    pub debug_upstream: bool,
}

impl AppConfig {
    /// Resolve the bot token: flag, then token file, then `BOT_TOKEN`.
    pub fn resolve_token(&self) -> Result<String> {
        resolve_token(
            self.token.as_deref(),
            self.token_path.as_deref(),
            std::env::var(BOT_TOKEN_ENV).ok(),
        )
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::default()
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs.max(1)))
            .with_debounce(Duration::from_secs(self.debounce_secs))
            .with_debug_upstream(self.debug_upstream)
    }
}

fn resolve_token(flag: Option<&str>, path: Option<&Path>, env: Option<String>) -> Result<String> {
    if let Some(token) = flag.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    if let Some(path) = path {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io_path("reading token file", path, e))?;
        return non_empty(raw.trim().to_string());
    }

    warn!("No token flags specified, loading bot token from the {BOT_TOKEN_ENV} environment variable");
    non_empty(env.unwrap_or_default().trim().to_string())
}

fn non_empty(token: String) -> Result<String> {
    if token.is_empty() {
        return Err(Error::config("Discord bot token is empty"));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::parse_from(["housebot", "-t", "abc"]);
        assert_eq!(config.session_name, "session1");
        assert_eq!(config.command_prefix, "housebot");
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.debounce_secs, 300);
        assert!(!config.debug_upstream);

        let monitor = config.monitor_config();
        assert_eq!(monitor.poll_interval, Duration::from_secs(30));
        assert_eq!(monitor.debounce, Duration::from_secs(300));
    }

    #[test]
    fn test_flag_wins() {
        let token = resolve_token(Some("flag"), Some(Path::new("/nope")), Some("env".to_string()));
        assert_eq!(token.unwrap(), "flag");
    }

    #[test]
    fn test_file_is_trimmed_and_beats_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "from-file\n").unwrap();

        let token = resolve_token(None, Some(&path), Some("env".to_string())).unwrap();
        assert_eq!(token, "from-file");
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve_token(None, Some(&dir.path().join("missing")), None).unwrap_err();
        assert!(matches!(err, Error::IoPath { .. }));
    }

    #[test]
    fn test_env_fallback() {
        assert_eq!(resolve_token(None, None, Some("env".to_string())).unwrap(), "env");
        assert!(resolve_token(None, None, None).is_err());
    }
}
