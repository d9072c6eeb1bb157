//! Application-wide error types.

use std::path::PathBuf;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// "Already registered" and "not registered" are ordinary outcomes of the
/// registry operations and are reported through their return values instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Twitch channel does not exist: {0}")]
    ChannelNotFound(String),

    #[error("No snapshot at {}", .0.display())]
    SnapshotNotFound(PathBuf),

    #[error("Failed to read snapshot {}: {message}", path.display())]
    PersistenceReadFailed { path: PathBuf, message: String },

    #[error("Failed to write snapshot {}: {message}", path.display())]
    PersistenceWriteFailed { path: PathBuf, message: String },

    #[error("Upstream query failed: {0}")]
    UpstreamQueryFailed(#[from] helix_api::HelixError),

    #[error("Message delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::DeliveryFailed(msg.into())
    }

    pub fn io_path(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.into(),
            source,
        }
    }

    /// True for the "no prior snapshot" condition, which callers treat as a
    /// first run rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SnapshotNotFound(_))
    }

    /// Message suitable for replying to a chat user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredential(_) => {
                "Could not reach Twitch right now, please try again later.".to_string()
            }
            Self::ChannelNotFound(name) => format!("{name} is not a Twitch channel."),
            Self::UpstreamQueryFailed(_) => "Twitch did not answer, please try again later.".to_string(),
            _ => "Something went wrong while handling that command.".to_string(),
        }
    }
}
