//! Helix response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope used by every Helix collection endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DataResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// `POST /oauth2/token` response for the client-credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct AppAccessToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
}

/// A Twitch user as returned by `GET /helix/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: String,
}

/// A stream as returned by `GET /helix/streams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    /// `"live"` while broadcasting, empty on errors.
    #[serde(rename = "type", default)]
    pub stream_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    pub started_at: DateTime<Utc>,
    /// Template containing `{width}` and `{height}` placeholders.
    #[serde(default)]
    pub thumbnail_url: String,
}

impl Stream {
    pub fn is_live(&self) -> bool {
        self.stream_type == "live"
    }
}

/// Substitute `{width}` / `{height}` in a Helix thumbnail template.
pub fn fill_thumbnail_template(template: &str, width: u32, height: u32) -> String {
    template
        .replace("{width}", &width.to_string())
        .replace("{height}", &height.to_string())
}
