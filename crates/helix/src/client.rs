use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::HelixError;
use crate::models::{AppAccessToken, DataResponse, Stream, User};

/// Helix accepts at most this many `login` / `user_login` values per request.
pub const MAX_LOGINS_PER_REQUEST: usize = 100;

/// Upper bound on a single Helix or OAuth request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of `GET /oauth2/validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenValidation {
    pub is_valid: bool,
    pub status: u16,
}

/// Client for the Twitch Helix API using an app access token.
pub struct HelixClient {
    client: Client,
    client_id: String,
    client_secret: String,
    auth_base: String,
    api_base: String,
    access_token: RwLock<Option<String>>,
}

impl HelixClient {
    const AUTH_BASE_URL: &str = "https://id.twitch.tv";
    const API_BASE_URL: &str = "https://api.twitch.tv";

    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_timeout(client_id, client_secret, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Like [`new`](Self::new), failing any request that takes longer than `timeout`.
    pub fn with_timeout(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        crate::tls::install_rustls_provider();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self::with_client(client, client_id, client_secret)
    }

    pub fn with_client(
        client: Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_base: Self::AUTH_BASE_URL.to_string(),
            api_base: Self::API_BASE_URL.to_string(),
            access_token: RwLock::new(None),
        }
    }

    /// Point the client at different hosts (local mocks, proxies).
    pub fn with_endpoints(mut self, auth_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.auth_base = auth_base.into().trim_end_matches('/').to_string();
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Currently stored app access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write() = Some(token.into());
    }

    /// Exchange the client id/secret for an app access token and store it.
    pub async fn request_app_access_token(&self) -> Result<String, HelixError> {
        let url = format!("{}/oauth2/token", self.auth_base);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let token: AppAccessToken = Self::parse_json(response).await?;
        if token.access_token.is_empty() {
            return Err(HelixError::EmptyAccessToken);
        }

        debug!(expires_in = token.expires_in, "Obtained app access token");
        self.set_access_token(token.access_token.clone());
        Ok(token.access_token)
    }

    /// Validate a token. Any non-2xx answer (401 in practice) is reported as
    /// `is_valid = false` with its status, not as an error.
    pub async fn validate_token(&self, token: &str) -> Result<TokenValidation, HelixError> {
        if token.is_empty() {
            return Ok(TokenValidation {
                is_valid: false,
                status: StatusCode::UNAUTHORIZED.as_u16(),
            });
        }

        let url = format!("{}/oauth2/validate", self.auth_base);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, format!("OAuth {token}"))
            .send()
            .await?;

        let status = response.status();
        Ok(TokenValidation {
            is_valid: status.is_success(),
            status: status.as_u16(),
        })
    }

    /// Look up users by login name.
    pub async fn get_users(&self, logins: &[String]) -> Result<Vec<User>, HelixError> {
        let mut users = Vec::with_capacity(logins.len());
        for chunk in logins.chunks(MAX_LOGINS_PER_REQUEST) {
            let query: Vec<(&str, &str)> = chunk.iter().map(|l| ("login", l.as_str())).collect();
            let resp: DataResponse<User> = self.get_helix("users", &query).await?;
            users.extend(resp.data);
        }
        Ok(users)
    }

    /// Query the streams currently broadcasting for the given logins.
    ///
    /// Logins that are offline are simply absent from the result.
    pub async fn get_streams(&self, logins: &[String]) -> Result<Vec<Stream>, HelixError> {
        let mut streams = Vec::new();
        let first = MAX_LOGINS_PER_REQUEST.to_string();

        for chunk in logins.chunks(MAX_LOGINS_PER_REQUEST) {
            let mut cursor: Option<String> = None;
            loop {
                let mut query: Vec<(&str, &str)> =
                    chunk.iter().map(|l| ("user_login", l.as_str())).collect();
                query.push(("first", first.as_str()));
                if let Some(after) = cursor.as_deref() {
                    query.push(("after", after));
                }

                let resp: DataResponse<Stream> = self.get_helix("streams", &query).await?;
                let page_len = resp.data.len();
                streams.extend(resp.data);

                cursor = resp
                    .pagination
                    .and_then(|p| p.cursor)
                    .filter(|c| !c.is_empty());
                if cursor.is_none() || page_len == 0 {
                    break;
                }
            }
        }

        Ok(streams)
    }

    async fn get_helix<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, HelixError> {
        let token = self.access_token().ok_or(HelixError::MissingAccessToken)?;
        let mut url = Url::parse(&format!("{}/helix/{}", self.api_base, endpoint))?;
        url.query_pairs_mut().extend_pairs(query);

        let response = self
            .client
            .get(url)
            .header("Client-Id", &self.client_id)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;

        Self::parse_json(response).await
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, HelixError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(HelixError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
