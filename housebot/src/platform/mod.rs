//! Streaming-platform seam.
//!
//! The session and monitor only talk to Twitch through [`StreamPlatform`],
//! so tests can substitute an in-process fake.

use async_trait::async_trait;
use helix_api::{HelixClient, Stream, TokenValidation, User};

use crate::Result;

#[async_trait]
pub trait StreamPlatform: Send + Sync {
    /// Exchange the app credentials for a fresh access token.
    async fn exchange_credential(&self) -> Result<String>;

    /// Validate the access token currently in use.
    async fn validate_token(&self) -> Result<TokenValidation>;

    /// Profiles for the given logins. Unknown logins are absent.
    async fn lookup_users(&self, logins: &[String]) -> Result<Vec<User>>;

    /// Live streams for the given logins. Offline logins are absent.
    async fn lookup_streams(&self, logins: &[String]) -> Result<Vec<Stream>>;
}

#[async_trait]
impl StreamPlatform for HelixClient {
    async fn exchange_credential(&self) -> Result<String> {
        Ok(self.request_app_access_token().await?)
    }

    async fn validate_token(&self) -> Result<TokenValidation> {
        let token = self.access_token().unwrap_or_default();
        Ok(HelixClient::validate_token(self, &token).await?)
    }

    async fn lookup_users(&self, logins: &[String]) -> Result<Vec<User>> {
        Ok(self.get_users(logins).await?)
    }

    async fn lookup_streams(&self, logins: &[String]) -> Result<Vec<Stream>> {
        Ok(self.get_streams(logins).await?)
    }
}
