use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelixError {
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("empty access token")]
    EmptyAccessToken,
    #[error("no access token, request one first")]
    MissingAccessToken,
}
