//! Minimal Twitch Helix client.
//!
//! Covers what a live-notification bot needs from the platform:
//! app-access-token exchange and validation, user lookups and
//! batched live-stream queries.

pub mod client;
pub mod error;
pub mod models;
mod tls;

pub use client::{HelixClient, TokenValidation};
pub use error::HelixError;
pub use models::{Stream, User, fill_thumbnail_template};
pub use tls::install_rustls_provider;
