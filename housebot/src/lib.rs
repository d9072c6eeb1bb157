//! housebot library crate.
//!
//! Announces Twitch streams going live or offline in Discord channels.
//! Everything the binary uses lives here so it can be exercised by the
//! integration tests.

pub mod commands;
pub mod config;
pub mod discord;
pub mod domain;
pub mod error;
pub mod guild;
pub mod logging;
pub mod monitor;
pub mod platform;
pub mod session;
pub mod snapshot;
pub mod utils;

pub use error::{Error, Result};
