//! Domain types for Twitch channel subscriptions.

mod registry;

pub use registry::{ChannelRegistry, ChannelSubscription, RegisterOutcome, StreamingChannelInfo};
