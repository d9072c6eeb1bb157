//! Live-state monitoring.
//!
//! Each poll cycle:
//! 1. makes sure the Twitch credential is valid (refreshing it if needed)
//! 2. queries every followed channel in one batched request
//! 3. folds the result into the registry and runs the debounce
//! 4. queues the due notifications on the [`NotificationDispatcher`]

mod dispatcher;
mod reconcile;
mod service;

pub use dispatcher::NotificationDispatcher;
pub use reconcile::{
    Notification, NotificationKind, apply_streams, evaluate, live_embed, offline_text,
};
pub use service::{LiveMonitor, MonitorConfig};
