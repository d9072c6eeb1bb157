//! Bounded delivery queue for notifications.
//!
//! The monitor enqueues; a single worker fans deliveries out into a
//! `JoinSet` limited by a semaphore. Failed deliveries are logged and
//! dropped, and `notification_sent` is never rolled back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::reconcile::{Notification, NotificationKind};
use crate::discord::ChatSink;

/// Owns the delivery worker. Hand out [`NotificationDispatcher::sender`]
/// clones to producers.
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
    worker: JoinHandle<()>,
}

impl NotificationDispatcher {
    pub fn spawn(chat: Arc<dyn ChatSink>, capacity: usize, concurrency: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let worker = tokio::spawn(run_worker(rx, chat, semaphore));
        Self { tx, worker }
    }

    pub fn sender(&self) -> mpsc::Sender<Notification> {
        self.tx.clone()
    }

    /// Close the queue and wait for queued and in-flight deliveries.
    ///
    /// Producers holding a [`sender`](Self::sender) clone must be gone, or
    /// the wait runs into `timeout`. Anything still pending then is aborted.
    /// Returns `true` when everything was delivered (or failed) in time.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        let Self { tx, mut worker } = self;
        drop(tx);

        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(Ok(())) => {
                debug!("Notification dispatcher drained");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Notification worker failed");
                false
            }
            Err(_) => {
                warn!(?timeout, "Notification dispatch did not drain in time, abandoning pending deliveries");
                worker.abort();
                false
            }
        }
    }
}

/// Enqueue one notification, waiting while the queue is full.
pub async fn enqueue(tx: &mpsc::Sender<Notification>, notification: Notification) {
    let channel_id = notification.channel_id.clone();
    if tx.send(notification).await.is_err() {
        warn!(channel_id = %channel_id, "Notification queue closed, dropping notification");
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Notification>,
    chat: Arc<dyn ChatSink>,
    semaphore: Arc<Semaphore>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            next = rx.recv() => {
                let Some(notification) = next else {
                    break;
                };
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let chat = chat.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    deliver(chat.as_ref(), &notification).await;
                });
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Notification delivery task panicked");
                }
            }
        }
    }

    let in_flight = tasks.len();
    if in_flight > 0 {
        info!(in_flight, "Waiting for in-flight notifications");
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Notification delivery task panicked");
        }
    }
}

async fn deliver(chat: &dyn ChatSink, notification: &Notification) {
    let result = match &notification.kind {
        NotificationKind::Live(embed) => chat.send_embed(&notification.channel_id, embed).await,
        NotificationKind::Offline(text) => chat.send_text(&notification.channel_id, text).await,
    };

    match result {
        Ok(()) => debug!(
            twitch_channel = %notification.twitch_channel,
            channel_id = %notification.channel_id,
            live = notification.is_live(),
            "Notification delivered"
        ),
        Err(e) => warn!(
            twitch_channel = %notification.twitch_channel,
            channel_id = %notification.channel_id,
            error = %e,
            "Failed to deliver notification"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::Embed;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        sent: Mutex<Vec<String>>,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl ChatSink for RecordingChat {
        async fn send_text(&self, channel_id: &str, text: &str) -> Result<()> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(Error::delivery("boom"));
            }
            self.sent.lock().push(format!("{channel_id}:{text}"));
            Ok(())
        }

        async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()> {
            self.send_text(channel_id, &embed.title).await
        }
    }

    fn offline(channel_id: &str) -> Notification {
        Notification {
            twitch_channel: "alice".to_string(),
            guild_id: "g1".to_string(),
            channel_id: channel_id.to_string(),
            kind: NotificationKind::Offline("Alice is now offline!".to_string()),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let chat = Arc::new(RecordingChat::default());
        let dispatcher = NotificationDispatcher::spawn(chat.clone(), 4, 2);

        for id in ["c1", "c2", "c3", "c4", "c5"] {
            enqueue(&dispatcher.sender(), offline(id)).await;
        }
        let live = Notification {
            kind: NotificationKind::Live(Embed {
                title: "Speedrun".to_string(),
                ..Default::default()
            }),
            ..offline("c6")
        };
        enqueue(&dispatcher.sender(), live).await;

        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);

        let mut sent = chat.sent.lock().clone();
        sent.sort();
        assert_eq!(sent.len(), 6);
        assert!(sent.contains(&"c6:Speedrun".to_string()));
    }

    #[tokio::test]
    async fn test_failed_delivery_is_tolerated() {
        let chat = Arc::new(RecordingChat {
            fail: true,
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::spawn(chat.clone(), 4, 2);

        enqueue(&dispatcher.sender(), offline("c1")).await;

        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);
        assert!(chat.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_abandons_after_timeout() {
        let chat = Arc::new(RecordingChat {
            hang: true,
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::spawn(chat, 4, 1);

        enqueue(&dispatcher.sender(), offline("c1")).await;

        assert!(!dispatcher.shutdown(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_enqueue_after_close_is_dropped() {
        let chat = Arc::new(RecordingChat::default());
        let dispatcher = NotificationDispatcher::spawn(chat.clone(), 1, 1);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        enqueue(&tx, offline("c1")).await;

        assert!(dispatcher.shutdown(Duration::from_secs(1)).await);
        assert!(chat.sent.lock().is_empty());
    }
}
