//! Chat command handling against a real session and fake backends.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{FakeChat, FakePlatform, Sent, open_session};
use housebot::commands::CommandHandler;
use housebot::discord::MessageCreate;
use housebot::session::BotContext;
use housebot::snapshot::SnapshotStore;

const BOT_ID: &str = "bot-user";

struct Harness {
    _dir: TempDir,
    ctx: BotContext,
    chat: Arc<FakeChat>,
    handler: CommandHandler,
}

async fn harness(with_session: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path());
    let platform = FakePlatform::new();
    platform.add_user("alice", "Alice", "http://a");

    let ctx = BotContext::new();
    let chat = FakeChat::new();
    if with_session {
        let session = open_session(&platform, &store, ctx.guilds()).await;
        session.authenticate().await.unwrap();
        ctx.register_session(BOT_ID, Arc::new(session));
    }
    let handler = CommandHandler::new(ctx.clone(), chat.clone(), "housebot", BOT_ID);

    Harness {
        _dir: dir,
        ctx,
        chat,
        handler,
    }
}

fn message(content: &str) -> MessageCreate {
    MessageCreate {
        channel_id: "c1".to_string(),
        guild_id: Some("g1".to_string()),
        author_id: "u1".to_string(),
        author_name: "sam".to_string(),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn test_add_then_add_again() {
    let h = harness(true).await;

    let reply = h.handler.handle(&message("housebot channel add Alice")).await;
    assert_eq!(
        reply.as_deref(),
        Some("alice's Twitch channel successfully added to this Discord channel.")
    );

    let reply = h.handler.handle(&message("HOUSEBOT channel add alice")).await;
    assert_eq!(
        reply.as_deref(),
        Some("alice's Twitch channel is already added to this Discord channel.")
    );

    let session = h.ctx.session(BOT_ID).unwrap();
    assert_eq!(session.registry_snapshot().await.total_subscriptions(), 1);

    let sent = h.chat.sent();
    assert_eq!(sent.len(), 2);
    assert!(matches!(&sent[0], Sent::Text { channel_id, .. } if channel_id == "c1"));
}

#[tokio::test]
async fn test_remove() {
    let h = harness(true).await;

    let reply = h.handler.handle(&message("housebot channel remove alice")).await;
    assert_eq!(
        reply.as_deref(),
        Some("alice's Twitch channel is not added to this Discord channel.")
    );

    h.handler.handle(&message("housebot channel add alice")).await;
    let reply = h.handler.handle(&message("housebot channel remove alice")).await;
    assert_eq!(
        reply.as_deref(),
        Some("alice's Twitch channel successfully removed from this Discord channel.")
    );
    assert!(h.ctx.session(BOT_ID).unwrap().registry_snapshot().await.is_empty());
}

#[tokio::test]
async fn test_unknown_twitch_channel() {
    let h = harness(true).await;

    let reply = h.handler.handle(&message("housebot channel add nobody")).await;
    assert_eq!(reply.as_deref(), Some("nobody is not a Twitch channel."));
}

#[tokio::test]
async fn test_usage_reply() {
    let h = harness(true).await;

    let reply = h.handler.handle(&message("housebot channel add")).await;
    assert_eq!(
        reply.as_deref(),
        Some("Proper usage is housebot channel [add/remove] <Twitch Channel>")
    );
}

#[tokio::test]
async fn test_ignored_messages() {
    let h = harness(true).await;

    assert_eq!(h.handler.handle(&message("hello there")).await, None);
    assert_eq!(h.handler.handle(&message("housebot dance")).await, None);

    let mut own = message("housebot channel add alice");
    own.author_id = BOT_ID.to_string();
    assert_eq!(h.handler.handle(&own).await, None);

    assert!(h.chat.sent().is_empty());
}

#[tokio::test]
async fn test_without_session_reports_unavailable() {
    let h = harness(false).await;

    let reply = h.handler.handle(&message("housebot channel add alice")).await;
    assert!(reply.is_some());
    assert_eq!(h.chat.sent().len(), 1);
    assert_eq!(h.ctx.session_count(), 0);
}
