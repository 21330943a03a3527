//! Orchestrator integration tests
//!
//! Join, leave and text commands against mock links

use std::sync::Arc;
use std::time::Duration;

use huddle::channels::TextCommand;
use huddle::{ConversationState, Orchestrator};
use huddle::session::SessionMode;
use tokio_test::{assert_err, assert_ok};

mod common;
use common::{Harness, MockLinkFactory, wait_until};

fn orchestrator() -> (Orchestrator, Arc<MockLinkFactory>, Harness) {
    let harness = Harness::new();
    let factory = Arc::new(MockLinkFactory::default());
    let orchestrator = Orchestrator::new(factory.clone(), harness.services.clone());
    (orchestrator, factory, harness)
}

#[tokio::test]
async fn test_join_twice_is_rejected() {
    let (orchestrator, _factory, _harness) = orchestrator();

    assert_ok!(orchestrator.join("guild-1", SessionMode::Normal).await);
    assert_err!(orchestrator.join("guild-1", SessionMode::Silent).await);

    assert_ok!(orchestrator.join("guild-2", SessionMode::Silent).await);
    let mut channels = orchestrator.channels().await;
    channels.sort();
    assert_eq!(channels, vec!["guild-1", "guild-2"]);
}

#[tokio::test]
async fn test_leave_disconnects_and_allows_rejoin() {
    let (orchestrator, factory, _harness) = orchestrator();

    orchestrator.join("guild-1", SessionMode::Normal).await.unwrap();
    let link = factory.link("guild-1").unwrap();

    assert_eq!(orchestrator.leave("guild-1").await.unwrap(), None);
    assert!(link.is_disconnected());
    assert!(orchestrator.session("guild-1").await.is_none());
    assert_err!(orchestrator.leave("guild-1").await);

    orchestrator.join("guild-1", SessionMode::Normal).await.unwrap();
}

#[tokio::test]
async fn test_text_commands_reply() {
    let (orchestrator, _factory, _harness) = orchestrator();

    let reply = orchestrator
        .handle_text("guild-1", TextCommand::Join(SessionMode::TriggerFree))
        .await;
    assert_eq!(reply, "Joined voice chat in free mode.");

    let reply = orchestrator.handle_text("guild-1", TextCommand::Reset).await;
    assert_eq!(reply, "Chat history cleared.");

    let reply = orchestrator
        .handle_text("guild-1", TextCommand::Search("rust".to_string()))
        .await;
    assert_eq!(reply, "Searching for rust.");

    let reply = orchestrator.handle_text("guild-1", TextCommand::Leave).await;
    assert_eq!(reply, "Left voice chat.");

    let reply = orchestrator.handle_text("guild-1", TextCommand::Reset).await;
    assert!(reply.starts_with("Sorry,"));
}

#[tokio::test]
async fn test_text_play_reaches_link() {
    let (orchestrator, factory, _harness) = orchestrator();

    orchestrator.join("guild-1", SessionMode::Normal).await.unwrap();
    let reply = orchestrator
        .handle_text("guild-1", TextCommand::Play("rain sounds".to_string()))
        .await;
    assert_eq!(reply, "Looking up rain sounds.");

    let link = factory.link("guild-1").unwrap();
    wait_until("media", || !link.media().is_empty()).await;
    assert_eq!(link.media(), vec!["https://media.example/rain-sounds"]);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let (orchestrator, factory, harness) = orchestrator();

    let first = orchestrator.join("guild-1", SessionMode::Normal).await.unwrap();
    orchestrator.join("guild-2", SessionMode::Normal).await.unwrap();
    let link = factory.link("guild-1").unwrap();
    let other = factory.link("guild-2").unwrap();
    link.wait_listening("alice").await;

    harness.generator.reply("Hello there.");
    harness.transcriber.push("bot hello");
    link.say("alice").await;

    wait_until("reply", || link.played_count() == 1).await;
    first.wait_for_state(|s| s.is_idle()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(other.played_count(), 0);
}

#[tokio::test]
async fn test_spoken_leave_prunes_session() {
    let (orchestrator, factory, harness) = orchestrator();

    orchestrator.join("guild-1", SessionMode::Normal).await.unwrap();
    let link = factory.link("guild-1").unwrap();
    link.wait_listening("alice").await;

    harness.transcriber.push("bot leave channel");
    link.say("alice").await;
    wait_until("disconnect", || link.is_disconnected()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(orchestrator.session("guild-1").await.is_none());
    orchestrator.join("guild-1", SessionMode::Normal).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_leaves_everything() {
    let (orchestrator, factory, _harness) = orchestrator();

    orchestrator.join("guild-1", SessionMode::Normal).await.unwrap();
    orchestrator.join("guild-2", SessionMode::Normal).await.unwrap();
    orchestrator.shutdown().await;

    assert!(orchestrator.channels().await.is_empty());
    assert!(factory.link("guild-1").unwrap().is_disconnected());
    assert!(factory.link("guild-2").unwrap().is_disconnected());
}

#[tokio::test]
async fn test_text_commands_while_busy() {
    let (orchestrator, factory, harness) = orchestrator();

    let session = orchestrator.join("guild-1", SessionMode::Normal).await.unwrap();
    let link = factory.link("guild-1").unwrap();
    link.wait_listening("alice").await;

    harness.generator.gate.close();
    harness.transcriber.push("bot hello");
    link.say("alice").await;
    session
        .wait_for_state(|s| matches!(s, ConversationState::Busy { .. }))
        .await
        .unwrap();

    let reply = orchestrator
        .handle_text("guild-1", TextCommand::Play("rain sounds".to_string()))
        .await;
    assert_eq!(reply, "I'm busy right now.");
    let reply = orchestrator
        .handle_text("guild-1", TextCommand::Search("rust".to_string()))
        .await;
    assert_eq!(reply, "I'm busy right now.");
    let reply = orchestrator.handle_text("guild-1", TextCommand::Reset).await;
    assert_eq!(reply, "Chat history cleared.");

    harness.generator.gate.open();
    session.wait_for_state(|s| s.is_idle()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(link.media().is_empty());
    assert_eq!(harness.generator.requests().len(), 1);
}

#[tokio::test]
async fn test_slow_join_does_not_block_other_commands() {
    let (orchestrator, factory, _harness) = orchestrator();
    let orchestrator = Arc::new(orchestrator);

    factory.gate.close();
    let joining = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.join("guild-1", SessionMode::Normal).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply = tokio::time::timeout(
        Duration::from_millis(500),
        orchestrator.handle_text("guild-2", TextCommand::Reset),
    )
    .await
    .expect("text command waited on a pending join");
    assert!(reply.starts_with("Sorry,"));
    assert!(orchestrator.channels().await.is_empty());

    factory.gate.open();
    assert_ok!(joining.await.unwrap());
    assert_eq!(orchestrator.channels().await, vec!["guild-1"]);
}
