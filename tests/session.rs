//! Voice session scenario tests
//!
//! Drive a session through a mock link with scripted collaborators

use std::sync::Arc;
use std::time::Duration;

use huddle::ConversationState;
use huddle::agent::Role;
use huddle::playback::RetryPolicy;
use huddle::session::{SessionMode, SessionSettings, VoiceSession};

mod common;
use common::{Harness, MockLink, alarm_earcons, settings_in, test_settings, wait_until};

async fn start(harness: &Harness, link: &Arc<MockLink>, mode: SessionMode) -> VoiceSession {
    let session = VoiceSession::start("test", mode, link.clone(), harness.services.clone()).await;
    link.wait_listening("alice").await;
    session
}

/// Speak one utterance as alice and wait for the session to go back to idle
async fn turn(harness: &Harness, link: &MockLink, session: &VoiceSession, line: &str) {
    harness.transcriber.push(line);
    link.say("alice").await;
    wait_until("transcription", || harness.transcriber.pending() == 0).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    tokio::time::timeout(Duration::from_secs(2), session.wait_for_state(|s| s.is_idle()))
        .await
        .expect("turn did not finish")
        .unwrap();
}

#[tokio::test]
async fn test_full_turn_speaks_reply_and_returns_idle() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness.generator.reply("It is sunny today.");
    turn(&harness, &link, &session, "Bot, what is the weather like?").await;

    wait_until("reply played", || link.played_count() == 1).await;
    assert_eq!(link.played(), vec!["It is sunny today."]);

    let requests = harness.generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0][0].role, Role::System);
    assert_eq!(requests[0].last().unwrap().content, "what is the weather like?");

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Idle);
    assert_eq!(snapshot.history_participants, 1);
    assert_eq!(snapshot.pending_chunks, 0);
}

#[tokio::test]
async fn test_unaddressed_speech_is_ignored() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    turn(&harness, &link, &session, "what should we have for dinner").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(harness.generator.requests().is_empty());
    assert_eq!(link.played_count(), 0);
}

#[tokio::test]
async fn test_free_mode_needs_no_trigger() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::TriggerFree).await;

    harness.generator.reply("Pasta sounds good.");
    turn(&harness, &link, &session, "what should we have for dinner").await;

    wait_until("reply played", || link.played_count() == 1).await;
    assert_eq!(harness.generator.requests().len(), 1);
}

#[tokio::test]
async fn test_declined_reply_is_silent_and_forgotten() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::TriggerFree).await;

    harness.generator.reply("IGNORING");
    turn(&harness, &link, &session, "talking to someone else here").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.generator.requests().len(), 1);
    assert_eq!(link.played_count(), 0);
    assert_eq!(session.snapshot().await.unwrap().history_participants, 0);
}

#[tokio::test]
async fn test_reset_command_clears_history() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    turn(&harness, &link, &session, "bot tell me a joke").await;
    wait_until("history", || link.played_count() == 1).await;
    assert_eq!(session.snapshot().await.unwrap().history_participants, 1);

    turn(&harness, &link, &session, "Bot reset chat history").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.snapshot().await.unwrap().history_participants, 0);

    assert_eq!(harness.generator.requests().len(), 1);
}

#[tokio::test]
async fn test_stop_while_speaking_drops_remaining_chunks() {
    let settings = SessionSettings {
        chunk_words: 3,
        ..test_settings()
    };
    let harness = Harness::with_settings(settings);
    let link = Arc::new(MockLink::new(&["alice"]).with_play_time(Duration::from_millis(400)));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness
        .generator
        .reply("First we begin. Then we continue. Finally we end.");
    harness.transcriber.push("bot tell me a story");
    link.say("alice").await;

    tokio::time::timeout(
        Duration::from_secs(2),
        session.wait_for_state(|s| matches!(s, ConversationState::Speaking { .. })),
    )
    .await
    .expect("never started speaking")
    .unwrap();

    // No trigger needed while speaking
    harness.transcriber.push("stop");
    link.say("alice").await;

    tokio::time::timeout(Duration::from_secs(2), session.wait_for_state(|s| s.is_idle()))
        .await
        .expect("stop did not end the turn")
        .unwrap();
    assert!(link.stops() >= 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(link.played(), vec!["First we begin."]);
    assert_eq!(session.snapshot().await.unwrap().pending_chunks, 0);
}

#[tokio::test]
async fn test_busy_session_discards_other_requests() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]).with_play_time(Duration::from_millis(300)));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness.generator.reply("A long answer.");
    harness.transcriber.push("bot first question");
    link.say("alice").await;
    session
        .wait_for_state(|s| matches!(s, ConversationState::Speaking { .. }))
        .await
        .unwrap();

    harness.transcriber.push("bot second question");
    link.say("alice").await;

    session.wait_for_state(|s| s.is_idle()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.generator.requests().len(), 1);
}

#[tokio::test]
async fn test_failed_chunk_abandons_response_after_retries() {
    let settings = SessionSettings {
        chunk_words: 2,
        ..test_settings()
    };
    let harness = Harness::with_settings(settings);
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness.synthesizer.fail_on("Three");
    harness.generator.reply("One two. Three four. Five six.");
    turn(&harness, &link, &session, "bot count for me").await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(link.played(), vec!["One two."]);

    // Retries resynthesize the failed chunk before giving up
    let attempts = harness
        .synthesizer
        .calls()
        .iter()
        .filter(|text| text.contains("Three"))
        .count();
    assert!(attempts >= 2, "chunk was only tried {attempts} times");
}

#[tokio::test]
async fn test_generation_failure_apologizes() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness.generator.fail();
    turn(&harness, &link, &session, "bot what is the answer").await;

    wait_until("apology", || link.played_count() == 1).await;
    assert!(link.played()[0].starts_with("Sorry"));
    assert_eq!(session.snapshot().await.unwrap().history_participants, 0);
}

#[tokio::test]
async fn test_timer_schedule_list_cancel() {
    let harness = Harness::new();
    let alarms = harness.services.alarms.clone();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    turn(&harness, &link, &session, "bot set a timer for 10 minutes").await;
    wait_until("timer", || alarms.len() == 1).await;
    wait_until("announcement", || link.played_count() == 1).await;
    assert!(link.played()[0].starts_with("Timer 1 set for 10 minutes"));

    turn(&harness, &link, &session, "bot list timers").await;
    wait_until("listing", || link.played_count() == 2).await;
    assert!(link.played()[1].contains("Number 1: timer"));

    turn(&harness, &link, &session, "bot cancel timer number 4").await;
    wait_until("not found", || link.played_count() == 3).await;
    assert_eq!(link.played()[2], "Sorry, there is no alarm number 4.");
    assert_eq!(alarms.len(), 1);

    turn(&harness, &link, &session, "bot cancel timer").await;
    wait_until("cancelled", || link.played_count() == 4).await;
    assert!(link.played()[3].starts_with("Cancelled the timer"));
    assert!(alarms.is_empty());

    assert!(harness.generator.requests().is_empty());
}

#[tokio::test]
async fn test_alarm_rings_until_repeats_run_out() {
    let settings = SessionSettings {
        earcons: alarm_earcons(),
        alarm_repeats: 3,
        ..test_settings()
    };
    let harness = Harness::with_settings(settings);
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Silent).await;

    turn(&harness, &link, &session, "bot set a timer for 1 second").await;
    wait_until("announcement", || link.played_count() == 1).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let rings = link.played().iter().filter(|p| *p == "ring").count();
    assert_eq!(rings, 3);
    assert!(!session.snapshot().await.unwrap().alarm_ringing);
}

#[tokio::test]
async fn test_stop_silences_ringing_alarm() {
    let settings = SessionSettings {
        earcons: alarm_earcons(),
        alarm_repeats: 50,
        ..test_settings()
    };
    let harness = Harness::with_settings(settings);
    let link = Arc::new(MockLink::new(&["alice"]).with_play_time(Duration::from_millis(100)));
    let session = start(&harness, &link, SessionMode::Normal).await;

    turn(&harness, &link, &session, "bot set a timer for 1 second").await;
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(session.snapshot().await.unwrap().alarm_ringing);

    harness.transcriber.push("stop");
    link.say("alice").await;
    wait_until("alarm stopped", || link.stops() >= 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let rings = link.played_count();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(link.played_count(), rings);
    assert!(!session.snapshot().await.unwrap().alarm_ringing);
}

#[tokio::test]
async fn test_media_plays_and_stop_clears_flag() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    turn(&harness, &link, &session, "bot play lofi beats").await;
    wait_until("media", || !link.media().is_empty()).await;
    assert_eq!(link.media(), vec!["https://media.example/lofi-beats"]);
    assert!(session.snapshot().await.unwrap().media_playing);

    turn(&harness, &link, &session, "stop").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!session.snapshot().await.unwrap().media_playing);
}

#[tokio::test]
async fn test_next_turn_clears_finished_media() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    turn(&harness, &link, &session, "bot play lofi beats").await;
    wait_until("media", || !link.media().is_empty()).await;

    turn(&harness, &link, &session, "bot what time is it").await;
    assert!(!session.snapshot().await.unwrap().media_playing);

    // Without media or a turn running, "stop" needs the trigger again
    turn(&harness, &link, &session, "we should stop for lunch").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(link.stops(), 0);
    assert_eq!(harness.generator.requests().len(), 1);
}

#[tokio::test]
async fn test_spoken_search_is_not_remembered() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness.generator.reply("Rust is a programming language.");
    turn(&harness, &link, &session, "bot search for rust language").await;

    wait_until("answer", || link.played_count() == 1).await;
    let requests = harness.generator.requests();
    assert!(requests[0].last().unwrap().content.contains("About rust language"));
    assert_eq!(session.snapshot().await.unwrap().history_participants, 0);
}

#[tokio::test]
async fn test_spoken_leave_disconnects() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness.transcriber.push("bot leave voice chat");
    link.say("alice").await;

    wait_until("disconnect", || link.is_disconnected()).await;
    wait_until("session end", || !session.is_alive()).await;
}

#[tokio::test]
async fn test_transcribe_mode_posts_transcript_on_leave() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::with_settings(settings_in(dir.path()));
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Transcribe).await;

    harness.generator.reply("Hello Alice.");
    turn(&harness, &link, &session, "bot say hello").await;
    wait_until("reply", || link.played_count() == 1).await;

    let transcript = session.leave().await.unwrap().expect("transcript");
    assert!(transcript.contains("alice: bot say hello"));
    assert!(transcript.contains("assistant: Hello Alice."));
    assert!(link.posted().iter().any(|p| p.contains("Hello Alice.")));

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn test_text_reset_reaches_session() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    turn(&harness, &link, &session, "bot remember my name is alice").await;
    wait_until("reply", || link.played_count() == 1).await;

    session.reset_history().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.snapshot().await.unwrap().history_participants, 0);
}

#[tokio::test]
async fn test_text_reset_applies_while_speaking() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]).with_play_time(Duration::from_millis(400)));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness.generator.reply("Nice to meet you, Alice.");
    harness.transcriber.push("bot my name is alice");
    link.say("alice").await;
    session
        .wait_for_state(|s| matches!(s, ConversationState::Speaking { .. }))
        .await
        .unwrap();
    assert_eq!(session.snapshot().await.unwrap().history_participants, 1);

    session.reset_history().unwrap();
    tokio::time::timeout(Duration::from_secs(2), session.wait_for_state(|s| s.is_idle()))
        .await
        .expect("reply never finished")
        .unwrap();

    assert_eq!(session.snapshot().await.unwrap().history_participants, 0);
    assert_eq!(link.played(), vec!["Nice to meet you, Alice."]);
}

#[tokio::test]
async fn test_alarm_without_sound_is_announced_after_speech() {
    let settings = SessionSettings {
        alarm_repeats: 1,
        ..test_settings()
    };
    let harness = Harness::with_settings(settings);
    let alarms = harness.services.alarms.clone();
    let link = Arc::new(MockLink::new(&["alice"]).with_play_time(Duration::from_millis(1500)));
    let session = start(&harness, &link, SessionMode::Normal).await;

    // The confirmation is still playing when the timer fires
    harness.transcriber.push("bot set a timer for 1 second");
    link.say("alice").await;
    wait_until("confirmation", || link.played_count() == 1).await;
    assert!(link.played()[0].starts_with("Timer 1 set for 1 second"));

    wait_until("announcement", || link.played_count() == 2).await;
    assert_eq!(link.played()[1], "Your timer is going off.");
    assert!(alarms.is_empty());

    tokio::time::timeout(Duration::from_secs(3), session.wait_for_state(|s| s.is_idle()))
        .await
        .expect("session stayed busy")
        .unwrap();
}

#[tokio::test]
async fn test_leaving_cancels_own_alarms() {
    let harness = Harness::new();
    let alarms = harness.services.alarms.clone();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    turn(&harness, &link, &session, "bot set a timer for 10 minutes").await;
    wait_until("timer", || alarms.len() == 1).await;

    session.leave().await.unwrap();
    assert!(alarms.is_empty());
}

#[tokio::test]
async fn test_stop_while_generating_discards_reply() {
    let harness = Harness::new();
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness.generator.gate.close();
    harness.generator.reply("This should never be heard.");
    harness.transcriber.push("bot tell me a story");
    link.say("alice").await;
    tokio::time::timeout(
        Duration::from_secs(2),
        session.wait_for_state(|s| matches!(s, ConversationState::Busy { .. })),
    )
    .await
    .expect("never became busy")
    .unwrap();
    wait_until("request", || harness.generator.requests().len() == 1).await;

    harness.transcriber.push("stop");
    link.say("alice").await;
    tokio::time::timeout(Duration::from_secs(2), session.wait_for_state(|s| s.is_idle()))
        .await
        .expect("stop did not end the turn")
        .unwrap();

    harness.generator.gate.open();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(link.played_count(), 0);
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Idle);
    assert_eq!(snapshot.history_participants, 0);
}

#[tokio::test]
async fn test_synthesis_finishing_after_stop_is_not_played() {
    let settings = SessionSettings {
        retry: RetryPolicy {
            backoff: Duration::from_millis(50),
            max_retries: 100,
        },
        ..test_settings()
    };
    let harness = Harness::with_settings(settings);
    let link = Arc::new(MockLink::new(&["alice"]));
    let session = start(&harness, &link, SessionMode::Normal).await;

    harness.synthesizer.gate.close();
    harness.generator.reply("Old answer.");
    harness.transcriber.push("bot say something");
    link.say("alice").await;
    wait_until("synthesis started", || !harness.synthesizer.calls().is_empty()).await;

    harness.transcriber.push("stop");
    link.say("alice").await;
    tokio::time::timeout(Duration::from_secs(2), session.wait_for_state(|s| s.is_idle()))
        .await
        .expect("stop did not end the turn")
        .unwrap();

    harness.synthesizer.gate.open();
    harness.generator.reply("New answer.");
    turn(&harness, &link, &session, "bot say something else").await;

    wait_until("new answer", || link.played_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(link.played(), vec!["New answer."]);
}
