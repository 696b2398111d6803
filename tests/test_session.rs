//! End-to-end conversations through `InteractiveSession` with a fake browser.

mod common;

use std::future::pending;
use std::time::Duration;

use common::{
    composing, config, done, hello_script, streaming, FakeBrowser, FakeDocument, StalledPrompts,
};
use pagechat_pilot::{
    DocumentError, InteractiveSession, PilotError, RecordingTranscript, ScriptedPrompts,
};

fn assert_released_once(session: &InteractiveSession<FakeBrowser>) {
    assert_eq!(session.host().close_page_calls, 1, "page closed exactly once");
    assert_eq!(session.host().shutdown_calls, 1, "browser stopped exactly once");
}

#[tokio::test(start_paused = true)]
async fn first_prompt_then_exit() {
    let doc = FakeDocument::new(hello_script());
    let log = doc.log();
    let mut session = InteractiveSession::new(FakeBrowser::with_page(doc), config(true));
    let mut prompts = ScriptedPrompts::new(["exit", "never sent"]);
    let mut transcript = RecordingTranscript::new();

    let stats = session
        .run("Hello", &mut prompts, &mut transcript, pending())
        .await
        .expect("conversation should end cleanly");

    assert_eq!(transcript.fragments, vec!["Hi", " there"]);
    assert_eq!(stats.turns_completed, 1);
    assert_eq!(stats.chars_received, "Hi there".len());
    assert_eq!(log.lock().unwrap().typed, vec!["Hello"]);
    assert_eq!(log.lock().unwrap().clicks, 1);
    assert_eq!(prompts.remaining(), 1);
    assert_eq!(session.host().opened_urls, vec!["https://chat.openai.com"]);
    assert!(!session.session().active);
    assert_released_once(&session);
}

#[tokio::test(start_paused = true)]
async fn batch_mode_prints_one_reply() {
    let mut session = InteractiveSession::new(FakeBrowser::new(hello_script()), config(false));
    let mut prompts = ScriptedPrompts::new(["exit"]);
    let mut transcript = RecordingTranscript::new();

    session
        .run("Hello", &mut prompts, &mut transcript, pending())
        .await
        .unwrap();

    assert!(transcript.fragments.is_empty());
    assert_eq!(transcript.replies, vec!["Hi there"]);
}

#[tokio::test(start_paused = true)]
async fn end_of_input_ends_the_session() {
    let mut session = InteractiveSession::new(FakeBrowser::new(hello_script()), config(true));
    let mut prompts = ScriptedPrompts::new(Vec::<String>::new());
    let mut transcript = RecordingTranscript::new();

    let stats = session
        .run("Hello", &mut prompts, &mut transcript, pending())
        .await
        .unwrap();

    assert_eq!(stats.turns_completed, 1);
    assert_released_once(&session);
}

#[tokio::test(start_paused = true)]
async fn follow_up_turn_waits_for_a_new_message() {
    let script = vec![
        (0, Some(composing("m1"))),
        (300, Some(streaming("m1", "Hi"))),
        (600, Some(done("m1", "Hi there"))),
        (2_000, Some(composing("m2"))),
        (2_300, Some(done("m2", "Again"))),
    ];
    let doc = FakeDocument::new(script);
    let log = doc.log();
    let mut session = InteractiveSession::new(FakeBrowser::with_page(doc), config(true));
    let mut prompts = ScriptedPrompts::new(["", "More", "EXIT"]);
    let mut transcript = RecordingTranscript::new();

    let stats = session
        .run("Hello", &mut prompts, &mut transcript, pending())
        .await
        .unwrap();

    assert_eq!(transcript.fragments, vec!["Hi", " there", "Again"]);
    assert_eq!(log.lock().unwrap().typed, vec!["Hello", "More"]);
    assert_eq!(stats.turns_completed, 2);
    assert_eq!(session.session().last_message_id.as_deref(), Some("m2"));
    assert_released_once(&session);
}

#[tokio::test(start_paused = true)]
async fn missing_input_is_fatal_and_saves_a_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let shot = dir.path().join("login-wall.png");

    let mut doc = FakeDocument::new(hello_script());
    doc.input_present = false;
    doc.screenshot = Some(b"\x89PNG fake".to_vec());
    let log = doc.log();

    let mut cfg = config(true);
    cfg.page.failure_screenshot = Some(shot.clone());
    let mut session = InteractiveSession::new(FakeBrowser::with_page(doc), cfg);
    let mut prompts = ScriptedPrompts::new(["should not be read"]);
    let mut transcript = RecordingTranscript::new();

    let result = session
        .run("Hello", &mut prompts, &mut transcript, pending())
        .await;

    assert!(matches!(result, Err(PilotError::InputNotFound { .. })));
    assert!(log.lock().unwrap().typed.is_empty());
    assert_eq!(prompts.remaining(), 1);
    assert_eq!(transcript.notices.len(), 1);
    assert!(transcript.notices[0].contains("cannot find the prompt input"));
    assert_eq!(std::fs::read(&shot).unwrap(), b"\x89PNG fake");
    assert_released_once(&session);
}

#[tokio::test(start_paused = true)]
async fn first_token_timeout_keeps_the_session_alive() {
    let script = vec![(0, Some(composing("m1")))];
    let mut session = InteractiveSession::new(FakeBrowser::new(script), config(true));
    let mut prompts = ScriptedPrompts::new(["exit"]);
    let mut transcript = RecordingTranscript::new();

    let stats = session
        .run("Hello", &mut prompts, &mut transcript, pending())
        .await
        .expect("a timeout is not fatal");

    assert_eq!(stats.turns_completed, 0);
    assert_eq!(stats.first_token_timeouts, 1);
    assert_eq!(transcript.notices.len(), 1);
    assert!(transcript.notices[0].contains("waiting for the initial response"));
    assert!(transcript.fragments.is_empty());
    // The operator was still asked for the next prompt.
    assert_eq!(prompts.remaining(), 0);
    assert_released_once(&session);
}

#[tokio::test(start_paused = true)]
async fn failed_send_click_still_watches_the_reply() {
    let mut doc = FakeDocument::new(hello_script());
    doc.click_fails = true;
    let mut session = InteractiveSession::new(FakeBrowser::with_page(doc), config(true));
    let mut prompts = ScriptedPrompts::new(["exit"]);
    let mut transcript = RecordingTranscript::new();

    let stats = session
        .run("Hello", &mut prompts, &mut transcript, pending())
        .await
        .unwrap();

    assert_eq!(transcript.notices.len(), 1);
    assert!(transcript.notices[0].contains("failed to submit the prompt"));
    assert_eq!(transcript.fragments, vec!["Hi", " there"]);
    assert_eq!(stats.turns_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn interruption_releases_mid_stream() {
    let script = vec![(0, Some(streaming("m1", "partial")))];
    let mut session = InteractiveSession::new(FakeBrowser::new(script), config(true));
    let mut prompts = ScriptedPrompts::new(["exit"]);
    let mut transcript = RecordingTranscript::new();

    let result = session
        .run(
            "Hello",
            &mut prompts,
            &mut transcript,
            tokio::time::sleep(Duration::from_secs(2)),
        )
        .await;

    assert!(matches!(result, Err(PilotError::Interrupted)));
    assert_eq!(transcript.fragments, vec!["partial"]);
    assert_eq!(
        transcript.notices.last().map(String::as_str),
        Some("Interrupted by user, closing...")
    );
    assert_released_once(&session);
}

#[tokio::test(start_paused = true)]
async fn interruption_while_waiting_for_the_operator_releases() {
    let mut session = InteractiveSession::new(FakeBrowser::new(hello_script()), config(true));
    let mut prompts = StalledPrompts;
    let mut transcript = RecordingTranscript::new();

    let result = session
        .run(
            "Hello",
            &mut prompts,
            &mut transcript,
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;

    assert!(matches!(result, Err(PilotError::Interrupted)));
    // The first reply finished before the operator was asked for more.
    assert_eq!(transcript.fragments, vec!["Hi", " there"]);
    assert_eq!(transcript.turns_ended, 1);
    assert_eq!(
        transcript.notices.last().map(String::as_str),
        Some("Interrupted by user, closing...")
    );
    assert!(!session.session().active);
    assert_released_once(&session);
}

#[tokio::test(start_paused = true)]
async fn page_that_cannot_open_still_stops_the_browser() {
    let mut browser = FakeBrowser::new(hello_script());
    browser.fail_open = true;
    let mut session = InteractiveSession::new(browser, config(true));
    let mut prompts = ScriptedPrompts::new(["exit"]);
    let mut transcript = RecordingTranscript::new();

    let result = session
        .run("Hello", &mut prompts, &mut transcript, pending())
        .await;

    assert!(matches!(
        result,
        Err(PilotError::Document(DocumentError::Navigation { .. }))
    ));
    assert_eq!(session.host().close_page_calls, 0);
    assert_eq!(session.host().shutdown_calls, 1);
    assert!(transcript.notices[0].starts_with("An error occurred"));
}

#[tokio::test(start_paused = true)]
async fn release_is_idempotent() {
    let mut session = InteractiveSession::new(FakeBrowser::new(hello_script()), config(true));
    let mut prompts = ScriptedPrompts::new(["exit"]);
    let mut transcript = RecordingTranscript::new();

    session
        .run("Hello", &mut prompts, &mut transcript, pending())
        .await
        .unwrap();
    session.release().await;
    session.release().await;

    assert_released_once(&session);
}
