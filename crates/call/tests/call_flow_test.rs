//! Integration tests for call negotiation through the orchestrator
//!
//! Each test drives a real `CallOrchestrator` over the scripted engine and
//! signaling channel from the harness, injecting remote events and checking
//! the published statuses and the exact engine/signaling traffic.

mod harness;

use chitchat_call::{Error, IceConnectionState, MediaEvent, SessionDescription, SignalingEvent};
use harness::{candidate, EngineCall, SignalingCall, TestCall};

/// Bring a caller to `Audio Connected!`
async fn caller_in_call() -> TestCall {
    let mut call = TestCall::connected().await;

    call.handle.start_call().unwrap();
    call.expect_statuses(&["Calling..."]).await;
    call.wait_for_signaling(|log| log.contains(&SignalingCall::Description(SessionDescription::offer("offer-1"))))
        .await;

    call.signal(SignalingEvent::DescriptionReceived(SessionDescription::answer("A1")));
    call.media_state(IceConnectionState::Connected);
    call.expect_statuses(&["Audio Connected!"]).await;
    call
}

#[tokio::test]
async fn test_caller_happy_path() {
    let mut call = TestCall::start();
    assert_eq!(call.handle.status().label, "Disconnected");

    call.handle.connect().unwrap();
    call.expect_statuses(&["Connecting...", "Server Connected"]).await;

    call.handle.start_call().unwrap();
    call.expect_statuses(&["Calling..."]).await;
    call.wait_for_signaling(|log| log.len() == 2).await;
    assert_eq!(
        call.signaling_calls(),
        vec![
            SignalingCall::Connect,
            SignalingCall::Description(SessionDescription::offer("offer-1")),
        ]
    );

    call.signal(SignalingEvent::DescriptionReceived(SessionDescription::answer("A1")));
    call.media_state(IceConnectionState::Connected);

    // Negotiating as caller publishes nothing new before media connects
    call.expect_statuses(&["Audio Connected!"]).await;
    assert_eq!(call.handle.status().label, "Audio Connected!");
    assert_eq!(
        call.engine_calls(),
        vec![
            EngineCall::CreateOffer,
            EngineCall::ApplyRemoteDescription(SessionDescription::answer("A1")),
        ]
    );

    call.shutdown().await;
}

#[tokio::test]
async fn test_answerer_with_early_candidates() {
    let mut call = TestCall::connected().await;
    let offer = SessionDescription::offer("O1");

    call.signal(SignalingEvent::DescriptionReceived(offer.clone()));
    let status = call.next_status().await;
    assert_eq!(status.label, "Incoming Call...");
    assert!(status.incoming_call);

    call.signal(SignalingEvent::CandidateReceived(candidate(1)));
    call.signal(SignalingEvent::CandidateReceived(candidate(2)));
    call.handle.answer_call().unwrap();

    let status = call.next_status().await;
    assert_eq!(status.label, "Connecting Audio...");
    assert!(!status.incoming_call);

    call.wait_for_signaling(|log| log.contains(&SignalingCall::Description(SessionDescription::answer("answer-1"))))
        .await;
    assert_eq!(
        call.engine_calls(),
        vec![
            EngineCall::ApplyRemoteDescription(offer),
            EngineCall::ApplyRemoteCandidate(candidate(1)),
            EngineCall::ApplyRemoteCandidate(candidate(2)),
            EngineCall::CreateAnswer,
        ]
    );

    call.media_state(IceConnectionState::Completed);
    call.expect_statuses(&["Audio Connected!"]).await;

    call.shutdown().await;
}

#[tokio::test]
async fn test_buffered_candidates_drain_once_in_order() {
    let mut call = TestCall::connected().await;
    call.handle.start_call().unwrap();
    call.expect_statuses(&["Calling..."]).await;

    for n in 1..=3 {
        call.signal(SignalingEvent::CandidateReceived(candidate(n)));
    }
    call.signal(SignalingEvent::DescriptionReceived(SessionDescription::answer("A1")));
    call.signal(SignalingEvent::CandidateReceived(candidate(4)));

    call.wait_for_engine(|log| log.len() == 6).await;
    assert_eq!(
        call.engine_calls(),
        vec![
            EngineCall::CreateOffer,
            EngineCall::ApplyRemoteDescription(SessionDescription::answer("A1")),
            EngineCall::ApplyRemoteCandidate(candidate(1)),
            EngineCall::ApplyRemoteCandidate(candidate(2)),
            EngineCall::ApplyRemoteCandidate(candidate(3)),
            EngineCall::ApplyRemoteCandidate(candidate(4)),
        ]
    );

    call.shutdown().await;
}

#[tokio::test]
async fn test_answer_without_pending_offer_is_noop() {
    let mut call = TestCall::connected().await;

    call.handle.answer_call().unwrap();
    // Commands are processed in order, so the offer proves the answer was handled
    call.handle.start_call().unwrap();

    call.expect_statuses(&["Calling..."]).await;
    assert_eq!(call.engine_calls(), vec![EngineCall::CreateOffer]);

    call.shutdown().await;
}

#[tokio::test]
async fn test_end_call_and_restart() {
    let mut call = caller_in_call().await;
    assert_eq!(call.engine_session(), 1);

    call.handle.end_call().unwrap();
    call.expect_statuses(&["Server Connected"]).await;
    assert_eq!(call.engine_calls().last(), Some(&EngineCall::Reset));
    assert_eq!(call.engine_session(), 2);

    // Candidates after the hang-up wait for the next remote description
    call.signal(SignalingEvent::CandidateReceived(candidate(9)));

    call.handle.start_call().unwrap();
    call.expect_statuses(&["Calling..."]).await;
    call.wait_for_signaling(|log| log.contains(&SignalingCall::Description(SessionDescription::offer("offer-2"))))
        .await;

    let calls = call.engine_calls();
    let after_reset = &calls[calls.iter().position(|c| *c == EngineCall::Reset).unwrap() + 1..];
    assert_eq!(after_reset, &[EngineCall::CreateOffer]);

    call.shutdown().await;
}

#[tokio::test]
async fn test_end_call_clears_pending_offer() {
    let mut call = TestCall::connected().await;

    call.signal(SignalingEvent::DescriptionReceived(SessionDescription::offer("O1")));
    call.expect_statuses(&["Incoming Call..."]).await;

    call.handle.end_call().unwrap();
    let status = call.next_status().await;
    assert_eq!(status.label, "Server Connected");
    assert!(!status.incoming_call);

    call.handle.answer_call().unwrap();
    call.handle.start_call().unwrap();
    call.expect_statuses(&["Calling..."]).await;

    assert_eq!(
        call.engine_calls(),
        vec![EngineCall::Reset, EngineCall::CreateOffer]
    );

    call.shutdown().await;
}

#[tokio::test]
async fn test_signaling_drop_mid_call() {
    let mut call = caller_in_call().await;
    let engine_calls = call.engine_calls().len();

    call.signal(SignalingEvent::Disconnected);
    call.expect_statuses(&["Server Disconnected"]).await;

    // The media session is left alone
    assert_eq!(call.engine_calls().len(), engine_calls);

    // Reconnecting starts over on a fresh session
    call.handle.connect().unwrap();
    call.expect_statuses(&["Connecting...", "Server Connected"]).await;
    assert_eq!(call.engine_calls().last(), Some(&EngineCall::Reset));

    call.shutdown().await;
}

#[tokio::test]
async fn test_rejected_answer_aborts_call() {
    let mut call = TestCall::connected().await;
    call.reject_remote_descriptions();

    call.handle.start_call().unwrap();
    call.expect_statuses(&["Calling..."]).await;

    call.signal(SignalingEvent::DescriptionReceived(SessionDescription::answer("bad")));
    call.expect_statuses(&["Server Connected"]).await;
    assert_eq!(call.engine_calls().last(), Some(&EngineCall::Reset));

    call.shutdown().await;
}

#[tokio::test]
async fn test_stray_answer_is_applied_without_transition() {
    let mut call = TestCall::connected().await;

    call.signal(SignalingEvent::CandidateReceived(candidate(1)));
    call.signal(SignalingEvent::DescriptionReceived(SessionDescription::answer("stray")));
    call.wait_for_engine(|log| log.len() == 2).await;

    assert_eq!(
        call.engine_calls(),
        vec![
            EngineCall::ApplyRemoteDescription(SessionDescription::answer("stray")),
            EngineCall::ApplyRemoteCandidate(candidate(1)),
        ]
    );

    // No status was published for the stray answer
    call.handle.start_call().unwrap();
    call.expect_statuses(&["Calling..."]).await;

    call.shutdown().await;
}

#[tokio::test]
async fn test_media_loss_recovery_and_failure() {
    let mut call = caller_in_call().await;

    call.media_state(IceConnectionState::Disconnected);
    call.expect_statuses(&["Audio Disconnected"]).await;

    call.media_state(IceConnectionState::Checking);
    call.media_state(IceConnectionState::Connected);
    call.expect_statuses(&["Audio Connected!"]).await;

    call.media_state(IceConnectionState::Failed);
    call.expect_statuses(&["Connection Failed"]).await;

    call.handle.end_call().unwrap();
    call.expect_statuses(&["Server Connected"]).await;

    call.shutdown().await;
}

#[tokio::test]
async fn test_local_candidates_forwarded_immediately() {
    let call = TestCall::connected().await;

    call.media(MediaEvent::LocalCandidate(candidate(5)));
    call.wait_for_signaling(|log| log.contains(&SignalingCall::Candidate(candidate(5))))
        .await;

    call.shutdown().await;
}

#[tokio::test]
async fn test_commands_fail_after_orchestrator_stops() {
    let mut call = TestCall::start();
    call.stop_orchestrator().await;

    assert!(matches!(call.handle.start_call(), Err(Error::OrchestratorStopped)));
}
