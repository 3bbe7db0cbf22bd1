//! Call orchestration test harness
//!
//! Provides scripted stand-ins for the two collaborators of the orchestrator:
//! - `ScriptedEngine`: records every media engine call and answers with
//!   deterministic SDP, optionally rejecting remote descriptions
//! - `ScriptedSignaling`: records every outgoing message and reports
//!   `Connected` as soon as `connect` is called
//!
//! `TestCall` wires both into a running orchestrator and lets a test inject
//! remote signaling and media events and wait for published statuses.

#![allow(dead_code)]

use async_trait::async_trait;
use chitchat_call::call::{CallHandle, CallOrchestrator, CallStatus};
use chitchat_call::{
    Error, IceCandidate, IceConnectionState, MediaEngine, MediaEvent, Result, SdpKind,
    SessionDescription, SignalingChannel, SignalingEvent,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// How long to wait for an expected status or call before failing
pub const WAIT: Duration = Duration::from_secs(5);

/// Initialize logging once for the test binary
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Media engine operations as seen by the scripted engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateOffer,
    CreateAnswer,
    ApplyRemoteDescription(SessionDescription),
    ApplyRemoteCandidate(IceCandidate),
    Reset,
}

/// Engine that records calls and produces `offer-N`/`answer-N` SDP, where N
/// is the session number (starting at 1, bumped by every reset)
pub struct ScriptedEngine {
    log: Arc<Mutex<Vec<EngineCall>>>,
    session: Arc<AtomicUsize>,
    reject_remote: Arc<AtomicBool>,
    remote_applied: Option<SdpKind>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            session: Arc::new(AtomicUsize::new(1)),
            reject_remote: Arc::new(AtomicBool::new(false)),
            remote_applied: None,
        }
    }

    fn record(&self, call: EngineCall) {
        self.log.lock().unwrap().push(call);
    }

    fn session(&self) -> usize {
        self.session.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    async fn create_offer(&mut self) -> Result<SessionDescription> {
        self.record(EngineCall::CreateOffer);
        Ok(SessionDescription::offer(format!("offer-{}", self.session())))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription> {
        self.record(EngineCall::CreateAnswer);
        if self.remote_applied != Some(SdpKind::Offer) {
            return Err(Error::InvalidNegotiationState(
                "no remote offer applied".to_string(),
            ));
        }
        Ok(SessionDescription::answer(format!("answer-{}", self.session())))
    }

    async fn apply_remote_description(&mut self, description: SessionDescription) -> Result<()> {
        let kind = description.kind();
        self.record(EngineCall::ApplyRemoteDescription(description));

        if self.remote_applied.is_some() {
            return Err(Error::InvalidNegotiationState(
                "remote description already applied".to_string(),
            ));
        }
        if self.reject_remote.load(Ordering::SeqCst) {
            return Err(Error::Negotiation("scripted rejection".to_string()));
        }

        self.remote_applied = Some(kind);
        Ok(())
    }

    async fn apply_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        self.record(EngineCall::ApplyRemoteCandidate(candidate));
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.record(EngineCall::Reset);
        self.remote_applied = None;
        self.session.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Outgoing signaling as seen by the scripted channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingCall {
    Connect,
    Description(SessionDescription),
    Candidate(IceCandidate),
}

/// Signaling channel that records sends and connects instantly
pub struct ScriptedSignaling {
    log: Arc<Mutex<Vec<SignalingCall>>>,
    events: mpsc::UnboundedSender<SignalingEvent>,
}

#[async_trait]
impl SignalingChannel for ScriptedSignaling {
    async fn connect(&mut self) -> Result<()> {
        self.log.lock().unwrap().push(SignalingCall::Connect);
        let _ = self.events.send(SignalingEvent::Connected);
        Ok(())
    }

    async fn send_description(&mut self, description: &SessionDescription) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(SignalingCall::Description(description.clone()));
        Ok(())
    }

    async fn send_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(SignalingCall::Candidate(candidate.clone()));
        Ok(())
    }
}

/// A running orchestrator over scripted collaborators
pub struct TestCall {
    pub handle: CallHandle,
    pub updates: broadcast::Receiver<CallStatus>,
    engine_log: Arc<Mutex<Vec<EngineCall>>>,
    signaling_log: Arc<Mutex<Vec<SignalingCall>>>,
    reject_remote: Arc<AtomicBool>,
    session: Arc<AtomicUsize>,
    signaling_tx: mpsc::UnboundedSender<SignalingEvent>,
    media_tx: mpsc::UnboundedSender<MediaEvent>,
    task: JoinHandle<()>,
}

impl TestCall {
    pub fn start() -> Self {
        init_logging();

        let engine = ScriptedEngine::new();
        let engine_log = Arc::clone(&engine.log);
        let reject_remote = Arc::clone(&engine.reject_remote);
        let session = Arc::clone(&engine.session);

        let (signaling_tx, signaling_rx) = mpsc::unbounded_channel();
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let signaling_log = Arc::new(Mutex::new(Vec::new()));
        let signaling = ScriptedSignaling {
            log: Arc::clone(&signaling_log),
            events: signaling_tx.clone(),
        };

        let (handle, task) = CallOrchestrator::spawn(engine, signaling, signaling_rx, media_rx);
        let updates = handle.updates();

        Self {
            handle,
            updates,
            engine_log,
            signaling_log,
            reject_remote,
            session,
            signaling_tx,
            media_tx,
            task,
        }
    }

    /// Start and bring the endpoint to `Server Connected`
    pub async fn connected() -> Self {
        let mut call = Self::start();
        call.handle.connect().unwrap();
        call.expect_statuses(&["Connecting...", "Server Connected"]).await;
        call
    }

    /// Deliver a remote signaling event
    pub fn signal(&self, event: SignalingEvent) {
        self.signaling_tx.send(event).unwrap();
    }

    /// Deliver a media engine event
    pub fn media(&self, event: MediaEvent) {
        self.media_tx.send(event).unwrap();
    }

    pub fn media_state(&self, state: IceConnectionState) {
        self.media(MediaEvent::ConnectionStateChanged(state));
    }

    /// Make the engine reject every remote description from now on
    pub fn reject_remote_descriptions(&self) {
        self.reject_remote.store(true, Ordering::SeqCst);
    }

    /// Engine session number (1 + number of resets)
    pub fn engine_session(&self) -> usize {
        self.session.load(Ordering::SeqCst)
    }

    pub fn engine_calls(&self) -> Vec<EngineCall> {
        self.engine_log.lock().unwrap().clone()
    }

    pub fn signaling_calls(&self) -> Vec<SignalingCall> {
        self.signaling_log.lock().unwrap().clone()
    }

    /// Wait for the next published status
    pub async fn next_status(&mut self) -> CallStatus {
        tokio::time::timeout(WAIT, self.updates.recv())
            .await
            .expect("timed out waiting for status")
            .expect("status stream closed")
    }

    /// Assert the next published statuses, in order
    pub async fn expect_statuses(&mut self, labels: &[&str]) {
        for expected in labels {
            let status = self.next_status().await;
            assert_eq!(status.label, *expected);
        }
    }

    /// Wait until the engine log satisfies `done`
    pub async fn wait_for_engine(&self, done: impl Fn(&[EngineCall]) -> bool) {
        let log = Arc::clone(&self.engine_log);
        wait_until(move || done(&log.lock().unwrap())).await;
    }

    /// Wait until the signaling log satisfies `done`
    pub async fn wait_for_signaling(&self, done: impl Fn(&[SignalingCall]) -> bool) {
        let log = Arc::clone(&self.signaling_log);
        wait_until(move || done(&log.lock().unwrap())).await;
    }

    /// Stop the orchestrator task while keeping the handle alive
    pub async fn stop_orchestrator(&mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }

    pub async fn shutdown(self) {
        drop(self.handle);
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Poll `condition` every 10ms until it holds or `WAIT` elapses
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate::new(format!("candidate:{} 1 udp 2130706431 10.0.0.{} 5000 typ host", n, n), "0", 0)
}
