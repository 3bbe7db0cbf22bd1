//! Call orchestrator actor
//!
//! One tokio task owns the [`CallMachine`], the media engine and the
//! signaling channel. Commands, signaling events and media events are
//! handled one at a time; the effects of each input run in order, and the
//! outcome of every engine operation is fed back to the machine before the
//! next message is read.

use super::machine::{CallMachine, Effect, Input};
use super::state::CallStatus;
use super::status::StatusPublisher;
use crate::config::CallConfig;
use crate::media::{MediaEngine, MediaEvent, WebRtcMediaEngine};
use crate::signaling::{SignalingChannel, SignalingEvent, WebSocketSignalingChannel};
use crate::{Error, Result};
use std::collections::VecDeque;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// User commands accepted by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    StartCall,
    AnswerCall,
    EndCall,
}

impl From<Command> for Input {
    fn from(command: Command) -> Self {
        match command {
            Command::Connect => Input::Connect,
            Command::StartCall => Input::StartCall,
            Command::AnswerCall => Input::AnswerCall,
            Command::EndCall => Input::EndCall,
        }
    }
}

impl From<SignalingEvent> for Input {
    fn from(event: SignalingEvent) -> Self {
        match event {
            SignalingEvent::Connected => Input::SignalingConnected,
            SignalingEvent::Disconnected => Input::SignalingDisconnected,
            SignalingEvent::PeerReady => Input::PeerReady,
            SignalingEvent::DescriptionReceived(description) => {
                Input::RemoteDescription(description)
            }
            SignalingEvent::CandidateReceived(candidate) => Input::RemoteCandidate(candidate),
        }
    }
}

impl From<MediaEvent> for Input {
    fn from(event: MediaEvent) -> Self {
        match event {
            MediaEvent::LocalCandidate(candidate) => Input::LocalCandidate(candidate),
            MediaEvent::ConnectionStateChanged(state) => Input::MediaStateChanged(state),
        }
    }
}

/// Command surface for the presentation layer
///
/// Cheap to clone. Commands never block; they fail only when the
/// orchestrator task has stopped.
#[derive(Debug, Clone)]
pub struct CallHandle {
    commands: mpsc::UnboundedSender<Command>,
    publisher: StatusPublisher,
}

impl CallHandle {
    /// Connect to the relay and join the room
    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    /// Offer a call to the other participant
    pub fn start_call(&self) -> Result<()> {
        self.send(Command::StartCall)
    }

    /// Accept the pending incoming call
    pub fn answer_call(&self) -> Result<()> {
        self.send(Command::AnswerCall)
    }

    /// Hang up and reset the media session
    pub fn end_call(&self) -> Result<()> {
        self.send(Command::EndCall)
    }

    /// Current status
    pub fn status(&self) -> CallStatus {
        self.publisher.current()
    }

    /// Last-value status receiver
    pub fn subscribe(&self) -> watch::Receiver<CallStatus> {
        self.publisher.subscribe()
    }

    /// Ordered stream of every status change from now on
    pub fn updates(&self) -> broadcast::Receiver<CallStatus> {
        self.publisher.updates()
    }

    fn send(&self, command: Command) -> Result<()> {
        debug!(?command, "Queueing command");
        self.commands
            .send(command)
            .map_err(|_| Error::OrchestratorStopped)
    }
}

/// Orchestrator owning one engine and one signaling channel
pub struct CallOrchestrator<E, S> {
    machine: CallMachine,
    engine: E,
    signaling: S,
    publisher: StatusPublisher,
    commands: mpsc::UnboundedReceiver<Command>,
    signaling_events: mpsc::UnboundedReceiver<SignalingEvent>,
    media_events: mpsc::UnboundedReceiver<MediaEvent>,
}

impl<E, S> CallOrchestrator<E, S>
where
    E: MediaEngine + 'static,
    S: SignalingChannel + 'static,
{
    /// Create an orchestrator and its handle
    ///
    /// `signaling_events` and `media_events` must be the receiving ends of
    /// the channels `signaling` and `engine` were built with.
    pub fn new(
        engine: E,
        signaling: S,
        signaling_events: mpsc::UnboundedReceiver<SignalingEvent>,
        media_events: mpsc::UnboundedReceiver<MediaEvent>,
    ) -> (Self, CallHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let publisher = StatusPublisher::new();

        let handle = CallHandle {
            commands: commands_tx,
            publisher: publisher.clone(),
        };

        let orchestrator = Self {
            machine: CallMachine::new(),
            engine,
            signaling,
            publisher,
            commands,
            signaling_events,
            media_events,
        };

        (orchestrator, handle)
    }

    /// Spawn the orchestrator on the current runtime
    pub fn spawn(
        engine: E,
        signaling: S,
        signaling_events: mpsc::UnboundedReceiver<SignalingEvent>,
        media_events: mpsc::UnboundedReceiver<MediaEvent>,
    ) -> (CallHandle, JoinHandle<()>) {
        let (orchestrator, handle) = Self::new(engine, signaling, signaling_events, media_events);
        let task = tokio::spawn(orchestrator.run());
        (handle, task)
    }

    /// Run until every [`CallHandle`] has been dropped
    pub async fn run(mut self) {
        info!("Call orchestrator started");

        loop {
            // Network events first so commands act on the latest known state
            let input: Input = tokio::select! {
                biased;
                Some(event) = self.signaling_events.recv() => event.into(),
                Some(event) = self.media_events.recv() => event.into(),
                command = self.commands.recv() => match command {
                    Some(command) => command.into(),
                    None => break,
                },
            };

            self.process(input).await;
        }

        info!("Call orchestrator stopped");
    }

    /// Handle one input to completion
    async fn process(&mut self, input: Input) {
        debug!(?input, state = ?self.machine.state(), "Processing input");

        let mut queue: VecDeque<Effect> = self.machine.handle(input).into();
        while let Some(effect) = queue.pop_front() {
            if let Some(outcome) = self.execute(effect).await {
                queue.extend(self.machine.handle(outcome));
            }
        }
    }

    /// Run one effect, returning the outcome the machine must see next
    async fn execute(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::Publish(status) => {
                self.publisher.publish(status);
                None
            }
            Effect::OpenSignaling => match self.signaling.connect().await {
                Ok(()) => None,
                Err(e) => {
                    warn!("Failed to open signaling channel: {}", e);
                    Some(Input::SignalingDisconnected)
                }
            },
            Effect::CreateOffer => Some(match self.engine.create_offer().await {
                Ok(offer) => Input::OfferCreated(offer),
                Err(e) => Input::OfferFailed(e.to_string()),
            }),
            Effect::CreateAnswer => Some(match self.engine.create_answer().await {
                Ok(answer) => Input::AnswerCreated(answer),
                Err(e) => Input::AnswerFailed(e.to_string()),
            }),
            Effect::ApplyRemoteDescription(description) => {
                let kind = description.kind();
                Some(match self.engine.apply_remote_description(description).await {
                    Ok(()) => Input::RemoteDescriptionApplied(kind),
                    Err(e) => Input::RemoteDescriptionFailed {
                        kind,
                        error: e.to_string(),
                    },
                })
            }
            Effect::ApplyRemoteCandidate(candidate) => {
                if let Err(e) = self.engine.apply_remote_candidate(candidate).await {
                    warn!("Failed to apply remote candidate: {}", e);
                }
                None
            }
            Effect::SendDescription(description) => {
                if let Err(e) = self.signaling.send_description(&description).await {
                    warn!(kind = %description.kind(), "Failed to send description: {}", e);
                }
                None
            }
            Effect::SendCandidate(candidate) => {
                if let Err(e) = self.signaling.send_candidate(&candidate).await {
                    warn!("Failed to send local candidate: {}", e);
                }
                None
            }
            Effect::ResetEngine => {
                if let Err(e) = self.engine.reset().await {
                    error!("Failed to reset media session: {}", e);
                }
                None
            }
        }
    }
}

impl CallOrchestrator<WebRtcMediaEngine, WebSocketSignalingChannel> {
    /// Build a WebRTC engine and a WebSocket signaling channel from `config`
    /// and spawn an orchestrator over them
    pub async fn launch(config: CallConfig) -> Result<(CallHandle, JoinHandle<()>)> {
        config.validate()?;

        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (signaling_tx, signaling_rx) = mpsc::unbounded_channel();

        let engine = WebRtcMediaEngine::new(config.clone(), media_tx).await?;
        let signaling =
            WebSocketSignalingChannel::new(&config.signaling_url, &config.room, signaling_tx);

        info!(url = %config.signaling_url, room = %config.room, "Launching call orchestrator");
        Ok(Self::spawn(engine, signaling, signaling_rx, media_rx))
    }
}
