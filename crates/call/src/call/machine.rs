//! Call negotiation state machine
//!
//! [`CallMachine`] is pure: it consumes one [`Input`] at a time and returns
//! the [`Effect`]s to run, in order. It never touches the network or the
//! media engine. The orchestrator runs the effects and feeds the outcome of
//! every engine operation back as an input before reading the next message,
//! so a remote description is never applied while another one is in flight.

use super::state::{CallRole, CallState, CallStatus};
use crate::media::{IceCandidate, IceConnectionState, SdpKind, SessionDescription};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Everything the machine reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    // User commands
    Connect,
    StartCall,
    AnswerCall,
    EndCall,

    // Signaling events
    SignalingConnected,
    SignalingDisconnected,
    PeerReady,
    RemoteDescription(SessionDescription),
    RemoteCandidate(IceCandidate),

    // Media engine events
    LocalCandidate(IceCandidate),
    MediaStateChanged(IceConnectionState),

    // Outcomes of effects
    OfferCreated(SessionDescription),
    OfferFailed(String),
    AnswerCreated(SessionDescription),
    AnswerFailed(String),
    RemoteDescriptionApplied(SdpKind),
    RemoteDescriptionFailed { kind: SdpKind, error: String },
}

/// Work requested by the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenSignaling,
    CreateOffer,
    CreateAnswer,
    ApplyRemoteDescription(SessionDescription),
    ApplyRemoteCandidate(IceCandidate),
    SendDescription(SessionDescription),
    SendCandidate(IceCandidate),
    ResetEngine,
    Publish(CallStatus),
}

/// Negotiation state for one endpoint
#[derive(Debug, Default)]
pub struct CallMachine {
    state: CallState,

    /// Remote offer waiting for `AnswerCall`
    pending_offer: Option<SessionDescription>,

    /// Remote candidates received before any remote description was applied
    remote_candidates: VecDeque<IceCandidate>,

    /// A remote description has been applied to the current engine session
    remote_description_applied: bool,

    /// Remote apply the call is waiting on, as opposed to a stray one
    awaiting_remote: Option<SdpKind>,

    signaling_up: bool,
    incoming_call: bool,
}

impl CallMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn status(&self) -> CallStatus {
        CallStatus::new(self.state, self.incoming_call)
    }

    pub fn pending_offer(&self) -> Option<&SessionDescription> {
        self.pending_offer.as_ref()
    }

    /// Candidates waiting for a remote description
    pub fn buffered_candidates(&self) -> usize {
        self.remote_candidates.len()
    }

    pub fn remote_description_applied(&self) -> bool {
        self.remote_description_applied
    }

    pub fn is_signaling_up(&self) -> bool {
        self.signaling_up
    }

    /// Process one input and return the effects to run, in order
    ///
    /// When the visible status changed, the first effect is a `Publish`.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let before = self.status();
        let mut effects = Vec::new();

        match input {
            Input::Connect => self.on_connect(&mut effects),
            Input::StartCall => self.on_start_call(&mut effects),
            Input::AnswerCall => self.on_answer_call(&mut effects),
            Input::EndCall => {
                info!(state = ?self.state, "Ending call");
                self.clear_call(&mut effects);
            }

            Input::SignalingConnected => {
                self.signaling_up = true;
                if matches!(
                    self.state,
                    CallState::Idle | CallState::ConnectingToServer | CallState::Ended
                ) {
                    self.state = CallState::ServerConnected;
                }
            }
            Input::SignalingDisconnected => {
                self.signaling_up = false;
                // An offer cannot be answered without signaling
                self.pending_offer = None;
                self.incoming_call = false;
                self.state = CallState::Ended;
            }
            Input::PeerReady => {
                info!("Remote participant joined the room");
            }
            Input::RemoteDescription(description) => {
                self.on_remote_description(description, &mut effects)
            }
            Input::RemoteCandidate(candidate) => {
                if self.remote_description_applied {
                    effects.push(Effect::ApplyRemoteCandidate(candidate));
                } else {
                    debug!(buffered = self.remote_candidates.len() + 1, "Buffering remote candidate");
                    self.remote_candidates.push_back(candidate);
                }
            }

            Input::LocalCandidate(candidate) => effects.push(Effect::SendCandidate(candidate)),
            Input::MediaStateChanged(media_state) => self.on_media_state(media_state),

            Input::OfferCreated(offer) => {
                if self.state == CallState::Calling {
                    effects.push(Effect::SendDescription(offer));
                } else {
                    debug!(state = ?self.state, "Discarding offer created outside a call");
                }
            }
            Input::AnswerCreated(answer) => {
                if matches!(self.state, CallState::Negotiating { role: CallRole::Answerer }) {
                    effects.push(Effect::SendDescription(answer));
                } else {
                    debug!(state = ?self.state, "Discarding answer created outside a call");
                }
            }
            Input::OfferFailed(error) => {
                warn!("Failed to create offer: {}", error);
                self.abort_call(&mut effects);
            }
            Input::AnswerFailed(error) => {
                warn!("Failed to create answer: {}", error);
                self.abort_call(&mut effects);
            }
            Input::RemoteDescriptionApplied(kind) => self.on_remote_applied(kind, &mut effects),
            Input::RemoteDescriptionFailed { kind, error } => {
                if self.awaiting_remote == Some(kind) {
                    warn!(%kind, "Remote description rejected, aborting call: {}", error);
                    self.abort_call(&mut effects);
                } else {
                    warn!(%kind, "Stray remote description rejected: {}", error);
                }
            }
        }

        let after = self.status();
        if after != before {
            effects.insert(0, Effect::Publish(after));
        }

        effects
    }

    fn on_connect(&mut self, effects: &mut Vec<Effect>) {
        match self.state {
            CallState::Idle => {}
            CallState::Ended => {
                // Start over on a fresh media session
                self.clear_negotiation();
                effects.push(Effect::ResetEngine);
            }
            _ => {
                debug!(state = ?self.state, "Connect ignored");
                return;
            }
        }

        self.state = CallState::ConnectingToServer;
        effects.push(Effect::OpenSignaling);
    }

    fn on_start_call(&mut self, effects: &mut Vec<Effect>) {
        if self.state != CallState::ServerConnected {
            debug!(state = ?self.state, "Start call ignored");
            return;
        }

        info!("Starting call");
        self.state = CallState::Calling;
        effects.push(Effect::CreateOffer);
    }

    fn on_answer_call(&mut self, effects: &mut Vec<Effect>) {
        if self.state != CallState::IncomingCall {
            debug!(state = ?self.state, "Answer ignored: no incoming call");
            return;
        }
        let Some(offer) = self.pending_offer.take() else {
            debug!("Answer ignored: no pending offer");
            return;
        };

        info!("Answering call");
        self.incoming_call = false;
        self.state = CallState::Negotiating {
            role: CallRole::Answerer,
        };
        self.awaiting_remote = Some(SdpKind::Offer);
        effects.push(Effect::ApplyRemoteDescription(offer));
    }

    fn on_remote_description(&mut self, description: SessionDescription, effects: &mut Vec<Effect>) {
        match description.kind() {
            SdpKind::Offer => {
                if self.state != CallState::ServerConnected {
                    warn!(state = ?self.state, "Dropping remote offer outside idle server connection");
                    return;
                }

                info!("Incoming call");
                self.pending_offer = Some(description);
                self.incoming_call = true;
                self.state = CallState::IncomingCall;
            }
            SdpKind::Answer => {
                if self.state == CallState::Calling {
                    self.awaiting_remote = Some(SdpKind::Answer);
                } else {
                    warn!(state = ?self.state, "Applying remote answer received outside a pending call");
                }
                effects.push(Effect::ApplyRemoteDescription(description));
            }
        }
    }

    fn on_remote_applied(&mut self, kind: SdpKind, effects: &mut Vec<Effect>) {
        if !self.remote_description_applied {
            self.remote_description_applied = true;
            if !self.remote_candidates.is_empty() {
                debug!(count = self.remote_candidates.len(), "Draining buffered remote candidates");
            }
            effects.extend(self.remote_candidates.drain(..).map(Effect::ApplyRemoteCandidate));
        }

        if self.awaiting_remote != Some(kind) {
            return;
        }
        self.awaiting_remote = None;

        match kind {
            SdpKind::Offer => effects.push(Effect::CreateAnswer),
            SdpKind::Answer => {
                self.state = CallState::Negotiating {
                    role: CallRole::Caller,
                };
            }
        }
    }

    fn on_media_state(&mut self, media_state: IceConnectionState) {
        let next = match media_state {
            IceConnectionState::Connected | IceConnectionState::Completed => {
                match self.state {
                    CallState::Calling
                    | CallState::IncomingCall
                    | CallState::Negotiating { .. }
                    | CallState::Disconnected => Some(CallState::Connected),
                    _ => None,
                }
            }
            IceConnectionState::Disconnected if self.state == CallState::Connected => {
                Some(CallState::Disconnected)
            }
            IceConnectionState::Failed if self.state.is_in_call() => Some(CallState::Failed),
            _ => None,
        };

        match next {
            Some(state) => {
                info!(?media_state, from = ?self.state, to = ?state, "Media connectivity changed");
                self.state = state;
            }
            None => debug!(?media_state, state = ?self.state, "Media state change ignored"),
        }
    }

    /// Reset the call after an engine rejection
    fn abort_call(&mut self, effects: &mut Vec<Effect>) {
        if self.state.is_in_call() {
            self.clear_call(effects);
        }
    }

    /// Tear down the current call and return to the idle server connection
    fn clear_call(&mut self, effects: &mut Vec<Effect>) {
        self.clear_negotiation();
        self.pending_offer = None;
        self.incoming_call = false;
        effects.push(Effect::ResetEngine);

        if self.signaling_up {
            self.state = CallState::ServerConnected;
        }
    }

    fn clear_negotiation(&mut self) {
        self.remote_candidates.clear();
        self.remote_description_applied = false;
        self.awaiting_remote = None;
    }
}
