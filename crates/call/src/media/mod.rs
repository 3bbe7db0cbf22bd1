//! Media session engine contract
//!
//! The orchestrator drives a single peer connection through the
//! [`MediaEngine`] trait and observes it through [`MediaEvent`]s pushed on the
//! channel handed to the engine at construction.

pub mod engine;

pub use engine::WebRtcMediaEngine;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a negotiation round a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Offer from the calling side
    Offer,
    /// Answer from the called side
    Answer,
}

impl SdpKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An offer or answer produced by an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    kind: SdpKind,
    sdp: String,
}

impl SessionDescription {
    /// Build a description of the given kind
    pub fn new(kind: SdpKind, sdp: impl Into<String>) -> Self {
        Self {
            kind,
            sdp: sdp.into(),
        }
    }

    /// Build an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(SdpKind::Offer, sdp)
    }

    /// Build an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(SdpKind::Answer, sdp)
    }

    pub fn kind(&self) -> SdpKind {
        self.kind
    }

    pub fn sdp(&self) -> &str {
        &self.sdp
    }
}

/// A connectivity candidate exchanged through signaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    /// Transport description line (`candidate:...`)
    pub candidate: String,
    /// Media-section identifier tag (empty when the engine did not provide one)
    pub sdp_mid: String,
    /// Media-section index
    pub sdp_mline_index: u16,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, sdp_mid: impl Into<String>, sdp_mline_index: u16) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: sdp_mid.into(),
            sdp_mline_index,
        }
    }
}

/// ICE connectivity state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// Media is flowing
    pub fn is_connected(&self) -> bool {
        matches!(self, IceConnectionState::Connected | IceConnectionState::Completed)
    }
}

/// Events pushed by the engine to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The engine gathered a local candidate that must reach the remote peer
    LocalCandidate(IceCandidate),
    /// Connectivity changed on the current session
    ConnectionStateChanged(IceConnectionState),
}

/// Operations the orchestrator needs from a media session engine
///
/// Every call operates on the engine's current session. Implementations own
/// the underlying connection exclusively.
#[async_trait]
pub trait MediaEngine: Send {
    /// Create a local offer and set it as the local description
    async fn create_offer(&mut self) -> Result<SessionDescription>;

    /// Create a local answer to the applied remote offer and set it as the local description
    ///
    /// Fails with `InvalidNegotiationState` when no remote offer has been applied.
    async fn create_answer(&mut self) -> Result<SessionDescription>;

    /// Apply the remote peer's description
    ///
    /// Applying a second remote description in the same round fails with
    /// `InvalidNegotiationState`.
    async fn apply_remote_description(&mut self, description: SessionDescription) -> Result<()>;

    /// Apply a remote candidate
    async fn apply_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()>;

    /// Close the current session and open a fresh one with a new local audio track
    async fn reset(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_description_constructors() {
        let offer = SessionDescription::offer("v=0");
        assert_eq!(offer.kind(), SdpKind::Offer);
        assert_eq!(offer.sdp(), "v=0");

        let answer = SessionDescription::answer("v=0");
        assert_eq!(answer.kind(), SdpKind::Answer);
        assert_eq!(answer.kind().to_string(), "answer");
    }

    #[test]
    fn test_connected_states() {
        assert!(IceConnectionState::Connected.is_connected());
        assert!(IceConnectionState::Completed.is_connected());
        assert!(!IceConnectionState::Checking.is_connected());
        assert!(!IceConnectionState::Disconnected.is_connected());
    }
}
