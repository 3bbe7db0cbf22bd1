//! Wire protocol for the rendezvous relay
//!
//! Every frame is a JSON text message with an `{"event": ..., "data": ...}`
//! envelope:
//!
//! ```text
//! {"event":"join","data":{"room":"room1"}}
//! {"event":"offer","data":{"room":"room1","type":"offer","sdp":"v=0..."}}
//! {"event":"ice-candidate","data":{"room":"room1","candidate":"candidate:...","sdpMid":"0","sdpMLineIndex":0}}
//! {"event":"ready","data":{"room":"room1"}}
//! ```

use crate::media::{IceCandidate, SdpKind, SessionDescription};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Signaling message types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// Join a rendezvous room (client to relay, once per connection)
    Join(RoomPayload),

    /// Both participants are present (relay to clients)
    Ready(RoomPayload),

    /// SDP offer for the other participant
    Offer(DescriptionPayload),

    /// SDP answer for the other participant
    Answer(DescriptionPayload),

    /// Connectivity candidate for the other participant
    IceCandidate(CandidatePayload),
}

/// Payload carrying only the room name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomPayload {
    pub room: String,
}

/// Payload for offer/answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DescriptionPayload {
    /// Room the sender joined
    #[serde(default)]
    pub room: String,

    /// Description kind, repeated inside the payload
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SdpKind>,

    /// SDP text
    pub sdp: String,
}

/// Payload for ice-candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidatePayload {
    /// Room the sender joined
    #[serde(default)]
    pub room: String,

    /// Candidate line
    pub candidate: String,

    /// Media-section identifier tag
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,

    /// Media-section index, a signed 32-bit integer on the wire
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: i32,
}

impl SignalingMessage {
    /// Room join request
    pub fn join(room: &str) -> Self {
        SignalingMessage::Join(RoomPayload {
            room: room.to_string(),
        })
    }

    /// Room ready notification
    pub fn ready(room: &str) -> Self {
        SignalingMessage::Ready(RoomPayload {
            room: room.to_string(),
        })
    }

    /// Offer or answer message for a local description
    pub fn description(room: &str, description: &SessionDescription) -> Self {
        let payload = DescriptionPayload {
            room: room.to_string(),
            kind: Some(description.kind()),
            sdp: description.sdp().to_string(),
        };

        match description.kind() {
            SdpKind::Offer => SignalingMessage::Offer(payload),
            SdpKind::Answer => SignalingMessage::Answer(payload),
        }
    }

    /// Candidate message for a local candidate
    pub fn candidate(room: &str, candidate: &IceCandidate) -> Self {
        SignalingMessage::IceCandidate(CandidatePayload {
            room: room.to_string(),
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: i32::from(candidate.sdp_mline_index),
        })
    }

    /// Convert message to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::Serialization(format!("Failed to serialize signaling message: {}", e))
        })
    }

    /// Parse message from JSON string
    ///
    /// Unknown events and missing required fields are reported as
    /// `MalformedMessage`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::MalformedMessage(format!("Failed to parse signaling message: {}", e))
        })
    }

    /// Get the event name
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalingMessage::Join(_) => "join",
            SignalingMessage::Ready(_) => "ready",
            SignalingMessage::Offer(_) => "offer",
            SignalingMessage::Answer(_) => "answer",
            SignalingMessage::IceCandidate(_) => "ice-candidate",
        }
    }

    /// Room named in the payload
    pub fn room(&self) -> &str {
        match self {
            SignalingMessage::Join(p) | SignalingMessage::Ready(p) => &p.room,
            SignalingMessage::Offer(p) | SignalingMessage::Answer(p) => &p.room,
            SignalingMessage::IceCandidate(p) => &p.room,
        }
    }
}

impl DescriptionPayload {
    /// Build the remote description; the envelope event decides the kind
    pub fn into_description(self, kind: SdpKind) -> Result<SessionDescription> {
        if let Some(declared) = self.kind {
            if declared != kind {
                return Err(Error::MalformedMessage(format!(
                    "{} event carries a {} description",
                    kind, declared
                )));
            }
        }

        Ok(SessionDescription::new(kind, self.sdp))
    }
}

impl CandidatePayload {
    /// Build the remote candidate, rejecting out-of-range media-section indices
    pub fn into_candidate(self) -> Result<IceCandidate> {
        let index = u16::try_from(self.sdp_mline_index).map_err(|_| {
            Error::MalformedMessage(format!(
                "sdpMLineIndex out of range: {}",
                self.sdp_mline_index
            ))
        })?;

        Ok(IceCandidate::new(self.candidate, self.sdp_mid, index))
    }
}
