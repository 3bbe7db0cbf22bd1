//! Peer-to-peer voice calls over a WebSocket rendezvous relay
//!
//! Two participants join the same room on a relay, exchange an SDP
//! offer/answer and ICE candidates through it, and then talk over a direct
//! WebRTC audio connection.
//!
//! # Features
//!
//! - **Call negotiation state machine**: sequences out-of-order offers,
//!   answers and candidates into a correct session setup and teardown
//! - **Candidate buffering**: remote candidates that arrive early are held
//!   and applied in arrival order once a remote description is in place
//! - **WebRTC media engine**: Opus audio track over `webrtc` peer connections
//! - **JSON signaling**: `{"event","data"}` frames over WebSocket
//! - **Relay server**: room-based rendezvous for local testing and small deployments
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Presentation (CLI / UI)                             │
//! │  ↓ CallHandle: connect, start_call, answer_call, ... │
//! │  CallOrchestrator (single task)                      │
//! │  ├─ CallMachine (pure state transitions)             │
//! │  ├─ MediaEngine ── WebRtcMediaEngine                 │
//! │  ├─ SignalingChannel ── WebSocketSignalingChannel    │
//! │  └─ StatusPublisher (watch + broadcast)              │
//! │     ↓ WebSocket                                      │
//! │  RelayServer (rooms)                                 │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use chitchat_call::CallConfig;
//!
//! let config = CallConfig::default()
//!     .with_signaling_url("wss://relay.example.com")
//!     .with_room("kitchen");
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.room, "kitchen");
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use chitchat_call::{CallConfig, CallOrchestrator};
//!
//! # async fn example() -> chitchat_call::Result<()> {
//! let (call, _task) = CallOrchestrator::launch(CallConfig::default()).await?;
//!
//! let mut updates = call.updates();
//! call.connect()?;
//! call.start_call()?;
//!
//! while let Ok(status) = updates.recv().await {
//!     println!("{}", status);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod audio_session;
pub mod call;
pub mod config;
pub mod error;
pub mod media;
pub mod signaling;

pub use audio_session::{configure_audio_session, AudioSessionConfigurator, AudioSessionProfile};
pub use call::{CallHandle, CallOrchestrator, CallRole, CallState, CallStatus};
pub use config::{AudioTrackConfig, CallConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use media::{
    IceCandidate, IceConnectionState, MediaEngine, MediaEvent, SdpKind, SessionDescription,
    WebRtcMediaEngine,
};
pub use signaling::{
    RelayHandle, RelayServer, SignalingChannel, SignalingEvent, WebSocketSignalingChannel,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
