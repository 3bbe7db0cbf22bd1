//! WebRTC-backed media session engine
//!
//! Wraps one `webrtc::RTCPeerConnection` per negotiation round. Each session
//! carries a generation number; callbacks from a session that has been
//! replaced by [`MediaEngine::reset`] are dropped instead of reaching the
//! orchestrator.

use crate::config::CallConfig;
use crate::media::{
    IceCandidate, IceConnectionState, MediaEngine, MediaEvent, SdpKind, SessionDescription,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine as CodecRegistry, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Media engine backed by webrtc-rs
pub struct WebRtcMediaEngine {
    config: CallConfig,
    events: mpsc::UnboundedSender<MediaEvent>,
    /// Generation of the live session, shared with its callbacks
    generation: Arc<AtomicU64>,
    session: MediaSession,
}

/// One peer connection plus its local audio track
struct MediaSession {
    generation: u64,
    session_id: String,
    peer_connection: Arc<RTCPeerConnection>,
    audio_track: Option<Arc<TrackLocalStaticSample>>,
    audio_sender: Option<Arc<RTCRtpSender>>,
    /// Kind of remote description applied in this round, if any
    remote_applied: Option<SdpKind>,
}

impl WebRtcMediaEngine {
    /// Create an engine with a ready session
    ///
    /// # Arguments
    ///
    /// * `config` - STUN/TURN servers and local audio track settings
    /// * `events` - Channel receiving local candidates and connectivity changes
    #[instrument(skip(config, events), fields(room = %config.room))]
    pub async fn new(config: CallConfig, events: mpsc::UnboundedSender<MediaEvent>) -> Result<Self> {
        let generation = Arc::new(AtomicU64::new(0));
        let session = MediaSession::open(&config, 0, Arc::clone(&generation), events.clone()).await?;

        Ok(Self {
            config,
            events,
            generation,
            session,
        })
    }

    /// Identifier of the live session
    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// Local audio track of the live session, for feeding captured samples
    pub fn local_audio_track(&self) -> Option<Arc<TrackLocalStaticSample>> {
        self.session.audio_track.clone()
    }

    /// Underlying peer connection of the live session
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.session.peer_connection
    }

    async fn set_local(&self, description: RTCSessionDescription) -> Result<SessionDescription> {
        let pc = &self.session.peer_connection;
        let kind = match description.sdp_type {
            webrtc::peer_connection::sdp::sdp_type::RTCSdpType::Answer => SdpKind::Answer,
            _ => SdpKind::Offer,
        };

        pc.set_local_description(description)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set local description: {}", e)))?;

        let local = pc.local_description().await.ok_or_else(|| {
            Error::Negotiation(format!("No local description after setting {}", kind))
        })?;

        debug!(
            session_id = %self.session.session_id,
            kind = %kind,
            bytes = local.sdp.len(),
            "Local description set"
        );

        Ok(SessionDescription::new(kind, local.sdp))
    }
}

#[async_trait]
impl MediaEngine for WebRtcMediaEngine {
    async fn create_offer(&mut self) -> Result<SessionDescription> {
        if self.session.audio_sender.is_none() {
            return Err(Error::MissingLocalMedia);
        }

        let offer = self
            .session
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to create offer: {}", e)))?;

        self.set_local(offer).await
    }

    async fn create_answer(&mut self) -> Result<SessionDescription> {
        if self.session.remote_applied != Some(SdpKind::Offer) {
            return Err(Error::InvalidNegotiationState(
                "cannot create an answer before a remote offer is applied".to_string(),
            ));
        }

        let answer = self
            .session
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to create answer: {}", e)))?;

        self.set_local(answer).await
    }

    async fn apply_remote_description(&mut self, description: SessionDescription) -> Result<()> {
        if let Some(applied) = self.session.remote_applied {
            return Err(Error::InvalidNegotiationState(format!(
                "remote {} already applied in this round, refusing {}",
                applied,
                description.kind()
            )));
        }

        let kind = description.kind();
        let sdp = description.sdp().to_string();
        let remote = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp),
            SdpKind::Answer => RTCSessionDescription::answer(sdp),
        }
        .map_err(|e| Error::Negotiation(format!("Invalid {} SDP: {}", kind, e)))?;

        self.session
            .peer_connection
            .set_remote_description(remote)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set remote description: {}", e)))?;

        self.session.remote_applied = Some(kind);
        info!(session_id = %self.session.session_id, kind = %kind, "Remote description applied");

        Ok(())
    }

    async fn apply_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        debug!(
            session_id = %self.session.session_id,
            candidate = %candidate.candidate,
            "Adding remote ICE candidate"
        );

        self.session
            .peer_connection
            .add_ice_candidate(candidate.into())
            .await
            .map_err(|e| Error::IceCandidate(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn reset(&mut self) -> Result<()> {
        let next = self.session.generation + 1;

        info!(
            old_session = %self.session.session_id,
            old_generation = self.session.generation,
            generation = next,
            "Resetting media session"
        );

        // On failure the current session stays live and untouched
        let fresh =
            MediaSession::open(&self.config, next, Arc::clone(&self.generation), self.events.clone())
                .await?;

        // Callbacks of the old session are stale from here on, including its Closed
        self.generation.store(next, Ordering::SeqCst);
        let old = std::mem::replace(&mut self.session, fresh);

        if let Err(e) = old.peer_connection.close().await {
            warn!(session_id = %old.session_id, "Error closing peer connection: {}", e);
        }

        Ok(())
    }
}

impl MediaSession {
    async fn open(
        config: &CallConfig,
        generation: u64,
        live_generation: Arc<AtomicU64>,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();

        let mut codecs = CodecRegistry::default();
        codecs
            .register_default_codecs()
            .map_err(|e| Error::PeerConnection(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut codecs)
            .map_err(|e| {
                Error::PeerConnection(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(codecs)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }))
            .collect();

        let peer_connection = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::PeerConnection(format!("Failed to create peer connection: {}", e)))?,
        );

        let candidate_tx = events.clone();
        let candidate_generation = Arc::clone(&live_generation);
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = candidate_tx.clone();
            let live = Arc::clone(&candidate_generation);

            Box::pin(async move {
                // None marks the end of gathering
                let Some(candidate) = candidate else { return };

                if live.load(Ordering::SeqCst) != generation {
                    debug!(generation, "Dropping candidate from superseded session");
                    return;
                }

                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(MediaEvent::LocalCandidate(IceCandidate::from(init)));
                    }
                    Err(e) => warn!("Failed to encode local ICE candidate: {}", e),
                }
            })
        }));

        let state_tx = events;
        let state_generation = live_generation;
        peer_connection.on_ice_connection_state_change(Box::new(
            move |state: RTCIceConnectionState| {
                let tx = state_tx.clone();
                let live = Arc::clone(&state_generation);

                Box::pin(async move {
                    let Some(state) = map_connection_state(state) else { return };

                    if live.load(Ordering::SeqCst) != generation {
                        debug!(generation, ?state, "Dropping state change from superseded session");
                        return;
                    }

                    debug!(generation, ?state, "ICE connection state changed");
                    let _ = tx.send(MediaEvent::ConnectionStateChanged(state));
                })
            },
        ));

        let audio_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: config.audio.clock_rate,
                channels: config.audio.channels,
                ..Default::default()
            },
            config.audio.track_id.clone(),
            config.audio.stream_id.clone(),
        ));

        let audio_sender = peer_connection
            .add_track(Arc::clone(&audio_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::PeerConnection(format!("Failed to add audio track: {}", e)))?;

        // Drain RTCP so the sender's interceptors keep running
        let rtcp_sender = Arc::clone(&audio_sender);
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtcp_sender.read(&mut rtcp_buf).await {}
        });

        info!(%session_id, generation, "Media session opened");

        Ok(Self {
            generation,
            session_id,
            peer_connection,
            audio_track: Some(audio_track),
            audio_sender: Some(audio_sender),
            remote_applied: None,
        })
    }
}

fn map_connection_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        _ => None,
    }
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid.unwrap_or_default(),
            sdp_mline_index: init.sdp_mline_index.unwrap_or(0),
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: candidate.candidate,
            sdp_mid: (!candidate.sdp_mid.is_empty()).then_some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        }
    }
}
