//! WebSocket signaling channel to the rendezvous relay

use super::protocol::SignalingMessage;
use super::{SignalingChannel, SignalingEvent};
use crate::media::{IceCandidate, SdpKind, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle of the channel
enum Link {
    Disconnected,
    Connecting,
    /// Outgoing frames for the sender task
    Connected(mpsc::UnboundedSender<Message>),
}

/// Signaling channel over a WebSocket to the relay
///
/// `connect` returns immediately; the socket is opened by a background task
/// that reports the outcome as [`SignalingEvent::Connected`] or
/// [`SignalingEvent::Disconnected`].
pub struct WebSocketSignalingChannel {
    /// Relay URL
    url: String,

    /// Room joined after each connect
    room: String,

    /// Event sink for the orchestrator
    events: mpsc::UnboundedSender<SignalingEvent>,

    link: Arc<Mutex<Link>>,
}

impl WebSocketSignalingChannel {
    /// Create a new signaling channel
    ///
    /// # Arguments
    ///
    /// * `url` - Relay URL (ws:// or wss://)
    /// * `room` - Rendezvous room to join on connect
    /// * `events` - Channel receiving signaling events
    pub fn new(url: &str, room: &str, events: mpsc::UnboundedSender<SignalingEvent>) -> Self {
        Self {
            url: url.to_string(),
            room: room.to_string(),
            events,
            link: Arc::new(Mutex::new(Link::Disconnected)),
        }
    }

    /// Check if the socket is currently open
    pub async fn is_connected(&self) -> bool {
        matches!(*self.link.lock().await, Link::Connected(_))
    }

    /// Relay URL
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_message(&self, msg: SignalingMessage) -> Result<()> {
        let json = msg.to_json()?;

        let link = self.link.lock().await;
        let Link::Connected(tx) = &*link else {
            return Err(Error::Transport(format!(
                "Cannot send {}: not connected to {}",
                msg.event_name(),
                self.url
            )));
        };

        debug!(event = msg.event_name(), "Sending signaling message");
        tx.send(Message::Text(json))
            .map_err(|_| Error::Transport("Signaling connection closed".to_string()))
    }

    /// Connection task: opens the socket, joins the room, then pumps frames
    /// until the connection ends
    async fn run(
        url: String,
        room: String,
        events: mpsc::UnboundedSender<SignalingEvent>,
        link: Arc<Mutex<Link>>,
    ) {
        info!("Connecting to signaling server: {}", url);

        let ws_stream = match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                warn!("Failed to connect to signaling server {}: {}", url, e);
                *link.lock().await = Link::Disconnected;
                let _ = events.send(SignalingEvent::Disconnected);
                return;
            }
        };

        info!(%room, "Connected to signaling server");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        // Join goes out as the first frame, before anyone can send on the link
        match SignalingMessage::join(&room).to_json() {
            Ok(json) => {
                let _ = tx.send(Message::Text(json));
            }
            Err(e) => error!("Failed to encode join message: {}", e),
        }

        *link.lock().await = Link::Connected(tx);
        let _ = events.send(SignalingEvent::Connected);

        let sender = tokio::spawn(Self::sender_task(write, rx));
        Self::receiver_task(read, &events).await;

        // Dropping the outgoing sender ends the sender task
        *link.lock().await = Link::Disconnected;
        if let Err(e) = sender.await {
            debug!("Sender task join error: {}", e);
        }

        info!("Disconnected from signaling server");
        let _ = events.send(SignalingEvent::Disconnected);
    }

    /// Sender task: sends messages from channel to WebSocket
    async fn sender_task(
        mut write: SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }

        let _ = write.close().await;
        debug!("Sender task terminated");
    }

    /// Receiver task: decodes frames into signaling events
    async fn receiver_task(
        mut read: SplitStream<WsStream>,
        events: &mpsc::UnboundedSender<SignalingEvent>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match Self::decode(&text) {
                    Ok(Some(event)) => {
                        if events.send(event).is_err() {
                            debug!("Signaling event receiver dropped");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Dropping signaling message: {}", e),
                },
                Ok(Message::Close(_)) => {
                    info!("WebSocket connection closed");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        debug!("Receiver task terminated");
    }

    /// Decode one text frame
    fn decode(text: &str) -> Result<Option<SignalingEvent>> {
        let event = match SignalingMessage::from_json(text)? {
            SignalingMessage::Offer(payload) => Some(SignalingEvent::DescriptionReceived(
                payload.into_description(SdpKind::Offer)?,
            )),
            SignalingMessage::Answer(payload) => Some(SignalingEvent::DescriptionReceived(
                payload.into_description(SdpKind::Answer)?,
            )),
            SignalingMessage::IceCandidate(payload) => {
                Some(SignalingEvent::CandidateReceived(payload.into_candidate()?))
            }
            SignalingMessage::Ready(payload) => {
                info!(room = %payload.room, "Both participants present");
                Some(SignalingEvent::PeerReady)
            }
            SignalingMessage::Join(payload) => {
                debug!(room = %payload.room, "Ignoring join echoed by relay");
                None
            }
        };

        Ok(event)
    }
}

#[async_trait]
impl SignalingChannel for WebSocketSignalingChannel {
    async fn connect(&mut self) -> Result<()> {
        let mut link = self.link.lock().await;
        if !matches!(*link, Link::Disconnected) {
            debug!("Signaling connect ignored: already connecting or connected");
            return Ok(());
        }
        *link = Link::Connecting;
        drop(link);

        tokio::spawn(Self::run(
            self.url.clone(),
            self.room.clone(),
            self.events.clone(),
            Arc::clone(&self.link),
        ));

        Ok(())
    }

    async fn send_description(&mut self, description: &SessionDescription) -> Result<()> {
        self.send_message(SignalingMessage::description(&self.room, description))
            .await
    }

    async fn send_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        self.send_message(SignalingMessage::candidate(&self.room, candidate))
            .await
    }
}
