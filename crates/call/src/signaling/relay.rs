//! Rendezvous relay server
//!
//! Accepts WebSocket connections, groups them into rooms by the `join`
//! message, and relays `offer`/`answer`/`ice-candidate` frames verbatim to
//! the other members of the sender's room. When a room reaches two members
//! every member receives `ready`.

use super::protocol::SignalingMessage;
use crate::Result;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Message, Result as WsResult},
};
use tracing::{debug, error, info, warn};

/// Members of one room, keyed by connection id
type Room = HashMap<String, mpsc::UnboundedSender<String>>;

/// Shared state across all relay connections
#[derive(Default)]
pub struct RelayState {
    rooms: RwLock<HashMap<String, Room>>,
}

impl RelayState {
    /// Number of members currently in a room
    pub async fn room_size(&self, room: &str) -> usize {
        self.rooms.read().await.get(room).map_or(0, HashMap::len)
    }

    /// Add a connection to a room, returning the new member count
    async fn join(&self, room: &str, conn_id: &str, tx: mpsc::UnboundedSender<String>) -> usize {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.to_string()).or_default();
        members.insert(conn_id.to_string(), tx);
        members.len()
    }

    async fn leave(&self, room: &str, conn_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(conn_id);
            if members.is_empty() {
                rooms.remove(room);
                debug!(%room, "Room closed");
            }
        }
    }

    /// Send a frame to every member of a room except `skip`
    async fn broadcast(&self, room: &str, skip: Option<&str>, frame: &str) -> usize {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            return 0;
        };

        let mut delivered = 0;
        for (conn_id, tx) in members {
            if Some(conn_id.as_str()) == skip {
                continue;
            }
            if tx.send(frame.to_string()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

/// WebSocket relay server
///
/// # Example
///
/// ```
/// use chitchat_call::RelayServer;
///
/// # tokio_test::block_on(async {
/// let relay = RelayServer::bind("127.0.0.1:0").await?;
/// let handle = relay.start()?;
/// assert!(handle.url().starts_with("ws://127.0.0.1:"));
/// assert_eq!(handle.state().room_size("room1").await, 0);
///
/// handle.shutdown().await;
/// # Ok::<(), chitchat_call::Error>(())
/// # });
/// ```
pub struct RelayServer {
    listener: TcpListener,
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Bind the relay to an address (use port 0 for an ephemeral port)
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(RelayState::default()),
        })
    }

    /// Address the relay is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Get shared state (for external access)
    pub fn state(&self) -> Arc<RelayState> {
        Arc::clone(&self.state)
    }

    /// Run the accept loop on the current runtime
    ///
    /// Returns a handle that can be used to shut down the relay.
    pub fn start(self) -> Result<RelayHandle> {
        let addr = self.local_addr()?;
        let state = Arc::clone(&self.state);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let task = tokio::spawn(self.run(shutdown_tx.clone()));

        Ok(RelayHandle {
            addr,
            state,
            shutdown_tx,
            task,
        })
    }

    /// Accept loop; returns when a shutdown signal is sent on `shutdown_tx`
    ///
    /// Open connections are closed on the same signal.
    pub async fn run(self, shutdown_tx: broadcast::Sender<()>) {
        let listener = self.listener;
        let state = self.state;
        let mut shutdown = shutdown_tx.subscribe();

        match listener.local_addr() {
            Ok(addr) => info!("Relay listening on ws://{}", addr),
            Err(e) => warn!("Relay listening on unknown address: {}", e),
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            info!("Accepted WebSocket connection from {}", peer_addr);
                            let state = Arc::clone(&state);
                            let shutdown = shutdown_tx.subscribe();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, state, shutdown).await {
                                    error!("WebSocket connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept WebSocket connection: {}", e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Relay received shutdown signal");
                    break;
                }
            }
        }

        info!("Relay accept loop exited");
    }
}

/// Handle for controlling a running relay
pub struct RelayHandle {
    addr: SocketAddr,
    state: Arc<RelayState>,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Address the relay is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// WebSocket URL clients should connect to
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Shared room state
    pub fn state(&self) -> Arc<RelayState> {
        Arc::clone(&self.state)
    }

    /// Shut down the relay and close every open connection
    pub async fn shutdown(self) {
        info!("Sending shutdown signal to relay");
        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.task.await {
            warn!("Relay task join error: {}", e);
        }
        info!("Relay stopped");
    }
}

/// Handle a single relay connection
async fn handle_connection(
    stream: TcpStream,
    state: Arc<RelayState>,
    mut shutdown: broadcast::Receiver<()>,
) -> WsResult<()> {
    let addr = stream.peer_addr()?;
    let ws_stream = accept_async(stream).await?;
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(%conn_id, "New relay connection from: {}", addr);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Frames relayed to this connection by other members
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let forward_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut joined: Option<String> = None;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&text, &conn_id, &state, &tx, &mut joined).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%conn_id, "Relay connection closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(%conn_id, "WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            _ = shutdown.recv() => {
                debug!(%conn_id, "Closing relay connection for shutdown");
                break;
            }
        }
    }

    if let Some(room) = joined.take() {
        state.leave(&room, &conn_id).await;
        info!(%conn_id, %room, "Left room");
    }

    // Dropping the last sender lets the forward task flush and close the socket
    drop(tx);
    if let Err(e) = forward_task.await {
        debug!("Forward task join error: {}", e);
    }

    Ok(())
}

/// Route one text frame from a connection
async fn handle_frame(
    text: &str,
    conn_id: &str,
    state: &RelayState,
    tx: &mpsc::UnboundedSender<String>,
    joined: &mut Option<String>,
) {
    let msg = match SignalingMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(%conn_id, "Dropping frame: {}", e);
            return;
        }
    };

    match msg {
        SignalingMessage::Join(payload) => {
            if let Some(previous) = joined.take() {
                state.leave(&previous, conn_id).await;
            }

            let size = state.join(&payload.room, conn_id, tx.clone()).await;
            info!(%conn_id, room = %payload.room, size, "Joined room");

            if size == 2 {
                match SignalingMessage::ready(&payload.room).to_json() {
                    Ok(ready) => {
                        state.broadcast(&payload.room, None, &ready).await;
                    }
                    Err(e) => error!("Failed to encode ready message: {}", e),
                }
            }

            *joined = Some(payload.room);
        }
        SignalingMessage::Ready(_) => {
            debug!(%conn_id, "Ignoring ready sent by client");
        }
        msg => {
            let Some(room) = joined.as_deref() else {
                warn!(%conn_id, event = msg.event_name(), "Dropping frame from connection outside any room");
                return;
            };

            let delivered = state.broadcast(room, Some(conn_id), text).await;
            debug!(%conn_id, %room, event = msg.event_name(), delivered, "Relayed frame");
        }
    }
}
