//! Server network layer: WebSocket transport, outbound dispatch and the scheduler tick

use crate::client_manager::ClientManager;
use crate::registry::RoomRegistry;
use crate::session::SessionManager;
use crate::utils::get_timestamp;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientEvent, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Messages sent from the session layer to the network sender task
#[derive(Debug, Clone)]
pub enum GameMessage {
    SendEvent {
        session: u32,
        event: ServerEvent,
    },
    BroadcastEvent {
        room: String,
        event: ServerEvent,
        exclude: Option<u32>,
    },
    Subscribe {
        session: u32,
        room: String,
    },
    Unsubscribe {
        session: u32,
    },
}

/// Main server coordinating connections, rooms and the scheduler
pub struct Server {
    listener: TcpListener,
    clients: Arc<RwLock<ClientManager>>,
    sessions: Arc<SessionManager>,
    tick_duration: Duration,

    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            sessions: Arc::new(SessionManager::new(RoomRegistry::new(), game_tx)),
            tick_duration,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    /// Encodes an event as a JSON text frame
    fn encode(event: &ServerEvent) -> Option<String> {
        match serde_json::to_string(event) {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!("Failed to serialize {}: {}", event.name(), e);
                None
            }
        }
    }

    /// Spawns the task that delivers session output in FIFO order
    fn spawn_network_sender(&mut self) {
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendEvent { session, event } => {
                        if let Some(frame) = Self::encode(&event) {
                            if !clients.read().await.send_to(session, frame) {
                                debug!("Dropped {} for closed session {}", event.name(), session);
                            }
                        }
                    }
                    GameMessage::BroadcastEvent {
                        room,
                        event,
                        exclude,
                    } => {
                        if let Some(frame) = Self::encode(&event) {
                            clients.read().await.broadcast(&room, &frame, exclude);
                        }
                    }
                    GameMessage::Subscribe { session, room } => {
                        clients.write().await.subscribe(session, room);
                    }
                    GameMessage::Unsubscribe { session } => {
                        clients.write().await.unsubscribe(session);
                    }
                }
            }
        });
    }

    /// Spawns the fixed-rate task that drains queued moves in every room
    fn spawn_scheduler(&self) {
        let sessions = Arc::clone(&self.sessions);
        let tick_duration = self.tick_duration;

        tokio::spawn(async move {
            let mut ticker = interval(tick_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                sessions.tick(get_timestamp()).await;
            }
        });
    }

    /// Runs one connection until the socket closes
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        clients: Arc<RwLock<ClientManager>>,
        sessions: Arc<SessionManager>,
    ) {
        let socket = match accept_async(stream).await {
            Ok(socket) => socket,
            Err(e) => {
                warn!("WebSocket handshake with {} failed: {}", addr, e);
                return;
            }
        };
        let (mut write, mut read) = socket.split();

        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
        let client_id = clients.write().await.add_client(addr, frame_tx);

        let Some(client_id) = client_id else {
            warn!("Rejecting {}: server full", addr);
            let rejection = ServerEvent::JoinError {
                message: "Server full".to_string(),
            };
            if let Some(frame) = Self::encode(&rejection) {
                let _ = write.send(Message::Text(frame)).await;
            }
            let _ = write.close().await;
            return;
        };

        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    debug!("Write to client {} failed: {}", client_id, e);
                    break;
                }
            }
            let _ = write.close().await;
        });

        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => sessions.handle(client_id, event, get_timestamp()).await,
                    Err(e) => warn!("Malformed event from client {}: {}", client_id, e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Read from client {} failed: {}", client_id, e);
                    break;
                }
            }
        }

        sessions.disconnect(client_id, get_timestamp()).await;

        let mut clients = clients.write().await;
        if let Some(client) = clients.get(client_id) {
            debug!(
                "Client {} was connected for {:?}",
                client_id,
                client.connected_at.elapsed()
            );
        }
        clients.remove_client(&client_id);
    }

    /// Accepts connections until the listener fails
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_sender();
        self.spawn_scheduler();

        info!("Server started successfully");

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let clients = Arc::clone(&self.clients);
            let sessions = Arc::clone(&self.sessions);
            tokio::spawn(Self::handle_connection(stream, addr, clients, sessions));
        }
    }
}
