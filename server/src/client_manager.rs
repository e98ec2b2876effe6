//! Connected WebSocket sessions and their room subscriptions
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Session id assignment and capacity limits
//! - The outbound channel feeding each connection's writer task
//! - Which room each session currently listens to
//!
//! Game state lives in the rooms. The client manager only knows where to
//! deliver already-serialized frames.

use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// A connected socket
///
/// Each client holds:
/// - Its session id and peer address
/// - The sender half of its writer task's channel
/// - The room it is subscribed to, if any
#[derive(Debug)]
pub struct Client {
    /// Session id, also used as the player id inside rooms
    pub id: u32,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// When the socket was accepted
    pub connected_at: Instant,
    /// Room code this session receives broadcasts for
    pub room: Option<String>,
    sender: mpsc::UnboundedSender<String>,
}

impl Client {
    /// Creates a client that is not yet subscribed to any room
    pub fn new(id: u32, addr: SocketAddr, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            room: None,
            sender,
        }
    }

    /// Queues a text frame for the writer task
    ///
    /// Returns false if the writer has already shut down, which happens
    /// when the socket closed between routing and delivery.
    pub fn send(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }
}

/// Tracks every connected session
///
/// Session ids start at 1 and are never reused during the process lifetime,
/// so a late message addressed to a closed session can never reach a new one.
pub struct ClientManager {
    /// Connected clients indexed by session id
    clients: HashMap<u32, Client>,
    /// Next available session id
    next_client_id: u32,
    /// Maximum number of concurrent sockets
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty manager with the given capacity
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns Some(session_id), or None if the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<String>,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));

        Some(client_id)
    }

    /// Removes a client, dropping its outbound channel
    ///
    /// Once the sender is dropped the writer task drains what is already
    /// queued and closes the socket.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Points a session at a room, replacing any previous subscription
    pub fn subscribe(&mut self, client_id: u32, room: String) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                debug!("Client {} subscribed to room {}", client_id, room);
                client.room = Some(room);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.room = None;
        }
    }

    /// Delivers a frame to one session
    pub fn send_to(&self, client_id: u32, frame: String) -> bool {
        self.clients
            .get(&client_id)
            .map_or(false, |client| client.send(frame))
    }

    /// Delivers a frame to every subscriber of `room` except `exclude`.
    /// Returns the number of sessions reached.
    pub fn broadcast(&self, room: &str, frame: &str, exclude: Option<u32>) -> usize {
        self.clients
            .values()
            .filter(|client| client.room.as_deref() == Some(room))
            .filter(|client| Some(client.id) != exclude)
            .filter(|client| client.send(frame.to_string()))
            .count()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
