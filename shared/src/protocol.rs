//! JSON event envelopes exchanged over the WebSocket
//!
//! Every frame is `{"event": "<name>", "data": {...}}`. Field names are
//! camelCase on the wire.

use crate::board::{Board, Color, Square};
use crate::{CooldownConfig, Phase, Player, Team};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source and destination of a direct move, as sent by the board UI
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub start_row: i32,
    pub start_col: i32,
    pub end_row: i32,
    pub end_col: i32,
}

impl MoveRequest {
    pub fn new(start: Square, end: Square) -> Self {
        Self {
            start_row: start.row as i32,
            start_col: start.col as i32,
            end_row: end.row as i32,
            end_col: end.col as i32,
        }
    }

    /// None if either end lies off the board
    pub fn squares(&self) -> Option<(Square, Square)> {
        Some((
            Square::new(self.start_row, self.start_col)?,
            Square::new(self.end_row, self.end_col)?,
        ))
    }
}

/// One pending destination in a square's queue
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMove {
    pub end_row: u8,
    pub end_col: u8,
}

impl From<Square> for QueuedMove {
    fn from(square: Square) -> Self {
        Self {
            end_row: square.row,
            end_col: square.col,
        }
    }
}

/// Full room state, sent on every lobby change and on (re)join
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_code: String,
    pub owner_id: u32,
    pub players: Vec<Player>,
    pub phase: Phase,
    pub started: bool,
    pub winner: Option<Color>,
    pub board: Board,
    pub custom_cooldowns: CooldownConfig,
    /// Square key -> expiry in epoch milliseconds
    pub cooldowns: BTreeMap<String, u64>,
    pub move_queue: BTreeMap<String, Vec<QueuedMove>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        username: String,
        #[serde(default)]
        custom_cooldowns: Option<CooldownConfig>,
    },
    #[serde(rename_all = "camelCase", alias = "joinRoom")]
    EnterRoom { username: String, room_code: String },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_code: String },
    #[serde(rename_all = "camelCase")]
    ChangeTeam { room_code: String, team: Team },
    #[serde(rename_all = "camelCase")]
    SetReady { room_code: String, is_ready: bool },
    #[serde(rename_all = "camelCase")]
    UpdateSettings {
        room_code: String,
        custom_cooldowns: CooldownConfig,
    },
    #[serde(rename_all = "camelCase")]
    SwapTeams { room_code: String },
    #[serde(rename_all = "camelCase")]
    SetOwner { room_code: String, player_id: u32 },
    #[serde(rename_all = "camelCase")]
    StartGame { room_code: String },
    #[serde(rename_all = "camelCase")]
    StartNewMatch { room_code: String },
    #[serde(rename_all = "camelCase")]
    CancelRoom { room_code: String },
    #[serde(rename_all = "camelCase")]
    MakeMove {
        room_code: String,
        #[serde(rename = "move")]
        mv: MoveRequest,
        #[serde(default)]
        player_color: Option<Color>,
        /// Queue the move instead of failing when the piece is cooling down
        #[serde(default)]
        queue: bool,
    },
    #[serde(rename_all = "camelCase")]
    ExecuteCommand { room_code: String, command: String },
    #[serde(rename_all = "camelCase")]
    ReorderQueue {
        room_code: String,
        piece_key: String,
        previous_index: usize,
        current_index: usize,
    },
    /// A `move_index` of -1 clears the whole queue
    #[serde(rename_all = "camelCase")]
    CancelFromQueue {
        room_code: String,
        piece_key: String,
        move_index: i64,
    },
    #[serde(rename_all = "camelCase")]
    Resign { room_code: String },
}

impl ClientEvent {
    /// The room an event addresses, None for room creation
    pub fn room_code(&self) -> Option<&str> {
        match self {
            ClientEvent::CreateRoom { .. } => None,
            ClientEvent::EnterRoom { room_code, .. }
            | ClientEvent::LeaveRoom { room_code }
            | ClientEvent::ChangeTeam { room_code, .. }
            | ClientEvent::SetReady { room_code, .. }
            | ClientEvent::UpdateSettings { room_code, .. }
            | ClientEvent::SwapTeams { room_code }
            | ClientEvent::SetOwner { room_code, .. }
            | ClientEvent::StartGame { room_code }
            | ClientEvent::StartNewMatch { room_code }
            | ClientEvent::CancelRoom { room_code }
            | ClientEvent::MakeMove { room_code, .. }
            | ClientEvent::ExecuteCommand { room_code, .. }
            | ClientEvent::ReorderQueue { room_code, .. }
            | ClientEvent::CancelFromQueue { room_code, .. }
            | ClientEvent::Resign { room_code } => Some(room_code),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    LobbyState(RoomSnapshot),
    GameStarted(RoomSnapshot),
    #[serde(rename_all = "camelCase")]
    MoveMade {
        #[serde(rename = "move")]
        mv: MoveRequest,
        board: Board,
    },
    #[serde(rename_all = "camelCase")]
    QueueUpdated {
        move_queue: BTreeMap<String, Vec<QueuedMove>>,
    },
    CooldownsUpdated { cooldowns: BTreeMap<String, u64> },
    /// A queued move was dropped because it was no longer legal
    #[serde(rename_all = "camelCase")]
    QueueInvalidated {
        piece_key: String,
        end_row: u8,
        end_col: u8,
    },
    GameOver {
        winner: Color,
        board: Board,
        players: Vec<Player>,
    },
    CommandSuccess { message: String },
    CommandError { message: String },
    MoveError { message: String },
    JoinError { message: String },
    StartError { message: String },
    TeamError { message: String },
    RoomCancelled,
    PlayerLeft { username: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::LobbyState(_) => "lobbyState",
            ServerEvent::GameStarted(_) => "gameStarted",
            ServerEvent::MoveMade { .. } => "moveMade",
            ServerEvent::QueueUpdated { .. } => "queueUpdated",
            ServerEvent::CooldownsUpdated { .. } => "cooldownsUpdated",
            ServerEvent::QueueInvalidated { .. } => "queueInvalidated",
            ServerEvent::GameOver { .. } => "gameOver",
            ServerEvent::CommandSuccess { .. } => "commandSuccess",
            ServerEvent::CommandError { .. } => "commandError",
            ServerEvent::MoveError { .. } => "moveError",
            ServerEvent::JoinError { .. } => "joinError",
            ServerEvent::StartError { .. } => "startError",
            ServerEvent::TeamError { .. } => "teamError",
            ServerEvent::RoomCancelled => "roomCancelled",
            ServerEvent::PlayerLeft { .. } => "playerLeft",
        }
    }
}
