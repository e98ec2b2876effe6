use serde::{Deserialize, Serialize};

pub mod board;
pub mod command;
pub mod protocol;

pub use board::{Board, Color, Piece, PieceKind, Square, BOARD_SIZE};
pub use command::{Action, ActionKind, Command, Filter, ParseError, Step};
pub use protocol::{ClientEvent, MoveRequest, QueuedMove, RoomSnapshot, ServerEvent};

pub const PAWN_COOLDOWN_MS: u64 = 2000;
pub const KNIGHT_COOLDOWN_MS: u64 = 6000;
pub const BISHOP_COOLDOWN_MS: u64 = 6000;
pub const ROOK_COOLDOWN_MS: u64 = 9000;
pub const QUEEN_COOLDOWN_MS: u64 = 0;
pub const KING_COOLDOWN_MS: u64 = 0;

/// Milliseconds a square stays locked after a piece of each kind lands on it.
///
/// Serialized with single-letter keys. Missing keys fall back to the
/// defaults, so clients may send a partial override such as `{"p": 500}`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CooldownConfig {
    #[serde(rename = "p")]
    pub pawn: u64,
    #[serde(rename = "n")]
    pub knight: u64,
    #[serde(rename = "b")]
    pub bishop: u64,
    #[serde(rename = "r")]
    pub rook: u64,
    #[serde(rename = "q")]
    pub queen: u64,
    #[serde(rename = "k")]
    pub king: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            pawn: PAWN_COOLDOWN_MS,
            knight: KNIGHT_COOLDOWN_MS,
            bishop: BISHOP_COOLDOWN_MS,
            rook: ROOK_COOLDOWN_MS,
            queen: QUEEN_COOLDOWN_MS,
            king: KING_COOLDOWN_MS,
        }
    }
}

impl CooldownConfig {
    pub fn duration_for(&self, kind: PieceKind) -> u64 {
        match kind {
            PieceKind::Pawn => self.pawn,
            PieceKind::Knight => self.knight,
            PieceKind::Bishop => self.bishop,
            PieceKind::Rook => self.rook,
            PieceKind::Queen => self.queen,
            PieceKind::King => self.king,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    White,
    Black,
    Spectator,
}

impl Team {
    /// The color this team plays, None for spectators
    pub fn color(self) -> Option<Color> {
        match self {
            Team::White => Some(Color::White),
            Team::Black => Some(Color::Black),
            Team::Spectator => None,
        }
    }

    pub fn is_player(self) -> bool {
        self != Team::Spectator
    }
}

impl From<Color> for Team {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Team::White,
            Color::Black => Team::Black,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Team::White => write!(f, "white"),
            Team::Black => write!(f, "black"),
            Team::Spectator => write!(f, "spectator"),
        }
    }
}

/// Room lifecycle. Cancelled rooms are simply removed from the registry.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lobby,
    Started,
    Over,
}

/// A roster entry. `id` is the current session; `username` is the identity
/// that survives reconnects.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: u32,
    pub username: String,
    pub team: Team,
    pub is_ready: bool,
    pub wins: u32,
    pub losses: u32,
}

impl Player {
    pub fn new(id: u32, username: &str, team: Team) -> Self {
        Self {
            id,
            username: username.to_string(),
            team,
            is_ready: false,
            wins: 0,
            losses: 0,
        }
    }
}
