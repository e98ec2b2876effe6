//! Board representation and move legality
//!
//! The board is an 8x8 mailbox. Row 0 is rank 8 (black's back rank) and row 7
//! is rank 1 (white's back rank), so white advances toward row 0 and black
//! toward row 7. Legality here is purely geometric: there is no notion of
//! turns, check or cooldowns. Those are enforced by the server.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const BOARD_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Row delta of one step "forward" for this color
    pub fn forward(self) -> i32 {
        match self {
            Color::White => -1,
            Color::Black => 1,
        }
    }

    pub fn pawn_start_row(self) -> u8 {
        match self {
            Color::White => 6,
            Color::Black => 1,
        }
    }

    pub fn promotion_row(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

impl PieceKind {
    /// Parses a piece letter, ignoring case
    pub fn from_letter(letter: char) -> Option<PieceKind> {
        match letter.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'r' => Some(PieceKind::Rook),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'q' => Some(PieceKind::Queen),
            'k' => Some(PieceKind::King),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Rook => 'r',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
}

impl Piece {
    pub fn new(kind: PieceKind, color: Color) -> Self {
        Self { kind, color }
    }
}

/// A board cell addressed by (row, col), both in 0..8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Square {
    pub row: u8,
    pub col: u8,
}

impl Square {
    /// Returns None when the coordinates fall outside the board
    pub fn new(row: i32, col: i32) -> Option<Square> {
        let size = BOARD_SIZE as i32;
        if (0..size).contains(&row) && (0..size).contains(&col) {
            Some(Square {
                row: row as u8,
                col: col as u8,
            })
        } else {
            None
        }
    }

    pub fn offset(self, d_row: i32, d_col: i32) -> Option<Square> {
        Square::new(self.row as i32 + d_row, self.col as i32 + d_col)
    }

    /// Stable "row-col" key used to index cooldowns and queues
    pub fn key(self) -> String {
        format!("{}-{}", self.row, self.col)
    }

    pub fn from_key(key: &str) -> Option<Square> {
        let (row, col) = key.split_once('-')?;
        Square::new(row.trim().parse().ok()?, col.trim().parse().ok()?)
    }

    /// Parses algebraic notation such as "e4"
    pub fn from_algebraic(text: &str) -> Option<Square> {
        let mut chars = text.chars();
        let file = chars.next()?;
        let rank = chars.next()?;
        if chars.next().is_some() || !('a'..='h').contains(&file) {
            return None;
        }
        let rank = rank.to_digit(10)? as i32;
        if !(1..=8).contains(&rank) {
            return None;
        }
        Square::new(8 - rank, file as i32 - 'a' as i32)
    }

    /// Chess rank, 1..=8
    pub fn rank(self) -> u8 {
        BOARD_SIZE as u8 - self.row
    }

    pub fn file(self) -> char {
        (b'a' + self.col) as char
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file(), self.rank())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Option<Piece>; BOARD_SIZE]; BOARD_SIZE],
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

impl Board {
    pub fn empty() -> Self {
        Self {
            cells: [[None; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    /// Standard starting layout, black on rows 0-1 and white on rows 6-7
    pub fn initial() -> Self {
        use PieceKind::*;
        const BACK_RANK: [PieceKind; BOARD_SIZE] =
            [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];

        let mut board = Self::empty();
        for col in 0..BOARD_SIZE {
            board.cells[0][col] = Some(Piece::new(BACK_RANK[col], Color::Black));
            board.cells[1][col] = Some(Piece::new(Pawn, Color::Black));
            board.cells[6][col] = Some(Piece::new(Pawn, Color::White));
            board.cells[7][col] = Some(Piece::new(BACK_RANK[col], Color::White));
        }
        board
    }

    pub fn get(&self, square: Square) -> Option<Piece> {
        self.cells[square.row as usize][square.col as usize]
    }

    pub fn set(&mut self, square: Square, piece: Option<Piece>) {
        self.cells[square.row as usize][square.col as usize] = piece;
    }

    pub fn is_empty_at(&self, square: Square) -> bool {
        self.get(square).is_none()
    }

    /// All occupied squares in row-major order
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        self.cells.iter().enumerate().flat_map(|(row, cells)| {
            cells.iter().enumerate().filter_map(move |(col, cell)| {
                cell.map(|piece| {
                    (
                        Square {
                            row: row as u8,
                            col: col as u8,
                        },
                        piece,
                    )
                })
            })
        })
    }

    pub fn pieces_of(&self, color: Color) -> impl Iterator<Item = (Square, Piece)> + '_ {
        self.pieces().filter(move |(_, piece)| piece.color == color)
    }

    /// Checks whether the piece on `start` may move to `end` on the current board.
    ///
    /// Turn order, cooldowns and check are deliberately ignored. A move that
    /// would capture a piece of the mover's own color is never legal.
    pub fn is_legal_move(&self, start: Square, end: Square) -> bool {
        if start == end {
            return false;
        }
        let Some(piece) = self.get(start) else {
            return false;
        };
        if let Some(target) = self.get(end) {
            if target.color == piece.color {
                return false;
            }
        }

        let d_row = end.row as i32 - start.row as i32;
        let d_col = end.col as i32 - start.col as i32;
        let (abs_row, abs_col) = (d_row.abs(), d_col.abs());

        match piece.kind {
            PieceKind::Pawn => self.is_legal_pawn_move(piece.color, start, end, d_row, d_col),
            PieceKind::Rook => (d_row == 0 || d_col == 0) && self.is_path_clear(start, end),
            PieceKind::Bishop => abs_row == abs_col && self.is_path_clear(start, end),
            PieceKind::Queen => {
                (d_row == 0 || d_col == 0 || abs_row == abs_col) && self.is_path_clear(start, end)
            }
            PieceKind::Knight => (abs_row, abs_col) == (1, 2) || (abs_row, abs_col) == (2, 1),
            PieceKind::King => abs_row <= 1 && abs_col <= 1,
        }
    }

    fn is_legal_pawn_move(
        &self,
        color: Color,
        start: Square,
        end: Square,
        d_row: i32,
        d_col: i32,
    ) -> bool {
        let forward = color.forward();
        let target_empty = self.is_empty_at(end);

        if d_col == 0 {
            if d_row == forward {
                return target_empty;
            }
            if d_row == 2 * forward && start.row == color.pawn_start_row() {
                let between = start.offset(forward, 0);
                return target_empty && between.map_or(false, |sq| self.is_empty_at(sq));
            }
            return false;
        }

        // Diagonal steps are only allowed as captures
        d_col.abs() == 1 && d_row == forward && !target_empty
    }

    /// True when every square strictly between the endpoints is empty.
    /// Only meaningful for straight or diagonal lines.
    fn is_path_clear(&self, start: Square, end: Square) -> bool {
        let step_row = (end.row as i32 - start.row as i32).signum();
        let step_col = (end.col as i32 - start.col as i32).signum();

        let mut current = start.offset(step_row, step_col);
        while let Some(square) = current {
            if square == end {
                return true;
            }
            if !self.is_empty_at(square) {
                return false;
            }
            current = square.offset(step_row, step_col);
        }
        false
    }

    /// Moves the piece on `start` to `end`, promoting pawns that reach the
    /// back rank. Returns the captured piece, if any.
    ///
    /// Legality is not rechecked here.
    pub fn apply_move(&mut self, start: Square, end: Square) -> Option<Piece> {
        let mut piece = self.get(start)?;
        if piece.kind == PieceKind::Pawn && end.row == piece.color.promotion_row() {
            piece.kind = PieceKind::Queen;
        }
        let captured = self.get(end);
        self.set(start, None);
        self.set(end, Some(piece));
        captured
    }

    /// A color wins once the opposing king is no longer on the board
    pub fn detect_winner(&self) -> Option<Color> {
        let mut white_king = false;
        let mut black_king = false;
        for (_, piece) in self.pieces() {
            if piece.kind == PieceKind::King {
                match piece.color {
                    Color::White => white_king = true,
                    Color::Black => black_king = true,
                }
            }
        }

        match (white_king, black_king) {
            (false, true) => Some(Color::Black),
            (true, false) => Some(Color::White),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(text: &str) -> Square {
        Square::from_algebraic(text).unwrap()
    }

    fn board_with(pieces: &[(&str, PieceKind, Color)]) -> Board {
        let mut board = Board::empty();
        for (at, kind, color) in pieces {
            board.set(sq(at), Some(Piece::new(*kind, *color)));
        }
        board
    }

    #[test]
    fn test_initial_layout() {
        let board = Board::initial();
        assert_eq!(board.pieces().count(), 32);
        assert_eq!(
            board.get(sq("e1")),
            Some(Piece::new(PieceKind::King, Color::White))
        );
        assert_eq!(
            board.get(sq("d8")),
            Some(Piece::new(PieceKind::Queen, Color::Black))
        );
        assert_eq!(board.pieces_of(Color::White).count(), 16);
        assert_eq!(board.detect_winner(), None);
    }

    #[test]
    fn test_square_notation() {
        let e4 = sq("e4");
        assert_eq!((e4.row, e4.col), (4, 4));
        assert_eq!(e4.key(), "4-4");
        assert_eq!(Square::from_key("4-4"), Some(e4));
        assert_eq!(e4.to_string(), "e4");
        assert_eq!(sq("a8"), Square { row: 0, col: 0 });
        assert!(Square::from_algebraic("i1").is_none());
        assert!(Square::from_algebraic("a9").is_none());
        assert!(Square::from_key("8-0").is_none());
        assert!(Square::from_key("garbage").is_none());
    }

    #[test]
    fn test_pawn_moves() {
        let board = Board::initial();
        assert!(board.is_legal_move(sq("e2"), sq("e3")));
        assert!(board.is_legal_move(sq("e2"), sq("e4")));
        assert!(!board.is_legal_move(sq("e2"), sq("e5")));
        assert!(!board.is_legal_move(sq("e2"), sq("d3")));
        assert!(board.is_legal_move(sq("e7"), sq("e5")));
        assert!(!board.is_legal_move(sq("e7"), sq("e8")));
    }

    #[test]
    fn test_pawn_double_step_blocked() {
        let board = board_with(&[
            ("e2", PieceKind::Pawn, Color::White),
            ("e3", PieceKind::Knight, Color::Black),
        ]);
        assert!(!board.is_legal_move(sq("e2"), sq("e4")));
        assert!(!board.is_legal_move(sq("e2"), sq("e3")));
    }

    #[test]
    fn test_pawn_double_step_only_from_start_row() {
        let board = board_with(&[("e3", PieceKind::Pawn, Color::White)]);
        assert!(!board.is_legal_move(sq("e3"), sq("e5")));
        assert!(board.is_legal_move(sq("e3"), sq("e4")));
    }

    #[test]
    fn test_pawn_capture() {
        let board = board_with(&[
            ("e4", PieceKind::Pawn, Color::White),
            ("d5", PieceKind::Pawn, Color::Black),
            ("f5", PieceKind::Pawn, Color::White),
        ]);
        assert!(board.is_legal_move(sq("e4"), sq("d5")));
        assert!(!board.is_legal_move(sq("e4"), sq("f5")));
        assert!(board.is_legal_move(sq("d5"), sq("e4")));
    }

    #[test]
    fn test_sliding_pieces_blocked() {
        let board = Board::initial();
        assert!(!board.is_legal_move(sq("a1"), sq("a3")));
        assert!(!board.is_legal_move(sq("c1"), sq("e3")));
        assert!(!board.is_legal_move(sq("d1"), sq("d4")));
        assert!(!board.is_legal_move(sq("a1"), sq("a2")));
    }

    #[test]
    fn test_sliding_pieces_open_lines() {
        let board = board_with(&[
            ("d4", PieceKind::Queen, Color::White),
            ("d8", PieceKind::Rook, Color::Black),
            ("a1", PieceKind::Bishop, Color::White),
        ]);
        assert!(board.is_legal_move(sq("d4"), sq("d8")));
        assert!(board.is_legal_move(sq("d4"), sq("h8")));
        assert!(board.is_legal_move(sq("d4"), sq("a4")));
        assert!(!board.is_legal_move(sq("d4"), sq("e6")));
        assert!(!board.is_legal_move(sq("d4"), sq("a1")));
        assert!(board.is_legal_move(sq("a1"), sq("c3")));
        assert!(!board.is_legal_move(sq("a1"), sq("e5")));
    }

    #[test]
    fn test_knight_jumps_over_pieces() {
        let board = Board::initial();
        assert!(board.is_legal_move(sq("g1"), sq("f3")));
        assert!(board.is_legal_move(sq("g1"), sq("h3")));
        assert!(!board.is_legal_move(sq("g1"), sq("e2")));
        assert!(!board.is_legal_move(sq("g1"), sq("g3")));
    }

    #[test]
    fn test_king_single_step() {
        let board = board_with(&[
            ("e4", PieceKind::King, Color::White),
            ("e5", PieceKind::King, Color::Black),
        ]);
        assert!(board.is_legal_move(sq("e4"), sq("e5")));
        assert!(board.is_legal_move(sq("e4"), sq("d3")));
        assert!(!board.is_legal_move(sq("e4"), sq("e6")));
        assert!(!board.is_legal_move(sq("e4"), sq("e4")));
    }

    #[test]
    fn test_empty_source_is_illegal() {
        let board = Board::initial();
        assert!(!board.is_legal_move(sq("e4"), sq("e5")));
    }

    #[test]
    fn test_never_captures_own_color() {
        let board = Board::initial();
        for (from, piece) in board.pieces() {
            for (to, other) in board.pieces() {
                if piece.color == other.color {
                    assert!(!board.is_legal_move(from, to), "{} -> {}", from, to);
                }
            }
        }
    }

    #[test]
    fn test_revalidating_applied_move_is_illegal() {
        let mut board = Board::initial();
        let moves = [("e2", "e4"), ("g8", "f6"), ("f1", "c4"), ("d7", "d5")];
        for (from, to) in moves {
            assert!(board.is_legal_move(sq(from), sq(to)));
            board.apply_move(sq(from), sq(to));
            assert!(!board.is_legal_move(sq(from), sq(to)));
        }
    }

    #[test]
    fn test_apply_move_captures() {
        let mut board = board_with(&[
            ("e4", PieceKind::Pawn, Color::White),
            ("d5", PieceKind::Knight, Color::Black),
        ]);
        let captured = board.apply_move(sq("e4"), sq("d5"));
        assert_eq!(captured, Some(Piece::new(PieceKind::Knight, Color::Black)));
        assert!(board.is_empty_at(sq("e4")));
        assert_eq!(
            board.get(sq("d5")),
            Some(Piece::new(PieceKind::Pawn, Color::White))
        );
    }

    #[test]
    fn test_promotion_on_back_rank() {
        let mut board = board_with(&[
            ("a7", PieceKind::Pawn, Color::White),
            ("h2", PieceKind::Pawn, Color::Black),
        ]);
        board.apply_move(sq("a7"), sq("a8"));
        board.apply_move(sq("h2"), sq("h1"));
        assert_eq!(
            board.get(sq("a8")),
            Some(Piece::new(PieceKind::Queen, Color::White))
        );
        assert_eq!(
            board.get(sq("h1")),
            Some(Piece::new(PieceKind::Queen, Color::Black))
        );
    }

    #[test]
    fn test_detect_winner() {
        let mut board = Board::initial();
        board.set(sq("e1"), None);
        assert_eq!(board.detect_winner(), Some(Color::Black));

        let mut board = Board::initial();
        board.set(sq("e8"), None);
        assert_eq!(board.detect_winner(), Some(Color::White));
    }

    #[test]
    fn test_board_serialization() {
        let board = board_with(&[("a8", PieceKind::Rook, Color::Black)]);
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json[0][0]["kind"], "rook");
        assert_eq!(json[0][0]["color"], "black");
        assert!(json[7][7].is_null());

        let restored: Board = serde_json::from_value(json).unwrap();
        assert_eq!(restored, board);
    }
}
