//! Targeting language: `filter -> action[|action...]`
//!
//! A filter selects some of the issuing player's own pieces by rank, file and
//! kind, combined strictly left to right with `&` (and) and `|` (or). The
//! action list then says where each selected piece should go. Directions are
//! written from the mover's point of view and are mirrored for black.
//!
//! ```text
//! p->e4            every pawn that can reach e4 goes there
//! n&g->2u1l        the g-file knight jumps two up, one left
//! 2|7->&u|&u       second/seventh rank pieces step up twice, queueing
//! *->X             clear every pending queue
//! ```

use crate::board::{Board, Color, Piece, PieceKind, Square};
use std::str::FromStr;
use thiserror::Error;

pub const COMMAND_SEPARATOR: &str = "->";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Commands must look like filter->action")]
    MissingSeparator,
    #[error("The filter is empty")]
    EmptyFilter,
    #[error("The action list is empty")]
    EmptyAction,
    #[error("Unknown filter token '{0}'")]
    UnknownFilterToken(char),
    #[error("Expected '&' or '|' before '{0}'")]
    MissingOperator(char),
    #[error("Filter operator '{0}' has no right-hand term")]
    DanglingOperator(char),
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
    #[error("Knight leg '{0}' is not an L-shape")]
    InvalidKnightLeg(String),
    #[error("Quantity must be at least 1 in '{0}'")]
    ZeroQuantity(String),
}

/// Boolean expression over rank, file and piece kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Chess rank, 1..=8
    Rank(u8),
    /// Board column, 0 (a) ..= 7 (h)
    File(u8),
    PieceKind(PieceKind),
    All,
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    pub fn matches(&self, square: Square, piece: Piece) -> bool {
        match self {
            Filter::Rank(rank) => square.rank() == *rank,
            Filter::File(col) => square.col == *col,
            Filter::PieceKind(kind) => piece.kind == *kind,
            Filter::All => true,
            Filter::And(left, right) => left.matches(square, piece) && right.matches(square, piece),
            Filter::Or(left, right) => left.matches(square, piece) || right.matches(square, piece),
        }
    }

    fn parse_term(token: char) -> Result<Filter, ParseError> {
        match token {
            '*' => Ok(Filter::All),
            '1'..='8' => Ok(Filter::Rank(token as u8 - b'0')),
            // Lowercase a-h is always a file; bishops are addressed with 'B'
            'a'..='h' => Ok(Filter::File(token as u8 - b'a')),
            _ => PieceKind::from_letter(token)
                .map(Filter::PieceKind)
                .ok_or(ParseError::UnknownFilterToken(token)),
        }
    }
}

impl FromStr for Filter {
    type Err = ParseError;

    /// Builds a left-nested tree so that `a & b | c` evaluates as `(a & b) | c`
    /// and `a | b & c` as `(a | b) & c`. There is no operator precedence.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut tokens = text.chars().filter(|c| !c.is_whitespace());

        let first = tokens.next().ok_or(ParseError::EmptyFilter)?;
        let mut filter = Filter::parse_term(first)?;

        while let Some(op) = tokens.next() {
            if op != '&' && op != '|' {
                return Err(ParseError::MissingOperator(op));
            }
            let term = tokens.next().ok_or(ParseError::DanglingOperator(op))?;
            let right = Box::new(Filter::parse_term(term)?);
            let left = Box::new(filter);
            filter = if op == '&' {
                Filter::And(left, right)
            } else {
                Filter::Or(left, right)
            };
        }

        Ok(filter)
    }
}

/// A relative displacement expressed from white's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One unit vector repeated `distance` times
    Line { d_row: i32, d_col: i32, distance: u8 },
    /// An explicit knight jump, e.g. "2u1l"
    KnightLeg { d_row: i32, d_col: i32 },
}

impl Step {
    /// Resolves the step for a mover of `color` standing on `from`.
    /// Returns None when the destination falls off the board.
    pub fn destination(self, from: Square, color: Color) -> Option<Square> {
        let sign = match color {
            Color::White => 1,
            Color::Black => -1,
        };
        let (d_row, d_col) = match self {
            Step::Line {
                d_row,
                d_col,
                distance,
            } => (d_row * distance as i32, d_col * distance as i32),
            Step::KnightLeg { d_row, d_col } => (d_row, d_col),
        };
        from.offset(d_row * sign, d_col * sign)
    }

    fn parse(token: &str) -> Result<Step, ParseError> {
        let unknown = || ParseError::UnknownAction(token.to_string());

        let digits_end = token
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(unknown)?;
        let (quantity, rest) = token.split_at(digits_end);

        if let Some(leg) = Step::parse_knight_leg(quantity, rest) {
            return leg.ok_or_else(|| ParseError::InvalidKnightLeg(token.to_string()));
        }

        let distance = if quantity.is_empty() {
            1
        } else {
            quantity.parse::<u8>().map_err(|_| unknown())?
        };
        if distance == 0 {
            return Err(ParseError::ZeroQuantity(token.to_string()));
        }

        let (mut d_row, mut d_col) = (None, None);
        if rest.is_empty() || rest.len() > 2 {
            return Err(unknown());
        }
        for letter in rest.chars() {
            let (slot, value) = match letter {
                'u' => (&mut d_row, -1),
                'd' => (&mut d_row, 1),
                'l' => (&mut d_col, -1),
                'r' => (&mut d_col, 1),
                _ => return Err(unknown()),
            };
            if slot.replace(value).is_some() {
                return Err(unknown());
            }
        }

        Ok(Step::Line {
            d_row: d_row.unwrap_or(0),
            d_col: d_col.unwrap_or(0),
            distance,
        })
    }

    /// Recognises `<digits><a>(u|d)<b>(l|r)`. The leading digit run is split
    /// so that its last digit becomes the vertical leg; anything before it is
    /// an ignored quantity.
    ///
    /// Returns None when the token is not shaped like a knight leg at all,
    /// Some(None) when it is shaped like one but is not an L.
    fn parse_knight_leg(digits: &str, rest: &str) -> Option<Option<Step>> {
        let vertical_len = digits.chars().last()?.to_digit(10)? as i32;
        let mut rest = rest.chars();
        let vertical = rest.next()?;
        let horizontal_len = rest.next()?.to_digit(10)? as i32;
        let horizontal = rest.next()?;
        if rest.next().is_some() {
            return None;
        }

        let d_row = match vertical {
            'u' => -vertical_len,
            'd' => vertical_len,
            _ => return None,
        };
        let d_col = match horizontal {
            'l' => -horizontal_len,
            'r' => horizontal_len,
            _ => return None,
        };

        let shape = (vertical_len, horizontal_len);
        if shape == (1, 2) || shape == (2, 1) {
            Some(Some(Step::KnightLeg { d_row, d_col }))
        } else {
            Some(None)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Absolute destination
    Move(Square),
    /// Destination relative to the piece's current square
    DirectionalMove(Step),
    /// Drop everything queued for the piece's current square
    ClearQueue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Queue instead of failing on cooldown, and keep going after a success
    pub append: bool,
    pub kind: ActionKind,
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (append, body) = match text.strip_prefix('&') {
            Some(body) => (true, body),
            None => (false, text),
        };
        if body.is_empty() {
            return Err(ParseError::EmptyAction);
        }

        let kind = if body == "X" || body == "x" {
            ActionKind::ClearQueue
        } else if let Some(square) = Square::from_algebraic(body) {
            ActionKind::Move(square)
        } else {
            ActionKind::DirectionalMove(Step::parse(body)?)
        };

        Ok(Action { append, kind })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub filter: Filter,
    pub actions: Vec<Action>,
}

impl Command {
    /// Squares of `color`'s pieces selected by the filter, in board order
    pub fn select(&self, board: &Board, color: Color) -> Vec<Square> {
        board
            .pieces_of(color)
            .filter(|(square, piece)| self.filter.matches(*square, *piece))
            .map(|(square, _)| square)
            .collect()
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let (filter, actions) = compact
            .split_once(COMMAND_SEPARATOR)
            .ok_or(ParseError::MissingSeparator)?;

        let filter = filter.parse::<Filter>()?;
        if actions.is_empty() {
            return Err(ParseError::EmptyAction);
        }
        let actions = actions
            .split('|')
            .map(str::parse::<Action>)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Command { filter, actions })
    }
}
