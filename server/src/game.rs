use crate::schedule::{CooldownRegistry, MoveQueue};
use log::debug;
use shared::{ActionKind, Board, Color, Command, CooldownConfig, Piece, Square};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("That square is off the board.")]
    OffBoard,
    #[error("There is no piece on that square.")]
    EmptySquare,
    #[error("You can only move your own pieces.")]
    NotYourPiece,
    #[error("That piece is on cooldown.")]
    OnCooldown,
    #[error("That piece already has too many queued moves.")]
    QueueFull,
    #[error("Invalid move.")]
    Illegal,
    #[error("The game is not in progress.")]
    GameNotActive,
}

/// A move that has been written to the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedMove {
    pub from: Square,
    pub to: Square,
    /// The mover as it was before the move (a promoted pawn is still a pawn here)
    pub piece: Piece,
    pub captured: Option<Piece>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Applied(AppliedMove),
    Queued,
}

/// Result of one scheduler pass over a single square's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEvent {
    Applied(AppliedMove),
    /// The head entry was no longer legal and has been dropped
    Invalidated { from: Square, to: Square },
}

/// Tally of everything a command did across all matched pieces
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub matched: usize,
    pub cleared: usize,
    pub queued: usize,
    pub cooldown_failures: usize,
    pub queue_full_failures: usize,
    pub invalid_failures: usize,
    pub moves: Vec<AppliedMove>,
}

impl CommandReport {
    /// The most favourable outcome wins: executed, queued, cleared, then the
    /// failures from least to most severe
    pub fn feedback(&self) -> Result<&'static str, &'static str> {
        if !self.moves.is_empty() {
            Ok("Command executed.")
        } else if self.queued > 0 {
            Ok("Moves queued. Some may turn out to be invalid when they run.")
        } else if self.cleared > 0 {
            Ok("Queue cleared.")
        } else if self.queue_full_failures > 0 {
            Err("That piece already has too many queued moves.")
        } else if self.cooldown_failures > 0 {
            Err("That piece is on cooldown.")
        } else if self.invalid_failures > 0 {
            Err("Invalid move.")
        } else {
            Err("No matching pieces.")
        }
    }

    pub fn changed_queue(&self) -> bool {
        self.queued > 0 || self.cleared > 0 || !self.moves.is_empty()
    }
}

/// Authoritative board state of one room
///
/// Owns the board together with the square-keyed cooldowns and queues, and
/// keeps them consistent: every applied move migrates the mover's queue to
/// its destination, discards whatever was tracked for a captured piece and
/// restarts the cooldown at the destination.
#[derive(Debug, Clone)]
pub struct GameState {
    pub board: Board,
    pub cooldowns: CooldownRegistry,
    pub queue: MoveQueue,
    pub config: CooldownConfig,
    pub winner: Option<Color>,
}

impl GameState {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            board: Board::initial(),
            cooldowns: CooldownRegistry::new(),
            queue: MoveQueue::new(),
            config,
            winner: None,
        }
    }

    /// Back to the initial layout with no cooldowns, queues or winner
    pub fn reset(&mut self) {
        self.board = Board::initial();
        self.cooldowns.clear_all();
        self.queue.clear_all();
        self.winner = None;
    }

    fn apply(&mut self, from: Square, to: Square, now: u64) -> Option<AppliedMove> {
        let piece = self.board.get(from)?;
        let captured = self.board.apply_move(from, to);

        self.cooldowns.clear(from);
        self.queue.migrate(from, to);
        self.cooldowns
            .start(to, self.config.duration_for(piece.kind), now);

        if self.winner.is_none() {
            self.winner = self.board.detect_winner();
        }

        debug!(
            "{} {:?} {} -> {}{}",
            piece.color,
            piece.kind,
            from,
            to,
            if captured.is_some() { " (capture)" } else { "" }
        );

        Some(AppliedMove {
            from,
            to,
            piece,
            captured,
        })
    }

    /// Direct move from the board UI. When the source is cooling down the
    /// move is queued if `queue_on_cooldown` is set, otherwise refused.
    pub fn try_move(
        &mut self,
        color: Color,
        from: Square,
        to: Square,
        now: u64,
        queue_on_cooldown: bool,
    ) -> Result<MoveOutcome, MoveError> {
        if self.winner.is_some() {
            return Err(MoveError::GameNotActive);
        }
        let piece = self.board.get(from).ok_or(MoveError::EmptySquare)?;
        if piece.color != color {
            return Err(MoveError::NotYourPiece);
        }

        if self.cooldowns.is_cooling(from, now) {
            if queue_on_cooldown {
                if !self.queue.push(from, to) {
                    return Err(MoveError::QueueFull);
                }
                return Ok(MoveOutcome::Queued);
            }
            return Err(MoveError::OnCooldown);
        }

        if !self.board.is_legal_move(from, to) {
            return Err(MoveError::Illegal);
        }
        self.apply(from, to, now)
            .map(MoveOutcome::Applied)
            .ok_or(MoveError::EmptySquare)
    }

    /// Runs a parsed command for `color`.
    ///
    /// Pieces are handled in board order and each piece's actions run in
    /// sequence against its current square. A plain action stops at the first
    /// success; an `&` action queues while cooling down and keeps chaining.
    pub fn execute_command(&mut self, color: Color, command: &Command, now: u64) -> CommandReport {
        let mut report = CommandReport::default();

        for start in command.select(&self.board, color) {
            if self.winner.is_some() {
                break;
            }
            report.matched += 1;
            let mut current = start;

            for action in &command.actions {
                if self.board.get(current).map(|p| p.color) != Some(color) {
                    break;
                }

                let destination = match &action.kind {
                    ActionKind::ClearQueue => {
                        self.queue.clear(current);
                        report.cleared += 1;
                        continue;
                    }
                    ActionKind::Move(square) => Some(*square),
                    ActionKind::DirectionalMove(step) => step.destination(current, color),
                };

                if self.cooldowns.is_cooling(current, now) {
                    match (action.append, destination) {
                        (true, Some(to)) => {
                            if self.queue.push(current, to) {
                                report.queued += 1;
                            } else {
                                report.queue_full_failures += 1;
                            }
                        }
                        (true, None) => report.invalid_failures += 1,
                        (false, _) => report.cooldown_failures += 1,
                    }
                    continue;
                }

                let applied = destination
                    .filter(|to| self.board.is_legal_move(current, *to))
                    .and_then(|to| self.apply(current, to, now));

                match applied {
                    Some(applied) => {
                        report.moves.push(applied);
                        current = applied.to;
                        if self.winner.is_some() || !action.append {
                            break;
                        }
                    }
                    None => report.invalid_failures += 1,
                }
            }
        }

        report
    }

    /// One scheduler pass: every square whose cooldown has lapsed gets its
    /// head entry popped and re-validated against the current board.
    ///
    /// A piece moves at most once per pass, so a queue that just migrated
    /// to a square with no cooldown waits for the next tick.
    pub fn drain(&mut self, now: u64) -> Vec<DrainEvent> {
        let mut events = Vec::new();
        let mut landed = HashSet::new();

        for from in self.queue.squares() {
            if self.winner.is_some() {
                break;
            }
            if landed.contains(&from) || self.cooldowns.is_cooling(from, now) {
                continue;
            }
            let Some(to) = self.queue.pop_front(from) else {
                continue;
            };

            if self.board.get(from).is_none() {
                self.queue.clear(from);
                events.push(DrainEvent::Invalidated { from, to });
                continue;
            }

            let applied = if self.board.is_legal_move(from, to) {
                self.apply(from, to, now)
            } else {
                None
            };

            match applied {
                Some(applied) => {
                    landed.insert(applied.to);
                    events.push(DrainEvent::Applied(applied));
                }
                None => {
                    debug!("Discarding stale queued move {} -> {}", from, to);
                    events.push(DrainEvent::Invalidated { from, to });
                }
            }
        }

        events
    }

    /// True if the queue at `square` belongs to a piece of `color`
    pub fn owns_queue(&self, color: Color, square: Square) -> bool {
        self.board.get(square).map(|piece| piece.color) == Some(color)
    }
}
