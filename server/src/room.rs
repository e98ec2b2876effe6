//! Room lifecycle: lobby roster, match start, win and departure resolution
//!
//! A room moves `Lobby -> Started -> Over`, and from `Over` either back to
//! `Started` (rematch) or out of the registry entirely. Every method assumes
//! the caller holds the room's lock for its whole duration.

use crate::game::{CommandReport, DrainEvent, GameState, MoveError, MoveOutcome};
use crate::session::SessionError;
use log::{error, info};
use shared::{
    Color, Command, CooldownConfig, MoveRequest, Phase, Player, RoomSnapshot, Square, Team,
};
use std::panic::{self, AssertUnwindSafe};

/// What happened when a player left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub username: String,
    /// The roster is now empty and the room should be dropped
    pub room_empty: bool,
    /// Set when the departure ended an active game
    pub winner: Option<Color>,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    pub owner_id: u32,
    pub players: Vec<Player>,
    pub phase: Phase,
    pub game: GameState,
    /// Cancelled or emptied; handlers must treat the room as gone
    pub closed: bool,
}

impl Room {
    /// The creator owns the room and starts on the white team
    pub fn new(code: String, owner_id: u32, username: &str, config: CooldownConfig) -> Self {
        Self {
            code,
            owner_id,
            players: vec![Player::new(owner_id, username, Team::White)],
            phase: Phase::Lobby,
            game: GameState::new(config),
            closed: false,
        }
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    fn player_mut(&mut self, id: u32) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn is_owner(&self, id: u32) -> bool {
        self.owner_id == id
    }

    /// Started and nobody has won yet
    pub fn is_active(&self) -> bool {
        self.phase == Phase::Started && self.game.winner.is_none()
    }

    pub fn color_of(&self, id: u32) -> Option<Color> {
        self.player(id).and_then(|player| player.team.color())
    }

    pub fn member_ids(&self) -> Vec<u32> {
        self.players.iter().map(|player| player.id).collect()
    }

    /// Adds `username` as a spectator, or rebinds an existing player with
    /// that name to the new session. Returns the displaced session id on a
    /// reconnect. A session already seated under another name is refused.
    pub fn enter(&mut self, id: u32, username: &str) -> Result<Option<u32>, SessionError> {
        if self
            .players
            .iter()
            .any(|player| player.id == id && player.username != username)
        {
            return Err(SessionError::AlreadySeated);
        }

        if let Some(player) = self
            .players
            .iter_mut()
            .find(|player| player.username == username)
        {
            let previous = player.id;
            if previous == id {
                return Ok(None);
            }
            player.id = id;
            if self.owner_id == previous {
                self.owner_id = id;
            }
            info!("{} reconnected to room {}", username, self.code);
            Ok(Some(previous))
        } else {
            self.players
                .push(Player::new(id, username, Team::Spectator));
            info!("{} joined room {}", username, self.code);
            Ok(None)
        }
    }

    pub fn change_team(&mut self, id: u32, team: Team) -> Result<(), SessionError> {
        if self.phase == Phase::Started {
            return Err(SessionError::GameInProgress);
        }
        if team.is_player()
            && self
                .players
                .iter()
                .any(|player| player.id != id && player.team == team)
        {
            return Err(SessionError::TeamTaken(team));
        }

        let player = self.player_mut(id).ok_or(SessionError::NotInRoom)?;
        player.team = team;
        player.is_ready = false;
        Ok(())
    }

    pub fn set_ready(&mut self, id: u32, is_ready: bool) -> bool {
        if self.phase == Phase::Started {
            return false;
        }
        match self.player_mut(id) {
            Some(player) => {
                player.is_ready = is_ready;
                true
            }
            None => false,
        }
    }

    pub fn update_settings(&mut self, id: u32, config: CooldownConfig) -> bool {
        if !self.is_owner(id) || self.phase == Phase::Started {
            return false;
        }
        self.game.config = config;
        true
    }

    pub fn swap_teams(&mut self, id: u32) -> bool {
        if !self.is_owner(id) || self.phase == Phase::Started {
            return false;
        }
        for player in &mut self.players {
            player.team = match player.team {
                Team::White => Team::Black,
                Team::Black => Team::White,
                Team::Spectator => continue,
            };
            player.is_ready = false;
        }
        true
    }

    pub fn set_owner(&mut self, id: u32, new_owner: u32) -> bool {
        if !self.is_owner(id) || id == new_owner || self.player(new_owner).is_none() {
            return false;
        }
        self.owner_id = new_owner;
        true
    }

    fn check_teams(&self) -> Result<(), SessionError> {
        let has = |team: Team| self.players.iter().any(|player| player.team == team);
        if has(Team::White) && has(Team::Black) {
            Ok(())
        } else {
            Err(SessionError::StartRejected("Both teams must have a player."))
        }
    }

    fn begin(&mut self) {
        for player in &mut self.players {
            player.is_ready = false;
        }
        self.game.reset();
        self.phase = Phase::Started;
        info!("Room {} started a match", self.code);
    }

    /// Starts a fresh series; win/loss counters go back to zero
    pub fn start_game(&mut self, id: u32) -> Result<(), SessionError> {
        if !self.is_owner(id) {
            return Err(SessionError::NotOwner);
        }
        if self.phase == Phase::Started {
            return Err(SessionError::StartRejected("The game has already started."));
        }
        self.check_teams()?;
        if self
            .players
            .iter()
            .any(|player| player.team.is_player() && !player.is_ready)
        {
            return Err(SessionError::StartRejected("All players must be ready."));
        }

        for player in &mut self.players {
            player.wins = 0;
            player.losses = 0;
        }
        self.begin();
        Ok(())
    }

    /// Rematch after a finished game, keeping the counters
    pub fn start_new_match(&mut self, id: u32) -> Result<(), SessionError> {
        if !self.is_owner(id) {
            return Err(SessionError::NotOwner);
        }
        if self.phase != Phase::Over {
            return Err(SessionError::StartRejected("The current match is not over."));
        }
        self.check_teams()?;
        self.begin();
        Ok(())
    }

    pub fn cancel(&mut self, id: u32) -> bool {
        if !self.is_owner(id) {
            return false;
        }
        self.closed = true;
        info!("Room {} cancelled by its owner", self.code);
        true
    }

    pub fn make_move(
        &mut self,
        id: u32,
        request: MoveRequest,
        claimed: Option<Color>,
        queue: bool,
        now: u64,
    ) -> Result<MoveOutcome, MoveError> {
        if !self.is_active() {
            return Err(MoveError::GameNotActive);
        }
        let color = self.color_of(id).ok_or(MoveError::NotYourPiece)?;
        if claimed.map_or(false, |claimed| claimed != color) {
            return Err(MoveError::NotYourPiece);
        }
        let (from, to) = request.squares().ok_or(MoveError::OffBoard)?;
        self.game.try_move(color, from, to, now, queue)
    }

    /// Parses and runs a command against a scratch copy of the game. The copy
    /// replaces the live state only if execution ran to completion.
    pub fn execute_command(
        &mut self,
        id: u32,
        text: &str,
        now: u64,
    ) -> Result<CommandReport, SessionError> {
        if !self.is_active() {
            return Err(SessionError::GameNotActive);
        }
        let color = self.color_of(id).ok_or(SessionError::Spectator)?;
        let command: Command = text.parse()?;

        let mut scratch = self.game.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            scratch.execute_command(color, &command, now)
        }));

        match outcome {
            Ok(report) => {
                self.game = scratch;
                Ok(report)
            }
            Err(_) => {
                error!("Command {:?} panicked in room {}", text, self.code);
                Err(SessionError::Internal)
            }
        }
    }

    fn owned_queue(&self, id: u32, piece_key: &str) -> Option<Square> {
        if !self.is_active() {
            return None;
        }
        let color = self.color_of(id)?;
        let square = Square::from_key(piece_key)?;
        self.game.owns_queue(color, square).then_some(square)
    }

    pub fn reorder_queue(&mut self, id: u32, piece_key: &str, previous: usize, current: usize) -> bool {
        match self.owned_queue(id, piece_key) {
            Some(square) => self.game.queue.reorder(square, previous, current),
            None => false,
        }
    }

    pub fn cancel_from_queue(&mut self, id: u32, piece_key: &str, index: i64) -> bool {
        match self.owned_queue(id, piece_key) {
            Some(square) => self.game.queue.cancel(square, index),
            None => false,
        }
    }

    pub fn resign(&mut self, id: u32) -> Option<Color> {
        if !self.is_active() {
            return None;
        }
        let color = self.color_of(id)?;
        self.game.winner = Some(color.opposite());
        self.resolve()
    }

    /// Closes out a match once the game has a winner. Returns the winner only
    /// on the transition, so counters are bumped exactly once.
    pub fn resolve(&mut self) -> Option<Color> {
        if self.phase != Phase::Started {
            return None;
        }
        let winner = self.game.winner?;
        self.phase = Phase::Over;

        for player in &mut self.players {
            match player.team.color() {
                Some(color) if color == winner => player.wins += 1,
                Some(_) => player.losses += 1,
                None => {}
            }
        }

        info!("Room {}: {} wins", self.code, winner);
        Some(winner)
    }

    /// Removes the player bound to session `id`. A session whose player has
    /// since been taken over by a reconnect matches nothing and is ignored.
    pub fn leave(&mut self, id: u32) -> Option<Departure> {
        let index = self.players.iter().position(|player| player.id == id)?;
        let departed = self.players.remove(index);
        info!("{} left room {}", departed.username, self.code);

        if self.players.is_empty() {
            self.closed = true;
            return Some(Departure {
                username: departed.username,
                room_empty: true,
                winner: None,
            });
        }

        if self.owner_id == id {
            self.owner_id = self.players[0].id;
        }

        let mut winner = None;
        if self.is_active() && departed.team.is_player() {
            let remaining: Vec<Color> = self
                .players
                .iter()
                .filter_map(|player| player.team.color())
                .collect();
            match remaining.as_slice() {
                [] => self.phase = Phase::Over,
                [color] => {
                    self.game.winner = Some(*color);
                    winner = self.resolve();
                }
                _ => {}
            }
        }

        Some(Departure {
            username: departed.username,
            room_empty: false,
            winner,
        })
    }

    /// One scheduler pass; a no-op unless a match is running
    pub fn tick(&mut self, now: u64) -> Vec<DrainEvent> {
        if !self.is_active() {
            return Vec::new();
        }
        self.game.cooldowns.prune(now);
        if self.game.queue.is_empty() {
            return Vec::new();
        }
        self.game.drain(now)
    }

    pub fn snapshot(&self, now: u64) -> RoomSnapshot {
        RoomSnapshot {
            room_code: self.code.clone(),
            owner_id: self.owner_id,
            players: self.players.clone(),
            phase: self.phase,
            started: self.phase == Phase::Started,
            winner: self.game.winner,
            board: self.game.board.clone(),
            custom_cooldowns: self.game.config,
            cooldowns: self.game.cooldowns.snapshot(now),
            move_queue: self.game.queue.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Board, Piece, PieceKind};

    const ALICE: u32 = 1;
    const BOB: u32 = 2;
    const CAROL: u32 = 3;

    fn sq(text: &str) -> Square {
        Square::from_algebraic(text).unwrap()
    }

    fn lobby() -> Room {
        let mut room = Room::new("ABCDE".to_string(), ALICE, "alice", CooldownConfig::default());
        room.enter(BOB, "bob").unwrap();
        room.change_team(BOB, Team::Black).unwrap();
        room
    }

    fn started() -> Room {
        let mut room = lobby();
        room.set_ready(ALICE, true);
        room.set_ready(BOB, true);
        room.start_game(ALICE).unwrap();
        room
    }

    #[test]
    fn test_new_room() {
        let room = Room::new("ABCDE".to_string(), ALICE, "alice", CooldownConfig::default());
        assert_eq!(room.owner_id, ALICE);
        assert_eq!(room.phase, Phase::Lobby);
        assert_eq!(room.players.len(), 1);
        assert_eq!(room.players[0].team, Team::White);
    }

    #[test]
    fn test_enter_as_spectator_and_reconnect() {
        let mut room = Room::new("ABCDE".to_string(), ALICE, "alice", CooldownConfig::default());
        assert_eq!(room.enter(BOB, "bob"), Ok(None));
        assert_eq!(room.player(BOB).unwrap().team, Team::Spectator);

        room.players[1].wins = 3;
        assert_eq!(room.enter(7, "bob"), Ok(Some(BOB)));
        assert!(room.player(BOB).is_none());
        let bob = room.player(7).unwrap();
        assert_eq!(bob.wins, 3);
        assert_eq!(room.players.len(), 2);

        // The owner reconnecting keeps ownership
        assert_eq!(room.enter(8, "alice"), Ok(Some(ALICE)));
        assert_eq!(room.owner_id, 8);
    }

    #[test]
    fn test_change_team_rules() {
        let mut room = lobby();
        room.enter(CAROL, "carol").unwrap();

        assert_eq!(
            room.change_team(CAROL, Team::Black),
            Err(SessionError::TeamTaken(Team::Black))
        );
        assert_eq!(
            SessionError::TeamTaken(Team::Black).to_string(),
            "Team black is already taken."
        );

        room.set_ready(BOB, true);
        room.change_team(BOB, Team::Spectator).unwrap();
        assert!(!room.player(BOB).unwrap().is_ready);
        room.change_team(CAROL, Team::Black).unwrap();
    }

    #[test]
    fn test_start_requires_both_teams_and_ready() {
        let mut room = Room::new("ABCDE".to_string(), ALICE, "alice", CooldownConfig::default());
        room.enter(BOB, "bob").unwrap();
        assert_eq!(
            room.start_game(ALICE),
            Err(SessionError::StartRejected("Both teams must have a player."))
        );

        room.change_team(BOB, Team::Black).unwrap();
        room.set_ready(ALICE, true);
        assert_eq!(
            room.start_game(ALICE),
            Err(SessionError::StartRejected("All players must be ready."))
        );

        room.set_ready(BOB, true);
        assert_eq!(room.start_game(BOB), Err(SessionError::NotOwner));
        room.start_game(ALICE).unwrap();

        assert_eq!(room.phase, Phase::Started);
        assert_eq!(room.game.board, Board::initial());
        assert!(room.players.iter().all(|player| !player.is_ready));
    }

    #[test]
    fn test_owner_only_lobby_actions() {
        let mut room = lobby();
        let fast = CooldownConfig {
            pawn: 100,
            ..CooldownConfig::default()
        };

        assert!(!room.update_settings(BOB, fast));
        assert!(room.update_settings(ALICE, fast));
        assert_eq!(room.game.config.pawn, 100);

        assert!(!room.swap_teams(BOB));
        assert!(room.swap_teams(ALICE));
        assert_eq!(room.player(ALICE).unwrap().team, Team::Black);
        assert_eq!(room.player(BOB).unwrap().team, Team::White);

        assert!(!room.set_owner(BOB, BOB));
        assert!(!room.set_owner(ALICE, 99));
        assert!(room.set_owner(ALICE, BOB));
        assert!(room.is_owner(BOB));

        assert!(!room.cancel(ALICE));
        assert!(room.cancel(BOB));
        assert!(room.closed);
    }

    #[test]
    fn test_moves_only_while_started() {
        let mut room = lobby();
        let request = MoveRequest::new(sq("e2"), sq("e4"));
        assert_eq!(
            room.make_move(ALICE, request, None, false, 0),
            Err(MoveError::GameNotActive)
        );

        let mut room = started();
        assert_eq!(
            room.make_move(ALICE, request, Some(Color::Black), false, 0),
            Err(MoveError::NotYourPiece)
        );
        assert_eq!(
            room.make_move(BOB, request, None, false, 0),
            Err(MoveError::NotYourPiece)
        );
        assert!(room.make_move(ALICE, request, Some(Color::White), false, 0).is_ok());
    }

    #[test]
    fn test_command_parse_error_leaves_state() {
        let mut room = started();
        let result = room.execute_command(ALICE, "p e4", 0);
        assert!(matches!(result, Err(SessionError::Parse(_))));
        assert_eq!(room.game.board, Board::initial());
    }

    #[test]
    fn test_spectator_cannot_command() {
        let mut room = started();
        room.enter(CAROL, "carol").unwrap();
        assert_eq!(
            room.execute_command(CAROL, "p->e4", 0),
            Err(SessionError::Spectator)
        );
    }

    #[test]
    fn test_king_capture_updates_counters() {
        let mut room = started();
        room.enter(CAROL, "carol").unwrap();
        room.game.board = Board::empty();
        room.game
            .board
            .set(sq("e1"), Some(Piece::new(PieceKind::King, Color::White)));
        room.game
            .board
            .set(sq("e2"), Some(Piece::new(PieceKind::King, Color::Black)));

        room.make_move(BOB, MoveRequest::new(sq("e2"), sq("e1")), None, false, 0)
            .unwrap();
        assert_eq!(room.resolve(), Some(Color::Black));
        assert_eq!(room.resolve(), None);

        assert_eq!(room.phase, Phase::Over);
        assert_eq!(room.player(BOB).unwrap().wins, 1);
        assert_eq!(room.player(ALICE).unwrap().losses, 1);
        let carol = room.player(CAROL).unwrap();
        assert_eq!((carol.wins, carol.losses), (0, 0));
    }

    #[test]
    fn test_resign_and_rematch() {
        let mut room = started();
        assert_eq!(room.resign(ALICE), Some(Color::Black));
        assert_eq!(room.resign(BOB), None);

        assert_eq!(
            room.start_game(BOB),
            Err(SessionError::NotOwner),
            "non-owners cannot restart"
        );
        room.start_new_match(ALICE).unwrap();
        assert_eq!(room.phase, Phase::Started);
        assert_eq!(room.player(BOB).unwrap().wins, 1);
        assert_eq!(
            room.start_new_match(ALICE),
            Err(SessionError::StartRejected("The current match is not over."))
        );
    }

    #[test]
    fn test_start_game_resets_series() {
        let mut room = started();
        room.resign(ALICE);
        room.set_ready(ALICE, true);
        room.set_ready(BOB, true);
        room.start_game(ALICE).unwrap();
        assert!(room.players.iter().all(|p| p.wins == 0 && p.losses == 0));
    }

    #[test]
    fn test_owner_leaving_transfers_ownership() {
        let mut room = lobby();
        room.enter(CAROL, "carol").unwrap();

        let departure = room.leave(ALICE).unwrap();
        assert_eq!(departure.username, "alice");
        assert!(!departure.room_empty);
        assert_eq!(room.owner_id, BOB);
        assert_eq!(room.players.len(), 2);
    }

    #[test]
    fn test_last_player_leaving_empties_room() {
        let mut room = Room::new("ABCDE".to_string(), ALICE, "alice", CooldownConfig::default());
        let departure = room.leave(ALICE).unwrap();
        assert!(departure.room_empty);
        assert!(room.closed);
    }

    #[test]
    fn test_leaving_mid_game_awards_win() {
        let mut room = started();
        room.enter(CAROL, "carol").unwrap();

        assert_eq!(room.leave(CAROL).unwrap().winner, None);
        assert_eq!(room.phase, Phase::Started);

        let departure = room.leave(ALICE).unwrap();
        assert_eq!(departure.winner, Some(Color::Black));
        assert_eq!(room.phase, Phase::Over);
        assert_eq!(room.player(BOB).unwrap().wins, 1);
    }

    #[test]
    fn test_stale_session_is_ignored() {
        let mut room = lobby();
        room.enter(9, "bob").unwrap();
        assert_eq!(room.leave(BOB), None);
        assert_eq!(room.players.len(), 2);
    }

    #[test]
    fn test_queue_edits_require_ownership() {
        let mut room = started();
        room.make_move(ALICE, MoveRequest::new(sq("e2"), sq("e3")), None, false, 0)
            .unwrap();
        room.make_move(ALICE, MoveRequest::new(sq("e3"), sq("e4")), None, true, 0)
            .unwrap();
        room.make_move(ALICE, MoveRequest::new(sq("e3"), sq("d4")), None, true, 0)
            .unwrap();

        let key = sq("e3").key();
        assert!(!room.reorder_queue(BOB, &key, 1, 0));
        assert!(room.reorder_queue(ALICE, &key, 1, 0));
        assert_eq!(
            room.game.queue.get(sq("e3")).unwrap().front(),
            Some(&sq("d4"))
        );

        assert!(!room.cancel_from_queue(BOB, &key, -1));
        assert!(!room.cancel_from_queue(ALICE, "not-a-key", -1));
        assert!(room.cancel_from_queue(ALICE, &key, -1));
        assert!(room.game.queue.is_empty());
    }

    #[test]
    fn test_snapshot() {
        let mut room = started();
        room.make_move(ALICE, MoveRequest::new(sq("e2"), sq("e4")), None, false, 1_000)
            .unwrap();
        let snapshot = room.snapshot(1_500);

        assert_eq!(snapshot.room_code, "ABCDE");
        assert!(snapshot.started);
        assert_eq!(snapshot.cooldowns.get(&sq("e4").key()), Some(&3_000));
        assert!(snapshot.move_queue.is_empty());
        assert_eq!(snapshot.players.len(), 2);
    }

    #[test]
    fn test_tick_drains_and_prunes() {
        let mut room = lobby();
        assert!(room.tick(0).is_empty());

        let mut room = started();
        room.make_move(ALICE, MoveRequest::new(sq("d2"), sq("d3")), None, false, 0)
            .unwrap();
        room.make_move(ALICE, MoveRequest::new(sq("e2"), sq("e3")), None, false, 0)
            .unwrap();
        room.make_move(ALICE, MoveRequest::new(sq("e3"), sq("e4")), None, true, 0)
            .unwrap();

        assert!(room.tick(1_000).is_empty());
        assert_eq!(room.game.cooldowns.expiry(sq("d3")), Some(2_000));

        let events = room.tick(2_000);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DrainEvent::Applied(applied) if applied.to == sq("e4")));
        assert_eq!(room.game.cooldowns.expiry(sq("d3")), None);
        assert_eq!(room.game.cooldowns.expiry(sq("e4")), Some(4_000));
    }

    #[test]
    fn test_one_seat_per_session() {
        let mut room = lobby();

        assert_eq!(room.enter(ALICE, "mallory"), Err(SessionError::AlreadySeated));
        assert_eq!(room.enter(ALICE, "alice"), Ok(None));
        assert_eq!(room.players.len(), 2);

        let departure = room.leave(ALICE).unwrap();
        assert_eq!(departure.username, "alice");
        assert!(room.player(ALICE).is_none());
    }
}
