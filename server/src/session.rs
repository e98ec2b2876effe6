//! Routes inbound client events to rooms and publishes the results
//!
//! Each handler resolves the addressed room, takes that room's lock, applies
//! the event and queues outbound [`GameMessage`]s before releasing the lock.
//! Queuing under the lock keeps every room's outbound stream in the same
//! order as its state changes.

use crate::game::{CommandReport, DrainEvent, MoveError, MoveOutcome};
use crate::network::GameMessage;
use crate::registry::{RoomHandle, RoomRegistry};
use crate::room::Room;
use crate::utils::normalize_room_code;
use log::{error, info, warn};
use shared::{
    ClientEvent, CooldownConfig, MoveRequest, ParseError, ServerEvent, Team,
};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("You are not in this room.")]
    NotInRoom,
    #[error("Username is required.")]
    MissingUsername,
    #[error("You are already in this room under another name.")]
    AlreadySeated,
    #[error("Only the room owner can do that.")]
    NotOwner,
    #[error("Team {0} is already taken.")]
    TeamTaken(Team),
    #[error("Teams cannot change while a game is in progress.")]
    GameInProgress,
    #[error("{0}")]
    StartRejected(&'static str),
    #[error("The game is not in progress.")]
    GameNotActive,
    #[error("Spectators cannot move pieces.")]
    Spectator,
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("Internal error while executing command")]
    Internal,
}

/// Session-facing front of the server
pub struct SessionManager {
    rooms: RoomRegistry,
    /// Which room each session last created or entered
    memberships: RwLock<HashMap<u32, String>>,
    outbox: mpsc::UnboundedSender<GameMessage>,
}

impl SessionManager {
    pub fn new(rooms: RoomRegistry, outbox: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self {
            rooms,
            memberships: RwLock::new(HashMap::new()),
            outbox,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    fn dispatch(&self, message: GameMessage) {
        if let Err(e) = self.outbox.send(message) {
            error!("Failed to queue outbound message: {}", e);
        }
    }

    fn send(&self, session: u32, event: ServerEvent) {
        self.dispatch(GameMessage::SendEvent { session, event });
    }

    fn broadcast(&self, room: &str, event: ServerEvent) {
        self.dispatch(GameMessage::BroadcastEvent {
            room: room.to_string(),
            event,
            exclude: None,
        });
    }

    fn broadcast_lobby(&self, room: &Room, now: u64) {
        self.broadcast(&room.code, ServerEvent::LobbyState(room.snapshot(now)));
    }

    fn broadcast_board_state(&self, room: &Room, now: u64) {
        self.broadcast(
            &room.code,
            ServerEvent::CooldownsUpdated {
                cooldowns: room.game.cooldowns.snapshot(now),
            },
        );
        self.broadcast(
            &room.code,
            ServerEvent::QueueUpdated {
                move_queue: room.game.queue.snapshot(),
            },
        );
    }

    fn broadcast_game_over(&self, room: &Room) {
        if let Some(winner) = room.game.winner {
            self.broadcast(
                &room.code,
                ServerEvent::GameOver {
                    winner,
                    board: room.game.board.clone(),
                    players: room.players.clone(),
                },
            );
        }
    }

    /// Callers still check `closed` once they hold the lock
    async fn find_room(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.get(code).await
    }

    /// Handles one inbound event from `session`
    pub async fn handle(&self, session: u32, event: ClientEvent, now: u64) {
        match event {
            ClientEvent::CreateRoom {
                username,
                custom_cooldowns,
            } => {
                self.create_room(session, &username, custom_cooldowns.unwrap_or_default(), now)
                    .await
            }
            ClientEvent::EnterRoom {
                username,
                room_code,
            } => self.enter_room(session, &username, &room_code, now).await,
            ClientEvent::LeaveRoom { room_code } => {
                let current = self.memberships.read().await.get(&session).cloned();
                if current == Some(normalize_room_code(&room_code)) {
                    self.memberships.write().await.remove(&session);
                }
                self.leave_room(session, &room_code, now).await;
            }
            other => self.room_event(session, other, now).await,
        }
    }

    /// Drops whatever `session` was attached to
    pub async fn disconnect(&self, session: u32, now: u64) {
        let previous = self.memberships.write().await.remove(&session);
        if let Some(code) = previous {
            self.leave_room(session, &code, now).await;
        }
    }

    /// Leaves the previous room when a session moves to another one
    async fn switch_room(&self, session: u32, next: Option<&str>, now: u64) {
        let previous = self.memberships.read().await.get(&session).cloned();
        if let Some(code) = previous {
            if Some(code.as_str()) != next {
                self.memberships.write().await.remove(&session);
                self.leave_room(session, &code, now).await;
            }
        }
    }

    async fn create_room(
        &self,
        session: u32,
        username: &str,
        config: CooldownConfig,
        now: u64,
    ) {
        let username = username.trim();
        if username.is_empty() {
            self.send(
                session,
                ServerEvent::JoinError {
                    message: SessionError::MissingUsername.to_string(),
                },
            );
            return;
        }
        self.switch_room(session, None, now).await;

        let (code, handle) = self
            .rooms
            .create(|code| Room::new(code, session, username, config))
            .await;
        info!("{} created room {}", username, code);

        self.memberships.write().await.insert(session, code.clone());
        let room = handle.lock().await;
        self.dispatch(GameMessage::Subscribe {
            session,
            room: code,
        });
        self.broadcast_lobby(&room, now);
    }

    async fn enter_room(&self, session: u32, username: &str, code: &str, now: u64) {
        let username = username.trim();
        if username.is_empty() {
            self.send(
                session,
                ServerEvent::JoinError {
                    message: SessionError::MissingUsername.to_string(),
                },
            );
            return;
        }

        let Some(handle) = self.find_room(code).await else {
            self.send(
                session,
                ServerEvent::JoinError {
                    message: SessionError::RoomNotFound.to_string(),
                },
            );
            return;
        };

        let code = handle.lock().await.code.clone();
        self.switch_room(session, Some(&code), now).await;

        let mut room = handle.lock().await;
        if room.closed {
            self.send(
                session,
                ServerEvent::JoinError {
                    message: SessionError::RoomNotFound.to_string(),
                },
            );
            return;
        }

        let previous = match room.enter(session, username) {
            Ok(previous) => previous,
            Err(e) => {
                self.send(
                    session,
                    ServerEvent::JoinError {
                        message: e.to_string(),
                    },
                );
                return;
            }
        };

        // The displaced session stops listening to this room
        let displaced = {
            let mut memberships = self.memberships.write().await;
            let displaced = previous.filter(|previous| {
                memberships.get(previous).map(String::as_str) == Some(code.as_str())
            });
            if let Some(previous) = displaced {
                memberships.remove(&previous);
            }
            memberships.insert(session, code.clone());
            displaced
        };
        if let Some(previous) = displaced {
            self.dispatch(GameMessage::Unsubscribe { session: previous });
        }
        self.dispatch(GameMessage::Subscribe {
            session,
            room: code,
        });
        self.broadcast_lobby(&room, now);
    }

    async fn leave_room(&self, session: u32, code: &str, now: u64) {
        let Some(handle) = self.find_room(code).await else {
            return;
        };
        let mut room = handle.lock().await;
        if room.closed {
            return;
        }
        let Some(departure) = room.leave(session) else {
            return;
        };

        self.dispatch(GameMessage::Unsubscribe { session });
        if departure.room_empty {
            self.rooms.remove(&room.code).await;
            info!("Room {} is empty and has been removed", room.code);
            return;
        }

        self.broadcast(
            &room.code,
            ServerEvent::PlayerLeft {
                username: departure.username,
            },
        );
        if departure.winner.is_some() {
            self.broadcast_game_over(&room);
        }
        self.broadcast_lobby(&room, now);
    }

    async fn room_event(&self, session: u32, event: ClientEvent, now: u64) {
        let Some(code) = event.room_code() else {
            return;
        };
        let Some(handle) = self.find_room(code).await else {
            self.send(
                session,
                ServerEvent::JoinError {
                    message: SessionError::RoomNotFound.to_string(),
                },
            );
            return;
        };

        let mut room = handle.lock().await;
        if room.closed {
            self.send(
                session,
                ServerEvent::JoinError {
                    message: SessionError::RoomNotFound.to_string(),
                },
            );
            return;
        }

        match event {
            ClientEvent::ChangeTeam { team, .. } => match room.change_team(session, team) {
                Ok(()) => self.broadcast_lobby(&room, now),
                Err(e) => self.send(
                    session,
                    ServerEvent::TeamError {
                        message: e.to_string(),
                    },
                ),
            },
            ClientEvent::SetReady { is_ready, .. } => {
                if room.set_ready(session, is_ready) {
                    self.broadcast_lobby(&room, now);
                }
            }
            ClientEvent::UpdateSettings {
                custom_cooldowns, ..
            } => {
                if room.update_settings(session, custom_cooldowns) {
                    self.broadcast_lobby(&room, now);
                }
            }
            ClientEvent::SwapTeams { .. } => {
                if room.swap_teams(session) {
                    self.broadcast_lobby(&room, now);
                }
            }
            ClientEvent::SetOwner { player_id, .. } => {
                if room.set_owner(session, player_id) {
                    self.broadcast_lobby(&room, now);
                }
            }
            ClientEvent::StartGame { .. } => {
                let result = room.start_game(session);
                self.publish_start(&room, session, result, now);
            }
            ClientEvent::StartNewMatch { .. } => {
                let result = room.start_new_match(session);
                self.publish_start(&room, session, result, now);
            }
            ClientEvent::CancelRoom { .. } => {
                if room.cancel(session) {
                    self.broadcast(&room.code, ServerEvent::RoomCancelled);
                    let members = room.member_ids();
                    {
                        let mut memberships = self.memberships.write().await;
                        for member in &members {
                            memberships.remove(member);
                        }
                    }
                    for member in members {
                        self.dispatch(GameMessage::Unsubscribe { session: member });
                    }
                    self.rooms.remove(&room.code).await;
                }
            }
            ClientEvent::MakeMove {
                mv,
                player_color,
                queue,
                ..
            } => {
                let result = room.make_move(session, mv, player_color, queue, now);
                self.publish_move(&mut room, session, mv, result, now);
            }
            ClientEvent::ExecuteCommand { command, .. } => {
                match room.execute_command(session, &command, now) {
                    Ok(report) => self.publish_command(&mut room, session, report, now),
                    Err(e) => self.send(
                        session,
                        ServerEvent::CommandError {
                            message: e.to_string(),
                        },
                    ),
                }
            }
            ClientEvent::ReorderQueue {
                piece_key,
                previous_index,
                current_index,
                ..
            } => {
                if room.reorder_queue(session, &piece_key, previous_index, current_index) {
                    self.broadcast(
                        &room.code,
                        ServerEvent::QueueUpdated {
                            move_queue: room.game.queue.snapshot(),
                        },
                    );
                }
            }
            ClientEvent::CancelFromQueue {
                piece_key,
                move_index,
                ..
            } => {
                if room.cancel_from_queue(session, &piece_key, move_index) {
                    self.broadcast(
                        &room.code,
                        ServerEvent::QueueUpdated {
                            move_queue: room.game.queue.snapshot(),
                        },
                    );
                }
            }
            ClientEvent::Resign { .. } => {
                if room.resign(session).is_some() {
                    self.broadcast_game_over(&room);
                }
            }
            ClientEvent::CreateRoom { .. }
            | ClientEvent::EnterRoom { .. }
            | ClientEvent::LeaveRoom { .. } => {
                warn!("Lifecycle event routed as a room event");
            }
        }
    }

    fn publish_start(&self, room: &Room, session: u32, result: Result<(), SessionError>, now: u64) {
        match result {
            Ok(()) => self.broadcast(&room.code, ServerEvent::GameStarted(room.snapshot(now))),
            Err(e) => self.send(
                session,
                ServerEvent::StartError {
                    message: e.to_string(),
                },
            ),
        }
    }

    fn publish_move(
        &self,
        room: &mut Room,
        session: u32,
        request: MoveRequest,
        result: Result<MoveOutcome, MoveError>,
        now: u64,
    ) {
        match result {
            Ok(MoveOutcome::Applied(_)) => {
                self.broadcast(
                    &room.code,
                    ServerEvent::MoveMade {
                        mv: request,
                        board: room.game.board.clone(),
                    },
                );
                self.broadcast_board_state(room, now);
                if room.resolve().is_some() {
                    self.broadcast_game_over(room);
                }
            }
            Ok(MoveOutcome::Queued) => self.broadcast(
                &room.code,
                ServerEvent::QueueUpdated {
                    move_queue: room.game.queue.snapshot(),
                },
            ),
            Err(e) => self.send(
                session,
                ServerEvent::MoveError {
                    message: e.to_string(),
                },
            ),
        }
    }

    fn publish_command(&self, room: &mut Room, session: u32, report: CommandReport, now: u64) {
        for applied in &report.moves {
            self.broadcast(
                &room.code,
                ServerEvent::MoveMade {
                    mv: MoveRequest::new(applied.from, applied.to),
                    board: room.game.board.clone(),
                },
            );
        }
        if report.changed_queue() {
            self.broadcast_board_state(room, now);
        }

        match report.feedback() {
            Ok(message) => self.send(
                session,
                ServerEvent::CommandSuccess {
                    message: message.to_string(),
                },
            ),
            Err(message) => self.send(
                session,
                ServerEvent::CommandError {
                    message: message.to_string(),
                },
            ),
        }

        if room.resolve().is_some() {
            self.broadcast_game_over(room);
        }
    }

    /// One scheduler pass over every room
    pub async fn tick(&self, now: u64) {
        for handle in self.rooms.handles().await {
            let mut room = handle.lock().await;
            if room.closed {
                continue;
            }
            let events = room.tick(now);
            if events.is_empty() {
                continue;
            }

            for event in events {
                match event {
                    DrainEvent::Applied(applied) => self.broadcast(
                        &room.code,
                        ServerEvent::MoveMade {
                            mv: MoveRequest::new(applied.from, applied.to),
                            board: room.game.board.clone(),
                        },
                    ),
                    DrainEvent::Invalidated { from, to } => self.broadcast(
                        &room.code,
                        ServerEvent::QueueInvalidated {
                            piece_key: from.key(),
                            end_row: to.row,
                            end_col: to.col,
                        },
                    ),
                }
            }
            self.broadcast_board_state(&room, now);

            if room.resolve().is_some() {
                self.broadcast_game_over(&room);
            }
        }
    }
}
