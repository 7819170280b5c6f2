//! Session registry: lobbies, seats and the running session actors.

use dashmap::DashMap;
use hexsettle_core::{GameConfig, GameError, GameSession, PlayerId};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::actor::{ActorError, ActorSettings, SessionEvent, SessionHandle};
use crate::protocol::{LobbyInfo, SeatInfo, SessionStatus};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Session is full")]
    SessionFull,

    #[error("Player not in session")]
    NotInSession,

    #[error("Not the host")]
    NotHost,

    #[error("Game already started")]
    AlreadyStarted,

    #[error("Not enough players")]
    NotEnoughPlayers,

    #[error("Game not started")]
    NotStarted,

    #[error("Seat {0} is still connected")]
    SeatTaken(PlayerId),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Actor(#[from] ActorError),
}

/// A connection holding a seat.
#[derive(Debug, Clone)]
pub struct Member {
    pub connection: Uuid,
    pub name: String,
    pub connected: bool,
}

impl Member {
    fn to_info(&self) -> SeatInfo {
        SeatInfo {
            id: self.connection,
            name: self.name.clone(),
            connected: self.connected,
        }
    }
}

/// One session, from lobby to finish.
pub struct SessionEntry {
    pub id: Uuid,
    pub name: String,
    pub max_players: u8,
    pub host_id: Uuid,
    pub status: SessionStatus,
    /// Seat order; a member's index is their player id once started
    pub members: Vec<Member>,
    /// The actor, once started
    pub handle: Option<SessionHandle>,
}

impl SessionEntry {
    fn new(id: Uuid, host_id: Uuid, host_name: String, max_players: u8) -> Self {
        Self {
            id,
            name: format!("{}'s Game", host_name),
            max_players,
            host_id,
            status: SessionStatus::Lobby,
            members: vec![Member {
                connection: host_id,
                name: host_name,
                connected: true,
            }],
            handle: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= usize::from(self.max_players)
    }

    pub fn seat_of(&self, connection: Uuid) -> Option<PlayerId> {
        self.members
            .iter()
            .position(|m| m.connection == connection)
            .map(|i| i as PlayerId)
    }

    pub fn to_info(&self) -> LobbyInfo {
        LobbyInfo {
            id: self.id,
            name: self.name.clone(),
            players: self.members.iter().map(Member::to_info).collect(),
            max_players: self.max_players,
            host_id: self.host_id,
            status: self.status,
        }
    }
}

/// Everything a new session needs besides its players
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_players: u8,
    pub game: GameConfig,
    pub actor: ActorSettings,
}

/// What the caller gets back from a successful start
pub struct StartedSession {
    pub handle: SessionHandle,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    /// Connection per seat
    pub seats: Vec<Uuid>,
}

pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
        }
    }

    pub fn create(&self, host_id: Uuid, host_name: String) -> LobbyInfo {
        let id = Uuid::new_v4();
        let entry = SessionEntry::new(id, host_id, host_name, self.settings.max_players);
        let info = entry.to_info();
        self.sessions.insert(id, entry);
        info!(session = %id, host = %host_id, "lobby created");
        info
    }

    pub fn join(&self, session_id: Uuid, player_id: Uuid, name: String) -> Result<LobbyInfo, RegistryError> {
        let mut entry = self.sessions.get_mut(&session_id).ok_or(RegistryError::SessionNotFound)?;
        if entry.status != SessionStatus::Lobby {
            return Err(RegistryError::AlreadyStarted);
        }
        if entry.is_full() {
            return Err(RegistryError::SessionFull);
        }

        entry.members.push(Member {
            connection: player_id,
            name,
            connected: true,
        });
        Ok(entry.to_info())
    }

    /// Leave a lobby that has not started. Returns the updated lobby, or
    /// `None` when the last member left and the lobby was removed.
    pub fn leave_lobby(&self, session_id: Uuid, player_id: Uuid) -> Result<Option<LobbyInfo>, RegistryError> {
        let info = {
            let mut entry = self.sessions.get_mut(&session_id).ok_or(RegistryError::SessionNotFound)?;
            if entry.status != SessionStatus::Lobby {
                return Err(RegistryError::AlreadyStarted);
            }
            let seat = entry.seat_of(player_id).ok_or(RegistryError::NotInSession)?;
            entry.members.remove(usize::from(seat));

            // If host left, the next seat hosts
            if player_id == entry.host_id {
                if let Some(next) = entry.members.first().map(|m| m.connection) {
                    entry.host_id = next;
                }
            }
            (!entry.members.is_empty()).then(|| entry.to_info())
        };

        if info.is_none() {
            self.sessions.remove(&session_id);
        }
        Ok(info)
    }

    /// Lobby to started: build the game and spawn its actor
    pub fn start(&self, session_id: Uuid, requester: Uuid) -> Result<StartedSession, RegistryError> {
        let mut entry = self.sessions.get_mut(&session_id).ok_or(RegistryError::SessionNotFound)?;
        if requester != entry.host_id {
            return Err(RegistryError::NotHost);
        }
        if entry.status != SessionStatus::Lobby {
            return Err(RegistryError::AlreadyStarted);
        }
        if entry.members.len() < 2 {
            return Err(RegistryError::NotEnoughPlayers);
        }

        let names = entry.members.iter().map(|m| m.name.clone()).collect();
        let game = GameSession::new(self.settings.game.clone(), names)?;

        let (events_tx, events) = mpsc::unbounded_channel();
        let (handle, _task) = SessionHandle::spawn(session_id, game, self.settings.actor, events_tx);
        entry.handle = Some(handle.clone());
        entry.status = SessionStatus::InGame;
        info!(session = %session_id, players = entry.members.len(), "session started");

        Ok(StartedSession {
            handle,
            events,
            seats: entry.members.iter().map(|m| m.connection).collect(),
        })
    }

    /// The running actor and the seat a connection holds in it
    pub fn seat(&self, session_id: Uuid, connection: Uuid) -> Result<(SessionHandle, PlayerId), RegistryError> {
        let entry = self.sessions.get(&session_id).ok_or(RegistryError::SessionNotFound)?;
        let handle = entry.handle.clone().ok_or(RegistryError::NotStarted)?;
        let seat = entry.seat_of(connection).ok_or(RegistryError::NotInSession)?;
        Ok((handle, seat))
    }

    /// Connection per seat, for fanning facts out
    pub fn seat_connections(&self, session_id: Uuid) -> Option<Vec<(Uuid, bool)>> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.members.iter().map(|m| (m.connection, m.connected)).collect())
    }

    /// Mark a seat as disconnected; returns the seat it held
    pub fn disconnect(&self, session_id: Uuid, connection: Uuid) -> Result<PlayerId, RegistryError> {
        let mut entry = self.sessions.get_mut(&session_id).ok_or(RegistryError::SessionNotFound)?;
        let seat = entry.seat_of(connection).ok_or(RegistryError::NotInSession)?;
        entry.members[usize::from(seat)].connected = false;
        Ok(seat)
    }

    /// Hand a disconnected seat to a new connection
    pub fn rejoin(
        &self,
        session_id: Uuid,
        seat: PlayerId,
        connection: Uuid,
    ) -> Result<SessionHandle, RegistryError> {
        let mut entry = self.sessions.get_mut(&session_id).ok_or(RegistryError::SessionNotFound)?;
        let handle = entry.handle.clone().ok_or(RegistryError::NotStarted)?;
        let member = entry
            .members
            .get_mut(usize::from(seat))
            .ok_or(RegistryError::NotInSession)?;
        if member.connected {
            return Err(RegistryError::SeatTaken(seat));
        }

        member.connection = connection;
        member.connected = true;
        Ok(handle)
    }

    /// Open lobbies
    pub fn lobbies(&self) -> Vec<LobbyInfo> {
        self.sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Lobby)
            .map(|s| s.to_info())
            .collect()
    }

    pub fn info(&self, session_id: Uuid) -> Option<LobbyInfo> {
        self.sessions.get(&session_id).map(|s| s.to_info())
    }

    pub fn host_of(&self, session_id: Uuid) -> Option<Uuid> {
        self.sessions.get(&session_id).map(|s| s.host_id)
    }

    /// Drop a session whose worker has stopped
    pub fn remove(&self, session_id: Uuid) -> Option<SessionEntry> {
        self.sessions.remove(&session_id).map(|(_, entry)| entry)
    }

    /// Forced close. A running worker finishes its current action first.
    pub async fn close(&self, session_id: Uuid, reason: &str) -> Result<(), RegistryError> {
        let entry = self.remove(session_id).ok_or(RegistryError::SessionNotFound)?;
        info!(session = %session_id, %reason, "session closed");
        if let Some(handle) = entry.handle {
            handle.close(reason).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexsettle_core::{GameAction, GamePhase};
    use std::time::Duration;

    fn registry(max_players: u8) -> SessionRegistry {
        SessionRegistry::new(SessionSettings {
            max_players,
            game: GameConfig {
                seed: Some(5),
                ..GameConfig::default()
            },
            actor: ActorSettings {
                mailbox_capacity: 8,
                discard_timeout: Duration::from_secs(60),
            },
        })
    }

    #[test]
    fn test_create_lobby() {
        let registry = registry(4);
        let host_id = Uuid::new_v4();
        let lobby = registry.create(host_id, "Host".to_string());

        assert_eq!(lobby.players.len(), 1);
        assert_eq!(lobby.host_id, host_id);
        assert_eq!(lobby.status, SessionStatus::Lobby);
        assert_eq!(registry.lobbies(), vec![lobby]);
    }

    #[test]
    fn test_join_and_leave() {
        let registry = registry(2);
        let host_id = Uuid::new_v4();
        let lobby = registry.create(host_id, "Host".to_string());

        let player2 = Uuid::new_v4();
        registry.join(lobby.id, player2, "Player 2".to_string()).unwrap();

        // Can't add more players
        assert!(matches!(
            registry.join(lobby.id, Uuid::new_v4(), "Player 3".to_string()),
            Err(RegistryError::SessionFull)
        ));

        // Host leaving hands the lobby over
        let updated = registry.leave_lobby(lobby.id, host_id).unwrap().unwrap();
        assert_eq!(updated.host_id, player2);

        // Last one out removes it
        assert!(registry.leave_lobby(lobby.id, player2).unwrap().is_none());
        assert!(registry.info(lobby.id).is_none());
    }

    #[tokio::test]
    async fn test_start_session() {
        let registry = registry(4);
        let host_id = Uuid::new_v4();
        let lobby = registry.create(host_id, "Host".to_string());

        // Can't start with only 1 player
        assert!(matches!(
            registry.start(lobby.id, host_id),
            Err(RegistryError::NotEnoughPlayers)
        ));

        let player2 = Uuid::new_v4();
        registry.join(lobby.id, player2, "Player 2".to_string()).unwrap();

        // Non-host can't start
        assert!(matches!(registry.start(lobby.id, player2), Err(RegistryError::NotHost)));

        let started = registry.start(lobby.id, host_id).unwrap();
        assert_eq!(started.seats, vec![host_id, player2]);
        assert!(matches!(
            registry.join(lobby.id, Uuid::new_v4(), "Late".to_string()),
            Err(RegistryError::AlreadyStarted)
        ));

        let (handle, seat) = registry.seat(lobby.id, player2).unwrap();
        assert_eq!(seat, 1);
        let snapshot = handle.snapshot().await.unwrap();
        assert!(matches!(snapshot.phase, GamePhase::Setup { .. }));
    }

    #[tokio::test]
    async fn test_rejoin_only_disconnected_seat() {
        let registry = registry(4);
        let host_id = Uuid::new_v4();
        let lobby = registry.create(host_id, "Host".to_string());
        let player2 = Uuid::new_v4();
        registry.join(lobby.id, player2, "Player 2".to_string()).unwrap();
        let started = registry.start(lobby.id, host_id).unwrap();

        let reconnect = Uuid::new_v4();
        assert!(matches!(
            registry.rejoin(lobby.id, 1, reconnect),
            Err(RegistryError::SeatTaken(1))
        ));

        assert_eq!(registry.disconnect(lobby.id, player2).unwrap(), 1);
        started.handle.act(1, GameAction::LeaveSession).await.unwrap();

        let handle = registry.rejoin(lobby.id, 1, reconnect).unwrap();
        handle.act(1, GameAction::RejoinSession).await.unwrap();
        assert_eq!(registry.seat(lobby.id, reconnect).unwrap().1, 1);
    }

    #[tokio::test]
    async fn test_forced_close() {
        let registry = registry(4);
        let host_id = Uuid::new_v4();
        let lobby = registry.create(host_id, "Host".to_string());
        registry.join(lobby.id, Uuid::new_v4(), "Player 2".to_string()).unwrap();
        let mut started = registry.start(lobby.id, host_id).unwrap();

        registry.close(lobby.id, "closed by host").await.unwrap();
        assert!(registry.info(lobby.id).is_none());
        assert_eq!(
            started.events.recv().await,
            Some(SessionEvent::Closed {
                reason: "closed by host".to_string()
            })
        );
        assert!(matches!(
            registry.close(lobby.id, "again").await,
            Err(RegistryError::SessionNotFound)
        ));
    }
}
