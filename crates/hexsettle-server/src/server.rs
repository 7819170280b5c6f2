//! WebSocket server and connection handling.

use crate::actor::{ActorError, ActorSettings, SessionEvent};
use crate::config::ServerConfig;
use crate::protocol::{ClientMessage, ServerMessage, SessionStatus};
use crate::registry::{RegistryError, SessionRegistry, SessionSettings};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use hexsettle_core::{GameAction, Outcome};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Server state shared across all connections.
pub struct ServerState {
    pub registry: SessionRegistry,
    /// Mapping from connection ID to their session ID
    pub player_sessions: DashMap<Uuid, Uuid>,
    /// Mapping from connection ID to their message sender
    pub player_senders: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: SessionRegistry::new(SessionSettings {
                max_players: config.max_players,
                game: config.game_config(),
                actor: ActorSettings {
                    mailbox_capacity: config.mailbox_capacity,
                    discard_timeout: config.discard_timeout,
                },
            }),
            player_sessions: DashMap::new(),
            player_senders: DashMap::new(),
        }
    }

    /// Send a message to a specific connection.
    pub fn send_to_player(&self, player_id: Uuid, msg: ServerMessage) {
        if let Some(sender) = self.player_senders.get(&player_id) {
            let _ = sender.send(msg);
        }
    }

    /// Broadcast to every connected member of a session except one.
    pub fn broadcast_to_session_except(&self, session_id: Uuid, except: Uuid, msg: ServerMessage) {
        for (connection, connected) in self.registry.seat_connections(session_id).unwrap_or_default() {
            if connected && connection != except {
                self.send_to_player(connection, msg.clone());
            }
        }
    }

    fn send_error(&self, player_id: Uuid, err: impl std::fmt::Display) {
        self.send_to_player(player_id, ServerMessage::Error { message: err.to_string() });
    }
}

/// Run the WebSocket server.
pub async fn run_server(addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("hexsettle server listening on {}", addr);

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let connection_id = Uuid::new_v4();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.player_senders.insert(connection_id, tx);

    let welcome = ServerMessage::Welcome { connection_id };
    ws_sender.send(Message::Text(serde_json::to_string(&welcome)?)).await?;

    // Forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(connection_id, client_msg, &state).await,
                Err(e) => {
                    warn!("Invalid message from {}: {}", connection_id, e);
                    state.send_error(connection_id, format!("invalid message: {e}"));
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client {} closing connection", connection_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                state.send_to_player(connection_id, ServerMessage::Pong);
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    // A dropped connection leaves the seat open for a rejoin
    leave(connection_id, &state).await;
    state.player_senders.remove(&connection_id);
    send_task.abort();

    info!("Connection closed for {}", connection_id);
    Ok(())
}

/// Handle a client message.
async fn handle_message(player_id: Uuid, msg: ClientMessage, state: &Arc<ServerState>) {
    match msg {
        ClientMessage::CreateSession { player_name } => {
            if state.player_sessions.contains_key(&player_id) {
                state.send_error(player_id, "already in a session");
                return;
            }
            let lobby = state.registry.create(player_id, player_name);
            state.player_sessions.insert(player_id, lobby.id);

            state.send_to_player(player_id, ServerMessage::SessionCreated { session_id: lobby.id });
            state.send_to_player(player_id, ServerMessage::JoinedLobby { lobby });
        }

        ClientMessage::JoinSession {
            session_id,
            player_name,
        } => {
            if state.player_sessions.contains_key(&player_id) {
                state.send_error(player_id, "already in a session");
                return;
            }
            match state.registry.join(session_id, player_id, player_name) {
                Ok(lobby) => {
                    state.player_sessions.insert(player_id, session_id);
                    state.send_to_player(player_id, ServerMessage::JoinedLobby { lobby: lobby.clone() });
                    state.broadcast_to_session_except(session_id, player_id, ServerMessage::LobbyUpdated { lobby });
                }
                Err(e) => state.send_error(player_id, e),
            }
        }

        ClientMessage::LeaveSession => {
            if leave(player_id, state).await {
                state.send_to_player(player_id, ServerMessage::Left);
            }
        }

        ClientMessage::StartSession => {
            let Some(session_id) = session_of(player_id, state) else {
                state.send_error(player_id, RegistryError::NotInSession);
                return;
            };
            if let Err(e) = start_session(session_id, player_id, state).await {
                state.send_error(player_id, e);
            }
        }

        ClientMessage::CloseSession => {
            let Some(session_id) = session_of(player_id, state) else {
                state.send_error(player_id, RegistryError::NotInSession);
                return;
            };
            if state.registry.host_of(session_id) != Some(player_id) {
                state.send_error(player_id, RegistryError::NotHost);
                return;
            }
            close_session(session_id, state).await;
        }

        ClientMessage::Action { action } => {
            // Only the session's own timer may end a discard round
            if matches!(action, GameAction::DiscardDeadline { .. }) {
                state.send_error(player_id, "discard deadlines are issued by the server");
                return;
            }
            let Some(session_id) = session_of(player_id, state) else {
                state.send_error(player_id, RegistryError::NotInSession);
                return;
            };
            let (handle, seat) = match state.registry.seat(session_id, player_id) {
                Ok(found) => found,
                Err(e) => return state.send_error(player_id, e),
            };
            let result = handle.act(seat, action).await;
            reply(player_id, result, state);
        }

        ClientMessage::Rejoin { session_id, seat } => {
            if state.player_sessions.contains_key(&player_id) {
                state.send_error(player_id, "already in a session");
                return;
            }
            let handle = match state.registry.rejoin(session_id, seat, player_id) {
                Ok(handle) => handle,
                Err(e) => return state.send_error(player_id, e),
            };
            state.player_sessions.insert(player_id, session_id);
            let result = handle.act(seat, GameAction::RejoinSession).await;
            if result.is_err() {
                // Give the seat back to whoever can still claim it
                let _ = state.registry.disconnect(session_id, player_id);
                state.player_sessions.remove(&player_id);
            }
            reply(player_id, result, state);
        }

        ClientMessage::ListSessions => {
            let sessions = state.registry.lobbies();
            state.send_to_player(player_id, ServerMessage::SessionList { sessions });
        }

        ClientMessage::Ping => {
            state.send_to_player(player_id, ServerMessage::Pong);
        }
    }
}

fn session_of(player_id: Uuid, state: &ServerState) -> Option<Uuid> {
    state.player_sessions.get(&player_id).map(|s| *s)
}

/// Send the requester their private reply or the reason for rejection
fn reply(player_id: Uuid, result: Result<Outcome, ActorError>, state: &ServerState) {
    match result {
        Ok(outcome) => {
            if let Some(response) = outcome.response {
                state.send_to_player(player_id, ServerMessage::Response { response });
            }
        }
        Err(ActorError::Game(error)) => {
            debug!(player = %player_id, %error, "action rejected");
            state.send_to_player(player_id, ServerMessage::ActionRejected { error });
        }
        Err(e) => state.send_error(player_id, e),
    }
}

async fn start_session(session_id: Uuid, player_id: Uuid, state: &Arc<ServerState>) -> Result<(), RegistryError> {
    let started = state.registry.start(session_id, player_id)?;
    let snapshot = Box::new(started.handle.snapshot().await?);

    for (seat, connection) in started.seats.iter().enumerate() {
        state.send_to_player(
            *connection,
            ServerMessage::SessionStarted {
                session_id,
                seat: seat as u8,
                snapshot: snapshot.clone(),
            },
        );
    }
    spawn_fanout(Arc::clone(state), session_id, started.seats, started.events);
    Ok(())
}

/// Relay a session's facts to its connected members until it stops
fn spawn_fanout(
    state: Arc<ServerState>,
    session_id: Uuid,
    seats: Vec<Uuid>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    tokio::spawn(relay_session_events(state, session_id, seats, events));
}

async fn relay_session_events(
    state: Arc<ServerState>,
    session_id: Uuid,
    seats: Vec<Uuid>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    // Last known membership, still needed once the entry is gone
    let mut members: Vec<(Uuid, bool)> = seats.into_iter().map(|c| (c, true)).collect();

    // A worker that dies without saying goodbye just drops its sender
    let reason = loop {
        let Some(event) = events.recv().await else {
            warn!(session = %session_id, "session worker stopped without closing");
            break "session worker stopped".to_string();
        };
        if let Some(current) = state.registry.seat_connections(session_id) {
            members = current;
        }
        match event {
            SessionEvent::Facts(facts) => {
                let msg = ServerMessage::Facts { facts };
                for (connection, connected) in &members {
                    if *connected {
                        state.send_to_player(*connection, msg.clone());
                    }
                }
            }
            SessionEvent::Closed { reason } => break reason,
        }
    };

    state.registry.remove(session_id);
    for (connection, _) in &members {
        state.player_sessions.remove_if(connection, |_, s| *s == session_id);
        state.send_to_player(*connection, ServerMessage::SessionClosed { reason: reason.clone() });
    }
    debug!(session = %session_id, %reason, "fanout finished");
}

async fn close_session(session_id: Uuid, state: &ServerState) {
    let lobby = state.registry.info(session_id);
    if let Err(e) = state.registry.close(session_id, "closed by host").await {
        warn!(session = %session_id, "close failed: {}", e);
        return;
    }
    // A running session reports its own closing through the fanout
    if let Some(lobby) = lobby.filter(|l| l.status == SessionStatus::Lobby) {
        for member in lobby.players {
            state.player_sessions.remove(&member.id);
            state.send_to_player(
                member.id,
                ServerMessage::SessionClosed {
                    reason: "closed by host".to_string(),
                },
            );
        }
    }
}

/// Take a connection out of its session. In a running game the seat stays
/// and the player is marked absent. Returns false if it was in no session.
async fn leave(player_id: Uuid, state: &ServerState) -> bool {
    let Some((_, session_id)) = state.player_sessions.remove(&player_id) else {
        return false;
    };
    let Some(lobby) = state.registry.info(session_id) else {
        return true;
    };

    match lobby.status {
        SessionStatus::Lobby => match state.registry.leave_lobby(session_id, player_id) {
            Ok(Some(lobby)) => {
                state.broadcast_to_session_except(session_id, player_id, ServerMessage::LobbyUpdated { lobby });
            }
            Ok(None) => {}
            Err(e) => warn!(player = %player_id, "leave failed: {}", e),
        },
        SessionStatus::InGame => {
            let seat = state
                .registry
                .seat(session_id, player_id)
                .and_then(|(handle, seat)| state.registry.disconnect(session_id, player_id).map(|_| (handle, seat)));
            match seat {
                Ok((handle, seat)) => {
                    if let Err(e) = handle.act(seat, GameAction::LeaveSession).await {
                        debug!(player = %player_id, "leave not applied: {}", e);
                    }
                }
                Err(e) => warn!(player = %player_id, "leave failed: {}", e),
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_lobby() -> (Arc<ServerState>, Uuid, Vec<mpsc::UnboundedReceiver<ServerMessage>>) {
        let state = Arc::new(ServerState::new(&ServerConfig::default()));
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let lobby = state.registry.create(host, "Alice".to_string());
        state.registry.join(lobby.id, guest, "Bob".to_string()).unwrap();

        let mut inboxes = Vec::new();
        for connection in [host, guest] {
            let (tx, rx) = mpsc::unbounded_channel();
            state.player_senders.insert(connection, tx);
            state.player_sessions.insert(connection, lobby.id);
            inboxes.push(rx);
        }
        (state, lobby.id, inboxes)
    }

    #[tokio::test]
    async fn test_fanout_cleans_up_when_worker_vanishes() {
        let (state, session_id, mut inboxes) = state_with_lobby();
        let started = state.registry.start(session_id, state.registry.host_of(session_id).unwrap()).unwrap();

        // Stand-in for a worker that died mid-action: its sender is simply dropped
        let (events_tx, events) = mpsc::unbounded_channel();
        drop(events_tx);
        relay_session_events(Arc::clone(&state), session_id, started.seats, events).await;

        assert!(state.registry.info(session_id).is_none());
        assert!(state.player_sessions.is_empty());
        for inbox in &mut inboxes {
            let Ok(ServerMessage::SessionClosed { reason }) = inbox.try_recv() else {
                panic!("expected SessionClosed");
            };
            assert_eq!(reason, "session worker stopped");
        }
    }

    #[tokio::test]
    async fn test_fanout_relays_facts_then_closes() {
        let (state, session_id, mut inboxes) = state_with_lobby();
        let started = state.registry.start(session_id, state.registry.host_of(session_id).unwrap()).unwrap();

        let (events_tx, events) = mpsc::unbounded_channel();
        events_tx.send(SessionEvent::Facts(Vec::new())).unwrap();
        events_tx
            .send(SessionEvent::Closed {
                reason: "game over".to_string(),
            })
            .unwrap();
        relay_session_events(Arc::clone(&state), session_id, started.seats, events).await;

        assert!(state.registry.info(session_id).is_none());
        for inbox in &mut inboxes {
            assert!(matches!(inbox.try_recv(), Ok(ServerMessage::Facts { .. })));
            assert!(matches!(
                inbox.try_recv(),
                Ok(ServerMessage::SessionClosed { reason }) if reason == "game over"
            ));
        }
    }
}
