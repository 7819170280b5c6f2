//! WebSocket protocol messages for hexsettle multiplayer.

use hexsettle_core::{Fact, GameAction, GameError, PlayerId, Response, SessionSnapshot};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Open a new session lobby
    CreateSession { player_name: String },

    /// Take a seat in a lobby
    JoinSession { session_id: Uuid, player_name: String },

    /// Leave the current lobby or running session
    LeaveSession,

    /// Start the game (host only)
    StartSession,

    /// Close the session for everyone (host only)
    CloseSession,

    /// Submit a game action for the seat this connection holds
    Action { action: GameAction },

    /// Take back a seat after reconnecting
    Rejoin { session_id: Uuid, seat: PlayerId },

    /// Request lobby list
    ListSessions,

    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Welcome message with assigned connection ID
    Welcome { connection_id: Uuid },

    /// Lobby created successfully
    SessionCreated { session_id: Uuid },

    /// Joined lobby successfully
    JoinedLobby { lobby: LobbyInfo },

    /// Left lobby or session successfully
    Left,

    /// Lobby membership changed
    LobbyUpdated { lobby: LobbyInfo },

    /// Game started; `seat` is this connection's player id
    SessionStarted {
        session_id: Uuid,
        seat: PlayerId,
        snapshot: Box<SessionSnapshot>,
    },

    /// State changes everyone in the session sees
    Facts { facts: Vec<Fact> },

    /// Reply meant only for the player who acted
    Response { response: Response },

    /// The action was refused and nothing changed
    ActionRejected { error: GameError },

    /// List of open lobbies
    SessionList { sessions: Vec<LobbyInfo> },

    /// The session was torn down
    SessionClosed { reason: String },

    /// Error occurred
    Error { message: String },

    /// Pong response
    Pong,
}

/// Lobby information for clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyInfo {
    pub id: Uuid,
    pub name: String,
    /// In seat order
    pub players: Vec<SeatInfo>,
    pub max_players: u8,
    pub host_id: Uuid,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatInfo {
    pub id: Uuid,
    pub name: String,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Lobby,
    InGame,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexsettle_core::{LegalityError, PieceKind};
    use serde_json::json;

    #[test]
    fn test_client_message_wire_shape() {
        let raw = json!({
            "type": "Action",
            "payload": { "action": { "StartBuild": "Road" } }
        });
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Action {
                action: GameAction::StartBuild(PieceKind::Road)
            }
        ));

        let msg: ClientMessage = serde_json::from_value(json!({ "type": "Ping" })).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_rejection_carries_typed_error() {
        let msg = ServerMessage::ActionRejected {
            error: GameError::Illegal(LegalityError::DistanceRule),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "ActionRejected");
        assert_eq!(value["payload"]["error"], json!({ "Illegal": "DistanceRule" }));
    }
}
