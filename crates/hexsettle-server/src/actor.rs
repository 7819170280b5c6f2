//! Per-session actor.
//!
//! One tokio task owns each [`GameSession`] and drains a bounded mailbox, so
//! actions are applied strictly one at a time in arrival order. Requests
//! carry a oneshot reply channel. Facts go out on a separate event channel
//! for the relay to fan out.

use hexsettle_core::{Fact, GameAction, GameError, GamePhase, GameSession, Outcome, PlayerId, SessionSnapshot};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ActorError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error("Session is closed")]
    Closed,
}

/// Mailbox and timer settings for one session
#[derive(Debug, Clone, Copy)]
pub struct ActorSettings {
    pub mailbox_capacity: usize,
    pub discard_timeout: Duration,
}

/// What the session tells the outside world
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Facts(Vec<Fact>),
    /// The worker has stopped; the session is gone
    Closed { reason: String },
}

enum Command {
    Act {
        player: PlayerId,
        action: GameAction,
        reply: oneshot::Sender<Result<Outcome, GameError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Close {
        reason: String,
    },
}

/// Cheap handle for talking to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Act { player, action, .. } => write!(f, "Act({player}, {action:?})"),
            Command::Snapshot { .. } => write!(f, "Snapshot"),
            Command::Close { reason } => write!(f, "Close({reason})"),
        }
    }
}

impl SessionHandle {
    /// Start the worker task for `session`
    pub fn spawn(
        id: Uuid,
        session: GameSession,
        settings: ActorSettings,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.mailbox_capacity);
        let worker = Worker {
            id,
            session,
            settings,
            events,
            mailbox: tx.downgrade(),
            deadline_round: None,
        };
        let task = tokio::spawn(worker.run(rx));
        (Self { tx }, task)
    }

    /// Apply one action and wait for the verdict
    pub async fn act(&self, player: PlayerId, action: GameAction) -> Result<Outcome, ActorError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::Act { player, action, reply })
            .await
            .map_err(|_| ActorError::Closed)?;
        Ok(response.await.map_err(|_| ActorError::Closed)??)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, ActorError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| ActorError::Closed)?;
        response.await.map_err(|_| ActorError::Closed)
    }

    /// Tear the session down. Queued actions ahead of this still run.
    pub async fn close(&self, reason: impl Into<String>) -> Result<(), ActorError> {
        self.tx
            .send(Command::Close { reason: reason.into() })
            .await
            .map_err(|_| ActorError::Closed)
    }
}

struct Worker {
    id: Uuid,
    session: GameSession,
    settings: ActorSettings,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// For the discard timer to post into; weak so dropping every handle stops the worker
    mailbox: mpsc::WeakSender<Command>,
    /// Discard round whose timer is already running
    deadline_round: Option<u32>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!(session = %self.id, "session worker started");
        self.schedule_discard_deadline();

        let reason = loop {
            let Some(command) = rx.recv().await else {
                break "all handles dropped".to_string();
            };
            debug!(session = %self.id, ?command, "processing command");

            match command {
                Command::Act { player, action, reply } => {
                    let result = self.session.apply(player, action);
                    if let Ok(outcome) = &result {
                        self.publish(outcome.facts.clone());
                    }
                    // The requester may have gone away; the action still counts
                    let _ = reply.send(result);
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.session.snapshot());
                }
                Command::Close { reason } => break reason,
            }

            if self.session.is_finished() {
                break "game over".to_string();
            }
            if self.session.active_player_count() == 0 {
                break "all players left".to_string();
            }
            self.schedule_discard_deadline();
        };

        info!(session = %self.id, %reason, "session worker stopped");
        let _ = self.events.send(SessionEvent::Closed { reason });
    }

    fn publish(&self, facts: Vec<Fact>) {
        if facts.is_empty() {
            return;
        }
        if self.events.send(SessionEvent::Facts(facts)).is_err() {
            warn!(session = %self.id, "no listener for session facts");
        }
    }

    /// Start a timer the first time each discard round is seen
    fn schedule_discard_deadline(&mut self) {
        let GamePhase::Discard { round, .. } = self.session.phase else {
            return;
        };
        if self.deadline_round == Some(round) {
            return;
        }
        self.deadline_round = Some(round);

        let mailbox = self.mailbox.clone();
        let timeout = self.settings.discard_timeout;
        let player = self.session.current_player;
        let session = self.id;
        debug!(%session, round, ?timeout, "discard deadline scheduled");

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(mailbox) = mailbox.upgrade() else {
                return;
            };
            let (reply, _) = oneshot::channel();
            let action = GameAction::DiscardDeadline { round };
            if mailbox.send(Command::Act { player, action, reply }).await.is_err() {
                debug!(%session, round, "session gone before discard deadline");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexsettle_core::{Board, GameConfig, HexCoord, Resource, ResourceHand, Tile};

    fn settings(discard_timeout: Duration) -> ActorSettings {
        ActorSettings {
            mailbox_capacity: 8,
            discard_timeout,
        }
    }

    fn session() -> GameSession {
        let board = Board::from_layout(
            vec![
                Tile::resource(HexCoord::new(0, 0), Resource::Ore, 8),
                Tile::desert(HexCoord::new(1, 0)),
            ],
            Vec::new(),
        );
        let config = GameConfig {
            seed: Some(99),
            ..GameConfig::default()
        };
        GameSession::with_board(config, vec!["Alice".into(), "Bob".into(), "Carol".into()], board).unwrap()
    }

    #[tokio::test]
    async fn test_rejected_action_publishes_nothing() {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (handle, _task) =
            SessionHandle::spawn(Uuid::new_v4(), session(), settings(Duration::from_secs(60)), events_tx);

        let err = handle.act(1, GameAction::RollDice).await.unwrap_err();
        assert!(matches!(err, ActorError::Game(GameError::NotYourTurn)));

        let err = handle.act(0, GameAction::EndTurn).await.unwrap_err();
        assert!(matches!(err, ActorError::Game(GameError::InvalidPhase)));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accepted_action_publishes_facts() {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (handle, _task) =
            SessionHandle::spawn(Uuid::new_v4(), session(), settings(Duration::from_secs(60)), events_tx);

        let corner = HexCoord::new(0, 0).corners()[0];
        handle.act(0, GameAction::PlaceObject(corner.into())).await.unwrap();

        let Some(SessionEvent::Facts(facts)) = events.recv().await else {
            panic!("expected facts");
        };
        assert!(matches!(facts[0], Fact::ObjectPlaced { player: 0, .. }));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.board.pieces.len(), 1);
    }

    #[tokio::test]
    async fn test_discard_deadline_fires() {
        let mut game = session();
        game.phase = GamePhase::Roll;
        game.players[1].resources = ResourceHand::with_amounts(2, 2, 2, 2, 2);
        game.roll_with(0, (3, 4)).unwrap();

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (handle, _task) =
            SessionHandle::spawn(Uuid::new_v4(), game, settings(Duration::from_millis(20)), events_tx);

        let Some(SessionEvent::Facts(facts)) = events.recv().await else {
            panic!("expected forced discard facts");
        };
        assert!(facts.contains(&Fact::CardsDiscarded {
            player: 1,
            count: 5,
            forced: true
        }));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, GamePhase::RobberPlacing);
        assert_eq!(snapshot.players[1].resources.total(), 5);
    }

    #[tokio::test]
    async fn test_close_stops_worker() {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (handle, task) =
            SessionHandle::spawn(Uuid::new_v4(), session(), settings(Duration::from_secs(60)), events_tx);

        handle.close("host closed the session").await.unwrap();
        task.await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Closed {
                reason: "host closed the session".to_string()
            })
        );
        assert!(matches!(
            handle.act(0, GameAction::RollDice).await,
            Err(ActorError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_last_player_leaving_ends_session() {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (handle, task) =
            SessionHandle::spawn(Uuid::new_v4(), session(), settings(Duration::from_secs(60)), events_tx);

        for player in 0..3 {
            handle.act(player, GameAction::LeaveSession).await.unwrap();
        }
        task.await.unwrap();

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(SessionEvent::Closed {
                reason: "all players left".to_string()
            })
        );
    }
}
