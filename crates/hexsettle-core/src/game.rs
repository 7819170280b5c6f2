//! Core game state machine.
//!
//! [`GameSession`] owns the board, the players and the trade book. Every
//! inbound action goes through [`GameSession::apply`], which either mutates
//! state and returns the resulting facts, or rejects the action with a
//! [`GameError`] and leaves everything as it was.

use crate::actions::{DevCardPlay, Fact, GameAction, Outcome, Response};
use crate::board::{Board, BoardSnapshot, LegalityError, Piece, PieceKind, PlacementRule, PlayerId, Resource};
use crate::hex::{Coord, CornerCoord, GeometryError, HexCoord};
use crate::player::{costs, DevelopmentCard, OverDraw, Player, ResourceHand};
use crate::trade::{TradeBook, TradeOffer, TradeStatus};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info};

/// Minimum road length for Longest Road
pub const MIN_LONGEST_ROAD: u32 = 5;

/// Minimum knights for Largest Army
pub const MIN_LARGEST_ARMY: u32 = 3;

pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 6;

/// Rules that may vary between sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Victory points needed to win
    pub victory_points_to_win: u32,
    /// Players holding more than this many cards on a 7 discard half
    pub discard_limit: u32,
    /// Seed for board, dice, deck and steals; entropy when absent
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            victory_points_to_win: 10,
            discard_limit: 7,
            seed: None,
        }
    }
}

/// Game phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Initial placement phase
    Setup {
        /// Which round of setup (1 or 2)
        round: u8,
        /// What we're currently placing
        placing: SetupPlacing,
    },

    /// Before rolling dice at start of turn
    Roll,

    /// Building, trading and card play until the player ends the turn
    Main,

    /// A 7 was rolled and these players still owe half their cards
    Discard {
        pending: BTreeSet<PlayerId>,
        /// Distinguishes deadlines of successive discard rounds
        round: u32,
    },

    /// The current player must move the robber
    RobberPlacing,

    /// Playing road building card - free roads left to place
    RoadBuilding { remaining: u8 },

    /// Game is over
    Ended { winner: PlayerId },
}

impl GamePhase {
    pub fn name(&self) -> &'static str {
        match self {
            GamePhase::Setup { .. } => "setup",
            GamePhase::Roll => "roll",
            GamePhase::Main => "main",
            GamePhase::Discard { .. } => "discard",
            GamePhase::RobberPlacing => "robber_placing",
            GamePhase::RoadBuilding { .. } => "road_building",
            GamePhase::Ended { .. } => "ended",
        }
    }
}

/// What we're placing during setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupPlacing {
    Settlement,
    Road,
}

/// Why an action was rejected. State is unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid action for current phase")]
    InvalidPhase,

    #[error(transparent)]
    Illegal(#[from] LegalityError),

    #[error("Not an active member of this session")]
    NotAMember,

    #[error("Rejoin denied: {0}")]
    RejoinDenied(String),

    #[error(transparent)]
    InvalidCoordinate(#[from] GeometryError),

    #[error("A session needs 2 to 6 players, got {0}")]
    PlayerCount(usize),

    #[error("Game is over")]
    GameOver,
}

impl From<OverDraw> for GameError {
    fn from(err: OverDraw) -> Self {
        GameError::Illegal(err.into())
    }
}

/// Everything a client needs to redraw the game, sent on rejoin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub board: BoardSnapshot,
    pub players: Vec<Player>,
    pub current_player: PlayerId,
    pub phase: GamePhase,
    pub turn_number: u32,
    pub dice: Option<(u8, u8)>,
    pub trade_offers: Vec<TradeOffer>,
    pub dev_cards_remaining: usize,
}

/// One running game
#[derive(Debug, Clone)]
pub struct GameSession {
    pub config: GameConfig,
    pub board: Board,
    /// All players, indexed by id
    pub players: Vec<Player>,
    pub current_player: PlayerId,
    pub phase: GamePhase,
    /// Turn number (0 during setup)
    pub turn_number: u32,
    /// Last dice roll of the current turn
    pub dice: Option<(u8, u8)>,
    pub trades: TradeBook,
    /// Development card deck; cards are drawn from the end
    pub dev_card_deck: Vec<DevelopmentCard>,
    rng: StdRng,
    /// Snake order: every player forward, then every player backward
    setup_order: Vec<PlayerId>,
    setup_step: usize,
    /// The settlement the next setup road must touch
    setup_anchor: Option<CornerCoord>,
    pending_build: Option<PieceKind>,
    rolled_this_turn: bool,
    dev_card_played_this_turn: bool,
    discard_round: u32,
}

impl GameSession {
    /// Create a session on a freshly generated standard board
    pub fn new(config: GameConfig, player_names: Vec<String>) -> Result<Self, GameError> {
        let mut rng = seeded_rng(config.seed);
        let board = Board::standard_with_rng(&mut rng);
        Self::build(config, player_names, board, rng)
    }

    /// Create a session on a fixed board
    pub fn with_board(config: GameConfig, player_names: Vec<String>, board: Board) -> Result<Self, GameError> {
        let rng = seeded_rng(config.seed);
        Self::build(config, player_names, board, rng)
    }

    fn build(config: GameConfig, player_names: Vec<String>, board: Board, mut rng: StdRng) -> Result<Self, GameError> {
        let count = player_names.len();
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&count) {
            return Err(GameError::PlayerCount(count));
        }

        let players: Vec<Player> = player_names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Player::new(i as PlayerId, name))
            .collect();

        let mut dev_card_deck = DevelopmentCard::standard_deck();
        dev_card_deck.shuffle(&mut rng);

        let forward = (0..count as PlayerId).collect::<Vec<_>>();
        let setup_order: Vec<PlayerId> = forward.iter().chain(forward.iter().rev()).copied().collect();

        info!(players = count, "session created");

        Ok(Self {
            config,
            board,
            players,
            current_player: setup_order[0],
            phase: GamePhase::Setup {
                round: 1,
                placing: SetupPlacing::Settlement,
            },
            turn_number: 0,
            dice: None,
            trades: TradeBook::new(),
            dev_card_deck,
            rng,
            setup_order,
            setup_step: 0,
            setup_anchor: None,
            pending_build: None,
            rolled_this_turn: false,
            dev_card_played_this_turn: false,
            discard_round: 0,
        })
    }

    // ==================== Queries ====================

    /// Get a player by ID
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(usize::from(id))
    }

    fn player_mut(&mut self, id: PlayerId) -> &mut Player {
        &mut self.players[usize::from(id)]
    }

    pub fn active_player_count(&self) -> usize {
        self.players.iter().filter(|p| p.active).count()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, GamePhase::Ended { .. })
    }

    pub fn winner(&self) -> Option<PlayerId> {
        match self.phase {
            GamePhase::Ended { winner } => Some(winner),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            board: self.board.snapshot(),
            players: self.players.clone(),
            current_player: self.current_player,
            phase: self.phase.clone(),
            turn_number: self.turn_number,
            dice: self.dice,
            trade_offers: self.trades.offers().cloned().collect(),
            dev_cards_remaining: self.dev_card_deck.len(),
        }
    }

    /// Replace the deck; cards are drawn in the order given
    pub fn stack_deck(&mut self, mut cards: Vec<DevelopmentCard>) {
        cards.reverse();
        self.dev_card_deck = cards;
    }

    // ==================== Action Entry Points ====================

    /// Validate and apply one action from `player`
    pub fn apply(&mut self, player: PlayerId, action: GameAction) -> Result<Outcome, GameError> {
        debug!(player, ?action, "applying action");
        self.run(player, |session| session.dispatch(player, action))
    }

    /// Roll with fixed dice values (1-6 each), for replays and tests
    pub fn roll_with(&mut self, player: PlayerId, dice: (u8, u8)) -> Result<Outcome, GameError> {
        debug!(player, ?dice, "applying fixed roll");
        self.run(player, |session| {
            session.check_active(player)?;
            if !(1..=6).contains(&dice.0) || !(1..=6).contains(&dice.1) {
                return Err(LegalityError::InvalidDice(dice.0, dice.1).into());
            }
            session.roll(player, dice)
        })
    }

    fn run<F>(&mut self, player: PlayerId, step: F) -> Result<Outcome, GameError>
    where
        F: FnOnce(&mut Self) -> Result<Outcome, GameError>,
    {
        let before = (self.phase.clone(), self.current_player);
        match step(self) {
            Ok(mut outcome) => {
                self.settle(&mut outcome.facts, before);
                debug!(player, facts = outcome.facts.len(), "action accepted");
                Ok(outcome)
            }
            Err(err) => {
                debug!(player, %err, "action rejected");
                Err(err)
            }
        }
    }

    fn dispatch(&mut self, player: PlayerId, action: GameAction) -> Result<Outcome, GameError> {
        match action {
            GameAction::RejoinSession => return self.rejoin(player),
            GameAction::LeaveSession => return self.leave(player),
            // Posted by the session's own timer rather than a player
            GameAction::DiscardDeadline { round } => return self.discard_deadline(round),
            _ => {}
        }
        self.check_active(player)?;

        match action {
            GameAction::StartBuild(kind) => self.start_build(player, kind),
            GameAction::PlaceObject(coord) => self.place_object(player, coord),
            GameAction::CancelBuild => self.cancel_build(player),
            GameAction::RollDice => {
                let dice = (self.rng.gen_range(1..=6), self.rng.gen_range(1..=6));
                self.roll(player, dice)
            }
            GameAction::EndTurn => {
                self.require_turn(player)?;
                if self.phase != GamePhase::Main {
                    return Err(GameError::InvalidPhase);
                }
                let mut outcome = Outcome::default();
                self.end_turn(&mut outcome.facts);
                Ok(outcome)
            }
            GameAction::StartTrade { offered, requested } => self.start_trade(player, offered, requested),
            GameAction::RegisterInterest { offering_player } => self.register_interest(player, offering_player),
            GameAction::AcceptTrade { chosen } => self.accept_trade(player, chosen),
            GameAction::DeclineTrade { offering_player } => self.decline_trade(player, offering_player),
            GameAction::CancelTrade => {
                let offer = self.trades.cancel(player)?;
                Ok(Outcome {
                    facts: vec![Fact::TradeCanceled {
                        offering_player: offer.offering_player,
                    }],
                    response: None,
                })
            }
            GameAction::BankTrade {
                give,
                give_count,
                receive,
            } => self.bank_trade(player, give, give_count, receive),
            GameAction::BuyDevCard => self.buy_dev_card(player),
            GameAction::UseDevCard(play) => self.use_dev_card(player, play),
            GameAction::DiscardCards(cards) => self.discard(player, cards),
            GameAction::PlaceRobber { hex, victim } => self.place_robber(player, hex, victim),
            GameAction::RejoinSession | GameAction::LeaveSession | GameAction::DiscardDeadline { .. } => {
                Err(GameError::InvalidPhase)
            }
        }
    }

    fn check_active(&self, player: PlayerId) -> Result<(), GameError> {
        match self.player(player) {
            Some(p) if p.active => {}
            _ => return Err(GameError::NotAMember),
        }
        if self.is_finished() {
            return Err(GameError::GameOver);
        }
        Ok(())
    }

    fn require_turn(&self, player: PlayerId) -> Result<(), GameError> {
        if player != self.current_player {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    fn require_main(&self) -> Result<(), GameError> {
        if self.phase != GamePhase::Main {
            return Err(GameError::InvalidPhase);
        }
        Ok(())
    }

    /// Where the turn continues after the robber or free roads
    fn resume_phase(&self) -> GamePhase {
        if self.rolled_this_turn {
            GamePhase::Main
        } else {
            GamePhase::Roll
        }
    }

    // ==================== Building ====================

    fn legal_spots(&self, player: PlayerId, kind: PieceKind, rule: PlacementRule) -> Vec<Coord> {
        match kind {
            PieceKind::Road => self
                .board
                .legal_road_spots(player, rule)
                .into_iter()
                .map(Coord::from)
                .collect(),
            PieceKind::Settlement => self
                .board
                .legal_settlement_spots(player, rule)
                .into_iter()
                .map(Coord::from)
                .collect(),
            PieceKind::City => self.board.legal_city_spots(player).into_iter().map(Coord::from).collect(),
        }
    }

    fn start_build(&mut self, player: PlayerId, kind: PieceKind) -> Result<Outcome, GameError> {
        self.require_turn(player)?;
        let coords = match (&self.phase, kind) {
            (
                GamePhase::Setup {
                    placing: SetupPlacing::Settlement,
                    ..
                },
                PieceKind::Settlement,
            ) => self.legal_spots(player, kind, PlacementRule::Setup { anchor: None }),
            (
                GamePhase::Setup {
                    placing: SetupPlacing::Road,
                    ..
                },
                PieceKind::Road,
            ) => self.legal_spots(
                player,
                kind,
                PlacementRule::Setup {
                    anchor: self.setup_anchor,
                },
            ),
            (GamePhase::RoadBuilding { .. }, PieceKind::Road) => self.legal_spots(player, kind, PlacementRule::Normal),
            (GamePhase::Main, _) => {
                self.players[usize::from(player)].check_can_build(kind)?;
                let coords = self.legal_spots(player, kind, PlacementRule::Normal);
                self.pending_build = Some(kind);
                coords
            }
            _ => return Err(GameError::InvalidPhase),
        };
        Ok(Outcome::default().with_response(Response::LegalPlacements { kind, coords }))
    }

    fn cancel_build(&mut self, player: PlayerId) -> Result<Outcome, GameError> {
        self.require_turn(player)?;
        match self.phase {
            GamePhase::Main if self.pending_build.is_some() => {
                self.pending_build = None;
            }
            GamePhase::Main => return Err(LegalityError::NoBuildInProgress.into()),
            // Giving up on the remaining free roads
            GamePhase::RoadBuilding { .. } => self.phase = self.resume_phase(),
            _ => return Err(GameError::InvalidPhase),
        }
        Ok(Outcome::default())
    }

    fn place_object(&mut self, player: PlayerId, coord: Coord) -> Result<Outcome, GameError> {
        self.require_turn(player)?;
        let mut outcome = Outcome::default();

        match self.phase.clone() {
            GamePhase::Setup { round, placing } => {
                self.place_setup_piece(player, coord, round, placing, &mut outcome.facts)?;
            }
            GamePhase::Main => {
                let kind = self.pending_build.ok_or(LegalityError::NoBuildInProgress)?;
                self.put_piece(
                    player,
                    coord,
                    kind,
                    PlacementRule::Normal,
                    Some(costs::piece(kind)),
                    &mut outcome.facts,
                )?;
                self.pending_build = None;
            }
            GamePhase::RoadBuilding { remaining } => {
                self.put_piece(player, coord, PieceKind::Road, PlacementRule::Normal, None, &mut outcome.facts)?;
                let remaining = remaining.saturating_sub(1);
                let stuck = self.players[usize::from(player)].roads_remaining == 0
                    || self.board.legal_road_spots(player, PlacementRule::Normal).is_empty();
                self.phase = if remaining == 0 || stuck {
                    self.resume_phase()
                } else {
                    GamePhase::RoadBuilding { remaining }
                };
            }
            _ => return Err(GameError::InvalidPhase),
        }
        Ok(outcome)
    }

    /// Validate, place, take the piece from supply and pay `cost` if given.
    /// Nothing changes unless everything succeeds.
    fn put_piece(
        &mut self,
        player: PlayerId,
        coord: Coord,
        kind: PieceKind,
        rule: PlacementRule,
        cost: Option<ResourceHand>,
        facts: &mut Vec<Fact>,
    ) -> Result<(), GameError> {
        let owner = &self.players[usize::from(player)];
        if owner.pieces_remaining(kind) == 0 {
            return Err(LegalityError::NoPiecesRemaining.into());
        }
        if let Some(cost) = &cost {
            if !owner.resources.can_afford(cost) {
                return Err(LegalityError::CannotAfford.into());
            }
        }

        let piece = Piece::new(kind, player);
        self.board.place_piece(coord, piece, rule)?;

        let owner = self.player_mut(player);
        owner.use_piece(kind)?;
        if let Some(cost) = cost {
            owner.resources.debit_all(&cost)?;
            facts.push(Fact::ObjectPlaced { player, coord, piece });
            facts.push(Fact::ResourcesChanged {
                player,
                resources: owner.resources,
            });
        } else {
            facts.push(Fact::ObjectPlaced { player, coord, piece });
        }

        if kind != PieceKind::Road {
            if let Ok(corner) = coord.as_corner() {
                if self.board.port_at_corner(&corner).is_some() {
                    let ports = self.board.ports_for(player);
                    self.player_mut(player).ports = ports;
                }
            }
        }
        Ok(())
    }

    fn place_setup_piece(
        &mut self,
        player: PlayerId,
        coord: Coord,
        round: u8,
        placing: SetupPlacing,
        facts: &mut Vec<Fact>,
    ) -> Result<(), GameError> {
        match placing {
            SetupPlacing::Settlement => {
                let rule = PlacementRule::Setup { anchor: None };
                self.put_piece(player, coord, PieceKind::Settlement, rule, None, facts)?;
                let corner = coord.as_corner()?;
                self.setup_anchor = Some(corner);

                // The second settlement collects one of each neighbouring resource
                if round == 2 {
                    let earned: Vec<Resource> = self
                        .board
                        .tiles_at_corner(&corner)
                        .iter()
                        .filter_map(|tile| tile.produces())
                        .collect();
                    if !earned.is_empty() {
                        let owner = self.player_mut(player);
                        for resource in earned {
                            owner.resources.credit(resource, 1);
                        }
                        facts.push(Fact::ResourcesChanged {
                            player,
                            resources: owner.resources,
                        });
                    }
                }
                self.phase = GamePhase::Setup {
                    round,
                    placing: SetupPlacing::Road,
                };
            }
            SetupPlacing::Road => {
                let rule = PlacementRule::Setup {
                    anchor: self.setup_anchor,
                };
                self.put_piece(player, coord, PieceKind::Road, rule, None, facts)?;
                self.advance_setup();
            }
        }
        Ok(())
    }

    /// Move to the next active player in snake order, or into normal play
    fn advance_setup(&mut self) {
        self.setup_anchor = None;
        self.setup_step += 1;
        while let Some(next) = self.setup_order.get(self.setup_step) {
            if self.players[usize::from(*next)].active {
                break;
            }
            self.setup_step += 1;
        }

        let player_count = self.players.len();
        match self.setup_order.get(self.setup_step) {
            Some(next) => {
                self.current_player = *next;
                self.phase = GamePhase::Setup {
                    round: if self.setup_step < player_count { 1 } else { 2 },
                    placing: SetupPlacing::Settlement,
                };
            }
            None => {
                let first = self.setup_order[0];
                self.current_player = if self.players[usize::from(first)].active {
                    first
                } else {
                    self.next_active_after(first).unwrap_or(first)
                };
                self.phase = GamePhase::Roll;
                self.turn_number = 1;
                self.rolled_this_turn = false;
                info!(first_player = self.current_player, "setup complete");
            }
        }
    }

    // ==================== Dice ====================

    fn roll(&mut self, player: PlayerId, dice: (u8, u8)) -> Result<Outcome, GameError> {
        self.require_turn(player)?;
        if self.phase != GamePhase::Roll {
            return Err(GameError::InvalidPhase);
        }

        let total = dice.0 + dice.1;
        self.dice = Some(dice);
        self.rolled_this_turn = true;

        let mut outcome = Outcome::default();
        outcome.facts.push(Fact::DiceRolled { player, dice, total });

        if total == 7 {
            let limit = self.config.discard_limit;
            let over: Vec<PlayerId> = self
                .players
                .iter()
                .filter(|p| p.resources.total() > limit)
                .map(|p| p.id)
                .collect();

            self.discard_round += 1;
            self.phase = GamePhase::Discard {
                pending: over.iter().copied().collect(),
                round: self.discard_round,
            };
            // Nobody is around to choose for absent players
            for id in over {
                if !self.players[usize::from(id)].active {
                    self.force_discard(id, &mut outcome.facts);
                }
            }
            if matches!(&self.phase, GamePhase::Discard { pending, .. } if pending.is_empty()) {
                self.phase = GamePhase::RobberPlacing;
            }
        } else {
            for (id, earned) in self.board.resources_produced_for(total) {
                let owner = self.player_mut(id);
                owner.resources.credit_all(&earned);
                outcome.facts.push(Fact::ResourcesChanged {
                    player: id,
                    resources: owner.resources,
                });
            }
            self.phase = GamePhase::Main;
        }
        Ok(outcome)
    }

    // ==================== Discard ====================

    fn discard(&mut self, player: PlayerId, cards: ResourceHand) -> Result<Outcome, GameError> {
        let GamePhase::Discard { pending, .. } = &self.phase else {
            return Err(GameError::InvalidPhase);
        };
        if !pending.contains(&player) {
            return Err(LegalityError::NoDiscardRequired.into());
        }
        let hand = self.players[usize::from(player)].resources;
        let required = hand.total() / 2;
        if cards.total() != required || !hand.can_afford(&cards) {
            return Err(LegalityError::InvalidDiscard { required }.into());
        }

        let owner = self.player_mut(player);
        owner.resources.debit_all(&cards)?;
        let resources = owner.resources;

        let mut outcome = Outcome::default();
        outcome.facts.push(Fact::CardsDiscarded {
            player,
            count: required,
            forced: false,
        });
        outcome.facts.push(Fact::ResourcesChanged { player, resources });
        self.mark_discarded(player);
        Ok(outcome.with_response(Response::DiscardAccepted { discarded: cards }))
    }

    fn discard_deadline(&mut self, round: u32) -> Result<Outcome, GameError> {
        let pending: Vec<PlayerId> = match &self.phase {
            GamePhase::Discard {
                pending,
                round: current,
            } if *current == round => pending.iter().copied().collect(),
            _ => return Err(GameError::InvalidPhase),
        };

        info!(round, players = pending.len(), "discard deadline reached");
        let mut outcome = Outcome::default();
        for player in pending {
            self.force_discard(player, &mut outcome.facts);
        }
        Ok(outcome)
    }

    /// Discard half of a pending player's hand at random
    fn force_discard(&mut self, player: PlayerId, facts: &mut Vec<Fact>) {
        let hand = &mut self.players[usize::from(player)].resources;
        let required = hand.total() / 2;
        hand.take_random(required, &mut self.rng);
        facts.push(Fact::CardsDiscarded {
            player,
            count: required,
            forced: true,
        });
        facts.push(Fact::ResourcesChanged {
            player,
            resources: *hand,
        });
        self.mark_discarded(player);
    }

    fn mark_discarded(&mut self, player: PlayerId) {
        let done = match &mut self.phase {
            GamePhase::Discard { pending, .. } => {
                pending.remove(&player);
                pending.is_empty()
            }
            _ => false,
        };
        if done {
            self.phase = GamePhase::RobberPlacing;
        }
    }

    // ==================== Robber ====================

    fn place_robber(
        &mut self,
        player: PlayerId,
        hex: HexCoord,
        victim: Option<PlayerId>,
    ) -> Result<Outcome, GameError> {
        self.require_turn(player)?;
        if self.phase != GamePhase::RobberPlacing {
            return Err(GameError::InvalidPhase);
        }
        if self.board.tile(&hex).is_none() {
            return Err(LegalityError::OffBoard.into());
        }
        if hex == self.board.robber().position {
            return Err(LegalityError::RobberUnchanged.into());
        }

        let candidates: Vec<PlayerId> = self
            .board
            .players_adjacent_to_hex(&hex)
            .into_iter()
            .filter(|id| *id != player && !self.players[usize::from(*id)].resources.is_empty())
            .collect();
        let victim = match victim {
            Some(v) if candidates.contains(&v) => Some(v),
            Some(_) => return Err(LegalityError::InvalidVictim.into()),
            None if candidates.len() > 1 => return Err(LegalityError::VictimRequired.into()),
            None => candidates.first().copied(),
        };

        self.board.move_robber(hex, player)?;
        let mut outcome = Outcome::default();
        outcome.facts.push(Fact::RobberMoved { player, hex });

        let mut stolen = None;
        if let Some(victim) = victim {
            stolen = self.players[usize::from(victim)]
                .resources
                .steal_random(&mut self.rng);
            if let Some(resource) = stolen {
                self.player_mut(player).resources.credit(resource, 1);
                outcome.facts.push(Fact::ResourceStolen { thief: player, victim });
                for id in [player, victim] {
                    outcome.facts.push(Fact::ResourcesChanged {
                        player: id,
                        resources: self.players[usize::from(id)].resources,
                    });
                }
            }
        }

        self.phase = self.resume_phase();
        Ok(outcome.with_response(Response::RobberPlaced { stolen }))
    }

    // ==================== Trading ====================

    fn start_trade(
        &mut self,
        player: PlayerId,
        offered: ResourceHand,
        requested: ResourceHand,
    ) -> Result<Outcome, GameError> {
        self.require_turn(player)?;
        self.require_main()?;
        let offer = self
            .trades
            .start_offer(&self.players[usize::from(player)], offered, requested)?
            .clone();
        Ok(Outcome {
            facts: vec![Fact::TradeOfferStarted { offer }],
            response: None,
        })
    }

    fn register_interest(&mut self, player: PlayerId, offering_player: PlayerId) -> Result<Outcome, GameError> {
        self.require_main()?;
        self.trades.register_interest(offering_player, player)?;
        Ok(Outcome {
            facts: vec![Fact::TradeInterestRegistered {
                offering_player,
                player,
            }],
            response: None,
        })
    }

    fn accept_trade(&mut self, player: PlayerId, chosen: PlayerId) -> Result<Outcome, GameError> {
        self.require_main()?;
        self.trades.accept(player, chosen, &mut self.players)?;

        let mut facts = vec![Fact::TradeAccepted {
            offering_player: player,
            chosen,
        }];
        for id in [player, chosen] {
            facts.push(Fact::ResourcesChanged {
                player: id,
                resources: self.players[usize::from(id)].resources,
            });
        }
        Ok(Outcome { facts, response: None })
    }

    fn decline_trade(&mut self, player: PlayerId, offering_player: PlayerId) -> Result<Outcome, GameError> {
        self.require_main()?;
        let responders: BTreeSet<PlayerId> = self
            .players
            .iter()
            .filter(|p| p.active && p.id != offering_player)
            .map(|p| p.id)
            .collect();
        let status = self.trades.decline(offering_player, player, &responders)?;

        let mut facts = vec![Fact::TradeDeclined {
            offering_player,
            player,
        }];
        if status == TradeStatus::DeclinedByAll {
            facts.push(Fact::TradeDeclinedByAll { offering_player });
        }
        Ok(Outcome { facts, response: None })
    }

    fn bank_trade(
        &mut self,
        player: PlayerId,
        give: Resource,
        give_count: u32,
        receive: Resource,
    ) -> Result<Outcome, GameError> {
        self.require_turn(player)?;
        self.require_main()?;
        if give == receive {
            return Err(LegalityError::SameResource.into());
        }
        let rate = self.players[usize::from(player)].bank_rate(give);
        if give_count == 0 || give_count % rate != 0 {
            return Err(LegalityError::BadBankRate { rate }.into());
        }

        let gave = ResourceHand::single(give, give_count);
        let received = ResourceHand::single(receive, give_count / rate);
        let owner = self.player_mut(player);
        owner.resources.debit_all(&gave)?;
        owner.resources.credit_all(&received);

        Ok(Outcome {
            facts: vec![
                Fact::BankTradeCompleted {
                    player,
                    gave,
                    received,
                },
                Fact::ResourcesChanged {
                    player,
                    resources: owner.resources,
                },
            ],
            response: None,
        })
    }

    // ==================== Development Cards ====================

    fn buy_dev_card(&mut self, player: PlayerId) -> Result<Outcome, GameError> {
        self.require_turn(player)?;
        self.require_main()?;
        if self.dev_card_deck.is_empty() {
            return Err(LegalityError::EmptyDeck.into());
        }
        if !self.players[usize::from(player)]
            .resources
            .can_afford(&costs::development_card())
        {
            return Err(LegalityError::CannotAfford.into());
        }

        let card = self.dev_card_deck.pop().ok_or(LegalityError::EmptyDeck)?;
        let owner = self.player_mut(player);
        owner.buy_dev_card(card)?;

        Ok(Outcome {
            facts: vec![
                Fact::ResourcesChanged {
                    player,
                    resources: owner.resources,
                },
                Fact::DevCardCountChanged {
                    player,
                    count: owner.dev_card_count(),
                },
            ],
            response: Some(Response::DevCardBought { card }),
        })
    }

    fn use_dev_card(&mut self, player: PlayerId, play: DevCardPlay) -> Result<Outcome, GameError> {
        self.require_turn(player)?;
        if !matches!(self.phase, GamePhase::Roll | GamePhase::Main) {
            return Err(GameError::InvalidPhase);
        }
        if self.dev_card_played_this_turn {
            return Err(LegalityError::DevCardAlreadyPlayed.into());
        }
        let card = play.card();
        let owner = &self.players[usize::from(player)];
        owner.check_can_play(card)?;
        if play == DevCardPlay::RoadBuilding {
            if owner.roads_remaining == 0 {
                return Err(LegalityError::NoPiecesRemaining.into());
            }
            if self.board.legal_road_spots(player, PlacementRule::Normal).is_empty() {
                return Err(LegalityError::NotConnected.into());
            }
        }

        let owner = self.player_mut(player);
        owner.play_dev_card(card)?;
        let count = owner.dev_card_count();
        self.dev_card_played_this_turn = true;

        let mut outcome = Outcome::default();
        outcome.facts.push(Fact::DevCardPlayed { player, card });
        outcome.facts.push(Fact::DevCardCountChanged { player, count });

        match play {
            DevCardPlay::Knight => {
                self.phase = GamePhase::RobberPlacing;
            }
            DevCardPlay::RoadBuilding => {
                let remaining = self.players[usize::from(player)].roads_remaining.min(2) as u8;
                self.phase = GamePhase::RoadBuilding { remaining };
            }
            DevCardPlay::YearOfPlenty(first, second) => {
                let owner = self.player_mut(player);
                owner.resources.credit(first, 1);
                owner.resources.credit(second, 1);
                outcome.facts.push(Fact::ResourcesChanged {
                    player,
                    resources: owner.resources,
                });
            }
            DevCardPlay::Monopoly(resource) => {
                let mut collected = 0;
                for other in self.players.iter_mut().filter(|p| p.id != player) {
                    let taken = other.resources.take_all(resource);
                    if taken > 0 {
                        collected += taken;
                        outcome.facts.push(Fact::ResourcesChanged {
                            player: other.id,
                            resources: other.resources,
                        });
                    }
                }
                let owner = self.player_mut(player);
                owner.resources.credit(resource, collected);
                outcome.facts.push(Fact::ResourcesChanged {
                    player,
                    resources: owner.resources,
                });
            }
        }
        Ok(outcome)
    }

    // ==================== Turn Management ====================

    fn next_active_after(&self, player: PlayerId) -> Option<PlayerId> {
        let count = self.players.len();
        (1..=count)
            .map(|offset| ((usize::from(player) + offset) % count) as PlayerId)
            .find(|id| self.players[usize::from(*id)].active)
    }

    fn end_turn(&mut self, facts: &mut Vec<Fact>) {
        let offering_players = self.trades.cancel_all();
        if !offering_players.is_empty() {
            facts.push(Fact::AllTradeOffersCanceled { offering_players });
        }

        let current = self.current_player;
        self.player_mut(current).end_turn();
        self.current_player = self.next_active_after(current).unwrap_or(current);
        self.phase = GamePhase::Roll;
        self.turn_number += 1;
        self.dice = None;
        self.pending_build = None;
        self.rolled_this_turn = false;
        self.dev_card_played_this_turn = false;
    }

    // ==================== Membership ====================

    fn leave(&mut self, player: PlayerId) -> Result<Outcome, GameError> {
        match self.player(player) {
            Some(p) if p.active => {}
            _ => return Err(GameError::NotAMember),
        }

        info!(player, "player left");
        self.player_mut(player).active = false;
        let mut outcome = Outcome::default();
        outcome.facts.push(Fact::PlayerLeft { player });

        if let Some(offer) = self.trades.remove_player(player) {
            outcome.facts.push(Fact::TradeCanceled {
                offering_player: offer.offering_player,
            });
        }
        if matches!(&self.phase, GamePhase::Discard { pending, .. } if pending.contains(&player)) {
            self.force_discard(player, &mut outcome.facts);
        }
        Ok(outcome)
    }

    fn rejoin(&mut self, player: PlayerId) -> Result<Outcome, GameError> {
        let Some(member) = self.player(player) else {
            return Err(GameError::NotAMember);
        };
        if member.active {
            return Err(GameError::RejoinDenied("player is already connected".to_string()));
        }

        info!(player, "player rejoined");
        self.player_mut(player).active = true;
        Ok(Outcome {
            facts: vec![Fact::PlayerRejoined { player }],
            response: Some(Response::Snapshot(Box::new(self.snapshot()))),
        })
    }

    // ==================== Bookkeeping after every action ====================

    fn settle(&mut self, facts: &mut Vec<Fact>, before: (GamePhase, PlayerId)) {
        self.skip_absent_player(facts);
        self.check_longest_road(facts);
        self.check_largest_army(facts);
        self.refresh_victory_points(facts);

        let winner = if self.is_finished() { None } else { self.check_winner() };
        if let Some(winner) = winner {
            self.phase = GamePhase::Ended { winner };
        }

        if self.phase != before.0 || self.current_player != before.1 {
            info!(
                phase = self.phase.name(),
                current_player = self.current_player,
                "phase changed"
            );
            facts.push(Fact::StateChanged {
                phase: self.phase.clone(),
                current_player: self.current_player,
            });
        }

        if let Some(winner) = winner {
            let victory_points = self.players.iter().map(|p| p.victory_points).collect();
            info!(winner, "game ended");
            facts.push(Fact::GameEnded { winner, victory_points });
        }
    }

    /// Keep the game moving when the player whose turn it is has left
    fn skip_absent_player(&mut self, facts: &mut Vec<Fact>) {
        if self.active_player_count() == 0 || self.players[usize::from(self.current_player)].active {
            return;
        }
        match self.phase {
            GamePhase::Setup { .. } => self.advance_setup(),
            GamePhase::Roll | GamePhase::Main | GamePhase::RobberPlacing | GamePhase::RoadBuilding { .. } => {
                self.end_turn(facts)
            }
            GamePhase::Discard { .. } | GamePhase::Ended { .. } => {}
        }
    }

    fn check_longest_road(&mut self, facts: &mut Vec<Fact>) {
        let lengths: Vec<u32> = self.players.iter().map(|p| self.board.longest_road(p.id)).collect();
        let best = lengths.iter().copied().max().unwrap_or(0);
        let current = self.players.iter().find(|p| p.has_longest_road).map(|p| p.id);

        let holder = if best < MIN_LONGEST_ROAD {
            None
        } else if current.is_some_and(|h| lengths[usize::from(h)] == best) {
            // Ties keep current holder
            current
        } else {
            let mut leaders = self.players.iter().filter(|p| lengths[usize::from(p.id)] == best);
            match (leaders.next(), leaders.next()) {
                (Some(leader), None) => Some(leader.id),
                _ => None,
            }
        };

        if holder != current {
            for player in &mut self.players {
                player.has_longest_road = Some(player.id) == holder;
            }
            facts.push(Fact::LongestRoadChanged { holder, length: best });
        }
    }

    fn check_largest_army(&mut self, facts: &mut Vec<Fact>) {
        let current = self.players.iter().find(|p| p.has_largest_army).map(|p| p.id);
        let to_beat = current.map_or(MIN_LARGEST_ARMY - 1, |h| self.players[usize::from(h)].played_knights);

        // A challenger needs strictly more knights than the holder
        let challenger = self
            .players
            .iter()
            .filter(|p| p.played_knights > to_beat)
            .max_by_key(|p| p.played_knights)
            .map(|p| (p.id, p.played_knights));

        if let Some((holder, knights)) = challenger {
            for player in &mut self.players {
                player.has_largest_army = player.id == holder;
            }
            facts.push(Fact::LargestArmyChanged {
                holder: Some(holder),
                knights,
            });
        }
    }

    fn refresh_victory_points(&mut self, facts: &mut Vec<Fact>) {
        for player in &mut self.players {
            let (settlements, cities) = self.board.building_counts(player.id);
            if player.recompute_victory_points(settlements, cities) {
                facts.push(Fact::VictoryPointsChanged {
                    player: player.id,
                    victory_points: player.victory_points,
                });
            }
        }
    }

    /// The current player wins ties with others over the threshold
    fn check_winner(&self) -> Option<PlayerId> {
        let target = self.config.victory_points_to_win;
        let current = &self.players[usize::from(self.current_player)];
        if current.victory_points >= target {
            return Some(current.id);
        }
        self.players.iter().find(|p| p.victory_points >= target).map(|p| p.id)
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Tile;
    use crate::hex::{CornerDirection, EdgeCoord, EdgeDirection};
    use pretty_assertions::assert_eq;

    fn config() -> GameConfig {
        GameConfig {
            seed: Some(42),
            ..GameConfig::default()
        }
    }

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Player {i}")).collect()
    }

    fn corner(q: i32, r: i32, dir: CornerDirection) -> Coord {
        CornerCoord::new(HexCoord::new(q, r), dir).into()
    }

    fn edge(q: i32, r: i32, dir: EdgeDirection) -> Coord {
        EdgeCoord::new(HexCoord::new(q, r), dir).into()
    }

    /// A session past setup, in player 0's main phase, with nothing on the board
    fn main_phase(players: usize) -> GameSession {
        let mut session = GameSession::new(config(), names(players)).unwrap();
        session.phase = GamePhase::Main;
        session.turn_number = 1;
        session.rolled_this_turn = true;
        session
    }

    #[test]
    fn test_new_game_starts_in_setup() {
        let session = GameSession::new(config(), names(4)).unwrap();
        assert_eq!(
            session.phase,
            GamePhase::Setup {
                round: 1,
                placing: SetupPlacing::Settlement
            }
        );
        assert_eq!(session.current_player, 0);
        assert_eq!(session.dev_card_deck.len(), 25);
        assert_eq!(session.setup_order, vec![0, 1, 2, 3, 3, 2, 1, 0]);
    }

    #[test]
    fn test_player_count_limits() {
        assert_eq!(GameSession::new(config(), names(1)).unwrap_err(), GameError::PlayerCount(1));
        assert_eq!(GameSession::new(config(), names(7)).unwrap_err(), GameError::PlayerCount(7));
        assert!(GameSession::new(config(), names(2)).is_ok());
    }

    #[test]
    fn test_unknown_player_is_not_a_member() {
        let mut session = GameSession::new(config(), names(2)).unwrap();
        assert_eq!(session.apply(5, GameAction::RollDice), Err(GameError::NotAMember));
    }

    #[test]
    fn test_setup_road_must_follow_settlement() {
        let mut session = GameSession::new(config(), names(2)).unwrap();
        let spot = corner(0, 0, CornerDirection::North);
        session.apply(0, GameAction::PlaceObject(spot)).unwrap();

        // A road away from the settlement is refused
        let away = edge(0, 0, EdgeDirection::South);
        assert!(matches!(
            session.apply(0, GameAction::PlaceObject(away)),
            Err(GameError::Illegal(LegalityError::NotConnected))
        ));

        let road = CornerCoord::new(HexCoord::new(0, 0), CornerDirection::North).touching_edges()[2];
        let outcome = session.apply(0, GameAction::PlaceObject(road.into())).unwrap();
        assert_eq!(session.current_player, 1);
        assert!(outcome.facts.contains(&Fact::StateChanged {
            phase: GamePhase::Setup {
                round: 1,
                placing: SetupPlacing::Settlement
            },
            current_player: 1,
        }));
    }

    #[test]
    fn test_setup_start_build_lists_spots() {
        let mut session = GameSession::new(config(), names(2)).unwrap();
        let outcome = session.apply(0, GameAction::StartBuild(PieceKind::Settlement)).unwrap();
        match outcome.response {
            Some(Response::LegalPlacements { kind, coords }) => {
                assert_eq!(kind, PieceKind::Settlement);
                assert_eq!(coords.len(), 54);
            }
            other => panic!("unexpected response {other:?}"),
        }
        assert_eq!(
            session.apply(0, GameAction::StartBuild(PieceKind::City)),
            Err(GameError::InvalidPhase)
        );
    }

    #[test]
    fn test_not_your_turn() {
        let mut session = main_phase(3);
        assert_eq!(session.apply(1, GameAction::EndTurn), Err(GameError::NotYourTurn));
        assert_eq!(
            session.apply(1, GameAction::StartBuild(PieceKind::Road)),
            Err(GameError::NotYourTurn)
        );
    }

    #[test]
    fn test_build_flow_debits_cost() {
        let mut session = main_phase(2);
        let home = CornerCoord::new(HexCoord::new(0, 0), CornerDirection::North);
        session
            .board
            .place_piece(home.into(), Piece::Settlement(0), PlacementRule::Setup { anchor: None })
            .unwrap();
        session.players[0].resources = ResourceHand::with_amounts(1, 1, 0, 0, 0);

        // Placing without starting a build is refused
        let road = home.touching_edges()[0];
        assert_eq!(
            session.apply(0, GameAction::PlaceObject(road.into())),
            Err(GameError::Illegal(LegalityError::NoBuildInProgress))
        );

        let outcome = session.apply(0, GameAction::StartBuild(PieceKind::Road)).unwrap();
        let Some(Response::LegalPlacements { coords, .. }) = outcome.response else {
            panic!("expected legal placements");
        };
        assert_eq!(coords.len(), 3);

        session.apply(0, GameAction::PlaceObject(road.into())).unwrap();
        assert!(session.players[0].resources.is_empty());
        assert_eq!(session.players[0].roads_remaining, 14);
        assert_eq!(session.board.road_owner(&road), Some(0));
    }

    #[test]
    fn test_start_build_rejects_unaffordable() {
        let mut session = main_phase(2);
        assert_eq!(
            session.apply(0, GameAction::StartBuild(PieceKind::City)),
            Err(GameError::Illegal(LegalityError::CannotAfford))
        );
    }

    #[test]
    fn test_cancel_build() {
        let mut session = main_phase(2);
        session.players[0].resources = ResourceHand::with_amounts(1, 1, 0, 0, 0);
        session.apply(0, GameAction::StartBuild(PieceKind::Road)).unwrap();
        session.apply(0, GameAction::CancelBuild).unwrap();
        assert_eq!(
            session.apply(0, GameAction::CancelBuild),
            Err(GameError::Illegal(LegalityError::NoBuildInProgress))
        );
    }

    #[test]
    fn test_roll_seven_with_no_big_hands_goes_to_robber() {
        let mut session = main_phase(2);
        session.phase = GamePhase::Roll;
        session.rolled_this_turn = false;
        session.roll_with(0, (3, 4)).unwrap();
        assert_eq!(session.phase, GamePhase::RobberPlacing);
    }

    #[test]
    fn test_discard_deadline_forces_discards() {
        let mut session = main_phase(3);
        session.phase = GamePhase::Roll;
        session.players[1].resources = ResourceHand::with_amounts(2, 2, 2, 2, 2);
        session.players[2].resources = ResourceHand::with_amounts(3, 3, 3, 0, 0);

        session.roll_with(0, (6, 1)).unwrap();
        let GamePhase::Discard { round, .. } = session.phase.clone() else {
            panic!("expected discard phase");
        };

        // Wrong round is a stale timer
        assert_eq!(
            session.apply(0, GameAction::DiscardDeadline { round: round + 1 }),
            Err(GameError::InvalidPhase)
        );

        session.apply(0, GameAction::DiscardDeadline { round }).unwrap();
        assert_eq!(session.players[1].resources.total(), 5);
        assert_eq!(session.players[2].resources.total(), 5);
        assert_eq!(session.phase, GamePhase::RobberPlacing);
    }

    #[test]
    fn test_oversized_discard_is_rejected() {
        let mut session = main_phase(2);
        session.phase = GamePhase::Roll;
        session.players[1].resources = ResourceHand::with_amounts(2, 2, 2, 2, 2);
        session.roll_with(0, (3, 4)).unwrap();
        let before = session.snapshot();

        let huge = ResourceHand::with_amounts(u32::MAX, 1, 0, 0, 0);
        assert_eq!(
            session.apply(1, GameAction::DiscardCards(huge)),
            Err(GameError::Illegal(LegalityError::InvalidDiscard { required: 5 }))
        );

        let action: GameAction = serde_json::from_str(
            r#"{"DiscardCards":{"brick":4294967295,"lumber":1,"ore":0,"grain":0,"wool":0}}"#,
        )
        .unwrap();
        assert_eq!(
            session.apply(1, action),
            Err(GameError::Illegal(LegalityError::InvalidDiscard { required: 5 }))
        );
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn test_oversized_trade_offer_is_rejected() {
        let mut session = main_phase(2);
        session.players[0].resources = ResourceHand::single(Resource::Brick, 1);
        let before = session.snapshot();

        let result = session.apply(
            0,
            GameAction::StartTrade {
                offered: ResourceHand::with_amounts(u32::MAX, 1, 0, 0, 0),
                requested: ResourceHand::single(Resource::Ore, 1),
            },
        );
        assert_eq!(result, Err(GameError::Illegal(LegalityError::CannotAfford)));
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn test_fixed_roll_rejects_out_of_range_dice() {
        let mut session = main_phase(2);
        session.phase = GamePhase::Roll;
        session.rolled_this_turn = false;

        for dice in [(0, 6), (0, 9), (7, 1)] {
            assert_eq!(
                session.roll_with(0, dice),
                Err(GameError::Illegal(LegalityError::InvalidDice(dice.0, dice.1)))
            );
        }
        assert_eq!(session.phase, GamePhase::Roll);
        assert_eq!(session.dice, None);
    }

    #[test]
    fn test_robber_steals_from_only_candidate() {
        let mut session = main_phase(2);
        session.phase = GamePhase::RobberPlacing;
        session
            .board
            .place_piece(
                corner(0, 0, CornerDirection::South),
                Piece::Settlement(1),
                PlacementRule::Setup { anchor: None },
            )
            .unwrap();
        session.players[1].resources = ResourceHand::single(Resource::Wool, 1);

        let target = if session.board.robber().position == HexCoord::new(0, 0) {
            HexCoord::new(0, 1)
        } else {
            HexCoord::new(0, 0)
        };
        let outcome = session
            .apply(0, GameAction::PlaceRobber { hex: target, victim: None })
            .unwrap();

        assert_eq!(
            outcome.response,
            Some(Response::RobberPlaced {
                stolen: Some(Resource::Wool)
            })
        );
        assert_eq!(session.players[0].resources, ResourceHand::single(Resource::Wool, 1));
        assert!(session.players[1].resources.is_empty());
        assert_eq!(session.phase, GamePhase::Main);
    }

    #[test]
    fn test_robber_rejects_bad_victim_without_moving() {
        let mut session = main_phase(3);
        session.phase = GamePhase::RobberPlacing;
        let start = session.board.robber();
        let target = if start.position == HexCoord::new(0, 0) {
            HexCoord::new(1, 0)
        } else {
            HexCoord::new(0, 0)
        };

        assert_eq!(
            session.apply(0, GameAction::PlaceRobber { hex: target, victim: Some(2) }),
            Err(GameError::Illegal(LegalityError::InvalidVictim))
        );
        assert_eq!(session.board.robber(), start);
        assert_eq!(
            session.apply(0, GameAction::PlaceRobber { hex: start.position, victim: None }),
            Err(GameError::Illegal(LegalityError::RobberUnchanged))
        );
    }

    #[test]
    fn test_bank_trade_rates() {
        let mut session = main_phase(2);
        session.players[0].resources = ResourceHand::single(Resource::Ore, 8);

        assert_eq!(
            session.apply(
                0,
                GameAction::BankTrade {
                    give: Resource::Ore,
                    give_count: 3,
                    receive: Resource::Wool
                }
            ),
            Err(GameError::Illegal(LegalityError::BadBankRate { rate: 4 }))
        );
        assert_eq!(
            session.apply(
                0,
                GameAction::BankTrade {
                    give: Resource::Ore,
                    give_count: 4,
                    receive: Resource::Ore
                }
            ),
            Err(GameError::Illegal(LegalityError::SameResource))
        );

        session
            .apply(
                0,
                GameAction::BankTrade {
                    give: Resource::Ore,
                    give_count: 8,
                    receive: Resource::Brick,
                },
            )
            .unwrap();
        assert_eq!(session.players[0].resources, ResourceHand::single(Resource::Brick, 2));

        session.players[0].ports.insert(crate::board::Port::Specific(Resource::Brick));
        session
            .apply(
                0,
                GameAction::BankTrade {
                    give: Resource::Brick,
                    give_count: 2,
                    receive: Resource::Grain,
                },
            )
            .unwrap();
        assert_eq!(session.players[0].resources, ResourceHand::single(Resource::Grain, 1));
    }

    #[test]
    fn test_dev_card_cannot_be_played_the_turn_it_was_bought() {
        let mut session = main_phase(2);
        session.stack_deck(vec![DevelopmentCard::Knight]);
        session.players[0].resources = costs::development_card();

        let outcome = session.apply(0, GameAction::BuyDevCard).unwrap();
        assert_eq!(
            outcome.response,
            Some(Response::DevCardBought {
                card: DevelopmentCard::Knight
            })
        );
        assert_eq!(
            session.apply(0, GameAction::UseDevCard(DevCardPlay::Knight)),
            Err(GameError::Illegal(LegalityError::CardBoughtThisTurn))
        );
        assert_eq!(
            session.apply(0, GameAction::BuyDevCard),
            Err(GameError::Illegal(LegalityError::EmptyDeck))
        );
    }

    #[test]
    fn test_one_dev_card_per_turn() {
        let mut session = main_phase(2);
        session.players[0].dev_cards.credit(DevelopmentCard::YearOfPlenty);
        session.players[0].dev_cards.credit(DevelopmentCard::Monopoly);

        session
            .apply(
                0,
                GameAction::UseDevCard(DevCardPlay::YearOfPlenty(Resource::Ore, Resource::Grain)),
            )
            .unwrap();
        assert_eq!(session.players[0].resources, ResourceHand::with_amounts(0, 0, 1, 1, 0));
        assert_eq!(
            session.apply(0, GameAction::UseDevCard(DevCardPlay::Monopoly(Resource::Ore))),
            Err(GameError::Illegal(LegalityError::DevCardAlreadyPlayed))
        );
    }

    #[test]
    fn test_monopoly_collects_from_everyone() {
        let mut session = main_phase(3);
        session.players[0].dev_cards.credit(DevelopmentCard::Monopoly);
        session.players[1].resources = ResourceHand::with_amounts(0, 0, 0, 3, 1);
        session.players[2].resources = ResourceHand::with_amounts(0, 0, 0, 2, 0);

        session
            .apply(0, GameAction::UseDevCard(DevCardPlay::Monopoly(Resource::Grain)))
            .unwrap();
        assert_eq!(session.players[0].resources, ResourceHand::single(Resource::Grain, 5));
        assert_eq!(session.players[1].resources, ResourceHand::single(Resource::Wool, 1));
        assert!(session.players[2].resources.is_empty());
    }

    #[test]
    fn test_knight_before_roll_returns_to_roll() {
        let mut session = main_phase(2);
        session.phase = GamePhase::Roll;
        session.rolled_this_turn = false;
        session.players[0].dev_cards.credit(DevelopmentCard::Knight);

        session.apply(0, GameAction::UseDevCard(DevCardPlay::Knight)).unwrap();
        assert_eq!(session.phase, GamePhase::RobberPlacing);

        let target = if session.board.robber().position == HexCoord::new(0, 0) {
            HexCoord::new(1, 0)
        } else {
            HexCoord::new(0, 0)
        };
        session
            .apply(0, GameAction::PlaceRobber { hex: target, victim: None })
            .unwrap();
        assert_eq!(session.phase, GamePhase::Roll);
        assert_eq!(session.players[0].played_knights, 1);
    }

    #[test]
    fn test_largest_army_awarded_at_three_knights() {
        let mut session = main_phase(2);
        session.players[1].played_knights = 3;
        let mut facts = Vec::new();
        session.check_largest_army(&mut facts);
        assert!(session.players[1].has_largest_army);
        assert_eq!(
            facts,
            vec![Fact::LargestArmyChanged {
                holder: Some(1),
                knights: 3
            }]
        );

        // A tie does not take it away
        session.players[0].played_knights = 3;
        facts.clear();
        session.check_largest_army(&mut facts);
        assert!(session.players[1].has_largest_army);
        assert!(facts.is_empty());
    }

    #[test]
    fn test_end_turn_moves_to_next_active_player() {
        let mut session = main_phase(3);
        session.players[1].active = false;
        session.apply(0, GameAction::EndTurn).unwrap();
        assert_eq!(session.current_player, 2);
        assert_eq!(session.phase, GamePhase::Roll);
        assert_eq!(session.turn_number, 2);
    }

    #[test]
    fn test_leave_and_rejoin() {
        let mut session = main_phase(3);
        let outcome = session.apply(0, GameAction::LeaveSession).unwrap();
        assert!(outcome.facts.contains(&Fact::PlayerLeft { player: 0 }));
        // Leaving on your own turn passes it on
        assert_eq!(session.current_player, 1);
        assert_eq!(session.apply(0, GameAction::EndTurn), Err(GameError::NotAMember));
        assert_eq!(session.apply(0, GameAction::LeaveSession), Err(GameError::NotAMember));

        let outcome = session.apply(0, GameAction::RejoinSession).unwrap();
        assert!(matches!(outcome.response, Some(Response::Snapshot(_))));
        assert!(session.players[0].active);
        assert_eq!(
            session.apply(0, GameAction::RejoinSession),
            Err(GameError::RejoinDenied("player is already connected".to_string()))
        );
    }

    #[test]
    fn test_reaching_threshold_ends_game() {
        let mut session = main_phase(2);
        session.config.victory_points_to_win = 3;
        session.stack_deck(vec![DevelopmentCard::VictoryPoint]);
        session.players[0].resources = costs::development_card();
        for (q, r) in [(0, 0), (2, -2)] {
            session
                .board
                .place_piece(
                    corner(q, r, CornerDirection::North),
                    Piece::Settlement(0),
                    PlacementRule::Setup { anchor: None },
                )
                .unwrap();
        }

        let outcome = session.apply(0, GameAction::BuyDevCard).unwrap();
        assert_eq!(session.phase, GamePhase::Ended { winner: 0 });
        assert!(matches!(outcome.facts.last(), Some(Fact::GameEnded { winner: 0, .. })));
        assert_eq!(session.apply(1, GameAction::EndTurn), Err(GameError::GameOver));
    }

    #[test]
    fn test_fixed_board_session() {
        let tiles = vec![
            Tile::resource(HexCoord::new(0, 0), Resource::Ore, 5),
            Tile::desert(HexCoord::new(1, 0)),
        ];
        let board = Board::from_layout(tiles, Vec::new());
        let session = GameSession::with_board(config(), names(2), board).unwrap();
        assert_eq!(session.board.robber().position, HexCoord::new(1, 0));
        assert_eq!(session.board.tiles().len(), 2);
    }
}
