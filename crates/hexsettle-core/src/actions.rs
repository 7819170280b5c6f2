//! Game actions that players can take.
//!
//! This module defines every inbound action tag, the facts a session emits
//! when its state changes, and the replies meant only for the requester.

use crate::board::{Piece, PieceKind, PlayerId, Resource};
use crate::game::{GamePhase, SessionSnapshot};
use crate::hex::{Coord, HexCoord};
use crate::player::{DevelopmentCard, ResourceHand};
use crate::trade::TradeOffer;
use serde::{Deserialize, Serialize};

/// All possible actions a player can take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameAction {
    // ==================== Building ====================
    /// Ask where a piece of this kind may go; answered with the legal spots
    StartBuild(PieceKind),
    /// Put the pending (or, in setup and road building, the expected) piece down
    PlaceObject(Coord),
    /// Abandon a build started with `StartBuild`
    CancelBuild,

    // ==================== Turn ====================
    RollDice,
    EndTurn,

    // ==================== Trading ====================
    /// Offer resources to every other player
    StartTrade {
        offered: ResourceHand,
        requested: ResourceHand,
    },
    /// Signal willingness to take an open offer
    RegisterInterest { offering_player: PlayerId },
    /// Close your own offer with one interested player
    AcceptTrade { chosen: PlayerId },
    DeclineTrade { offering_player: PlayerId },
    /// Withdraw your own offer
    CancelTrade,
    /// Trade with the bank (4:1) or a port (3:1 or 2:1)
    BankTrade {
        give: Resource,
        give_count: u32,
        receive: Resource,
    },

    // ==================== Development Cards ====================
    BuyDevCard,
    UseDevCard(DevCardPlay),

    // ==================== Robber ====================
    /// Discard cards when holding too many after a 7
    DiscardCards(ResourceHand),
    /// Timer expiry for the discard round; anyone still pending discards at random
    DiscardDeadline { round: u32 },
    /// Move the robber and steal from a player on the new hex
    PlaceRobber { hex: HexCoord, victim: Option<PlayerId> },

    // ==================== Membership ====================
    LeaveSession,
    RejoinSession,
}

/// A development card play with its choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevCardPlay {
    Knight,
    RoadBuilding,
    YearOfPlenty(Resource, Resource),
    Monopoly(Resource),
}

impl DevCardPlay {
    pub fn card(&self) -> DevelopmentCard {
        match self {
            DevCardPlay::Knight => DevelopmentCard::Knight,
            DevCardPlay::RoadBuilding => DevelopmentCard::RoadBuilding,
            DevCardPlay::YearOfPlenty(_, _) => DevelopmentCard::YearOfPlenty,
            DevCardPlay::Monopoly(_) => DevelopmentCard::Monopoly,
        }
    }
}

/// Something that changed, for every session member to see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fact {
    ObjectPlaced {
        player: PlayerId,
        coord: Coord,
        piece: Piece,
    },
    /// A player's full hand after a change
    ResourcesChanged {
        player: PlayerId,
        resources: ResourceHand,
    },
    DevCardCountChanged {
        player: PlayerId,
        count: u32,
    },
    StateChanged {
        phase: GamePhase,
        current_player: PlayerId,
    },
    DiceRolled {
        player: PlayerId,
        dice: (u8, u8),
        total: u8,
    },

    TradeOfferStarted {
        offer: TradeOffer,
    },
    TradeInterestRegistered {
        offering_player: PlayerId,
        player: PlayerId,
    },
    TradeAccepted {
        offering_player: PlayerId,
        chosen: PlayerId,
    },
    TradeDeclined {
        offering_player: PlayerId,
        player: PlayerId,
    },
    TradeDeclinedByAll {
        offering_player: PlayerId,
    },
    TradeCanceled {
        offering_player: PlayerId,
    },
    /// End of turn sweeps every unresolved offer at once
    AllTradeOffersCanceled {
        offering_players: Vec<PlayerId>,
    },
    BankTradeCompleted {
        player: PlayerId,
        gave: ResourceHand,
        received: ResourceHand,
    },

    DevCardPlayed {
        player: PlayerId,
        card: DevelopmentCard,
    },
    RobberMoved {
        player: PlayerId,
        hex: HexCoord,
    },
    /// The stolen resource is only told to the thief
    ResourceStolen {
        thief: PlayerId,
        victim: PlayerId,
    },
    CardsDiscarded {
        player: PlayerId,
        count: u32,
        forced: bool,
    },
    LongestRoadChanged {
        holder: Option<PlayerId>,
        length: u32,
    },
    LargestArmyChanged {
        holder: Option<PlayerId>,
        knights: u32,
    },
    VictoryPointsChanged {
        player: PlayerId,
        victory_points: u32,
    },

    PlayerLeft {
        player: PlayerId,
    },
    PlayerRejoined {
        player: PlayerId,
    },
    GameEnded {
        winner: PlayerId,
        victory_points: Vec<u32>,
    },
}

/// A reply meant only for the player who sent the action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    LegalPlacements { kind: PieceKind, coords: Vec<Coord> },
    DiscardAccepted { discarded: ResourceHand },
    RobberPlaced { stolen: Option<Resource> },
    DevCardBought { card: DevelopmentCard },
    Snapshot(Box<SessionSnapshot>),
}

/// Everything an accepted action produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub facts: Vec<Fact>,
    pub response: Option<Response>,
}

impl Outcome {
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }
}
