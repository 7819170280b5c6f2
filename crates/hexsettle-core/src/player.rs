//! Player state and inventory management.
//!
//! This module contains:
//! - Player struct with resources, development cards, ports and awards
//! - ResourceHand and DevCardHand with all-or-nothing debits
//! - Development card types and the standard deck
//! - Building costs

use crate::board::{LegalityError, PieceKind, PlayerId, Port, Resource};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Victory points granted by the Longest Road and Largest Army awards
pub const AWARD_VICTORY_POINTS: u32 = 2;

/// A debit would have driven a count below zero. Nothing was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot take {need} {item}, only {have} held")]
pub struct OverDraw {
    pub item: &'static str,
    pub have: u32,
    pub need: u32,
}

impl From<OverDraw> for LegalityError {
    fn from(_: OverDraw) -> Self {
        LegalityError::CannotAfford
    }
}

/// Player color for UI rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerColor {
    Red,
    Blue,
    Orange,
    White,
    Green,
    Brown,
}

impl PlayerColor {
    /// Get color for a player index
    pub fn for_player(id: PlayerId) -> Self {
        match id % 6 {
            0 => PlayerColor::Red,
            1 => PlayerColor::Blue,
            2 => PlayerColor::Orange,
            3 => PlayerColor::White,
            4 => PlayerColor::Green,
            _ => PlayerColor::Brown,
        }
    }
}

/// Development card types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DevelopmentCard {
    /// Move robber and steal, counts toward Largest Army
    Knight,
    /// Worth 1 VP as soon as it is held
    VictoryPoint,
    /// Build 2 roads for free
    RoadBuilding,
    /// Take any 2 resources from the bank
    YearOfPlenty,
    /// All players must give you all of one resource type
    Monopoly,
}

impl DevelopmentCard {
    pub const ALL: [DevelopmentCard; 5] = [
        DevelopmentCard::Knight,
        DevelopmentCard::VictoryPoint,
        DevelopmentCard::RoadBuilding,
        DevelopmentCard::YearOfPlenty,
        DevelopmentCard::Monopoly,
    ];

    /// Create the standard development card deck (25 cards), unshuffled
    pub fn standard_deck() -> Vec<DevelopmentCard> {
        let mut deck = Vec::with_capacity(25);
        for (card, count) in [
            (DevelopmentCard::Knight, 14),
            (DevelopmentCard::VictoryPoint, 5),
            (DevelopmentCard::RoadBuilding, 2),
            (DevelopmentCard::YearOfPlenty, 2),
            (DevelopmentCard::Monopoly, 2),
        ] {
            deck.extend(std::iter::repeat(card).take(count));
        }
        deck
    }

    fn name(&self) -> &'static str {
        match self {
            DevelopmentCard::Knight => "knight",
            DevelopmentCard::VictoryPoint => "victory point",
            DevelopmentCard::RoadBuilding => "road building",
            DevelopmentCard::YearOfPlenty => "year of plenty",
            DevelopmentCard::Monopoly => "monopoly",
        }
    }
}

fn resource_name(resource: Resource) -> &'static str {
    match resource {
        Resource::Brick => "brick",
        Resource::Lumber => "lumber",
        Resource::Ore => "ore",
        Resource::Grain => "grain",
        Resource::Wool => "wool",
    }
}

/// A hand of resources. Counts are unsigned; debits check first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHand {
    pub brick: u32,
    pub lumber: u32,
    pub ore: u32,
    pub grain: u32,
    pub wool: u32,
}

impl ResourceHand {
    /// Create an empty hand
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hand with specific amounts
    pub fn with_amounts(brick: u32, lumber: u32, ore: u32, grain: u32, wool: u32) -> Self {
        Self {
            brick,
            lumber,
            ore,
            grain,
            wool,
        }
    }

    /// Create a hand with a single resource
    pub fn single(resource: Resource, amount: u32) -> Self {
        let mut hand = Self::new();
        hand.credit(resource, amount);
        hand
    }

    /// Total number of resource cards, saturating at `u32::MAX`
    pub fn total(&self) -> u32 {
        Resource::ALL
            .iter()
            .fold(0u32, |sum, r| sum.saturating_add(self.get(*r)))
    }

    pub fn is_empty(&self) -> bool {
        Resource::ALL.iter().all(|r| self.get(*r) == 0)
    }

    /// Get count of a specific resource
    pub fn get(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Brick => self.brick,
            Resource::Lumber => self.lumber,
            Resource::Ore => self.ore,
            Resource::Grain => self.grain,
            Resource::Wool => self.wool,
        }
    }

    fn slot(&mut self, resource: Resource) -> &mut u32 {
        match resource {
            Resource::Brick => &mut self.brick,
            Resource::Lumber => &mut self.lumber,
            Resource::Ore => &mut self.ore,
            Resource::Grain => &mut self.grain,
            Resource::Wool => &mut self.wool,
        }
    }

    /// Resources with a non-zero count
    pub fn iter(&self) -> impl Iterator<Item = (Resource, u32)> + '_ {
        Resource::ALL
            .into_iter()
            .map(|r| (r, self.get(r)))
            .filter(|(_, n)| *n > 0)
    }

    pub fn credit(&mut self, resource: Resource, amount: u32) {
        let slot = self.slot(resource);
        *slot = slot.saturating_add(amount);
    }

    pub fn credit_all(&mut self, other: &ResourceHand) {
        for (resource, amount) in other.iter() {
            self.credit(resource, amount);
        }
    }

    pub fn can_afford(&self, cost: &ResourceHand) -> bool {
        Resource::ALL.iter().all(|r| self.get(*r) >= cost.get(*r))
    }

    pub fn debit(&mut self, resource: Resource, amount: u32) -> Result<(), OverDraw> {
        let have = self.get(resource);
        if have < amount {
            return Err(OverDraw {
                item: resource_name(resource),
                have,
                need: amount,
            });
        }
        *self.slot(resource) -= amount;
        Ok(())
    }

    /// Debit a whole bundle. If any count would go negative, nothing changes.
    pub fn debit_all(&mut self, cost: &ResourceHand) -> Result<(), OverDraw> {
        if let Some((resource, need)) = cost.iter().find(|(r, n)| self.get(*r) < *n) {
            return Err(OverDraw {
                item: resource_name(resource),
                have: self.get(resource),
                need,
            });
        }
        for (resource, amount) in cost.iter() {
            *self.slot(resource) -= amount;
        }
        Ok(())
    }

    /// Remove every card of one resource, returning how many there were
    pub fn take_all(&mut self, resource: Resource) -> u32 {
        std::mem::take(self.slot(resource))
    }

    /// Remove a random resource (for robber stealing)
    pub fn steal_random<R: Rng>(&mut self, rng: &mut R) -> Option<Resource> {
        let pile = self.cards();
        let resource = *pile.choose(rng)?;
        *self.slot(resource) -= 1;
        Some(resource)
    }

    /// Remove `count` random cards, returning what was removed
    pub fn take_random<R: Rng>(&mut self, count: u32, rng: &mut R) -> ResourceHand {
        let mut pile = self.cards();
        pile.shuffle(rng);
        let mut taken = ResourceHand::new();
        for resource in pile.into_iter().take(count as usize) {
            *self.slot(resource) -= 1;
            taken.credit(resource, 1);
        }
        taken
    }

    /// One entry per card held
    fn cards(&self) -> Vec<Resource> {
        self.iter()
            .flat_map(|(r, n)| std::iter::repeat(r).take(n as usize))
            .collect()
    }
}

/// Development card counts, one per card type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevCardHand {
    pub knight: u32,
    pub victory_point: u32,
    pub road_building: u32,
    pub year_of_plenty: u32,
    pub monopoly: u32,
}

impl DevCardHand {
    pub fn get(&self, card: DevelopmentCard) -> u32 {
        match card {
            DevelopmentCard::Knight => self.knight,
            DevelopmentCard::VictoryPoint => self.victory_point,
            DevelopmentCard::RoadBuilding => self.road_building,
            DevelopmentCard::YearOfPlenty => self.year_of_plenty,
            DevelopmentCard::Monopoly => self.monopoly,
        }
    }

    fn slot(&mut self, card: DevelopmentCard) -> &mut u32 {
        match card {
            DevelopmentCard::Knight => &mut self.knight,
            DevelopmentCard::VictoryPoint => &mut self.victory_point,
            DevelopmentCard::RoadBuilding => &mut self.road_building,
            DevelopmentCard::YearOfPlenty => &mut self.year_of_plenty,
            DevelopmentCard::Monopoly => &mut self.monopoly,
        }
    }

    pub fn total(&self) -> u32 {
        DevelopmentCard::ALL.iter().map(|c| self.get(*c)).sum()
    }

    pub fn credit(&mut self, card: DevelopmentCard) {
        *self.slot(card) += 1;
    }

    pub fn debit(&mut self, card: DevelopmentCard) -> Result<(), OverDraw> {
        let slot = self.slot(card);
        if *slot == 0 {
            return Err(OverDraw {
                item: card.name(),
                have: 0,
                need: 1,
            });
        }
        *slot -= 1;
        Ok(())
    }

    pub fn merge(&mut self, other: &DevCardHand) {
        for card in DevelopmentCard::ALL {
            *self.slot(card) += other.get(card);
        }
    }
}

/// Building costs
pub mod costs {
    use super::ResourceHand;
    use crate::board::PieceKind;

    /// Cost to build a road: 1 brick, 1 lumber
    pub fn road() -> ResourceHand {
        ResourceHand::with_amounts(1, 1, 0, 0, 0)
    }

    /// Cost to build a settlement: 1 brick, 1 lumber, 1 grain, 1 wool
    pub fn settlement() -> ResourceHand {
        ResourceHand::with_amounts(1, 1, 0, 1, 1)
    }

    /// Cost to upgrade to city: 3 ore, 2 grain
    pub fn city() -> ResourceHand {
        ResourceHand::with_amounts(0, 0, 3, 2, 0)
    }

    /// Cost to buy a development card: 1 ore, 1 grain, 1 wool
    pub fn development_card() -> ResourceHand {
        ResourceHand::with_amounts(0, 0, 1, 1, 1)
    }

    pub fn piece(kind: PieceKind) -> ResourceHand {
        match kind {
            PieceKind::Road => road(),
            PieceKind::Settlement => settlement(),
            PieceKind::City => city(),
        }
    }
}

/// A single player's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Seat index
    pub id: PlayerId,
    /// Display name
    pub name: String,
    pub color: PlayerColor,
    pub resources: ResourceHand,
    /// Development cards that may be played
    pub dev_cards: DevCardHand,
    /// Development cards bought this turn (can't be played same turn)
    pub dev_cards_bought_this_turn: DevCardHand,
    /// Number of knights played (for Largest Army)
    pub played_knights: u32,
    pub has_longest_road: bool,
    pub has_largest_army: bool,
    pub settlements_remaining: u32,
    pub cities_remaining: u32,
    pub roads_remaining: u32,
    /// Ports reachable through this player's buildings
    pub ports: BTreeSet<Port>,
    /// Last value computed by [`Player::recompute_victory_points`]
    pub victory_points: u32,
    /// False while the player has left the session
    pub active: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            color: PlayerColor::for_player(id),
            resources: ResourceHand::new(),
            dev_cards: DevCardHand::default(),
            dev_cards_bought_this_turn: DevCardHand::default(),
            played_knights: 0,
            has_longest_road: false,
            has_largest_army: false,
            settlements_remaining: 5,
            cities_remaining: 4,
            roads_remaining: 15,
            ports: BTreeSet::new(),
            victory_points: 0,
            active: true,
        }
    }

    /// VP cards count as soon as they are held, bought this turn or not
    pub fn victory_point_cards(&self) -> u32 {
        self.dev_cards.victory_point + self.dev_cards_bought_this_turn.victory_point
    }

    pub fn dev_card_count(&self) -> u32 {
        self.dev_cards.total() + self.dev_cards_bought_this_turn.total()
    }

    /// Recompute victory points from the building counts on the board.
    /// Returns true if the value changed.
    pub fn recompute_victory_points(&mut self, settlements: u32, cities: u32) -> bool {
        let mut vp = settlements + cities * 2 + self.victory_point_cards();
        if self.has_longest_road {
            vp += AWARD_VICTORY_POINTS;
        }
        if self.has_largest_army {
            vp += AWARD_VICTORY_POINTS;
        }
        let changed = vp != self.victory_points;
        self.victory_points = vp;
        changed
    }

    pub fn pieces_remaining(&self, kind: PieceKind) -> u32 {
        match kind {
            PieceKind::Road => self.roads_remaining,
            PieceKind::Settlement => self.settlements_remaining,
            PieceKind::City => self.cities_remaining,
        }
    }

    /// Whether this player could pay for and has a piece of this kind
    pub fn check_can_build(&self, kind: PieceKind) -> Result<(), LegalityError> {
        if self.pieces_remaining(kind) == 0 {
            return Err(LegalityError::NoPiecesRemaining);
        }
        if !self.resources.can_afford(&costs::piece(kind)) {
            return Err(LegalityError::CannotAfford);
        }
        Ok(())
    }

    /// Take one piece from the supply. A city returns its settlement.
    pub fn use_piece(&mut self, kind: PieceKind) -> Result<(), LegalityError> {
        match kind {
            PieceKind::Road if self.roads_remaining > 0 => self.roads_remaining -= 1,
            PieceKind::Settlement if self.settlements_remaining > 0 => self.settlements_remaining -= 1,
            PieceKind::City if self.cities_remaining > 0 => {
                self.cities_remaining -= 1;
                self.settlements_remaining += 1;
            }
            _ => return Err(LegalityError::NoPiecesRemaining),
        }
        Ok(())
    }

    /// Pay for and take one piece. Nothing changes on failure.
    pub fn buy_piece(&mut self, kind: PieceKind) -> Result<(), LegalityError> {
        self.check_can_build(kind)?;
        self.resources.debit_all(&costs::piece(kind))?;
        self.use_piece(kind)
    }

    /// Pay for a development card and put it on the bought-this-turn pile
    pub fn buy_dev_card(&mut self, card: DevelopmentCard) -> Result<(), LegalityError> {
        self.resources.debit_all(&costs::development_card())?;
        self.dev_cards_bought_this_turn.credit(card);
        Ok(())
    }

    /// Whether `card` may be played now
    pub fn check_can_play(&self, card: DevelopmentCard) -> Result<(), LegalityError> {
        if card == DevelopmentCard::VictoryPoint {
            return Err(LegalityError::NoSuchCard);
        }
        if self.dev_cards.get(card) > 0 {
            return Ok(());
        }
        if self.dev_cards_bought_this_turn.get(card) > 0 {
            return Err(LegalityError::CardBoughtThisTurn);
        }
        Err(LegalityError::NoSuchCard)
    }

    /// Remove a played card from the hand
    pub fn play_dev_card(&mut self, card: DevelopmentCard) -> Result<(), LegalityError> {
        self.check_can_play(card)?;
        self.dev_cards.debit(card)?;
        if card == DevelopmentCard::Knight {
            self.played_knights += 1;
        }
        Ok(())
    }

    /// Called at end of turn - move bought cards to playable pile
    pub fn end_turn(&mut self) {
        let bought = std::mem::take(&mut self.dev_cards_bought_this_turn);
        self.dev_cards.merge(&bought);
    }

    /// Best bank rate this player has for giving `resource`
    pub fn bank_rate(&self, resource: Resource) -> u32 {
        self.ports
            .iter()
            .filter(|p| match p {
                Port::Generic => true,
                Port::Specific(r) => *r == resource,
            })
            .map(|p| p.rate())
            .min()
            .unwrap_or(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_resource_hand_total() {
        let hand = ResourceHand::with_amounts(1, 2, 3, 4, 5);
        assert_eq!(hand.total(), 15);
    }

    #[test]
    fn test_total_saturates_on_huge_counts() {
        let hand = ResourceHand::with_amounts(u32::MAX, 1, 0, 0, 0);
        assert_eq!(hand.total(), u32::MAX);
        assert!(!hand.is_empty());

        let mut hand = ResourceHand::single(Resource::Wool, u32::MAX);
        hand.credit(Resource::Wool, 2);
        assert_eq!(hand.wool, u32::MAX);
    }

    #[test]
    fn test_credit_always_succeeds() {
        let mut hand = ResourceHand::new();
        hand.credit(Resource::Ore, 3);
        hand.credit(Resource::Ore, 0);
        assert_eq!(hand, ResourceHand::single(Resource::Ore, 3));
    }

    #[test]
    fn test_debit_all_is_all_or_nothing() {
        let mut hand = ResourceHand::with_amounts(3, 3, 0, 3, 3);
        let before = hand;

        let err = hand.debit_all(&costs::city()).unwrap_err();
        assert_eq!(err.item, "ore");
        assert_eq!(err.have, 0);
        assert_eq!(err.need, 3);
        assert_eq!(hand, before);

        hand.debit_all(&costs::settlement()).unwrap();
        assert_eq!(hand, ResourceHand::with_amounts(2, 2, 0, 2, 2));
    }

    #[test]
    fn test_single_debit_rejects_overdraw() {
        let mut hand = ResourceHand::single(Resource::Wool, 1);
        assert!(hand.debit(Resource::Wool, 2).is_err());
        assert_eq!(hand.wool, 1);
        assert!(hand.debit(Resource::Wool, 1).is_ok());
        assert!(hand.is_empty());
    }

    #[test]
    fn test_overdraw_becomes_cannot_afford() {
        let err: LegalityError = ResourceHand::new().debit(Resource::Brick, 1).unwrap_err().into();
        assert_eq!(err, LegalityError::CannotAfford);
    }

    #[test]
    fn test_take_all() {
        let mut hand = ResourceHand::with_amounts(0, 0, 0, 4, 1);
        assert_eq!(hand.take_all(Resource::Grain), 4);
        assert_eq!(hand, ResourceHand::single(Resource::Wool, 1));
    }

    #[test]
    fn test_building_costs() {
        assert_eq!(costs::road().total(), 2);
        assert_eq!(costs::settlement().total(), 4);
        assert_eq!(costs::city().total(), 5);
        assert_eq!(costs::development_card().total(), 3);
    }

    #[test]
    fn test_dev_card_deck_size() {
        let deck = DevelopmentCard::standard_deck();
        assert_eq!(deck.len(), 25);
        let knights = deck.iter().filter(|c| **c == DevelopmentCard::Knight).count();
        assert_eq!(knights, 14);
    }

    #[test]
    fn test_dev_card_debit_never_negative() {
        let mut hand = DevCardHand::default();
        assert!(hand.debit(DevelopmentCard::Monopoly).is_err());
        hand.credit(DevelopmentCard::Monopoly);
        assert!(hand.debit(DevelopmentCard::Monopoly).is_ok());
        assert_eq!(hand.total(), 0);
    }

    #[test]
    fn test_player_victory_points() {
        let mut player = Player::new(0, "Test".to_string());
        assert!(!player.recompute_victory_points(0, 0));

        assert!(player.recompute_victory_points(2, 1));
        assert_eq!(player.victory_points, 4);

        player.has_longest_road = true;
        player.recompute_victory_points(2, 1);
        assert_eq!(player.victory_points, 6);

        player.has_largest_army = true;
        player.dev_cards_bought_this_turn.credit(DevelopmentCard::VictoryPoint);
        player.recompute_victory_points(2, 1);
        assert_eq!(player.victory_points, 9);
    }

    #[test]
    fn test_player_buy_road() {
        let mut player = Player::new(0, "Test".to_string());
        player.resources = ResourceHand::with_amounts(5, 5, 5, 5, 5);

        player.buy_piece(PieceKind::Road).unwrap();
        assert_eq!(player.roads_remaining, 14);
        assert_eq!(player.resources.brick, 4);
        assert_eq!(player.resources.lumber, 4);
    }

    #[test]
    fn test_buy_piece_failure_changes_nothing() {
        let mut player = Player::new(0, "Test".to_string());
        player.resources = ResourceHand::with_amounts(1, 1, 0, 0, 0);
        let before = player.clone();

        assert_eq!(player.buy_piece(PieceKind::Settlement), Err(LegalityError::CannotAfford));
        assert_eq!(player, before);

        player.roads_remaining = 0;
        assert_eq!(player.buy_piece(PieceKind::Road), Err(LegalityError::NoPiecesRemaining));
        assert_eq!(player.resources, before.resources);
    }

    #[test]
    fn test_player_buy_city() {
        let mut player = Player::new(0, "Test".to_string());
        player.resources = ResourceHand::with_amounts(5, 5, 5, 5, 5);
        player.settlements_remaining = 3;

        player.buy_piece(PieceKind::City).unwrap();
        assert_eq!(player.cities_remaining, 3);
        assert_eq!(player.settlements_remaining, 4);
    }

    #[test]
    fn test_dev_card_bought_this_turn() {
        let mut player = Player::new(0, "Test".to_string());
        player.resources = ResourceHand::with_amounts(5, 5, 5, 5, 5);

        player.buy_dev_card(DevelopmentCard::Knight).unwrap();
        assert_eq!(
            player.check_can_play(DevelopmentCard::Knight),
            Err(LegalityError::CardBoughtThisTurn)
        );
        assert_eq!(player.dev_card_count(), 1);

        player.end_turn();
        assert_eq!(player.check_can_play(DevelopmentCard::Knight), Ok(()));
        assert_eq!(player.dev_cards_bought_this_turn.total(), 0);

        player.play_dev_card(DevelopmentCard::Knight).unwrap();
        assert_eq!(player.played_knights, 1);
        assert_eq!(player.dev_card_count(), 0);
    }

    #[test]
    fn test_victory_point_cards_are_never_played() {
        let mut player = Player::new(0, "Test".to_string());
        player.dev_cards.credit(DevelopmentCard::VictoryPoint);
        assert_eq!(
            player.play_dev_card(DevelopmentCard::VictoryPoint),
            Err(LegalityError::NoSuchCard)
        );
    }

    #[test]
    fn test_bank_rate_uses_best_port() {
        let mut player = Player::new(0, "Test".to_string());
        assert_eq!(player.bank_rate(Resource::Ore), 4);

        player.ports.insert(Port::Generic);
        assert_eq!(player.bank_rate(Resource::Ore), 3);

        player.ports.insert(Port::Specific(Resource::Ore));
        assert_eq!(player.bank_rate(Resource::Ore), 2);
        assert_eq!(player.bank_rate(Resource::Wool), 3);
    }

    #[test]
    fn test_steal_random() {
        let mut hand = ResourceHand::with_amounts(0, 0, 0, 1, 0);
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(hand.steal_random(&mut rng), Some(Resource::Grain));
        assert!(hand.is_empty());
        assert_eq!(hand.steal_random(&mut rng), None);
    }

    #[test]
    fn test_take_random_removes_exact_count() {
        let mut hand = ResourceHand::with_amounts(2, 3, 1, 0, 3);
        let mut rng = StdRng::seed_from_u64(4);

        let taken = hand.take_random(4, &mut rng);
        assert_eq!(taken.total(), 4);
        assert_eq!(hand.total(), 5);
        for resource in Resource::ALL {
            assert_eq!(
                hand.get(resource) + taken.get(resource),
                ResourceHand::with_amounts(2, 3, 1, 0, 3).get(resource)
            );
        }
    }
}
