//! Player-to-player trade negotiation.
//!
//! Each offering player has at most one open offer. Other players register
//! interest or decline; the offering player then accepts one interested
//! player, cancels, or sees the offer declined by everyone. Resolved offers
//! leave the book.

use crate::board::{LegalityError, PlayerId};
use crate::player::{Player, ResourceHand};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Where an offer stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Accepted { with: PlayerId },
    DeclinedByAll,
    Canceled,
}

/// A trade proposed by one player to the rest of the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub id: u32,
    pub offering_player: PlayerId,
    /// What the offering player gives
    pub offered: ResourceHand,
    /// What the offering player wants back
    pub requested: ResourceHand,
    pub interested: BTreeSet<PlayerId>,
    pub declined: BTreeSet<PlayerId>,
    pub status: TradeStatus,
}

/// All unresolved offers in a session, keyed by offering player
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeBook {
    offers: BTreeMap<PlayerId, TradeOffer>,
    next_id: u32,
}

impl TradeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, offering_player: PlayerId) -> Option<&TradeOffer> {
        self.offers.get(&offering_player)
    }

    pub fn offers(&self) -> impl Iterator<Item = &TradeOffer> {
        self.offers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    fn open_offer_mut(&mut self, offering_player: PlayerId) -> Result<&mut TradeOffer, LegalityError> {
        self.offers
            .get_mut(&offering_player)
            .filter(|o| o.status == TradeStatus::Open)
            .ok_or(LegalityError::NoSuchOffer)
    }

    /// Open a new offer. The offering player must hold what they offer.
    pub fn start_offer(
        &mut self,
        offering_player: &Player,
        offered: ResourceHand,
        requested: ResourceHand,
    ) -> Result<&TradeOffer, LegalityError> {
        if offered.is_empty() || requested.is_empty() {
            return Err(LegalityError::EmptyTrade);
        }
        if self.offers.contains_key(&offering_player.id) {
            return Err(LegalityError::OfferAlreadyOpen);
        }
        if !offering_player.resources.can_afford(&offered) {
            return Err(LegalityError::CannotAfford);
        }

        self.next_id += 1;
        let offer = TradeOffer {
            id: self.next_id,
            offering_player: offering_player.id,
            offered,
            requested,
            interested: BTreeSet::new(),
            declined: BTreeSet::new(),
            status: TradeStatus::Open,
        };
        Ok(self.offers.entry(offering_player.id).or_insert(offer))
    }

    /// Add `player` to the interested set. Registering twice is the same as
    /// registering once; a previous decline is withdrawn.
    pub fn register_interest(&mut self, offering_player: PlayerId, player: PlayerId) -> Result<(), LegalityError> {
        if offering_player == player {
            return Err(LegalityError::OwnOffer);
        }
        let offer = self.open_offer_mut(offering_player)?;
        offer.declined.remove(&player);
        offer.interested.insert(player);
        Ok(())
    }

    /// Record a decline. When every one of `responders` has declined the
    /// offer resolves and leaves the book.
    pub fn decline(
        &mut self,
        offering_player: PlayerId,
        player: PlayerId,
        responders: &BTreeSet<PlayerId>,
    ) -> Result<TradeStatus, LegalityError> {
        if offering_player == player {
            return Err(LegalityError::OwnOffer);
        }
        let offer = self.open_offer_mut(offering_player)?;
        offer.interested.remove(&player);
        offer.declined.insert(player);

        if responders.is_subset(&offer.declined) {
            offer.status = TradeStatus::DeclinedByAll;
            self.offers.remove(&offering_player);
            return Ok(TradeStatus::DeclinedByAll);
        }
        Ok(TradeStatus::Open)
    }

    /// Execute the trade with `chosen`. Both sides are checked before
    /// anything moves; on failure nobody's hand changes.
    pub fn accept(
        &mut self,
        offering_player: PlayerId,
        chosen: PlayerId,
        players: &mut [Player],
    ) -> Result<TradeOffer, LegalityError> {
        let offer = self.open_offer_mut(offering_player)?;
        if !offer.interested.contains(&chosen) {
            return Err(LegalityError::NotInterested);
        }
        let (offered, requested) = (offer.offered, offer.requested);

        let (giver, taker) = (usize::from(offering_player), usize::from(chosen));
        if giver >= players.len() || taker >= players.len() {
            return Err(LegalityError::NoSuchOffer);
        }
        if !players[giver].resources.can_afford(&offered) || !players[taker].resources.can_afford(&requested) {
            return Err(LegalityError::CannotAfford);
        }

        players[giver].resources.debit_all(&offered)?;
        players[taker].resources.debit_all(&requested)?;
        players[giver].resources.credit_all(&requested);
        players[taker].resources.credit_all(&offered);

        let mut offer = self.offers.remove(&offering_player).ok_or(LegalityError::NoSuchOffer)?;
        offer.status = TradeStatus::Accepted { with: chosen };
        Ok(offer)
    }

    /// Withdraw an offer
    pub fn cancel(&mut self, offering_player: PlayerId) -> Result<TradeOffer, LegalityError> {
        let mut offer = self.offers.remove(&offering_player).ok_or(LegalityError::NoSuchOffer)?;
        offer.status = TradeStatus::Canceled;
        Ok(offer)
    }

    /// Cancel every unresolved offer, returning the offering players
    pub fn cancel_all(&mut self) -> Vec<PlayerId> {
        std::mem::take(&mut self.offers).into_keys().collect()
    }

    /// Drop a departing player: cancel their offer and forget their answers
    pub fn remove_player(&mut self, player: PlayerId) -> Option<TradeOffer> {
        for offer in self.offers.values_mut() {
            offer.interested.remove(&player);
            offer.declined.remove(&player);
        }
        self.cancel(player).ok()
    }
}
