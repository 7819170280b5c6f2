//! Hexsettle - core rules engine for a hex-grid settlement and trading game
//!
//! This crate holds everything that decides what a move means:
//! - Hex coordinate system for tiles, corners and edges
//! - Board layout, piece placement rules, robber and production
//! - Player hands, piece supply and development cards
//! - Player-to-player trade offers
//! - The session state machine that validates and applies actions
//!
//! It does no I/O. The server crate feeds actions in and relays the facts
//! that come back out.
//!
//! # Modules
//!
//! - [`hex`]: Coordinate system for hex tiles, corners, and edges
//! - [`board`]: Game board representation and placement legality
//! - [`player`]: Player state and resources
//! - [`trade`]: Open trade offers between players
//! - [`actions`]: Inbound actions, outbound facts and private responses
//! - [`game`]: Session state machine

pub mod actions;
pub mod board;
pub mod game;
pub mod hex;
pub mod player;
pub mod trade;

// Re-export commonly used types
pub use actions::{DevCardPlay, Fact, GameAction, Outcome, Response};
pub use board::{Board, BoardSnapshot, LegalityError, Piece, PieceKind, PlayerId, Port, Resource, Tile, TileKind};
pub use game::{GameConfig, GameError, GamePhase, GameSession, SessionSnapshot, SetupPlacing};
pub use hex::{
    Coord, CornerCoord, CornerDirection, Direction, EdgeCoord, EdgeDirection, GeometryError, HexCoord, NodeKind,
};
pub use player::{DevelopmentCard, Player, PlayerColor, ResourceHand};
pub use trade::{TradeBook, TradeOffer, TradeStatus};
