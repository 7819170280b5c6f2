//! Game board representation including tiles, pieces, ports and the robber.
//!
//! This module contains:
//! - Resource and tile types
//! - Pieces (roads, settlements, cities) and their placement rules
//! - Ports attached to coastal edges
//! - Production, robber movement and longest-road queries
//! - Standard board generation

use crate::hex::{Coord, CornerCoord, EdgeCoord, HexCoord};
use crate::player::ResourceHand;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Player identifier: the seat index in the session's player list
pub type PlayerId = u8;

/// The five production resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resource {
    Brick,
    Lumber,
    Ore,
    Grain,
    Wool,
}

impl Resource {
    /// All resource types
    pub const ALL: [Resource; 5] = [
        Resource::Brick,
        Resource::Lumber,
        Resource::Ore,
        Resource::Grain,
        Resource::Wool,
    ];
}

/// What a hex produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    /// Produces a resource when its number is rolled
    Resource(Resource),
    /// No production; the robber starts here
    Desert,
}

/// Port types for bank trading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Port {
    /// 3:1 trade any resource
    Generic,
    /// 2:1 trade for a specific resource
    Specific(Resource),
}

impl Port {
    /// The exchange rate for this port
    pub fn rate(&self) -> u32 {
        match self {
            Port::Generic => 3,
            Port::Specific(_) => 2,
        }
    }
}

/// A single hex tile on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Position on the hex grid
    pub coord: HexCoord,
    /// Resource or desert
    pub kind: TileKind,
    /// Dice number that triggers production (2-12, None for desert)
    pub number: Option<u8>,
}

impl Tile {
    /// Create a new resource tile
    pub fn resource(coord: HexCoord, resource: Resource, number: u8) -> Self {
        Self {
            coord,
            kind: TileKind::Resource(resource),
            number: Some(number),
        }
    }

    /// Create a desert tile
    pub fn desert(coord: HexCoord) -> Self {
        Self {
            coord,
            kind: TileKind::Desert,
            number: None,
        }
    }

    /// Get the resource this tile produces, if any
    pub fn produces(&self) -> Option<Resource> {
        match self.kind {
            TileKind::Resource(r) => Some(r),
            TileKind::Desert => None,
        }
    }
}

/// Kinds of pieces a player can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    Road,
    Settlement,
    City,
}

/// A placed piece, carrying its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Piece {
    /// Occupies an edge
    Road(PlayerId),
    /// Occupies a corner; 1 VP, 1 resource per adjacent production
    Settlement(PlayerId),
    /// Upgraded settlement; 2 VP, 2 resources per adjacent production
    City(PlayerId),
}

impl Piece {
    pub fn new(kind: PieceKind, owner: PlayerId) -> Self {
        match kind {
            PieceKind::Road => Piece::Road(owner),
            PieceKind::Settlement => Piece::Settlement(owner),
            PieceKind::City => Piece::City(owner),
        }
    }

    pub fn kind(&self) -> PieceKind {
        match self {
            Piece::Road(_) => PieceKind::Road,
            Piece::Settlement(_) => PieceKind::Settlement,
            Piece::City(_) => PieceKind::City,
        }
    }

    pub fn owner(&self) -> PlayerId {
        match self {
            Piece::Road(p) | Piece::Settlement(p) | Piece::City(p) => *p,
        }
    }

    /// Resource multiplier (how many resources per production)
    pub fn production(&self) -> u32 {
        match self {
            Piece::Road(_) => 0,
            Piece::Settlement(_) => 1,
            Piece::City(_) => 2,
        }
    }
}

/// Port placement on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPlacement {
    /// The coastal edge where ships dock
    pub edge: EdgeCoord,
    /// Generic or specific port
    pub port: Port,
}

/// The robber: always on exactly one hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Robber {
    pub position: HexCoord,
    /// Who moved it last (None until the first move)
    pub last_mover: Option<PlayerId>,
}

/// Which connectivity rule applies to a placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementRule {
    /// Initial placement: settlements need no road, roads must touch the
    /// settlement placed just before them
    Setup { anchor: Option<CornerCoord> },
    /// Normal play: everything must connect to the owner's network
    Normal,
}

/// Why a move breaks the rules. Reported to the requester; never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LegalityError {
    #[error("coordinate is not on the board")]
    OffBoard,
    #[error("coordinate is already occupied")]
    Occupied,
    #[error("piece does not fit that kind of coordinate")]
    WrongNodeKind,
    #[error("too close to another settlement")]
    DistanceRule,
    #[error("not connected to your roads or buildings")]
    NotConnected,
    #[error("no settlement of yours at that corner")]
    NotYourSettlement,
    #[error("the robber must move to a different hex")]
    RobberUnchanged,
    #[error("cannot afford this")]
    CannotAfford,
    #[error("no pieces of that kind remaining")]
    NoPiecesRemaining,
    #[error("no development cards left in the deck")]
    EmptyDeck,
    #[error("you do not hold a playable card of that kind")]
    NoSuchCard,
    #[error("cards bought this turn cannot be played until next turn")]
    CardBoughtThisTurn,
    #[error("only one development card may be played per turn")]
    DevCardAlreadyPlayed,
    #[error("no build in progress")]
    NoBuildInProgress,
    #[error("a trade must offer and request at least one resource")]
    EmptyTrade,
    #[error("you already have an open trade offer this turn")]
    OfferAlreadyOpen,
    #[error("no open trade offer from that player")]
    NoSuchOffer,
    #[error("that player has not expressed interest in the offer")]
    NotInterested,
    #[error("you cannot respond to your own offer")]
    OwnOffer,
    #[error("cannot trade a resource for itself")]
    SameResource,
    #[error("bank trade does not match your exchange rate of {rate}:1")]
    BadBankRate { rate: u32 },
    #[error("must discard exactly {required} cards")]
    InvalidDiscard { required: u32 },
    #[error("you do not need to discard")]
    NoDiscardRequired,
    #[error("that player cannot be robbed here")]
    InvalidVictim,
    #[error("choose a player to steal from")]
    VictimRequired,
    #[error("dice show {0} and {1}; each die must be 1 to 6")]
    InvalidDice(u8, u8),
}

/// The complete game board
#[derive(Debug, Clone)]
pub struct Board {
    /// All tiles indexed by coordinate
    tiles: HashMap<HexCoord, Tile>,
    /// Settlements and cities
    corners: HashMap<CornerCoord, Piece>,
    /// Roads, keyed by edge, valued by owner
    roads: HashMap<EdgeCoord, PlayerId>,
    /// Ports on coastal edges
    ports: Vec<PortPlacement>,
    robber: Robber,
}

/// The 19 land hexes of the standard board: center, ring 1, ring 2
pub const STANDARD_COORDS: [HexCoord; 19] = [
    HexCoord::new(0, 0),
    HexCoord::new(1, 0),
    HexCoord::new(1, -1),
    HexCoord::new(0, -1),
    HexCoord::new(-1, 0),
    HexCoord::new(-1, 1),
    HexCoord::new(0, 1),
    HexCoord::new(2, 0),
    HexCoord::new(2, -1),
    HexCoord::new(2, -2),
    HexCoord::new(1, -2),
    HexCoord::new(0, -2),
    HexCoord::new(-1, -1),
    HexCoord::new(-2, 0),
    HexCoord::new(-2, 1),
    HexCoord::new(-2, 2),
    HexCoord::new(-1, 2),
    HexCoord::new(0, 2),
    HexCoord::new(1, 1),
];

impl Board {
    /// Build a board from a fixed layout. The robber starts on the first
    /// desert, or on the lowest coordinate when the layout has none.
    pub fn from_layout(tiles: Vec<Tile>, ports: Vec<PortPlacement>) -> Self {
        let robber_position = tiles
            .iter()
            .find(|t| t.kind == TileKind::Desert)
            .or_else(|| tiles.iter().min_by_key(|t| t.coord))
            .map(|t| t.coord)
            .unwrap_or_default();

        Self {
            tiles: tiles.into_iter().map(|t| (t.coord, t)).collect(),
            corners: HashMap::new(),
            roads: HashMap::new(),
            ports,
            robber: Robber {
                position: robber_position,
                last_mover: None,
            },
        }
    }

    /// Create the standard board layout with randomized tiles and numbers
    pub fn standard() -> Self {
        let mut rng = rand::thread_rng();
        Self::standard_with_rng(&mut rng)
    }

    /// Create the standard board layout with a provided RNG.
    /// This allows for deterministic board generation when needed.
    pub fn standard_with_rng<R: Rng>(rng: &mut R) -> Self {
        // 4 lumber, 4 grain, 4 wool, 3 ore, 3 brick, 1 desert (None)
        let mut kinds: Vec<Option<Resource>> = Vec::with_capacity(19);
        for (resource, count) in [
            (Resource::Lumber, 4),
            (Resource::Grain, 4),
            (Resource::Wool, 4),
            (Resource::Ore, 3),
            (Resource::Brick, 3),
        ] {
            kinds.extend(std::iter::repeat(Some(resource)).take(count));
        }
        kinds.push(None);
        kinds.shuffle(rng);

        let resource_coords: Vec<HexCoord> = STANDARD_COORDS
            .iter()
            .zip(&kinds)
            .filter(|(_, kind)| kind.is_some())
            .map(|(coord, _)| *coord)
            .collect();

        let numbers: Vec<u8> = vec![2, 3, 3, 4, 4, 5, 5, 6, 6, 8, 8, 9, 9, 10, 10, 11, 11, 12];
        let numbers = assign_numbers_avoiding_adjacent_68(&resource_coords, &numbers, rng);
        let mut numbers = numbers.into_iter();

        let mut tiles = Vec::with_capacity(19);
        for (coord, kind) in STANDARD_COORDS.iter().zip(kinds) {
            let tile = match kind {
                Some(resource) => match numbers.next() {
                    Some(number) => Tile::resource(*coord, resource, number),
                    None => Tile::desert(*coord),
                },
                None => Tile::desert(*coord),
            };
            tiles.push(tile);
        }

        let mut board = Self::from_layout(tiles, Vec::new());
        board.add_standard_ports(rng);
        board
    }

    /// Standard ports: 4 generic (3:1) and one 2:1 per resource, spread over
    /// the coast
    fn add_standard_ports<R: Rng>(&mut self, rng: &mut R) {
        let mut port_types = vec![Port::Generic, Port::Generic, Port::Generic, Port::Generic];
        port_types.extend(Resource::ALL.map(Port::Specific));
        port_types.shuffle(rng);

        let selected = self.select_distributed_coastal_edges(port_types.len(), rng);
        self.ports = selected
            .into_iter()
            .zip(port_types)
            .map(|(edge, port)| PortPlacement { edge, port })
            .collect();
    }

    /// Edges with a land hex on one side and open water on the other
    pub fn coastal_edges(&self) -> Vec<EdgeCoord> {
        let mut coastal: Vec<EdgeCoord> = self
            .land_edges()
            .into_iter()
            .filter(|e| e.touching_hexes().iter().any(|h| !self.tiles.contains_key(h)))
            .collect();
        coastal.sort();
        coastal
    }

    /// Pick `count` coastal edges, greedily maximising the distance to the
    /// edges already picked
    fn select_distributed_coastal_edges<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<EdgeCoord> {
        let mut available = self.coastal_edges();
        if available.len() <= count {
            return available;
        }
        available.shuffle(rng);

        let mut selected: Vec<EdgeCoord> = Vec::with_capacity(count);
        // Two ports may not share a corner
        while selected.len() < count && !available.is_empty() {
            let mut best: Option<(usize, f64)> = None;
            for (idx, candidate) in available.iter().enumerate() {
                let shares_corner = selected
                    .iter()
                    .any(|s| s.endpoints().iter().any(|c| candidate.endpoints().contains(c)));
                if shares_corner {
                    continue;
                }
                let min_dist = selected
                    .iter()
                    .map(|s| edge_distance(candidate, s))
                    .fold(f64::MAX, f64::min);
                if best.map_or(true, |(_, d)| min_dist > d) {
                    best = Some((idx, min_dist));
                }
            }
            match best {
                Some((idx, _)) => selected.push(available.remove(idx)),
                None => break,
            }
        }
        selected
    }

    // ==================== Query Methods ====================

    /// Get a tile by coordinate
    pub fn tile(&self, coord: &HexCoord) -> Option<&Tile> {
        self.tiles.get(coord)
    }

    /// All tiles, in coordinate order
    pub fn tiles(&self) -> Vec<&Tile> {
        let mut tiles: Vec<&Tile> = self.tiles.values().collect();
        tiles.sort_by_key(|t| t.coord);
        tiles
    }

    pub fn ports(&self) -> &[PortPlacement] {
        &self.ports
    }

    pub fn robber(&self) -> Robber {
        self.robber
    }

    /// Settlement or city at a corner
    pub fn corner_piece(&self, corner: &CornerCoord) -> Option<Piece> {
        self.corners.get(corner).copied()
    }

    /// Owner of the road at an edge
    pub fn road_owner(&self, edge: &EdgeCoord) -> Option<PlayerId> {
        self.roads.get(edge).copied()
    }

    /// Whatever occupies a coordinate
    pub fn piece_at(&self, coord: &Coord) -> Option<Piece> {
        if let Ok(corner) = coord.as_corner() {
            return self.corner_piece(&corner);
        }
        coord
            .as_edge()
            .ok()
            .and_then(|edge| self.road_owner(&edge))
            .map(Piece::Road)
    }

    /// Every placed piece with its coordinate, in coordinate order
    pub fn pieces(&self) -> Vec<(Coord, Piece)> {
        let mut pieces: Vec<(Coord, Piece)> = self
            .corners
            .iter()
            .map(|(c, p)| (Coord::from(*c), *p))
            .chain(self.roads.iter().map(|(e, owner)| (Coord::from(*e), Piece::Road(*owner))))
            .collect();
        pieces.sort_by_key(|(coord, _)| *coord);
        pieces
    }

    /// Number of settlements and cities a player has on the board
    pub fn building_counts(&self, player: PlayerId) -> (u32, u32) {
        self.corners.values().filter(|p| p.owner() == player).fold((0, 0), |(s, c), p| match p {
            Piece::Settlement(_) => (s + 1, c),
            Piece::City(_) => (s, c + 1),
            Piece::Road(_) => (s, c),
        })
    }

    /// All corners touching at least one board hex
    pub fn land_corners(&self) -> HashSet<CornerCoord> {
        self.tiles.keys().flat_map(|h| h.corners()).collect()
    }

    /// All edges touching at least one board hex
    pub fn land_edges(&self) -> HashSet<EdgeCoord> {
        self.tiles.keys().flat_map(|h| h.edges()).collect()
    }

    pub fn is_land_corner(&self, corner: &CornerCoord) -> bool {
        corner.touching_hexes().iter().any(|h| self.tiles.contains_key(h))
    }

    pub fn is_land_edge(&self, edge: &EdgeCoord) -> bool {
        edge.touching_hexes().iter().any(|h| self.tiles.contains_key(h))
    }

    /// Tiles touching a corner
    pub fn tiles_at_corner(&self, corner: &CornerCoord) -> Vec<&Tile> {
        corner.touching_hexes().iter().filter_map(|h| self.tiles.get(h)).collect()
    }

    /// The port a corner gives access to, if any
    pub fn port_at_corner(&self, corner: &CornerCoord) -> Option<Port> {
        self.ports
            .iter()
            .find(|p| p.edge.endpoints().contains(corner))
            .map(|p| p.port)
    }

    /// Ports a player has access to through their settlements and cities
    pub fn ports_for(&self, player: PlayerId) -> BTreeSet<Port> {
        self.ports
            .iter()
            .filter(|p| {
                p.edge
                    .endpoints()
                    .iter()
                    .any(|c| self.corner_piece(c).is_some_and(|piece| piece.owner() == player))
            })
            .map(|p| p.port)
            .collect()
    }

    // ==================== Validation Methods ====================

    /// No settlement or city on any neighbouring corner
    pub fn satisfies_distance_rule(&self, corner: &CornerCoord) -> bool {
        corner.adjacent_corners().iter().all(|adj| !self.corners.contains_key(adj))
    }

    pub fn check_settlement(
        &self,
        corner: &CornerCoord,
        player: PlayerId,
        rule: PlacementRule,
    ) -> Result<(), LegalityError> {
        if !self.is_land_corner(corner) {
            return Err(LegalityError::OffBoard);
        }
        if self.corners.contains_key(corner) {
            return Err(LegalityError::Occupied);
        }
        if !self.satisfies_distance_rule(corner) {
            return Err(LegalityError::DistanceRule);
        }
        if rule == PlacementRule::Normal && !self.touches_own_road(corner, player) {
            return Err(LegalityError::NotConnected);
        }
        Ok(())
    }

    pub fn check_road(&self, edge: &EdgeCoord, player: PlayerId, rule: PlacementRule) -> Result<(), LegalityError> {
        if !self.is_land_edge(edge) {
            return Err(LegalityError::OffBoard);
        }
        if self.roads.contains_key(edge) {
            return Err(LegalityError::Occupied);
        }
        let connected = match rule {
            PlacementRule::Setup { anchor } => anchor.is_some_and(|a| {
                edge.endpoints().contains(&a) && self.corner_piece(&a) == Some(Piece::Settlement(player))
            }),
            PlacementRule::Normal => self.is_connected_to_network(edge, player),
        };
        if !connected {
            return Err(LegalityError::NotConnected);
        }
        Ok(())
    }

    pub fn check_city(&self, corner: &CornerCoord, player: PlayerId) -> Result<(), LegalityError> {
        match self.corner_piece(corner) {
            Some(Piece::Settlement(owner)) if owner == player => Ok(()),
            _ => Err(LegalityError::NotYourSettlement),
        }
    }

    fn touches_own_road(&self, corner: &CornerCoord, player: PlayerId) -> bool {
        corner.touching_edges().iter().any(|e| self.road_owner(e) == Some(player))
    }

    /// An edge joins a player's network through an own building at an
    /// endpoint, or an own road at an endpoint not held by an opponent
    fn is_connected_to_network(&self, edge: &EdgeCoord, player: PlayerId) -> bool {
        edge.endpoints().iter().any(|endpoint| match self.corner_piece(endpoint) {
            Some(piece) => piece.owner() == player,
            None => endpoint
                .touching_edges()
                .iter()
                .any(|adj| adj != edge && self.road_owner(adj) == Some(player)),
        })
    }

    /// Legal settlement corners for a player, in coordinate order
    pub fn legal_settlement_spots(&self, player: PlayerId, rule: PlacementRule) -> Vec<CornerCoord> {
        let mut spots: Vec<CornerCoord> = self
            .land_corners()
            .into_iter()
            .filter(|c| self.check_settlement(c, player, rule).is_ok())
            .collect();
        spots.sort();
        spots
    }

    /// Legal road edges for a player, in coordinate order
    pub fn legal_road_spots(&self, player: PlayerId, rule: PlacementRule) -> Vec<EdgeCoord> {
        let mut spots: Vec<EdgeCoord> = self
            .land_edges()
            .into_iter()
            .filter(|e| self.check_road(e, player, rule).is_ok())
            .collect();
        spots.sort();
        spots
    }

    /// The player's settlements, which are the legal city spots
    pub fn legal_city_spots(&self, player: PlayerId) -> Vec<CornerCoord> {
        let mut spots: Vec<CornerCoord> = self
            .corners
            .iter()
            .filter(|(_, piece)| **piece == Piece::Settlement(player))
            .map(|(c, _)| *c)
            .collect();
        spots.sort();
        spots
    }

    // ==================== Mutation Methods ====================

    /// Validate and place a piece. Cities are upgrades and go through
    /// [`Board::upgrade_to_city`].
    pub fn place_piece(&mut self, coord: Coord, piece: Piece, rule: PlacementRule) -> Result<(), LegalityError> {
        match piece {
            Piece::Road(owner) => {
                let edge = coord.as_edge().map_err(|_| LegalityError::WrongNodeKind)?;
                self.check_road(&edge, owner, rule)?;
                self.roads.insert(edge, owner);
            }
            Piece::Settlement(owner) => {
                let corner = coord.as_corner().map_err(|_| LegalityError::WrongNodeKind)?;
                self.check_settlement(&corner, owner, rule)?;
                self.corners.insert(corner, piece);
            }
            Piece::City(owner) => {
                let corner = coord.as_corner().map_err(|_| LegalityError::WrongNodeKind)?;
                self.upgrade_to_city(corner, owner)?;
            }
        }
        Ok(())
    }

    /// Replace an own settlement with a city
    pub fn upgrade_to_city(&mut self, corner: CornerCoord, player: PlayerId) -> Result<(), LegalityError> {
        self.check_city(&corner, player)?;
        self.corners.insert(corner, Piece::City(player));
        Ok(())
    }

    /// Move the robber and return the owners of buildings around its new hex
    pub fn move_robber(&mut self, hex: HexCoord, mover: PlayerId) -> Result<BTreeSet<PlayerId>, LegalityError> {
        if !self.tiles.contains_key(&hex) {
            return Err(LegalityError::OffBoard);
        }
        if hex == self.robber.position {
            return Err(LegalityError::RobberUnchanged);
        }
        self.robber = Robber {
            position: hex,
            last_mover: Some(mover),
        };
        Ok(self.players_adjacent_to_hex(&hex))
    }

    /// Players who have buildings on a hex's corners
    pub fn players_adjacent_to_hex(&self, hex: &HexCoord) -> BTreeSet<PlayerId> {
        hex.corners()
            .iter()
            .filter_map(|c| self.corner_piece(c))
            .map(|p| p.owner())
            .collect()
    }

    // ==================== Resource Distribution ====================

    /// What every player earns when `number` is rolled. Hexes holding the
    /// robber produce nothing; contributions from several hexes add up.
    pub fn resources_produced_for(&self, number: u8) -> BTreeMap<PlayerId, ResourceHand> {
        let mut distribution: BTreeMap<PlayerId, ResourceHand> = BTreeMap::new();

        for tile in self.tiles.values() {
            if tile.number != Some(number) || tile.coord == self.robber.position {
                continue;
            }
            let Some(resource) = tile.produces() else {
                continue;
            };
            for corner in tile.coord.corners() {
                if let Some(piece) = self.corner_piece(&corner) {
                    distribution
                        .entry(piece.owner())
                        .or_default()
                        .credit(resource, piece.production());
                }
            }
        }

        distribution
    }

    // ==================== Longest Road Calculation ====================

    /// Length of the longest simple road path owned by a player
    pub fn longest_road(&self, player: PlayerId) -> u32 {
        self.roads
            .iter()
            .filter(|(_, owner)| **owner == player)
            .map(|(edge, _)| self.dfs_road_length(player, *edge, &mut HashSet::new()))
            .max()
            .unwrap_or(0)
    }

    fn dfs_road_length(&self, player: PlayerId, current: EdgeCoord, visited: &mut HashSet<EdgeCoord>) -> u32 {
        if !visited.insert(current) {
            return 0;
        }

        let mut max_continuation = 0;
        for endpoint in current.endpoints() {
            // Can't pass through an opponent's building
            if self.corner_piece(&endpoint).is_some_and(|p| p.owner() != player) {
                continue;
            }
            for next in endpoint.touching_edges() {
                if next != current && self.road_owner(&next) == Some(player) {
                    max_continuation = max_continuation.max(self.dfs_road_length(player, next, visited));
                }
            }
        }

        visited.remove(&current);
        1 + max_continuation
    }

    /// JSON-friendly form; JSON can't key maps by struct coordinates
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            tiles: self.tiles().into_iter().cloned().collect(),
            pieces: self
                .pieces()
                .into_iter()
                .map(|(coord, piece)| PlacedPiece { coord, piece })
                .collect(),
            ports: self.ports.clone(),
            robber: self.robber,
        }
    }
}

/// Assign dice numbers while trying to keep 6 and 8 off neighbouring hexes
fn assign_numbers_avoiding_adjacent_68<R: Rng>(coords: &[HexCoord], numbers: &[u8], rng: &mut R) -> Vec<u8> {
    const MAX_ATTEMPTS: usize = 100;

    let mut shuffled = numbers.to_vec();
    for _ in 0..MAX_ATTEMPTS {
        shuffled.shuffle(rng);
        if is_valid_number_placement(coords, &shuffled) {
            break;
        }
    }
    shuffled
}

fn is_valid_number_placement(coords: &[HexCoord], numbers: &[u8]) -> bool {
    let hot: HashSet<HexCoord> = coords
        .iter()
        .zip(numbers)
        .filter(|(_, n)| **n == 6 || **n == 8)
        .map(|(c, _)| *c)
        .collect();
    hot.iter().all(|c| c.neighbors().iter().all(|n| !hot.contains(n)))
}

/// Approximate distance between two edges using their pixel midpoints
fn edge_distance(e1: &EdgeCoord, e2: &EdgeCoord) -> f64 {
    let (x1, y1) = e1.to_pixel(1.0);
    let (x2, y2) = e2.to_pixel(1.0);
    ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt()
}

/// A piece with its coordinate, for snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedPiece {
    pub coord: Coord,
    pub piece: Piece,
}

/// Serializable view of the whole board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub tiles: Vec<Tile>,
    pub pieces: Vec<PlacedPiece>,
    pub ports: Vec<PortPlacement>,
    pub robber: Robber,
}
