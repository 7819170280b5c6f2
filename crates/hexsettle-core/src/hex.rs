//! Hex coordinate system using axial coordinates (q, r).
//!
//! This module provides the foundational coordinate types for the board:
//! - `HexCoord`: identifies individual hex tiles
//! - `CornerCoord`: identifies corners where settlements/cities are placed
//! - `EdgeCoord`: identifies edges where roads are placed
//! - `Coord`: the general wire form (axial pair plus optional sub-position)
//!
//! Hexes are pointy-top. Every hex cell owns two corners (its top `North` and
//! bottom `South` point) and three edges (upper-left `North`, left `West` and
//! lower-left `South`). The remaining corners and edges of a hex are owned by
//! its neighbours, so every geometric corner or edge has exactly one
//! coordinate and no canonicalisation is needed.
//!
//! All adjacency is read from the constant offset tables below; lists come
//! back in clockwise order starting from the uppermost-leftmost element.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a coordinate carries a direction that does not exist for its
/// node kind. This is a caller bug, not a game rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GeometryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Orientation tag used by the general [`Coord`] form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    West,
    South,
}

/// What a [`Coord`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Hex,
    Corner,
    Edge,
}

/// Which of the two owned corners of a hex cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CornerDirection {
    /// Top point of the hex
    North,
    /// Bottom point of the hex
    South,
}

impl CornerDirection {
    const fn index(self) -> usize {
        match self {
            CornerDirection::North => 0,
            CornerDirection::South => 1,
        }
    }
}

impl TryFrom<Direction> for CornerDirection {
    type Error = GeometryError;

    fn try_from(direction: Direction) -> Result<Self, Self::Error> {
        match direction {
            Direction::North => Ok(CornerDirection::North),
            Direction::South => Ok(CornerDirection::South),
            Direction::West => Err(GeometryError::InvalidArgument(
                "corners only have NORTH and SOUTH orientations".to_string(),
            )),
        }
    }
}

impl From<CornerDirection> for Direction {
    fn from(direction: CornerDirection) -> Self {
        match direction {
            CornerDirection::North => Direction::North,
            CornerDirection::South => Direction::South,
        }
    }
}

/// Which of the three owned edges of a hex cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeDirection {
    /// Upper-left side, from the north-west corner to the top corner
    North,
    /// Left side
    West,
    /// Lower-left side, from the south-west corner to the bottom corner
    South,
}

impl EdgeDirection {
    pub const ALL: [EdgeDirection; 3] = [EdgeDirection::North, EdgeDirection::West, EdgeDirection::South];

    const fn index(self) -> usize {
        match self {
            EdgeDirection::North => 0,
            EdgeDirection::West => 1,
            EdgeDirection::South => 2,
        }
    }
}

impl TryFrom<Direction> for EdgeDirection {
    type Error = GeometryError;

    fn try_from(direction: Direction) -> Result<Self, Self::Error> {
        Ok(match direction {
            Direction::North => EdgeDirection::North,
            Direction::West => EdgeDirection::West,
            Direction::South => EdgeDirection::South,
        })
    }
}

impl From<EdgeDirection> for Direction {
    fn from(direction: EdgeDirection) -> Self {
        match direction {
            EdgeDirection::North => Direction::North,
            EdgeDirection::West => Direction::West,
            EdgeDirection::South => Direction::South,
        }
    }
}

// ==================== Offset tables ====================

use CornerDirection as C;
use EdgeDirection as E;

/// Hex neighbours: NW, NE, E, SE, SW, W
const HEX_NEIGHBORS: [(i32, i32); 6] = [(0, -1), (1, -1), (1, 0), (0, 1), (-1, 1), (-1, 0)];

/// The six corners of a hex, clockwise from the top point
const HEX_CORNERS: [(i32, i32, CornerDirection); 6] = [
    (0, 0, C::North),
    (1, -1, C::South),
    (0, 1, C::North),
    (0, 0, C::South),
    (-1, 1, C::North),
    (0, -1, C::South),
];

/// The six sides of a hex, clockwise from the upper-right side
const HEX_EDGES: [(i32, i32, EdgeDirection); 6] = [
    (1, -1, E::South),
    (1, 0, E::West),
    (0, 1, E::North),
    (0, 0, E::South),
    (0, 0, E::West),
    (0, 0, E::North),
];

/// Corners one edge away, indexed by [`CornerDirection`]
const CORNER_NEIGHBORS: [[(i32, i32, CornerDirection); 3]; 2] = [
    // North: above, lower-right, lower-left
    [(1, -2, C::South), (1, -1, C::South), (0, -1, C::South)],
    // South: upper-left, upper-right, below
    [(-1, 1, C::North), (0, 1, C::North), (-1, 2, C::North)],
];

/// Edges meeting at a corner, same order as `CORNER_NEIGHBORS`
const CORNER_EDGES: [[(i32, i32, EdgeDirection); 3]; 2] = [
    [(1, -1, E::West), (1, -1, E::South), (0, 0, E::North)],
    [(0, 0, E::South), (0, 1, E::North), (0, 1, E::West)],
];

/// Hexes touching a corner
const CORNER_HEXES: [[(i32, i32); 3]; 2] = [[(0, -1), (1, -1), (0, 0)], [(0, 0), (0, 1), (-1, 1)]];

/// Endpoints of an edge, indexed by [`EdgeDirection`]
const EDGE_ENDPOINTS: [[(i32, i32, CornerDirection); 2]; 3] = [
    [(0, -1, C::South), (0, 0, C::North)],
    [(0, -1, C::South), (-1, 1, C::North)],
    [(-1, 1, C::North), (0, 0, C::South)],
];

/// Edges sharing an endpoint with an edge
const EDGE_NEIGHBORS: [[(i32, i32, EdgeDirection); 4]; 3] = [
    [(1, -1, E::West), (1, -1, E::South), (0, 0, E::West), (0, -1, E::South)],
    [(0, -1, E::South), (0, 0, E::North), (0, 0, E::South), (-1, 1, E::North)],
    [(0, 0, E::West), (0, 1, E::North), (0, 1, E::West), (-1, 1, E::North)],
];

/// The two hexes separated by an edge
const EDGE_HEXES: [[(i32, i32); 2]; 3] = [[(0, 0), (0, -1)], [(0, 0), (-1, 0)], [(0, 0), (-1, 1)]];

// ==================== Typed coordinates ====================

/// Axial coordinate for hex grid.
///
/// In axial coordinates:
/// - `q` increases going east (right)
/// - `r` increases going southeast
/// - The third coordinate `s` (not stored) satisfies: q + r + s = 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct HexCoord {
    /// Column (increases going east)
    pub q: i32,
    /// Row (increases going southeast)
    pub r: i32,
}

impl HexCoord {
    /// Create a new hex coordinate
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// The implicit third coordinate (s = -q - r)
    pub const fn s(&self) -> i32 {
        -self.q - self.r
    }

    const fn offset(&self, dq: i32, dr: i32) -> HexCoord {
        HexCoord::new(self.q + dq, self.r + dr)
    }

    /// The six neighbouring hexes, clockwise from north-west
    pub fn neighbors(&self) -> [HexCoord; 6] {
        HEX_NEIGHBORS.map(|(dq, dr)| self.offset(dq, dr))
    }

    /// The six corners of this hex, clockwise from the top
    pub fn corners(&self) -> [CornerCoord; 6] {
        HEX_CORNERS.map(|(dq, dr, dir)| CornerCoord::new(self.offset(dq, dr), dir))
    }

    /// The six sides of this hex, clockwise from the upper-right side
    pub fn edges(&self) -> [EdgeCoord; 6] {
        HEX_EDGES.map(|(dq, dr, dir)| EdgeCoord::new(self.offset(dq, dr), dir))
    }

    /// Distance to another hex (in hex steps)
    pub fn distance_to(&self, other: &HexCoord) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = (self.s() - other.s()).abs();
        ((dq + dr + ds) / 2) as u32
    }

    /// Convert to pixel coordinates (center of hex), pointy-top
    pub fn to_pixel(&self, hex_size: f64) -> (f64, f64) {
        let x = hex_size * (3.0_f64.sqrt() * self.q as f64 + 3.0_f64.sqrt() / 2.0 * self.r as f64);
        let y = hex_size * (3.0 / 2.0 * self.r as f64);
        (x, y)
    }
}

/// A corner where up to three hexes meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CornerCoord {
    /// The hex cell owning this corner
    pub hex: HexCoord,
    /// Top or bottom point of that hex
    pub direction: CornerDirection,
}

impl CornerCoord {
    pub const fn new(hex: HexCoord, direction: CornerDirection) -> Self {
        Self { hex, direction }
    }

    /// Corners one edge away (for the distance rule)
    pub fn adjacent_corners(&self) -> [CornerCoord; 3] {
        CORNER_NEIGHBORS[self.direction.index()]
            .map(|(dq, dr, dir)| CornerCoord::new(self.hex.offset(dq, dr), dir))
    }

    /// Edges that end at this corner
    pub fn touching_edges(&self) -> [EdgeCoord; 3] {
        CORNER_EDGES[self.direction.index()].map(|(dq, dr, dir)| EdgeCoord::new(self.hex.offset(dq, dr), dir))
    }

    /// Hexes that meet at this corner
    pub fn touching_hexes(&self) -> [HexCoord; 3] {
        CORNER_HEXES[self.direction.index()].map(|(dq, dr)| self.hex.offset(dq, dr))
    }

    /// Convert to pixel coordinates
    pub fn to_pixel(&self, hex_size: f64) -> (f64, f64) {
        let (hx, hy) = self.hex.to_pixel(hex_size);
        match self.direction {
            CornerDirection::North => (hx, hy - hex_size),
            CornerDirection::South => (hx, hy + hex_size),
        }
    }
}

/// A side shared by two hexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeCoord {
    /// The hex cell owning this edge
    pub hex: HexCoord,
    /// Which owned side of that hex
    pub direction: EdgeDirection,
}

impl EdgeCoord {
    pub const fn new(hex: HexCoord, direction: EdgeDirection) -> Self {
        Self { hex, direction }
    }

    /// The two corners at the ends of this edge
    pub fn endpoints(&self) -> [CornerCoord; 2] {
        EDGE_ENDPOINTS[self.direction.index()].map(|(dq, dr, dir)| CornerCoord::new(self.hex.offset(dq, dr), dir))
    }

    /// Edges sharing an endpoint with this one (for road connectivity)
    pub fn adjacent_edges(&self) -> [EdgeCoord; 4] {
        EDGE_NEIGHBORS[self.direction.index()].map(|(dq, dr, dir)| EdgeCoord::new(self.hex.offset(dq, dr), dir))
    }

    /// The two hexes this edge separates
    pub fn touching_hexes(&self) -> [HexCoord; 2] {
        EDGE_HEXES[self.direction.index()].map(|(dq, dr)| self.hex.offset(dq, dr))
    }

    /// Convert to pixel coordinates (midpoint of edge)
    pub fn to_pixel(&self, hex_size: f64) -> (f64, f64) {
        let [a, b] = self.endpoints();
        let (x1, y1) = a.to_pixel(hex_size);
        let (x2, y2) = b.to_pixel(hex_size);
        ((x1 + x2) / 2.0, (y1 + y2) / 2.0)
    }
}

// ==================== General coordinate ====================

/// Orientation and node kind of a [`Coord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubPosition {
    pub direction: Direction,
    pub kind: NodeKind,
}

/// The general coordinate carried by actions and facts: an axial pair plus an
/// optional sub-position. A hex has no sub-position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub q: i32,
    pub r: i32,
    pub sub: Option<SubPosition>,
}

impl Coord {
    /// Build a coordinate, rejecting directions that do not exist for the
    /// given node kind.
    pub fn new(q: i32, r: i32, sub: Option<(Direction, NodeKind)>) -> Result<Self, GeometryError> {
        let coord = Self {
            q,
            r,
            sub: sub.map(|(direction, kind)| SubPosition { direction, kind }),
        };
        coord.validate()?;
        Ok(coord)
    }

    pub const fn hex(q: i32, r: i32) -> Self {
        Self { q, r, sub: None }
    }

    fn validate(&self) -> Result<(), GeometryError> {
        match self.sub {
            None => Ok(()),
            Some(SubPosition { kind: NodeKind::Hex, .. }) => Err(GeometryError::InvalidArgument(
                "a hex coordinate carries no direction".to_string(),
            )),
            Some(SubPosition { kind: NodeKind::Corner, direction }) => CornerDirection::try_from(direction).map(|_| ()),
            Some(SubPosition { kind: NodeKind::Edge, direction }) => EdgeDirection::try_from(direction).map(|_| ()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.sub.map_or(NodeKind::Hex, |sub| sub.kind)
    }

    pub fn as_hex(&self) -> Result<HexCoord, GeometryError> {
        match self.sub {
            None => Ok(HexCoord::new(self.q, self.r)),
            Some(sub) => Err(GeometryError::InvalidArgument(format!(
                "expected a hex coordinate, got {:?}",
                sub.kind
            ))),
        }
    }

    pub fn as_corner(&self) -> Result<CornerCoord, GeometryError> {
        match self.sub {
            Some(SubPosition { kind: NodeKind::Corner, direction }) => {
                Ok(CornerCoord::new(HexCoord::new(self.q, self.r), direction.try_into()?))
            }
            _ => Err(GeometryError::InvalidArgument(format!(
                "expected a corner coordinate, got {:?}",
                self.kind()
            ))),
        }
    }

    pub fn as_edge(&self) -> Result<EdgeCoord, GeometryError> {
        match self.sub {
            Some(SubPosition { kind: NodeKind::Edge, direction }) => {
                Ok(EdgeCoord::new(HexCoord::new(self.q, self.r), direction.try_into()?))
            }
            _ => Err(GeometryError::InvalidArgument(format!(
                "expected an edge coordinate, got {:?}",
                self.kind()
            ))),
        }
    }
}

impl From<HexCoord> for Coord {
    fn from(hex: HexCoord) -> Self {
        Coord::hex(hex.q, hex.r)
    }
}

impl From<CornerCoord> for Coord {
    fn from(corner: CornerCoord) -> Self {
        Self {
            q: corner.hex.q,
            r: corner.hex.r,
            sub: Some(SubPosition {
                direction: corner.direction.into(),
                kind: NodeKind::Corner,
            }),
        }
    }
}

impl From<EdgeCoord> for Coord {
    fn from(edge: EdgeCoord) -> Self {
        Self {
            q: edge.hex.q,
            r: edge.hex.r,
            sub: Some(SubPosition {
                direction: edge.direction.into(),
                kind: NodeKind::Edge,
            }),
        }
    }
}

/// Everything geometrically adjacent to a coordinate. Lists that do not apply
/// to the node kind are empty (a hex has no endpoint corners, for example).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjacency {
    pub corners: Vec<Coord>,
    pub edges: Vec<Coord>,
    pub hexes: Vec<Coord>,
}

/// Resolve the adjacency of any coordinate.
///
/// - corner: 3 neighbouring corners, 3 connected edges, 3 touching hexes
/// - edge: 2 endpoint corners, 4 neighbouring edges, 2 touching hexes
/// - hex: 6 corners, 6 edges, 6 neighbouring hexes
pub fn adjacency(coord: &Coord) -> Result<Adjacency, GeometryError> {
    coord.validate()?;
    Ok(match coord.kind() {
        NodeKind::Hex => {
            let hex = coord.as_hex()?;
            Adjacency {
                corners: hex.corners().into_iter().map(Coord::from).collect(),
                edges: hex.edges().into_iter().map(Coord::from).collect(),
                hexes: hex.neighbors().into_iter().map(Coord::from).collect(),
            }
        }
        NodeKind::Corner => {
            let corner = coord.as_corner()?;
            Adjacency {
                corners: corner.adjacent_corners().into_iter().map(Coord::from).collect(),
                edges: corner.touching_edges().into_iter().map(Coord::from).collect(),
                hexes: corner.touching_hexes().into_iter().map(Coord::from).collect(),
            }
        }
        NodeKind::Edge => {
            let edge = coord.as_edge()?;
            Adjacency {
                corners: edge.endpoints().into_iter().map(Coord::from).collect(),
                edges: edge.adjacent_edges().into_iter().map(Coord::from).collect(),
                hexes: edge.touching_hexes().into_iter().map(Coord::from).collect(),
            }
        }
    })
}
