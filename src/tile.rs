//! The seam between the engine and the hexagonal index library.
//!
//! Everything the engine needs from the index is exposed here: ring-1
//! adjacency, cell centroids, polygon fill, parent aggregation, and the
//! deterministic enumeration of a whole resolution. The rest of the crate
//! never touches `h3o` types directly.

use std::fmt;
use std::str::FromStr;

use h3o::geom::{PolyfillConfig, ToCells};
use h3o::{CellIndex, LatLng, Resolution};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EngineError, Result};
use crate::spatial::Coord;

/// Total cell counts per resolution, used for capacity hints when walking a
/// whole resolution.
const RESOLUTION_SIZES: [u64; 16] = [
    122,
    842,
    5_882,
    41_162,
    288_122,
    2_016_842,
    14_117_882,
    98_825_162,
    691_776_122,
    4_842_432_842,
    33_897_029_882,
    237_279_209_162,
    1_660_954_464_122,
    11_626_681_248_842,
    81_386_768_741_882,
    569_707_381_193_162,
];

/// Parse and validate a resolution supplied on the command line.
pub fn resolution(value: u8) -> Result<Resolution> {
    Resolution::try_from(value).map_err(|_| EngineError::InvalidResolution(value))
}

/// Number of cells at a resolution.
pub fn cell_count(resolution: Resolution) -> u64 {
    RESOLUTION_SIZES[u8::from(resolution) as usize]
}

/// A cell of the global hexagonal index at a fixed resolution.
///
/// Ordered by the underlying 64-bit index; for cells of a single resolution
/// this coincides with the lexicographic order of the canonical string form,
/// so sorted iteration over tile-keyed `BTreeMap`s is the lexicographic
/// tiebreak the engine documents. Serialized as the canonical string in
/// every JSON artifact.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tile(CellIndex);

impl Tile {
    /// Cell containing a coordinate at the given resolution.
    pub fn from_coord(coord: &Coord, resolution: Resolution) -> Result<Self> {
        let location = LatLng::new(coord.lat, coord.lon)
            .map_err(|err| EngineError::InvalidCoordinate(err.to_string()))?;
        Ok(Self(location.to_cell(resolution)))
    }

    pub fn resolution(&self) -> Resolution {
        self.0.resolution()
    }

    /// Centroid of the cell in degrees.
    pub fn centroid(&self) -> Coord {
        let location = LatLng::from(self.0);
        Coord::new(location.lat(), location.lng())
    }

    /// All cells within graph distance `k`, including this one.
    pub fn ring(&self, k: u32) -> Vec<Tile> {
        self.0.grid_disk::<Vec<_>>(k).into_iter().map(Tile).collect()
    }

    /// The 6 (or 5, at pentagons) adjacent cells.
    pub fn neighbors(&self) -> Vec<Tile> {
        self.ring(1).into_iter().filter(|t| t != self).collect()
    }

    /// Containing cell at a coarser resolution.
    pub fn parent(&self, resolution: Resolution) -> Option<Tile> {
        self.0.parent(resolution).map(Tile)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Tile {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        CellIndex::from_str(s)
            .map(Tile)
            .map_err(|_| EngineError::InvalidTile(s.to_string()))
    }
}

impl Serialize for Tile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Fill a polygon with the cells whose centroid it contains.
pub fn polyfill(polygon: &geo::Polygon<f64>, resolution: Resolution) -> Result<Vec<Tile>> {
    let shape = h3o::geom::Polygon::from_degrees(polygon.clone())
        .map_err(|err| EngineError::UnsupportedGeometry(err.to_string()))?;
    Ok(shape
        .to_cells(PolyfillConfig::new(resolution))
        .map(Tile)
        .collect())
}

/// Tiles of the set that touch at least one tile outside the set.
pub fn border_tiles(tiles: &[Tile]) -> Vec<Tile> {
    let members: FxHashSet<Tile> = tiles.iter().copied().collect();
    tiles
        .iter()
        .copied()
        .filter(|tile| tile.neighbors().iter().any(|n| !members.contains(n)))
        .collect()
}

/// Arithmetic mean of the member tiles' centroids.
pub fn mean_centroid(tiles: &[Tile]) -> Coord {
    let mut lat = 0.0;
    let mut lon = 0.0;
    for tile in tiles {
        let centroid = tile.centroid();
        lat += centroid.lat;
        lon += centroid.lon;
    }
    let count = tiles.len() as f64;
    Coord::new(lat / count, lon / count)
}

/// Every cell of a resolution, discovered by flooding outward from the cell
/// containing (0°, 0°). The walk order is fully determined by the index
/// library's disk ordering, so two runs enumerate identically.
pub fn enumerate(resolution: Resolution) -> Vec<Tile> {
    let size = cell_count(resolution) as usize;
    let start = Tile(
        LatLng::new(0.0, 0.0)
            .expect("origin is a valid coordinate")
            .to_cell(resolution),
    );

    let mut seen = FxHashSet::with_capacity_and_hasher(size, Default::default());
    seen.insert(start);
    let mut stack = vec![start];
    let mut tiles = Vec::with_capacity(size);

    while let Some(tile) = stack.pop() {
        tiles.push(tile);
        for neighbor in tile.neighbors() {
            if seen.insert(neighbor) {
                stack.push(neighbor);
            }
        }
    }
    tiles
}
