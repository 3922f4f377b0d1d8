//! Regions, levels, and the maps that tie tiles to countries.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::spatial::{Coord, CountryPolygon};
use crate::tile::Tile;

/// Population per base-resolution tile.
pub type PopMap = BTreeMap<Tile, f64>;

/// A partition of a tile universe into regions, keyed by region id.
pub type Level = BTreeMap<Tile, Region>;

/// Tile to owning region id, materialized for O(1) lookups.
pub type Parents = BTreeMap<Tile, Tile>;

pub type CountryPolygons = BTreeMap<String, Vec<CountryPolygon>>;
pub type CountryToTiles = BTreeMap<String, Vec<Tile>>;
pub type TileToCountry = BTreeMap<Tile, String>;

/// A maximal contiguous collection of tiles at one level, carrying its
/// aggregated population and same-level adjacency.
///
/// Regions are value objects: merges copy tiles and fold neighbor sets, and
/// regions reference each other by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Canonical id: the seed tile at level 0, the seed region's id above.
    pub index: Tile,
    /// True population sum over member tiles.
    pub population: f64,
    /// Member tiles in absorption order.
    pub tiles: Vec<Tile>,
    /// Ids of adjacent regions at the same level. Symmetric by invariant.
    #[serde(with = "neighbor_set")]
    pub neighbors: BTreeSet<Tile>,
    /// Arithmetic mean of member tile centroids.
    pub centroid: Coord,
}

impl Region {
    /// A one-tile region, as built at level 0.
    pub fn singleton(tile: Tile, population: f64, neighbors: BTreeSet<Tile>) -> Self {
        Self {
            index: tile,
            population,
            tiles: vec![tile],
            neighbors,
            centroid: tile.centroid(),
        }
    }

    /// An empty region about to be grown from a seed.
    pub(crate) fn seeded(index: Tile) -> Self {
        Self {
            index,
            population: 0.0,
            tiles: Vec::new(),
            neighbors: BTreeSet::new(),
            centroid: Coord::default(),
        }
    }
}

/// Number of tiles across all regions of a level.
pub fn total_tiles(level: &Level) -> usize {
    level.values().map(|region| region.tiles.len()).sum()
}

/// Population across all regions of a level.
pub fn total_population(level: &Level) -> f64 {
    level.values().map(|region| region.population).sum()
}

/// Neighbor sets persist as `{"<region id>": true, …}` objects so the JSON
/// artifacts stay wire-compatible with existing consumers.
mod neighbor_set {
    use std::collections::{BTreeMap, BTreeSet};

    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::tile::Tile;

    pub fn serialize<S: Serializer>(
        set: &BTreeSet<Tile>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(set.len()))?;
        for tile in set {
            map.serialize_entry(tile, &true)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeSet<Tile>, D::Error> {
        let entries = BTreeMap::<Tile, bool>::deserialize(deserializer)?;
        Ok(entries.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_pair() -> (Tile, Tile) {
        let a: Tile = "85283473fffffff".parse().unwrap();
        let b = a.neighbors()[0];
        (a, b)
    }

    #[test]
    fn region_serializes_neighbors_as_object() {
        let (a, b) = tile_pair();
        let region = Region::singleton(a, 12.5, BTreeSet::from([b]));

        let json = serde_json::to_value(&region).unwrap();
        assert_eq!(json["index"], a.to_string());
        assert_eq!(json["population"], 12.5);
        assert_eq!(json["neighbors"][b.to_string().as_str()], true);
        assert!(json["centroid"]["lat"].is_number());

        let back: Region = serde_json::from_value(json).unwrap();
        assert_eq!(back, region);
    }

    #[test]
    fn level_totals_sum_over_regions() {
        let (a, b) = tile_pair();
        let mut level = Level::new();
        level.insert(a, Region::singleton(a, 3.0, BTreeSet::from([b])));
        level.insert(b, Region::singleton(b, 4.0, BTreeSet::from([a])));

        assert_eq!(total_tiles(&level), 2);
        assert_eq!(total_population(&level), 7.0);
    }
}
