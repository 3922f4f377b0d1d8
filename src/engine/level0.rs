//! Level 0: the trivial partition where every tile is its own region.

use crate::error::{EngineError, Result};
use crate::region::{Level, PopMap, Region};
use crate::tile::Tile;
use rustc_hash::FxHashSet;

/// Wrap each tile of a country as a singleton region carrying its population
/// and its in-country ring-1 adjacency, then repair isolated tiles.
///
/// Fails with [`EngineError::MissingPopulation`] if the population map has no
/// entry for a tile.
pub fn build(pop_map: &PopMap, tiles: &[Tile]) -> Result<Level> {
    let members: FxHashSet<Tile> = tiles.iter().copied().collect();
    let mut level = Level::new();

    for &tile in tiles {
        let population = *pop_map
            .get(&tile)
            .ok_or_else(|| EngineError::MissingPopulation(tile.to_string()))?;
        let neighbors = tile
            .neighbors()
            .into_iter()
            .filter(|neighbor| members.contains(neighbor))
            .collect();
        level.insert(tile, Region::singleton(tile, population, neighbors));
    }

    super::repair_isolated(&mut level);
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Coord;
    use crate::tile;
    use h3o::Resolution;

    fn disk(lat: f64, lon: f64, k: u32) -> Vec<Tile> {
        Tile::from_coord(&Coord::new(lat, lon), Resolution::Five)
            .unwrap()
            .ring(k)
    }

    fn uniform_pop(tiles: &[Tile], population: f64) -> PopMap {
        tiles.iter().map(|&t| (t, population)).collect()
    }

    #[test]
    fn singleton_country_has_no_neighbors() {
        let tiles = vec![Tile::from_coord(&Coord::new(40.7, -74.0), Resolution::Five).unwrap()];
        let pop_map = uniform_pop(&tiles, 10.0);

        let level = build(&pop_map, &tiles).unwrap();
        assert_eq!(level.len(), 1);
        let region = &level[&tiles[0]];
        assert_eq!(region.index, tiles[0]);
        assert_eq!(region.population, 10.0);
        assert_eq!(region.tiles, tiles);
        assert!(region.neighbors.is_empty());
    }

    #[test]
    fn neighbors_are_clipped_to_the_country() {
        let tiles = disk(40.7, -74.0, 1);
        let pop_map = uniform_pop(&tiles, 1.0);

        let level = build(&pop_map, &tiles).unwrap();
        assert_eq!(level.len(), 7);
        for (id, region) in &level {
            assert!(!region.neighbors.contains(id));
            for neighbor in &region.neighbors {
                assert!(level.contains_key(neighbor));
                assert!(level[neighbor].neighbors.contains(id));
            }
        }
        // The center of the disk touches all six others.
        let center = tile::border_tiles(&tiles)
            .iter()
            .fold(tiles.clone(), |acc, b| {
                acc.into_iter().filter(|t| t != b).collect()
            });
        assert_eq!(center.len(), 1);
        assert_eq!(level[&center[0]].neighbors.len(), 6);
    }

    #[test]
    fn missing_population_is_an_error() {
        let tiles = disk(40.7, -74.0, 1);
        let mut pop_map = uniform_pop(&tiles, 1.0);
        pop_map.remove(&tiles[3]);

        let err = build(&pop_map, &tiles).unwrap_err();
        assert!(matches!(err, EngineError::MissingPopulation(_)));
    }

    #[test]
    fn distant_tiles_are_linked_by_repair() {
        let nyc = Tile::from_coord(&Coord::new(40.7, -74.0), Resolution::Five).unwrap();
        let london = Tile::from_coord(&Coord::new(51.5, -0.1), Resolution::Five).unwrap();
        let tiles = vec![nyc, london];
        let pop_map = uniform_pop(&tiles, 1.0);

        let level = build(&pop_map, &tiles).unwrap();
        assert!(level[&nyc].neighbors.contains(&london));
        assert!(level[&london].neighbors.contains(&nyc));
    }
}
