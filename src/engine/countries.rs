//! Assignment of hex tiles to countries from polygon outlines.

use h3o::Resolution;
use tracing::info;

use crate::error::Result;
use crate::region::{CountryPolygons, CountryToTiles, TileToCountry};
use crate::spatial::Coord;
use crate::tile::{self, Tile};

/// Assign every tile of the target resolution to at most one country.
///
/// Three passes, each iterating countries in sorted name order so that
/// claim conflicts resolve deterministically:
///
/// 1. polyfill each country polygon; the first country to claim a tile
///    keeps it;
/// 2. rescue zero-tile countries by sampling the cell under each polygon
///    vertex;
/// 3. extend each country from its boundary tiles into unclaimed territory
///    within ring-`coast_fill`.
///
/// A country can still end up with zero tiles if the rescue pass finds
/// nothing unclaimed; downstream treats it as already merged.
pub fn generate_country_maps(
    country_polygons: &CountryPolygons,
    resolution: Resolution,
    coast_fill: u32,
) -> Result<(TileToCountry, CountryToTiles)> {
    let mut tile_to_country = TileToCountry::new();
    let mut country_to_tiles = CountryToTiles::new();

    info!("assigning tiles to countries");
    for (country, polygons) in country_polygons {
        let mut tiles = Vec::new();
        for polygon in polygons {
            for tile in tile::polyfill(&polygon.to_polygon(), resolution)? {
                if tile_to_country.contains_key(&tile) {
                    continue;
                }
                tile_to_country.insert(tile, country.clone());
                tiles.push(tile);
            }
        }
        country_to_tiles.insert(country.clone(), tiles);
    }

    info!("rescuing zero-tile countries");
    for (country, polygons) in country_polygons {
        let claimed = country_to_tiles
            .get(country)
            .is_some_and(|tiles| !tiles.is_empty());
        if claimed {
            continue;
        }
        for polygon in polygons {
            for vertex in &polygon.geofence {
                let tile = Tile::from_coord(vertex, resolution)?;
                if tile_to_country.contains_key(&tile) {
                    continue;
                }
                tile_to_country.insert(tile, country.clone());
                if let Some(tiles) = country_to_tiles.get_mut(country) {
                    tiles.push(tile);
                }
            }
        }
    }

    info!("assigning unclaimed tiles near coastlines");
    let countries: Vec<String> = country_to_tiles.keys().cloned().collect();
    for country in countries {
        let Some(snapshot) = country_to_tiles.get(&country).cloned() else {
            continue;
        };
        let mut gained = Vec::new();
        for boundary in tile::border_tiles(&snapshot) {
            for tile in boundary.ring(coast_fill) {
                if tile_to_country.contains_key(&tile) {
                    continue;
                }
                tile_to_country.insert(tile, country.clone());
                gained.push(tile);
            }
        }
        if let Some(tiles) = country_to_tiles.get_mut(&country) {
            tiles.extend(gained);
        }
    }

    Ok((tile_to_country, country_to_tiles))
}

/// Arithmetic mean of a country's tile centroids, compared later by
/// great-circle distance when stitching.
pub fn country_centroid(tiles: &[Tile]) -> Coord {
    tile::mean_centroid(tiles)
}
