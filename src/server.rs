//! HTTP query API over a loaded data directory.
//!
//! All handlers capture read-only references to the loaded level data for
//! the lifetime of the server; there is no mutable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::Result;
use crate::region::{CountryToTiles, Level, Parents, TileToCountry};
use crate::tile::Tile;

/// Everything the query endpoints need, loaded once at startup.
pub struct ServerState {
    pub levels: Vec<Level>,
    pub parents: Vec<Parents>,
    pub tile_to_country: TileToCountry,
    pub country_to_tiles: CountryToTiles,
}

/// Serve the query API on the given port until ctrl-c.
pub async fn run(state: ServerState, port: u16) -> Result<()> {
    let router = Router::new()
        .route("/", get(health))
        .route("/regions", post(regions))
        .route("/ring", post(ring))
        .route("/country", post(country))
        .with_state(Arc::new(state));

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("serving region queries on port {}", port);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

async fn health() -> &'static str {
    "Healthy"
}

#[derive(Debug, Deserialize)]
struct RegionsRequest {
    tiles: Vec<Tile>,
    levels: Vec<usize>,
}

/// For each requested level, resolve each tile to its region and return the
/// region's full tile list.
async fn regions(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RegionsRequest>,
) -> std::result::Result<Json<BTreeMap<usize, BTreeMap<Tile, Vec<Tile>>>>, StatusCode> {
    resolve_regions(&state, &request.tiles, &request.levels)
        .map(Json)
        .ok_or(StatusCode::BAD_REQUEST)
}

fn resolve_regions(
    state: &ServerState,
    tiles: &[Tile],
    levels: &[usize],
) -> Option<BTreeMap<usize, BTreeMap<Tile, Vec<Tile>>>> {
    let mut response = BTreeMap::new();
    for &index in levels {
        let level = state.levels.get(index)?;
        let parents = state.parents.get(index)?;
        let mut resolved = BTreeMap::new();
        for tile in tiles {
            // Tiles outside the generated universe are skipped rather than
            // failing the whole request.
            let Some(parent) = parents.get(tile) else {
                continue;
            };
            if let Some(region) = level.get(parent) {
                resolved.insert(*parent, region.tiles.clone());
            }
        }
        response.insert(index, resolved);
    }
    Some(response)
}

#[derive(Debug, Deserialize)]
struct RingRequest {
    tile: Tile,
    #[serde(default)]
    level: usize,
    #[serde(default)]
    radius: usize,
}

/// Breadth-first search over the region adjacency graph, `radius` hops out
/// from the region owning the given tile.
async fn ring(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RingRequest>,
) -> std::result::Result<Json<BTreeMap<Tile, Vec<Tile>>>, StatusCode> {
    ring_query(&state, request.tile, request.level, request.radius)
        .map(Json)
        .ok_or(StatusCode::BAD_REQUEST)
}

fn ring_query(
    state: &ServerState,
    tile: Tile,
    level_index: usize,
    radius: usize,
) -> Option<BTreeMap<Tile, Vec<Tile>>> {
    let level = state.levels.get(level_index)?;
    let parents = state.parents.get(level_index)?;
    let center = *parents.get(&tile)?;

    let mut discovered = BTreeMap::new();
    let mut frontier = vec![center];
    let mut seen = std::collections::BTreeSet::from([center]);
    for _ in 0..=radius {
        let mut next = Vec::new();
        for id in frontier {
            let region = level.get(&id)?;
            discovered.insert(id, region.tiles.clone());
            for &neighbor in &region.neighbors {
                if seen.insert(neighbor) {
                    next.push(neighbor);
                }
            }
        }
        frontier = next;
    }
    Some(discovered)
}

#[derive(Debug, Deserialize)]
struct CountryRequest {
    tile: Tile,
}

/// Full tile set of the country owning the given tile; empty for tiles
/// belonging to no country.
async fn country(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CountryRequest>,
) -> Json<Vec<Tile>> {
    let tiles = state
        .tile_to_country
        .get(&request.tile)
        .and_then(|name| state.country_to_tiles.get(name))
        .cloned()
        .unwrap_or_default();
    Json(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use crate::spatial::Coord;
    use h3o::Resolution;
    use std::collections::BTreeSet;

    /// A level of three singleton regions chained a-b-c, parents mapping
    /// each tile to itself.
    fn chain_state() -> (ServerState, Vec<Tile>) {
        let center = Tile::from_coord(&Coord::new(40.7, -74.0), Resolution::Five).unwrap();
        let ring = center.neighbors();
        let a = ring[0];
        let c = ring
            .iter()
            .copied()
            .find(|t| !a.ring(1).contains(t))
            .unwrap();

        let mut level = Level::new();
        level.insert(a, Region::singleton(a, 1.0, BTreeSet::from([center])));
        level.insert(
            center,
            Region::singleton(center, 1.0, BTreeSet::from([a, c])),
        );
        level.insert(c, Region::singleton(c, 1.0, BTreeSet::from([center])));
        let parents: Parents = [a, center, c].into_iter().map(|t| (t, t)).collect();

        let mut tile_to_country = TileToCountry::new();
        let mut country_to_tiles = CountryToTiles::new();
        for &t in &[a, center, c] {
            tile_to_country.insert(t, "chain".to_string());
        }
        country_to_tiles.insert("chain".to_string(), vec![a, center, c]);

        let state = ServerState {
            levels: vec![level],
            parents: vec![parents],
            tile_to_country,
            country_to_tiles,
        };
        (state, vec![a, center, c])
    }

    #[test]
    fn regions_resolves_tiles_per_level() {
        let (state, tiles) = chain_state();
        let response = resolve_regions(&state, &tiles[..2], &[0]).unwrap();
        assert_eq!(response[&0].len(), 2);
        assert_eq!(response[&0][&tiles[0]], vec![tiles[0]]);
    }

    #[test]
    fn regions_skips_unknown_tiles_but_rejects_unknown_levels() {
        let (state, tiles) = chain_state();
        let stranger = Tile::from_coord(&Coord::new(0.0, 0.0), Resolution::Five).unwrap();

        let response = resolve_regions(&state, &[stranger], &[0]).unwrap();
        assert!(response[&0].is_empty());

        assert!(resolve_regions(&state, &tiles, &[3]).is_none());
    }

    #[test]
    fn ring_expands_hop_by_hop() {
        let (state, tiles) = chain_state();
        let (a, center, c) = (tiles[0], tiles[1], tiles[2]);

        let zero = ring_query(&state, a, 0, 0).unwrap();
        assert_eq!(zero.keys().copied().collect::<Vec<_>>(), vec![a]);

        let one = ring_query(&state, a, 0, 1).unwrap();
        assert!(one.contains_key(&a) && one.contains_key(&center));
        assert!(!one.contains_key(&c));

        let two = ring_query(&state, a, 0, 2).unwrap();
        assert_eq!(two.len(), 3);
    }

    #[test]
    fn country_lookup_returns_full_tile_set() {
        let (state, tiles) = chain_state();
        let owned = state
            .tile_to_country
            .get(&tiles[0])
            .and_then(|name| state.country_to_tiles.get(name))
            .unwrap();
        assert_eq!(owned, &tiles);
    }
}
