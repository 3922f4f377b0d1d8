//! The level generator: a priority-driven agglomeration that grows regions
//! from the most populous unclaimed seeds outward, followed by shape
//! clean-up passes.
//!
//! Determinism: every container iterated here is ordered (`BTreeMap` /
//! `BTreeSet`), and heap ties break on region id, so two runs over identical
//! inputs produce identical output.

use crate::config::LevelOptions;
use crate::error::{EngineError, Result};
use crate::queue::WeightedQueue;
use crate::region::{Level, Parents, Region};
use crate::spatial::Coord;
use crate::tile::{self, Tile};

fn unresolved(id: Tile, context: &str) -> EngineError {
    EngineError::InvariantViolation(format!("region '{}' unresolved during {}", id, context))
}

/// Build the next level from a complete previous level for one country.
///
/// Returns the new level together with the parents table mapping every base
/// tile of the previous level to its new region id.
pub fn generate_level(prev_level: &Level, options: &LevelOptions) -> Result<(Level, Parents)> {
    let mut seeds = WeightedQueue::new();
    for (&id, region) in prev_level {
        seeds.push(region.population, id);
    }

    let mut level = Level::new();
    let mut parents = Parents::new();

    while let Some(seed) = seeds.pop() {
        // A region id is claimed exactly when its own tiles are, because a
        // region's id is always one of its member tiles.
        if parents.contains_key(&seed) {
            continue;
        }
        let region = flood(prev_level, options, seed, &mut level, &mut parents)?;
        level.insert(region.index, region);
    }

    if level.len() > 1 {
        dampen_islands(&mut level, &mut parents, options.island_dampening_passes)?;
    }
    if level.len() > 1 {
        merge_small_regions(&mut level, &mut parents, options.small_region_merge_limit)?;
    }
    super::repair_isolated(&mut level);

    Ok((level, parents))
}

/// Grow one region outward from `seed` under the population and size caps.
///
/// The local heap favors close-in, low-population candidates through the
/// weight `max(pop, 1) * dist^exponent`; the seed itself always enters.
/// Adjacency against previously completed regions is recorded symmetrically
/// as the frontier touches them.
fn flood(
    prev_level: &Level,
    options: &LevelOptions,
    seed: Tile,
    level: &mut Level,
    parents: &mut Parents,
) -> Result<Region> {
    let mut region = Region::seeded(seed);
    let mut lat_sum = 0.0;
    let mut lon_sum = 0.0;

    let mut frontier = WeightedQueue::new();
    let seed_population = prev_level
        .get(&seed)
        .ok_or_else(|| unresolved(seed, "seeding"))?
        .population;
    frontier.push(seed_population, seed);

    while let Some(id) = frontier.pop() {
        if parents.contains_key(&id) {
            continue;
        }
        let candidate = prev_level
            .get(&id)
            .ok_or_else(|| unresolved(id, "flood growth"))?;

        // Constraints only bind once the region is non-empty; the seed's
        // own absorption is exempt.
        if !region.tiles.is_empty() {
            if candidate.population + region.population > options.max_population {
                continue;
            }
            if candidate.tiles.len() + region.tiles.len() > options.max_region_size {
                continue;
            }
        }

        for &member in &candidate.tiles {
            parents.insert(member, region.index);
            let centroid = member.centroid();
            lat_sum += centroid.lat;
            lon_sum += centroid.lon;
        }
        region.tiles.extend_from_slice(&candidate.tiles);
        let count = region.tiles.len() as f64;
        region.centroid = Coord::new(lat_sum / count, lon_sum / count);
        region.population += candidate.population;

        for &neighbor in &candidate.neighbors {
            match parents.get(&neighbor) {
                None => {
                    let next = prev_level
                        .get(&neighbor)
                        .ok_or_else(|| unresolved(neighbor, "frontier expansion"))?;
                    if next.tiles.len() + region.tiles.len() > options.max_region_size {
                        continue;
                    }
                    if next.population + region.population > options.max_population {
                        continue;
                    }
                    let distance = region.centroid.planar_distance(&next.centroid);
                    let weight =
                        next.population.max(1.0) * distance.powf(options.distance_exponent);
                    frontier.push(weight, neighbor);
                }
                Some(&parent) if parent != region.index => {
                    region.neighbors.insert(parent);
                    level
                        .get_mut(&parent)
                        .ok_or_else(|| unresolved(parent, "adjacency recording"))?
                        .neighbors
                        .insert(region.index);
                }
                Some(_) => {}
            }
        }
    }

    Ok(region)
}

/// Merge `mergee` into `into`: union populations, tiles, and neighbor sets,
/// retarget parents and third-party adjacency, retire the mergee's id, and
/// recompute the surviving centroid as the true mean of its tiles.
fn merge_regions(level: &mut Level, parents: &mut Parents, into: Tile, mergee: Tile) -> Result<()> {
    let absorbed = level
        .remove(&mergee)
        .ok_or_else(|| unresolved(mergee, "merge"))?;

    for &neighbor in &absorbed.neighbors {
        if neighbor == into {
            continue;
        }
        let third_party = level
            .get_mut(&neighbor)
            .ok_or_else(|| unresolved(neighbor, "merge retargeting"))?;
        third_party.neighbors.remove(&mergee);
        third_party.neighbors.insert(into);
    }

    let target = level
        .get_mut(&into)
        .ok_or_else(|| unresolved(into, "merge"))?;
    target.population += absorbed.population;
    for &member in &absorbed.tiles {
        parents.insert(member, into);
    }
    target.tiles.extend_from_slice(&absorbed.tiles);
    for &neighbor in &absorbed.neighbors {
        target.neighbors.insert(neighbor);
    }
    target.neighbors.remove(&mergee);
    target.neighbors.remove(&into);
    target.centroid = tile::mean_centroid(&target.tiles);

    Ok(())
}

/// Absorb every region with exactly one neighbor into that neighbor,
/// repeated for the configured number of passes.
fn dampen_islands(level: &mut Level, parents: &mut Parents, passes: usize) -> Result<()> {
    for _ in 0..passes {
        let ids: Vec<Tile> = level.keys().copied().collect();
        for id in ids {
            let Some(region) = level.get(&id) else {
                continue;
            };
            if region.neighbors.len() != 1 {
                continue;
            }
            if let Some(&into) = region.neighbors.iter().next() {
                merge_regions(level, parents, into, id)?;
            }
        }
    }
    Ok(())
}

/// Merge every region with at most `limit` tiles into its smallest
/// neighbor; ties go to the lowest region id.
fn merge_small_regions(level: &mut Level, parents: &mut Parents, limit: usize) -> Result<()> {
    let ids: Vec<Tile> = level.keys().copied().collect();
    for id in ids {
        let Some(region) = level.get(&id) else {
            continue;
        };
        if region.tiles.len() > limit || region.neighbors.is_empty() {
            continue;
        }
        let mut smallest: Option<(usize, Tile)> = None;
        for &neighbor in &region.neighbors {
            let size = level
                .get(&neighbor)
                .ok_or_else(|| unresolved(neighbor, "small-region scan"))?
                .tiles
                .len();
            if smallest.is_none_or(|(best, _)| size < best) {
                smallest = Some((size, neighbor));
            }
        }
        if let Some((_, into)) = smallest {
            merge_regions(level, parents, into, id)?;
        }
    }
    Ok(())
}
