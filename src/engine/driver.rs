//! The per-country pipeline: parallel level generation, singleton
//! stitching, and global level writing.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::info;

use crate::config::LevelOptions;
use crate::error::{EngineError, Result};
use crate::persistence;
use crate::region::{self, CountryToTiles, Level, Parents, PopMap};
use crate::spatial::Coord;
use crate::tile;

use super::{countries, generator, level0};

pub type CountryLevels = BTreeMap<String, Level>;
pub type CountryParents = BTreeMap<String, Parents>;

/// Run the full per-country pipeline and persist every level under
/// `out_dir` as `level<i>.json` / `parents<i>.json`.
///
/// `memsafe` runs the whole pipeline strictly serially and streams each
/// stitched level to disk as soon as it is complete, so only the current
/// and previous level are ever resident instead of the whole stack. Time
/// traded for peak memory; the written artifacts are byte-identical to the
/// concurrent mode.
pub fn generate_and_write_levels(
    pop_map: &PopMap,
    country_to_tiles: &CountryToTiles,
    out_dir: &Path,
    options: &[LevelOptions],
    memsafe: bool,
) -> Result<()> {
    if memsafe {
        return generate_and_write_serially(pop_map, country_to_tiles, out_dir, options);
    }
    let (country_levels, country_parents) = generate_levels(pop_map, country_to_tiles, options)?;
    write_levels(&country_levels, &country_parents, out_dir)
}

/// Build every configured level for every country, retaining the whole
/// stack in memory.
///
/// Countries are independent subproblems: each level runs them in parallel
/// on the rayon pool (bounded by CPU count), with a barrier between levels.
/// The first worker error aborts the whole batch. After each barrier the
/// single-threaded stitcher relocates countries that collapsed to one
/// region.
pub fn generate_levels(
    pop_map: &PopMap,
    country_to_tiles: &CountryToTiles,
    options: &[LevelOptions],
) -> Result<(Vec<CountryLevels>, Vec<CountryParents>)> {
    let centroids = country_centroids(country_to_tiles);

    info!("generating country level 0s");
    let zero_levels = build_zero_levels(pop_map, country_to_tiles, true)?;

    let mut country_levels: Vec<CountryLevels> = Vec::with_capacity(options.len());
    let mut country_parents: Vec<CountryParents> = Vec::with_capacity(options.len());

    for (i, level_options) in options.iter().enumerate() {
        info!("generating level {}", i);
        let prev: &CountryLevels = if i == 0 {
            &zero_levels
        } else {
            &country_levels[i - 1]
        };

        let (mut levels, mut parents) = generate_one_level(prev, level_options, i, true)?;
        stitch_singletons(&mut levels, &mut parents, &centroids)?;

        country_levels.push(levels);
        country_parents.push(parents);
    }

    Ok((country_levels, country_parents))
}

/// The memsafe pipeline: no worker pool anywhere, and each global level is
/// flattened, written, and dropped as soon as its stitch completes. The
/// loop stays level-major because a singleton can only relocate once every
/// country's level is present, and the orphan must take part in the
/// recipient's next level.
fn generate_and_write_serially(
    pop_map: &PopMap,
    country_to_tiles: &CountryToTiles,
    out_dir: &Path,
    options: &[LevelOptions],
) -> Result<()> {
    let centroids = country_centroids(country_to_tiles);

    info!("generating country level 0s");
    let mut prev = build_zero_levels(pop_map, country_to_tiles, false)?;

    for (i, level_options) in options.iter().enumerate() {
        info!("generating level {}", i);
        let (mut levels, mut parents) = generate_one_level(&prev, level_options, i, false)?;
        stitch_singletons(&mut levels, &mut parents, &centroids)?;

        let (global_level, global_parents) = flatten_level(&levels, &parents);
        write_level(i, &global_level, &global_parents, out_dir)?;

        prev = levels;
    }
    Ok(())
}

fn country_centroids(country_to_tiles: &CountryToTiles) -> BTreeMap<String, Coord> {
    info!("calculating country centroids");
    country_to_tiles
        .iter()
        .map(|(country, tiles)| (country.clone(), countries::country_centroid(tiles)))
        .collect()
}

fn build_zero_levels(
    pop_map: &PopMap,
    country_to_tiles: &CountryToTiles,
    parallel: bool,
) -> Result<CountryLevels> {
    if !parallel {
        let mut zero_levels = CountryLevels::new();
        for (country, tiles) in country_to_tiles {
            zero_levels.insert(country.clone(), level0::build(pop_map, tiles)?);
        }
        return Ok(zero_levels);
    }

    let zero_levels = Mutex::new(CountryLevels::new());
    country_to_tiles
        .par_iter()
        .try_for_each(|(country, tiles)| -> Result<()> {
            let level = level0::build(pop_map, tiles)?;
            zero_levels.lock().insert(country.clone(), level);
            Ok(())
        })?;
    Ok(zero_levels.into_inner())
}

fn generate_one_level(
    prev: &CountryLevels,
    options: &LevelOptions,
    index: usize,
    parallel: bool,
) -> Result<(CountryLevels, CountryParents)> {
    if !parallel {
        let mut levels = CountryLevels::new();
        let mut parents = CountryParents::new();
        for (country, prev_level) in prev {
            let (level, parent_map) = generator::generate_level(prev_level, options)?;
            levels.insert(country.clone(), level);
            parents.insert(country.clone(), parent_map);
            info!("{} level {} complete", country, index);
        }
        return Ok((levels, parents));
    }

    let next_levels = Mutex::new(CountryLevels::new());
    let next_parents = Mutex::new(CountryParents::new());
    prev.par_iter()
        .try_for_each(|(country, prev_level)| -> Result<()> {
            let (level, parent_map) = generator::generate_level(prev_level, options)?;
            next_levels.lock().insert(country.clone(), level);
            next_parents.lock().insert(country.clone(), parent_map);
            info!("{} level {} complete", country, index);
            Ok(())
        })?;
    Ok((next_levels.into_inner(), next_parents.into_inner()))
}

/// Transplant every country that collapsed to a single region into its
/// geographically nearest still-live country, then delete the donor.
///
/// Runs single-threaded after the per-level barrier; countries are visited
/// in sorted name order, so the donor/recipient pairing is reproducible. A
/// singleton with no live recipient (the last country standing) stays put.
fn stitch_singletons(
    levels: &mut CountryLevels,
    parents: &mut CountryParents,
    centroids: &BTreeMap<String, Coord>,
) -> Result<()> {
    let candidates: Vec<String> = levels.keys().cloned().collect();
    for country in candidates {
        let singleton = levels.get(&country).is_some_and(|level| level.len() == 1);
        if !singleton {
            continue;
        }
        let Some(origin) = centroids.get(&country) else {
            continue;
        };

        let mut nearest: Option<(f64, &str)> = None;
        for (other, centroid) in centroids {
            if other == &country {
                continue;
            }
            let live = levels.get(other).is_some_and(|level| !level.is_empty());
            if !live {
                continue;
            }
            let distance = origin.great_circle_distance(centroid);
            if nearest.is_none_or(|(best, _)| distance < best) {
                nearest = Some((distance, other.as_str()));
            }
        }
        let Some((_, recipient)) = nearest else {
            continue;
        };
        let recipient = recipient.to_string();

        let donor_level = levels
            .remove(&country)
            .ok_or_else(|| stitch_error(&country, "level map"))?;
        let donor_parents = parents
            .remove(&country)
            .ok_or_else(|| stitch_error(&country, "parents map"))?;
        let Some((orphan_id, mut orphan)) = donor_level.into_iter().next() else {
            continue;
        };

        let recipient_parents = parents
            .get_mut(&recipient)
            .ok_or_else(|| stitch_error(&recipient, "parents map"))?;
        for (child, _) in donor_parents {
            recipient_parents.insert(child, orphan_id);
        }

        // Cross-border adjacency: any recipient region already claiming a
        // ring-1 neighbor of the orphan's boundary becomes a neighbor.
        let mut adjacent = Vec::new();
        for boundary in tile::border_tiles(&orphan.tiles) {
            for neighbor in boundary.neighbors() {
                if let Some(&other) = recipient_parents.get(&neighbor) {
                    if other != orphan_id {
                        adjacent.push(other);
                    }
                }
            }
        }

        let recipient_level = levels
            .get_mut(&recipient)
            .ok_or_else(|| stitch_error(&recipient, "level map"))?;
        for &other in &adjacent {
            orphan.neighbors.insert(other);
            recipient_level
                .get_mut(&other)
                .ok_or_else(|| stitch_error(&recipient, "adjacent region"))?
                .neighbors
                .insert(orphan_id);
        }
        recipient_level.insert(orphan_id, orphan);

        info!("stitched {} into {}", country, recipient);
    }
    Ok(())
}

fn stitch_error(country: &str, what: &str) -> EngineError {
    EngineError::InvariantViolation(format!("country '{}' missing from {}", country, what))
}

/// Union the per-country maps of one level into a global level and a
/// global parents table. The unions are disjoint: stitching has already
/// moved singletons.
fn flatten_level(levels: &CountryLevels, parents: &CountryParents) -> (Level, Parents) {
    let mut global_level = Level::new();
    for country_level in levels.values() {
        global_level.extend(
            country_level
                .iter()
                .map(|(id, region)| (*id, region.clone())),
        );
    }
    let mut global_parents = Parents::new();
    for country_parent in parents.values() {
        global_parents.extend(country_parent.iter().map(|(child, parent)| (*child, *parent)));
    }
    (global_level, global_parents)
}

fn write_level(index: usize, level: &Level, parents: &Parents, out_dir: &Path) -> Result<()> {
    persistence::write_json(level, &out_dir.join(format!("level{}.json", index)))?;
    persistence::write_json(parents, &out_dir.join(format!("parents{}.json", index)))?;
    info!(
        "level {}: {} regions, {} tiles, population {}",
        index,
        level.len(),
        region::total_tiles(level),
        region::total_population(level)
    );
    Ok(())
}

/// Flatten and persist every retained level, all levels concurrently.
fn write_levels(
    country_levels: &[CountryLevels],
    country_parents: &[CountryParents],
    out_dir: &Path,
) -> Result<()> {
    info!("writing global levels");
    (0..country_levels.len())
        .into_par_iter()
        .try_for_each(|i| {
            let (level, parents) = flatten_level(&country_levels[i], &country_parents[i]);
            write_level(i, &level, &parents, out_dir)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Coord;
    use crate::tile::Tile;
    use h3o::Resolution;

    fn disk(lat: f64, lon: f64, k: u32) -> Vec<Tile> {
        Tile::from_coord(&Coord::new(lat, lon), Resolution::Five)
            .unwrap()
            .ring(k)
    }

    fn options(max_region_size: usize, max_population: f64) -> LevelOptions {
        LevelOptions {
            max_region_size,
            max_population,
            distance_exponent: 1.0,
            island_dampening_passes: 0,
            small_region_merge_limit: 0,
        }
    }

    #[test]
    fn collapsed_country_is_stitched_into_nearest_live_one() {
        let mut country_to_tiles = CountryToTiles::new();
        let island = disk(10.0, 10.0, 0);
        let mainland = disk(40.7, -74.0, 2);
        country_to_tiles.insert("island".to_string(), island.clone());
        country_to_tiles.insert("mainland".to_string(), mainland.clone());

        let mut pop_map = PopMap::new();
        for &t in island.iter().chain(mainland.iter()) {
            pop_map.insert(t, 1.0);
        }

        // Caps sized so the mainland splits but the island collapses.
        let (levels, parents) =
            generate_levels(&pop_map, &country_to_tiles, &[options(5, 1e9)]).unwrap();

        assert!(!levels[0].contains_key("island"));
        assert!(!parents[0].contains_key("island"));
        let mainland_level = &levels[0]["mainland"];
        assert!(mainland_level.contains_key(&island[0]));
        assert_eq!(parents[0]["mainland"][&island[0]], island[0]);

        // Every mainland tile still resolves through the recipient tables.
        for &t in &mainland {
            let parent = parents[0]["mainland"][&t];
            assert!(mainland_level[&parent].tiles.contains(&t));
        }
    }

    #[test]
    fn last_country_standing_is_left_in_place() {
        let tiles = disk(10.0, 10.0, 0);
        let mut country_to_tiles = CountryToTiles::new();
        country_to_tiles.insert("solo".to_string(), tiles.clone());
        let pop_map: PopMap = tiles.iter().map(|&t| (t, 2.0)).collect();

        let (levels, parents) =
            generate_levels(&pop_map, &country_to_tiles, &[options(100, 1e9)]).unwrap();

        assert_eq!(levels[0]["solo"].len(), 1);
        assert_eq!(parents[0]["solo"][&tiles[0]], tiles[0]);
    }

    #[test]
    fn levels_chain_within_a_country() {
        let tiles = disk(40.7, -74.0, 3);
        let mut country_to_tiles = CountryToTiles::new();
        country_to_tiles.insert("main".to_string(), tiles.clone());
        let pop_map: PopMap = tiles.iter().map(|&t| (t, 1.0)).collect();

        let stack = [options(4, 1e9), options(16, 1e9)];
        let (levels, parents) =
            generate_levels(&pop_map, &country_to_tiles, &stack).unwrap();

        assert_eq!(levels.len(), 2);
        let coarse = &levels[1]["main"];
        assert!(coarse.len() < levels[0]["main"].len());
        assert_eq!(region::total_tiles(coarse), tiles.len());
        assert_eq!(region::total_population(coarse), tiles.len() as f64);
        for &t in &tiles {
            let parent = parents[1]["main"][&t];
            assert!(coarse[&parent].tiles.contains(&t));
        }
    }
}
