//! The partitioning engine: country tiling, level construction, and the
//! parallel per-country driver.

pub mod countries;
pub mod driver;
pub mod generator;
pub mod level0;

use crate::region::Level;

/// Link every neighbor-less region to the cyclic successor in the sorted
/// list of region ids, symmetrically. Ids are visited in sorted order and
/// isolation is re-checked at visit time, so repairs made earlier in the
/// pass are visible to later ids. A single-region level is left alone.
pub(crate) fn repair_isolated(level: &mut Level) {
    if level.len() <= 1 {
        return;
    }
    let sorted: Vec<_> = level.keys().copied().collect();
    for (i, &id) in sorted.iter().enumerate() {
        let isolated = level
            .get(&id)
            .is_some_and(|region| region.neighbors.is_empty());
        if !isolated {
            continue;
        }
        let successor = sorted[(i + 1) % sorted.len()];
        if let Some(region) = level.get_mut(&id) {
            region.neighbors.insert(successor);
        }
        if let Some(region) = level.get_mut(&successor) {
            region.neighbors.insert(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use crate::tile::Tile;
    use std::collections::BTreeSet;

    #[test]
    fn isolated_regions_link_to_cyclic_successor() {
        let anchor: Tile = "85283473fffffff".parse().unwrap();
        let mut ids: Vec<Tile> = anchor.neighbors();
        ids.push(anchor);
        ids.sort();

        let mut level = Level::new();
        for &id in &ids {
            level.insert(id, Region::singleton(id, 1.0, BTreeSet::new()));
        }
        repair_isolated(&mut level);

        // The first id links to the second; the last wraps around to one it
        // already repaired earlier in the pass.
        for region in level.values() {
            assert!(!region.neighbors.is_empty());
        }
        for (id, region) in &level {
            for neighbor in &region.neighbors {
                assert!(level[neighbor].neighbors.contains(id));
            }
        }
    }

    #[test]
    fn single_region_level_is_untouched() {
        let id: Tile = "85283473fffffff".parse().unwrap();
        let mut level = Level::new();
        level.insert(id, Region::singleton(id, 1.0, BTreeSet::new()));
        repair_isolated(&mut level);
        assert!(level[&id].neighbors.is_empty());
    }
}
