//! Per-level engine knobs, JSON-loadable with validation.
//!
//! A config file is a JSON array with one entry per output level:
//!
//! ```json
//! [
//!     {
//!         "maxRegionSize": 36,
//!         "maxPopulation": 500000.0,
//!         "distanceExponent": 2.0,
//!         "islandDampeningPasses": 2,
//!         "smallRegionMergeLimit": 3
//!     }
//! ]
//! ```

use h3o::Resolution;
use serde::{Deserialize, Serialize};

/// Knobs for one application of the level generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelOptions {
    /// Hard cap on tiles per region during flood growth.
    pub max_region_size: usize,
    /// Hard cap on population per region during flood growth.
    pub max_population: f64,
    /// Exponent on the centroid distance in the growth weight. Larger
    /// values favor geographically compact regions.
    pub distance_exponent: f64,
    /// How many times the single-neighbor absorption pass runs.
    pub island_dampening_passes: usize,
    /// Regions with at most this many tiles merge into their smallest
    /// neighbor.
    pub small_region_merge_limit: usize,
}

impl LevelOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_region_size == 0 {
            return Err("maxRegionSize must be at least 1".to_string());
        }
        if !self.max_population.is_finite() || self.max_population <= 0.0 {
            return Err("maxPopulation must be positive and finite".to_string());
        }
        if !self.distance_exponent.is_finite() {
            return Err("distanceExponent must be finite".to_string());
        }
        Ok(())
    }
}

impl Default for LevelOptions {
    fn default() -> Self {
        Self {
            max_region_size: 64,
            max_population: 1_000_000.0,
            distance_exponent: 2.0,
            island_dampening_passes: 2,
            small_region_merge_limit: 2,
        }
    }
}

/// One `LevelOptions` per output level, in generation order.
pub type EngineOptions = Vec<LevelOptions>;

/// Validate a full option stack.
pub fn validate_options(options: &[LevelOptions]) -> Result<(), String> {
    if options.is_empty() {
        return Err("at least one level must be configured".to_string());
    }
    for (i, level) in options.iter().enumerate() {
        level
            .validate()
            .map_err(|err| format!("level {}: {}", i, err))?;
    }
    Ok(())
}

/// Built-in option stacks for the resolutions the engine ships defaults for.
/// Region size caps follow the hexagon hierarchy's roughly sevenfold growth
/// per level; population caps step from metro scale up to continental scale.
/// Other resolutions require an explicit config file.
pub fn default_options(resolution: Resolution) -> Option<EngineOptions> {
    let levels: &[(usize, f64)] = match resolution {
        Resolution::Five => &[
            (36, 5.0e5),
            (216, 2.5e6),
            (1_296, 1.2e7),
            (7_776, 6.0e7),
            (46_656, 3.0e8),
            (279_936, 1.5e9),
        ],
        Resolution::Six => &[
            (49, 2.0e5),
            (343, 1.0e6),
            (2_401, 5.0e6),
            (16_807, 2.5e7),
            (117_649, 1.2e8),
            (823_543, 6.0e8),
            (5_764_801, 3.0e9),
        ],
        Resolution::Seven => &[
            (49, 1.0e5),
            (343, 5.0e5),
            (2_401, 2.5e6),
            (16_807, 1.2e7),
            (117_649, 6.0e7),
            (823_543, 3.0e8),
            (5_764_801, 1.5e9),
            (40_353_607, 7.0e9),
        ],
        _ => return None,
    };

    Some(
        levels
            .iter()
            .enumerate()
            .map(|(i, &(max_region_size, max_population))| LevelOptions {
                max_region_size,
                max_population,
                distance_exponent: if i < 3 { 2.0 } else { 1.5 },
                island_dampening_passes: 2,
                small_region_merge_limit: 1 << i,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_parse_camel_case_keys() {
        let json = r#"[{
            "maxRegionSize": 10,
            "maxPopulation": 1000.0,
            "distanceExponent": 1.5,
            "islandDampeningPasses": 1,
            "smallRegionMergeLimit": 2
        }]"#;
        let options: EngineOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].max_region_size, 10);
        assert_eq!(options[0].max_population, 1000.0);
        assert!(validate_options(&options).is_ok());
    }

    #[test]
    fn validation_rejects_degenerate_caps() {
        let mut options = LevelOptions::default();
        assert!(options.validate().is_ok());

        options.max_region_size = 0;
        assert!(options.validate().is_err());

        options = LevelOptions {
            max_population: f64::NAN,
            ..LevelOptions::default()
        };
        assert!(options.validate().is_err());

        assert!(validate_options(&[]).is_err());
    }

    #[test]
    fn defaults_exist_for_shipped_resolutions() {
        for res in [Resolution::Five, Resolution::Six, Resolution::Seven] {
            let options = default_options(res).unwrap();
            assert!(validate_options(&options).is_ok());
        }
        assert!(default_options(Resolution::Nine).is_none());
    }
}
