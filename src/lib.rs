//! Hierarchical, population-aware partitioning of the Earth's surface over
//! a global hexagonal index.
//!
//! Level 0 wraps every tile of a country as its own region; each further
//! level merges the previous level's regions into larger contiguous ones
//! under population and size caps, producing a coarse-to-fine stack suited
//! to zoom-dependent spatial queries.
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use hexstrata::{config::LevelOptions, engine, Tile};
//!
//! # fn main() -> hexstrata::Result<()> {
//! let tile: Tile = "85283473fffffff".parse()?;
//! let mut populations = BTreeMap::new();
//! populations.insert(tile, 42.0);
//!
//! let level0 = engine::level0::build(&populations, &[tile])?;
//! let (level1, parents) = engine::generator::generate_level(&level0, &LevelOptions::default())?;
//! assert_eq!(level1[&tile].population, 42.0);
//! assert_eq!(parents[&tile], tile);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod persistence;
pub(crate) mod queue;
pub mod region;
pub mod server;
pub mod spatial;
pub mod tile;

pub use config::{EngineOptions, LevelOptions};
pub use error::{EngineError, Result};
pub use region::{Level, Parents, Region};
pub use spatial::Coord;
pub use tile::Tile;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
