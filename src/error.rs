//! Error types shared across the engine, persistence, and serving layers.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the partitioning engine and its I/O layers.
#[derive(Debug)]
pub enum EngineError {
    /// Requested resolution is outside the supported table (0..=15).
    InvalidResolution(u8),
    /// A tile id could not be parsed as a cell of the hexagonal index.
    InvalidTile(String),
    /// A coordinate is outside the valid latitude/longitude range.
    InvalidCoordinate(String),
    /// A tile under construction has no entry in the population map.
    MissingPopulation(String),
    /// A neighbor pointer could not be resolved during a merge or flood.
    InvariantViolation(String),
    /// A GeoJSON feature carries a geometry other than Polygon/MultiPolygon.
    UnsupportedGeometry(String),
    /// The countries input could not be interpreted as GeoJSON.
    InvalidGeoJson(String),
    /// An engine options file failed validation.
    InvalidOptions(String),
    /// Fetching a remote input URL failed.
    Http(reqwest::Error),
    /// Underlying filesystem failure.
    Io(std::io::Error),
    /// JSON encoding or decoding failure.
    Serialization(serde_json::Error),
    /// Postgres failure while bulk loading.
    Database(tokio_postgres::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidResolution(res) => {
                write!(f, "resolution {} is outside the supported range 0..=15", res)
            }
            Self::InvalidTile(id) => write!(f, "'{}' is not a valid tile id", id),
            Self::InvalidCoordinate(msg) => write!(f, "invalid coordinate: {}", msg),
            Self::MissingPopulation(tile) => {
                write!(f, "tile '{}' not found in population map", tile)
            }
            Self::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
            Self::UnsupportedGeometry(kind) => {
                write!(f, "unsupported geometry type '{}'", kind)
            }
            Self::InvalidGeoJson(msg) => write!(f, "invalid GeoJSON: {}", msg),
            Self::InvalidOptions(msg) => write!(f, "invalid engine options: {}", msg),
            Self::Http(err) => write!(f, "http error: {}", err),
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Serialization(err) => write!(f, "serialization error: {}", err),
            Self::Database(err) => write!(f, "database error: {}", err),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Database(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}

impl From<tokio_postgres::Error> for EngineError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Database(err)
    }
}
