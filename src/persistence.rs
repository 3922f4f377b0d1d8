//! JSON artifacts and input loading.
//!
//! A generated data directory holds `countryPolygons.json`,
//! `countryToH3.json`, `h3ToCountry.json`, and one `level<i>.json` /
//! `parents<i>.json` pair per generated level.
//!
//! Input paths double as URLs: anything that is not a file on disk but
//! starts with `http://` or `https://` is fetched with a blocking GET, so
//! popmaps, configs, and countries GeoJSON can be loaded straight from
//! remote storage.

use std::fs;
use std::io::BufWriter;
use std::path::Path;

use h3o::Resolution;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::config::{self, EngineOptions};
use crate::error::{EngineError, Result};
use crate::region::{CountryPolygons, CountryToTiles, Level, Parents, PopMap, TileToCountry};
use crate::spatial::{Coord, CountryPolygon};
use crate::tile;

/// Serialize a value as JSON at `path`, creating parent directories.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), value)?;
    Ok(())
}

/// The path as a fetchable URL, if it names one instead of a local file.
fn remote_url(path: &Path) -> Option<&str> {
    path.to_str()
        .filter(|raw| raw.starts_with("http://") || raw.starts_with("https://"))
}

/// Read an input from disk, falling back to an HTTP(S) GET when the path
/// is a URL rather than a local file.
fn read_input(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        if let Some(url) = remote_url(path) {
            let body = reqwest::blocking::get(url)?.error_for_status()?.bytes()?;
            return Ok(body.to_vec());
        }
    }
    Ok(fs::read(path)?)
}

/// Deserialize a JSON input from a local file or an http(s) URL.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = read_input(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Load country outlines from a GeoJSON feature collection.
///
/// Every feature must carry an `ADMIN` name property and a Polygon or
/// MultiPolygon geometry; anything else is an error at load time.
pub fn load_countries(path: &Path) -> Result<CountryPolygons> {
    let raw = read_input(path)?;
    let geojson: geojson::GeoJson = serde_json::from_slice(&raw)
        .map_err(|err| EngineError::InvalidGeoJson(err.to_string()))?;
    let collection = geojson::FeatureCollection::try_from(geojson)
        .map_err(|err| EngineError::InvalidGeoJson(err.to_string()))?;

    let mut countries = CountryPolygons::new();
    for feature in collection.features {
        let name = feature
            .properties
            .as_ref()
            .and_then(|properties| properties.get("ADMIN"))
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                EngineError::InvalidGeoJson("feature missing ADMIN name property".to_string())
            })?
            .to_string();
        let geometry = feature
            .geometry
            .ok_or_else(|| EngineError::InvalidGeoJson(format!("'{}' has no geometry", name)))?;

        let polygons = match geometry.value {
            geojson::Value::Polygon(rings) => vec![polygon_from_rings(&rings)?],
            geojson::Value::MultiPolygon(shapes) => shapes
                .iter()
                .map(|rings| polygon_from_rings(rings))
                .collect::<Result<Vec<_>>>()?,
            other => return Err(EngineError::UnsupportedGeometry(geometry_kind(&other))),
        };
        countries.insert(name, polygons);
    }
    Ok(countries)
}

fn geometry_kind(value: &geojson::Value) -> String {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
    .to_string()
}

/// GeoJSON rings carry positions as `[lon, lat]`; the first ring is the
/// outer geofence and the rest are holes.
fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<CountryPolygon> {
    let mut converted = rings.iter().map(|ring| {
        ring.iter()
            .map(|position| {
                if position.len() < 2 {
                    return Err(EngineError::InvalidGeoJson(
                        "position with fewer than two coordinates".to_string(),
                    ));
                }
                Ok(Coord::new(position[1], position[0]))
            })
            .collect::<Result<Vec<Coord>>>()
    });

    let geofence = converted
        .next()
        .ok_or_else(|| EngineError::InvalidGeoJson("polygon with no rings".to_string()))??;
    let holes = converted.collect::<Result<Vec<_>>>()?;
    Ok(CountryPolygon { geofence, holes })
}

/// Persist the three country maps into `dir`.
pub fn write_country_maps(
    country_polygons: &CountryPolygons,
    country_to_tiles: &CountryToTiles,
    tile_to_country: &TileToCountry,
    dir: &Path,
) -> Result<()> {
    write_json(country_polygons, &dir.join("countryPolygons.json"))?;
    write_json(country_to_tiles, &dir.join("countryToH3.json"))?;
    write_json(tile_to_country, &dir.join("h3ToCountry.json"))?;
    Ok(())
}

/// Load the three country maps from `dir`.
pub fn read_country_maps(
    dir: &Path,
) -> Result<(CountryPolygons, CountryToTiles, TileToCountry)> {
    let country_polygons = read_json(&dir.join("countryPolygons.json"))?;
    let country_to_tiles = read_json(&dir.join("countryToH3.json"))?;
    let tile_to_country = read_json(&dir.join("h3ToCountry.json"))?;
    Ok((country_polygons, country_to_tiles, tile_to_country))
}

/// Load a population map, backfilling every cell of the resolution that the
/// file does not mention with zero. With no path, the map is all zeros.
pub fn load_pop_map(path: Option<&Path>, resolution: Resolution) -> Result<PopMap> {
    let mut pop_map = match path {
        Some(path) => read_json::<PopMap>(path)?,
        None => PopMap::new(),
    };
    for tile in tile::enumerate(resolution) {
        pop_map.entry(tile).or_insert(0.0);
    }
    Ok(pop_map)
}

/// Mean and standard deviation of the population map.
pub fn pop_map_stats(pop_map: &PopMap) -> (f64, f64) {
    let size = pop_map.len() as f64;
    let mean = pop_map.values().sum::<f64>() / size;
    let variance = pop_map
        .values()
        .map(|pop| {
            let diff = pop - mean;
            diff * diff
        })
        .sum::<f64>()
        / size;
    (mean, variance.sqrt())
}

/// Re-aggregate a population map to a coarser resolution by summing child
/// populations into each parent cell.
pub fn convert_pop_map(pop_map: &PopMap, resolution: Resolution) -> Result<PopMap> {
    let mut converted = PopMap::new();
    for (tile, population) in pop_map {
        let parent = tile
            .parent(resolution)
            .ok_or_else(|| EngineError::InvalidResolution(u8::from(resolution)))?;
        *converted.entry(parent).or_insert(0.0) += population;
    }
    Ok(converted)
}

/// Load and validate an engine options file.
pub fn load_options(path: &Path) -> Result<EngineOptions> {
    let options: EngineOptions = read_json(path)?;
    config::validate_options(&options).map_err(EngineError::InvalidOptions)?;
    Ok(options)
}

/// Load every `level<i>.json` / `parents<i>.json` pair in `dir`, in order.
pub fn read_levels(dir: &Path) -> Result<(Vec<Level>, Vec<Parents>)> {
    let mut levels = Vec::new();
    let mut parents = Vec::new();
    loop {
        let level_path = dir.join(format!("level{}.json", levels.len()));
        if !level_path.is_file() {
            break;
        }
        let parents_path = dir.join(format!("parents{}.json", levels.len()));
        levels.push(read_json(&level_path)?);
        parents.push(read_json(&parents_path)?);
    }
    info!("{} levels found", levels.len());
    Ok((levels, parents))
}
