//! Coordinates and the two distance metrics used by the engine.
//!
//! The flood fill weighs candidates with a planar Euclidean distance over raw
//! lat/lon degrees; the stitcher compares country centroids with a
//! great-circle distance. The two are intentionally distinct: the flood's
//! metric is a local compactness heuristic, the stitcher's a global
//! nearest-neighbor selection.

use geo::{Distance, Euclidean, Haversine, Point};
use serde::{Deserialize, Serialize};

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Convert to a `geo` point (x = longitude, y = latitude).
    #[inline]
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Planar distance in degree space. Used only as a relative weight
    /// inside the flood fill.
    #[inline]
    pub fn planar_distance(&self, other: &Coord) -> f64 {
        Euclidean.distance(self.to_point(), other.to_point())
    }

    /// Great-circle distance in meters. Only comparisons are consumed, so
    /// the spherical approximation is sufficient.
    #[inline]
    pub fn great_circle_distance(&self, other: &Coord) -> f64 {
        Haversine.distance(self.to_point(), other.to_point())
    }
}

/// One polygon of a country outline: an outer geofence plus optional holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryPolygon {
    pub geofence: Vec<Coord>,
    #[serde(default)]
    pub holes: Vec<Vec<Coord>>,
}

impl CountryPolygon {
    /// Convert into a `geo` polygon for polyfilling.
    pub fn to_polygon(&self) -> geo::Polygon<f64> {
        let exterior: geo::LineString<f64> = self
            .geofence
            .iter()
            .map(|c| geo::Coord { x: c.lon, y: c.lat })
            .collect();
        let holes = self
            .holes
            .iter()
            .map(|hole| {
                hole.iter()
                    .map(|c| geo::Coord { x: c.lon, y: c.lat })
                    .collect()
            })
            .collect();
        geo::Polygon::new(exterior, holes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_is_euclidean() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(4.0, 3.0);
        assert_eq!(a.planar_distance(&b), 5.0);
    }

    #[test]
    fn great_circle_distance_orders_by_arc() {
        let origin = Coord::new(0.0, 0.0);
        let near = Coord::new(1.0, 1.0);
        let far = Coord::new(40.0, 40.0);
        assert!(origin.great_circle_distance(&near) < origin.great_circle_distance(&far));
    }

    #[test]
    fn polygon_conversion_flips_axes() {
        let polygon = CountryPolygon {
            geofence: vec![
                Coord::new(35.0, -80.0),
                Coord::new(35.0, -70.0),
                Coord::new(45.0, -70.0),
                Coord::new(35.0, -80.0),
            ],
            holes: vec![],
        };
        let converted = polygon.to_polygon();
        let first = converted.exterior().coords().next().unwrap();
        assert_eq!(first.x, -80.0);
        assert_eq!(first.y, 35.0);
    }
}
