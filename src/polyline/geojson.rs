use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::polyline::{self, Precision, PolylineError};
use crate::types::LatLng;

/// GeoJSON positions are `(lng, lat)`, the reverse of [`LatLng`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: (f64, f64) },
    LineString { coordinates: Vec<(f64, f64)> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Entity {
    Feature {
        properties: Map<String, Value>,
        geometry: Geometry,
    },
    FeatureCollection {
        features: Vec<Entity>,
    },
}

pub fn point(location: LatLng) -> Geometry {
    Geometry::Point {
        coordinates: (location.lng, location.lat),
    }
}

pub fn line_string(points: &[LatLng]) -> Geometry {
    Geometry::LineString {
        coordinates: points.iter().map(|p| (p.lng, p.lat)).collect(),
    }
}

impl Geometry {
    /// Coordinates back in `(lat, lng)` order.
    pub fn lat_lngs(&self) -> Vec<LatLng> {
        match self {
            Geometry::Point { coordinates } => vec![LatLng::new(coordinates.1, coordinates.0)],
            Geometry::LineString { coordinates } => coordinates
                .iter()
                .map(|&(lng, lat)| LatLng::new(lat, lng))
                .collect(),
        }
    }
}

pub fn to_geojson(encoded: &str, precision: Precision) -> Result<Geometry, PolylineError> {
    let points = polyline::decode(encoded, precision)?;
    Ok(line_string(&points))
}

pub fn from_geojson(geometry: &Geometry, precision: Precision) -> Result<String, PolylineError> {
    polyline::encode(&geometry.lat_lngs(), precision)
}
