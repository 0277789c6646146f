use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{polyline::geojson::Geometry, provider::RouteType, route::BoundingBox};

/// A WGS84 coordinate. On the wire it is a `[lat, lng]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl From<LatLng> for (f64, f64) {
    fn from(value: LatLng) -> Self {
        (value.lat, value.lng)
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Parses `"lat,lng"` as used in query strings.
impl FromStr for LatLng {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("Expected 'lat,lng', got '{}'", s))?;
        let lat = lat
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Invalid latitude '{}'", lat))?;
        let lng = lng
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Invalid longitude '{}'", lng))?;
        Ok(Self { lat, lng })
    }
}

#[derive(Deserialize, Debug)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Geojson,
}

#[derive(Deserialize, Debug, Default)]
pub struct RouteQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "type")]
    pub route_type: Option<RouteType>,
    pub format: Option<OutputFormat>,
    pub precision: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct EncodeRequest {
    #[serde(default)]
    pub coordinates: Vec<LatLng>,
    /// GeoJSON geometry, used instead of `coordinates` when present.
    pub geometry: Option<Geometry>,
    pub precision: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EncodeResponse {
    pub polyline: String,
}

#[derive(Deserialize, Debug)]
pub struct DecodeRequest {
    pub polylines: Vec<String>,
    pub precision: Option<f64>,
    pub format: Option<OutputFormat>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DecodeResponse {
    pub paths: Vec<Vec<LatLng>>,
    pub path: Vec<LatLng>,
    pub bounds: Option<BoundingBox>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub provider: String,
    pub transcription_configured: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TranscriptionResponse {
    pub text: String,
    pub success: bool,
}
