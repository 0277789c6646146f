use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{instrument, warn};

use crate::polyline::{
    self, Precision, PolylineError,
    geojson::{self, Entity},
};
use crate::types::LatLng;

pub const PEDESTRIAN_MODE: &str = "WALK";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal: Option<String>,
    pub location: LatLng,
}

impl Place {
    pub fn new(name: impl Into<String>, location: LatLng) -> Self {
        Self {
            name: name.into(),
            address: None,
            postal: None,
            location,
        }
    }
}

/// One leg of a route as returned by the routing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    pub duration_s: f64,
    pub distance_m: f64,
    pub polyline: String,
    pub from: Place,
    pub to: Place,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub legs: Vec<RouteLeg>,
    pub duration_s: f64,
    pub distance_m: f64,
}

impl RoutePlan {
    pub fn from_legs(legs: Vec<RouteLeg>) -> Self {
        let duration_s = legs.iter().map(|leg| leg.duration_s).sum();
        let distance_m = legs.iter().map(|leg| leg.distance_m).sum();
        Self {
            legs,
            duration_s,
            distance_m,
        }
    }
}

pub fn is_pedestrian(mode: &str) -> bool {
    mode.eq_ignore_ascii_case(PEDESTRIAN_MODE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegStyle {
    pub color: &'static str,
    pub weight: u8,
    pub dashed: bool,
}

impl LegStyle {
    pub fn for_mode(mode: &str) -> Self {
        if is_pedestrian(mode) {
            Self {
                color: "#1d4ed8",
                weight: 6,
                dashed: true,
            }
        } else {
            Self {
                color: "#15803d",
                weight: 8,
                dashed: false,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn from_points(points: &[LatLng]) -> Option<Self> {
        let first = points.first()?;
        let initial = Self {
            south: first.lat,
            west: first.lng,
            north: first.lat,
            east: first.lng,
        };
        Some(points.iter().skip(1).fold(initial, |bounds, p| Self {
            south: bounds.south.min(p.lat),
            west: bounds.west.min(p.lng),
            north: bounds.north.max(p.lat),
            east: bounds.east.max(p.lng),
        }))
    }

    pub fn contains(&self, point: &LatLng) -> bool {
        (self.south..=self.north).contains(&point.lat) && (self.west..=self.east).contains(&point.lng)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedSegment {
    pub mode: String,
    pub style: LegStyle,
    pub distance_m: f64,
    pub duration_s: f64,
    pub path: Vec<LatLng>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRoute {
    pub segments: Vec<RenderedSegment>,
    pub path: Vec<LatLng>,
    pub bounds: Option<BoundingBox>,
    pub center: Option<LatLng>,
    pub start: Option<Place>,
    pub destination: Option<Place>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Decoded legs and the single path they form when joined.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatenatedPaths {
    pub legs: Vec<Vec<LatLng>>,
    pub path: Vec<LatLng>,
}

/// Decodes every polyline and joins them in order. Points shared by two
/// consecutive legs appear twice.
pub fn concatenate_paths<S: AsRef<str>>(
    polylines: &[S],
    precision: Precision,
) -> Result<ConcatenatedPaths, PolylineError> {
    let legs = polylines
        .iter()
        .map(|encoded| polyline::decode(encoded.as_ref(), precision))
        .collect::<Result<Vec<_>, _>>()?;
    let path = legs.iter().flatten().copied().collect();
    Ok(ConcatenatedPaths { legs, path })
}

#[instrument(skip_all, fields(legs = plan.legs.len(), precision = %precision))]
pub fn render_route(plan: &RoutePlan, precision: Precision) -> Result<RenderedRoute, PolylineError> {
    let mut segments = Vec::with_capacity(plan.legs.len());
    let mut path = Vec::new();

    for (index, leg) in plan.legs.iter().enumerate() {
        let points = polyline::decode(&leg.polyline, precision).inspect_err(|e| {
            warn!("Leg {} ({}) has an undecodable polyline: {}", index, leg.mode, e);
        })?;
        path.extend_from_slice(&points);
        segments.push(RenderedSegment {
            mode: leg.mode.clone(),
            style: LegStyle::for_mode(&leg.mode),
            distance_m: leg.distance_m,
            duration_s: leg.duration_s,
            path: points,
        });
    }

    let bounds = BoundingBox::from_points(&path);
    Ok(RenderedRoute {
        segments,
        path,
        bounds,
        center: bounds.map(|b| b.center()),
        start: plan.legs.first().map(|leg| leg.from.clone()),
        destination: plan.legs.last().map(|leg| leg.to.clone()),
        distance_m: plan.distance_m,
        duration_s: plan.duration_s,
    })
}

fn properties(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl RenderedRoute {
    /// One line feature per segment, then the start and destination markers.
    pub fn to_geojson(&self) -> Entity {
        let mut features: Vec<Entity> = self
            .segments
            .iter()
            .map(|segment| Entity::Feature {
                properties: properties(json!({
                    "kind": "segment",
                    "mode": segment.mode,
                    "color": segment.style.color,
                    "weight": segment.style.weight,
                    "dashed": segment.style.dashed,
                    "distance_m": segment.distance_m,
                    "duration_s": segment.duration_s,
                })),
                geometry: geojson::line_string(&segment.path),
            })
            .collect();

        for (kind, place) in [("start", &self.start), ("destination", &self.destination)] {
            if let Some(place) = place {
                features.push(Entity::Feature {
                    properties: properties(json!({ "kind": kind, "name": place.name })),
                    geometry: geojson::point(place.location),
                });
            }
        }

        Entity::FeatureCollection { features }
    }
}
