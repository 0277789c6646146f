//! OneMap response bodies and their conversion into [`RoutePlan`]s.

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::provider::{ProviderError, RouteRequest, RouteType};
use crate::route::{PEDESTRIAN_MODE, Place, RouteLeg, RoutePlan};
use crate::types::LatLng;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub found: u32,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SearchResult {
    pub searchval: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub postal: String,
    pub latitude: String,
    pub longitude: String,
}

impl SearchResult {
    fn into_place(self) -> Option<Place> {
        let lat = self.latitude.parse::<f64>().ok()?;
        let lng = self.longitude.parse::<f64>().ok()?;
        Some(Place {
            name: self.searchval,
            address: non_empty(self.address),
            postal: non_empty(self.postal),
            location: LatLng::new(lat, lng),
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() || value == "NIL" {
        None
    } else {
        Some(value)
    }
}

impl SearchResponse {
    pub fn into_places(self) -> Vec<Place> {
        self.results
            .into_iter()
            .filter_map(|result| {
                let name = result.searchval.clone();
                let place = result.into_place();
                if place.is_none() {
                    warn!("Dropping search result '{}' without usable coordinates", name);
                }
                place
            })
            .collect()
    }
}

#[derive(Deserialize, Debug)]
pub struct WalkRouteResponse {
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub route_geometry: Option<String>,
    #[serde(default)]
    pub route_summary: Option<WalkSummary>,
}

#[derive(Deserialize, Debug)]
pub struct WalkSummary {
    #[serde(default)]
    pub start_point: String,
    #[serde(default)]
    pub end_point: String,
    pub total_time: f64,
    pub total_distance: f64,
}

#[derive(Deserialize, Debug)]
pub struct TransitRouteResponse {
    #[serde(default)]
    pub plan: Option<TransitPlan>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
pub struct TransitPlan {
    #[serde(default)]
    pub itineraries: Vec<Itinerary>,
}

#[derive(Deserialize, Debug)]
pub struct Itinerary {
    pub legs: Vec<TransitLeg>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransitLeg {
    pub mode: String,
    #[serde(default)]
    pub route: Option<String>,
    pub duration: f64,
    pub distance: f64,
    pub from: Vertex,
    pub to: Vertex,
    pub leg_geometry: LegGeometry,
}

#[derive(Deserialize, Debug)]
pub struct Vertex {
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Deserialize, Debug)]
pub struct LegGeometry {
    pub points: String,
}

impl From<Vertex> for Place {
    fn from(vertex: Vertex) -> Self {
        Place::new(vertex.name, LatLng::new(vertex.lat, vertex.lon))
    }
}

impl From<TransitLeg> for RouteLeg {
    fn from(leg: TransitLeg) -> Self {
        RouteLeg {
            mode: leg.mode,
            route_name: leg.route.filter(|name| !name.is_empty()),
            duration_s: leg.duration,
            distance_m: leg.distance,
            polyline: leg.leg_geometry.points,
            from: leg.from.into(),
            to: leg.to.into(),
        }
    }
}

/// Parses a routing body for `request`. Walking routes become a single
/// pedestrian leg running from the requested start to the requested end.
#[instrument(level = "debug", skip_all, fields(route_type = request.route_type.as_str()))]
pub fn parse_route(body: &str, request: &RouteRequest) -> Result<RoutePlan, ProviderError> {
    match request.route_type {
        RouteType::Walk => {
            let response: WalkRouteResponse = serde_json::from_str(body)?;
            let (Some(geometry), Some(summary)) = (response.route_geometry, response.route_summary)
            else {
                let reason = response
                    .error
                    .or(response.status_message)
                    .unwrap_or_else(|| String::from("No walking route found"));
                return Err(ProviderError::NoRoute(reason));
            };
            debug!(
                "Walking route of {} m from '{}' to '{}'",
                summary.total_distance, summary.start_point, summary.end_point
            );
            Ok(RoutePlan::from_legs(vec![RouteLeg {
                mode: PEDESTRIAN_MODE.to_string(),
                route_name: None,
                duration_s: summary.total_time,
                distance_m: summary.total_distance,
                polyline: geometry,
                from: Place::new(summary.start_point, request.start),
                to: Place::new(summary.end_point, request.end),
            }]))
        }
        RouteType::Pt => {
            let response: TransitRouteResponse = serde_json::from_str(body)?;
            let itinerary = response
                .plan
                .and_then(|plan| plan.itineraries.into_iter().next())
                .ok_or_else(|| {
                    ProviderError::NoRoute(
                        response
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| String::from("No itinerary found")),
                    )
                })?;
            debug!("Transit itinerary with {} legs", itinerary.legs.len());
            Ok(RoutePlan::from_legs(
                itinerary.legs.into_iter().map(RouteLeg::from).collect(),
            ))
        }
    }
}
