use crate::provider::model::{self, SearchResponse};
use crate::provider::{ProviderError, RouteRequest, RouteType};
use crate::route::{Place, RoutePlan};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, instrument};

/// Serves recorded OneMap responses from a folder: `search.json`,
/// `route_walk.json` and `route_pt.json`. Routes ignore the requested
/// coordinates except for the endpoints of walking legs.
pub struct FixtureProvider {
    folder: PathBuf,
}

impl FixtureProvider {
    pub fn new(folder: String) -> Self {
        Self {
            folder: PathBuf::from(folder),
        }
    }

    async fn read(&self, name: &str) -> Result<String, ProviderError> {
        let file_path = self.folder.join(name);
        debug!("Reading fixture from: {:?}", file_path);
        Ok(fs::read_to_string(file_path.as_path()).await?)
    }

    #[instrument(name = "search_fixture", skip_all, fields(query = %query))]
    pub async fn search(&self, query: &str) -> Result<Vec<Place>, ProviderError> {
        let body = self.read("search.json").await?;
        let response: SearchResponse = serde_json::from_str(&body)?;
        let needle = query.to_lowercase();
        Ok(response
            .into_places()
            .into_iter()
            .filter(|place| {
                place.name.to_lowercase().contains(&needle)
                    || place
                        .address
                        .as_deref()
                        .is_some_and(|address| address.to_lowercase().contains(&needle))
            })
            .collect())
    }

    #[instrument(name = "route_fixture", skip_all, fields(route_type = request.route_type.as_str()))]
    pub async fn route(&self, request: &RouteRequest) -> Result<RoutePlan, ProviderError> {
        let name = match request.route_type {
            RouteType::Walk => "route_walk.json",
            RouteType::Pt => "route_pt.json",
        };
        let body = self.read(name).await?;
        model::parse_route(&body, request)
    }
}
