use crate::polyline::PolylineError;
use crate::provider::fixture::FixtureProvider;
use crate::provider::onemap::OneMapClient;
use crate::route::{Place, RoutePlan};
use crate::types::LatLng;
use chrono::FixedOffset;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

mod fixture;
pub mod model;
mod onemap;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Routing service returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("No route found: {0}")]
    NoRoute(String),
    #[error("No place found for '{0}'")]
    NotFound(String),
    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),
    #[error("Routing service returned bad geometry: {0}")]
    Polyline(#[from] PolylineError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    #[default]
    Walk,
    Pt,
}

impl RouteType {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteType::Walk => "walk",
            RouteType::Pt => "pt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub start: LatLng,
    pub end: LatLng,
    pub route_type: RouteType,
}

impl RouteRequest {
    /// Coordinates are keyed at 1e-6 degrees, finer than any routing snap.
    fn cache_key(&self) -> String {
        format!(
            "{}:{:.6},{:.6}:{:.6},{:.6}",
            self.route_type.as_str(),
            self.start.lat,
            self.start.lng,
            self.end.lat,
            self.end.lng
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub source: String,
    pub token: Option<String>,
    pub cache_size: u64,
    pub cache_ttl: Duration,
    pub utc_offset_hours: i32,
    pub max_walk_distance: u32,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            source: String::from("https://www.onemap.gov.sg"),
            token: None,
            cache_size: 128,
            cache_ttl: Duration::from_secs(600),
            utc_offset_hours: 8,
            max_walk_distance: 1000,
        }
    }
}

impl ProviderOptions {
    pub fn utc_offset(&self) -> Result<FixedOffset, ProviderError> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            ProviderError::InvalidConfig(format!(
                "UTC offset of {} hours is out of range",
                self.utc_offset_hours
            ))
        })
    }
}

pub enum RouteProvider {
    Fixture(FixtureProvider),
    OneMap(OneMapClient),
}

impl RouteProvider {
    pub fn new(options: ProviderOptions) -> Result<Self, ProviderError> {
        if options.source.starts_with("http://") || options.source.starts_with("https://") {
            Ok(RouteProvider::OneMap(OneMapClient::new(
                options.source.clone(),
                options,
            )?))
        } else {
            Ok(RouteProvider::Fixture(FixtureProvider::new(
                options.source.clone(),
            )))
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            RouteProvider::Fixture(_) => "fixture",
            RouteProvider::OneMap(_) => "onemap",
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Place>, ProviderError> {
        match self {
            RouteProvider::Fixture(fixture) => fixture.search(query).await,
            RouteProvider::OneMap(client) => client.search(query).await,
        }
    }

    async fn route(&self, request: &RouteRequest) -> Result<RoutePlan, ProviderError> {
        match self {
            RouteProvider::Fixture(fixture) => fixture.route(request).await,
            RouteProvider::OneMap(client) => client.route(request).await,
        }
    }
}

/// Provider plus result caches. Concurrent lookups of the same key share a
/// single upstream request.
pub struct RouteProviderWithCache {
    provider: RouteProvider,
    searches: Cache<String, Arc<Vec<Place>>>,
    routes: Cache<String, Arc<RoutePlan>>,
}

impl RouteProviderWithCache {
    pub fn new(options: ProviderOptions) -> Result<Self, ProviderError> {
        let searches = Cache::builder()
            .max_capacity(options.cache_size)
            .time_to_live(options.cache_ttl)
            .build();
        let routes = Cache::builder()
            .max_capacity(options.cache_size)
            .time_to_live(options.cache_ttl)
            .build();
        let provider = RouteProvider::new(options)?;
        info!("Using {} route provider", provider.describe());
        Ok(Self {
            provider,
            searches,
            routes,
        })
    }

    pub fn describe(&self) -> &'static str {
        self.provider.describe()
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Arc<Vec<Place>>, Arc<ProviderError>> {
        let key = query.trim().to_lowercase();
        self.searches
            .try_get_with(key, async {
                debug!("Search cache miss");
                self.provider.search(query.trim()).await.map(Arc::new)
            })
            .await
    }

    /// First search hit for `query`.
    pub async fn resolve(&self, query: &str) -> Result<Place, Arc<ProviderError>> {
        let places = self.search(query).await?;
        places
            .first()
            .cloned()
            .ok_or_else(|| Arc::new(ProviderError::NotFound(query.to_string())))
    }

    #[instrument(skip_all, fields(key = %request.cache_key()))]
    pub async fn route(&self, request: RouteRequest) -> Result<Arc<RoutePlan>, Arc<ProviderError>> {
        self.routes
            .try_get_with(request.cache_key(), async {
                debug!("Route cache miss");
                self.provider.route(&request).await.map(Arc::new)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_options() -> ProviderOptions {
        ProviderOptions {
            source: String::from("test_files/onemap"),
            ..ProviderOptions::default()
        }
    }

    #[test]
    fn test_provider_selection() {
        let http = RouteProvider::new(ProviderOptions::default()).unwrap();
        assert_eq!(http.describe(), "onemap");
        let fixture = RouteProvider::new(fixture_options()).unwrap();
        assert_eq!(fixture.describe(), "fixture");
    }

    #[test]
    fn test_provider_options_default() {
        let options = ProviderOptions::default();
        assert_eq!(options.cache_size, 128);
        assert_eq!(options.utc_offset_hours, 8);
        assert!(options.token.is_none());
    }

    #[test]
    fn test_invalid_utc_offset() {
        let options = ProviderOptions {
            utc_offset_hours: 30,
            ..ProviderOptions::default()
        };
        assert!(options.utc_offset().is_err());
        assert!(RouteProvider::new(options).is_err());
    }

    #[test]
    fn test_cache_key_rounds_coordinates() {
        let a = RouteRequest {
            start: LatLng::new(1.2803700001, 103.85035),
            end: LatLng::new(1.2826, 103.8529),
            route_type: RouteType::Walk,
        };
        let b = RouteRequest {
            start: LatLng::new(1.28037, 103.85035),
            ..a
        };
        assert_eq!(a.cache_key(), b.cache_key());
        let c = RouteRequest {
            route_type: RouteType::Pt,
            ..a
        };
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[tokio::test]
    async fn test_cached_search_and_resolve() {
        let provider = RouteProviderWithCache::new(fixture_options()).unwrap();
        let first = provider.search("Raffles").await.unwrap();
        let second = provider.search("  raffles ").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let place = provider.resolve("chulia").await.unwrap();
        assert_eq!(place.name, "CHULIA STREET");
    }

    #[tokio::test]
    async fn test_resolve_unknown_place() {
        let provider = RouteProviderWithCache::new(fixture_options()).unwrap();
        let error = provider.resolve("atlantis").await.unwrap_err();
        assert!(matches!(*error, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cached_route() {
        let provider = RouteProviderWithCache::new(fixture_options()).unwrap();
        let request = RouteRequest {
            start: LatLng::new(1.28037, 103.85035),
            end: LatLng::new(1.2826, 103.8529),
            route_type: RouteType::Walk,
        };
        let first = provider.route(request).await.unwrap();
        let second = provider.route(request).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.legs.len(), 1);
    }
}
