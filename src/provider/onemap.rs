use crate::provider::model::{self, SearchResponse};
use crate::provider::{ProviderError, ProviderOptions, RouteRequest, RouteType};
use crate::route::{Place, RoutePlan};
use chrono::{FixedOffset, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const SEARCH_PATH: &str = "/api/common/elastic/search";
const ROUTE_PATH: &str = "/api/public/routingsvc/route";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_ERROR_BODY: usize = 200;

pub struct OneMapClient {
    base_url: String,
    options: ProviderOptions,
    utc_offset: FixedOffset,
    client: Client,
}

impl OneMapClient {
    pub fn new(base_url: String, options: ProviderOptions) -> Result<Self, ProviderError> {
        let utc_offset = options.utc_offset()?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
            utc_offset,
            client,
        })
    }

    #[instrument(level = "debug", name = "search_onemap", skip_all, fields(query = %query))]
    pub async fn search(&self, query: &str) -> Result<Vec<Place>, ProviderError> {
        let url = format!("{}{}", self.base_url, SEARCH_PATH);
        debug!("Searching places at: {}", url);
        let request = self.client.get(&url).query(&[
            ("searchVal", query),
            ("returnGeom", "Y"),
            ("getAddrDetails", "Y"),
            ("pageNum", "1"),
        ]);
        let body = self.fetch(request).await?;
        let response: SearchResponse = serde_json::from_str(&body)?;
        Ok(response.into_places())
    }

    #[instrument(level = "debug", name = "route_onemap", skip_all, fields(route_type = request.route_type.as_str()))]
    pub async fn route(&self, request: &RouteRequest) -> Result<RoutePlan, ProviderError> {
        let url = format!("{}{}", self.base_url, ROUTE_PATH);
        debug!("Fetching route from: {}", url);
        let params = self.route_params(request);
        let body = self.fetch(self.client.get(&url).query(&params)).await?;
        model::parse_route(&body, request)
    }

    fn route_params(&self, request: &RouteRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("start", request.start.to_string()),
            ("end", request.end.to_string()),
            ("routeType", request.route_type.as_str().to_string()),
        ];
        if request.route_type == RouteType::Pt {
            let now = Utc::now().with_timezone(&self.utc_offset);
            params.push(("date", now.format("%m-%d-%Y").to_string()));
            params.push(("time", now.format("%H:%M:%S").to_string()));
            params.push(("mode", String::from("TRANSIT")));
            params.push(("maxWalkDistance", self.options.max_walk_distance.to_string()));
            params.push(("numItineraries", String::from("1")));
        }
        params
    }

    async fn fetch(&self, request: RequestBuilder) -> Result<String, ProviderError> {
        let request = match &self.options.token {
            Some(token) => request.header(AUTHORIZATION, token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!("Routing service answered with {}", status);
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LatLng;

    fn client() -> OneMapClient {
        OneMapClient::new(
            String::from("https://www.onemap.gov.sg/"),
            ProviderOptions::default(),
        )
        .unwrap()
    }

    fn request(route_type: RouteType) -> RouteRequest {
        RouteRequest {
            start: LatLng::new(1.28037, 103.85035),
            end: LatLng::new(1.2826, 103.8529),
            route_type,
        }
    }

    #[test]
    fn test_base_url_is_normalized() {
        assert_eq!(client().base_url, "https://www.onemap.gov.sg");
    }

    #[test]
    fn test_walk_route_params() {
        let params = client().route_params(&request(RouteType::Walk));
        assert_eq!(
            params,
            vec![
                ("start", String::from("1.28037,103.85035")),
                ("end", String::from("1.2826,103.8529")),
                ("routeType", String::from("walk")),
            ]
        );
    }

    #[test]
    fn test_transit_route_params() {
        let params = client().route_params(&request(RouteType::Pt));
        let keys: Vec<&str> = params.iter().map(|(key, _)| *key).collect();
        assert_eq!(
            keys,
            vec![
                "start",
                "end",
                "routeType",
                "date",
                "time",
                "mode",
                "maxWalkDistance",
                "numItineraries"
            ]
        );
        let date = &params[3].1;
        assert_eq!(date.len(), 10);
        assert_eq!(&date[2..3], "-");
        assert_eq!(params[6].1, "1000");
    }
}
