use std::convert::Infallible;
use std::sync::Arc;
use warp::http::Method;
use warp::{Filter, Rejection, Reply};

use crate::{
    config::Config,
    handlers,
    polyline::Precision,
    provider::RouteProviderWithCache,
    transcribe::Transcriber,
    types::{RouteQuery, SearchQuery},
};

fn with_provider(
    provider: Arc<RouteProviderWithCache>,
) -> impl Filter<Extract = (Arc<RouteProviderWithCache>,), Error = Infallible> + Clone {
    warp::any().map(move || provider.clone())
}

fn with_transcriber(
    transcriber: Arc<Transcriber>,
) -> impl Filter<Extract = (Arc<Transcriber>,), Error = Infallible> + Clone {
    warp::any().map(move || transcriber.clone())
}

fn with_config(config: Config) -> impl Filter<Extract = (Config,), Error = Infallible> + Clone {
    warp::any().map(move || config.clone())
}

fn with_precision(
    precision: Precision,
) -> impl Filter<Extract = (Precision,), Error = Infallible> + Clone {
    warp::any().map(move || precision)
}

pub fn api(
    config: Config,
    provider: Arc<RouteProviderWithCache>,
    transcriber: Arc<Transcriber>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let max_post_size = config.max_post_size.as_u64();

    let cors = warp::cors()
        .allow_origins(config.allowed_origins.iter().map(String::as_str))
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(&[Method::GET, Method::POST, Method::OPTIONS]);

    let status = warp::path!("status")
        .and(warp::get())
        .and(with_precision(config.polyline_precision))
        .and_then(handlers::get_status);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_provider(provider.clone()))
        .and(with_transcriber(transcriber.clone()))
        .and_then(handlers::get_health);

    let search = warp::path!("search")
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_provider(provider.clone()))
        .and_then(handlers::get_search);

    let route = warp::path!("route")
        .and(warp::get())
        .and(warp::query::<RouteQuery>())
        .and(with_provider(provider))
        .and(with_config(config.clone()))
        .and_then(handlers::get_route);

    let encode = warp::path!("polyline" / "encode")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_post_size))
        .and(warp::body::json())
        .and(with_config(config.clone()))
        .and_then(handlers::post_encode);

    let decode = warp::path!("polyline" / "decode")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_post_size))
        .and(warp::body::json())
        .and(with_config(config))
        .and_then(handlers::post_decode);

    let navigation = warp::path!("navigation" / "steps")
        .and(warp::get())
        .and_then(handlers::get_navigation_steps);

    let transcribe = warp::path!("transcribe")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_post_size))
        .and(warp::multipart::form().max_length(max_post_size))
        .and(with_transcriber(transcriber.clone()))
        .and_then(handlers::post_transcribe);

    let transcribe_raw = warp::path!("transcribe" / "raw")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_post_size))
        .and(warp::multipart::form().max_length(max_post_size))
        .and(with_transcriber(transcriber))
        .and_then(handlers::post_transcribe_raw);

    status
        .or(health)
        .or(search)
        .or(route)
        .or(encode)
        .or(decode)
        .or(navigation)
        .or(transcribe)
        .or(transcribe_raw)
        .with(cors)
        .with(warp::trace::request())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byte_unit::Byte;
    use serde_json::{Value, json};
    use warp::http::StatusCode;
    use warp::test::request;

    fn test_config() -> Config {
        Config {
            route_source: String::from("test_files/onemap"),
            ..Config::default()
        }
    }

    fn test_api(config: Config) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let provider = Arc::new(RouteProviderWithCache::new(config.provider_options()).unwrap());
        let transcriber = Arc::new(Transcriber::new(None, config.silence_threshold).unwrap());
        api(config, provider, transcriber)
    }

    fn body_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_status() {
        let api = test_api(test_config());
        let res = request().method("GET").path("/status").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), "Ok");
    }

    #[tokio::test]
    async fn test_health() {
        let api = test_api(test_config());
        let res = request().method("GET").path("/health").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res.body());
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["provider"], "fixture");
        assert_eq!(body["transcription_configured"], false);
    }

    #[tokio::test]
    async fn test_search() {
        let api = test_api(test_config());
        let res = request()
            .method("GET")
            .path("/search?q=raffles")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res.body());
        assert_eq!(body.as_array().unwrap().len(), 2);

        let res = request().method("GET").path("/search?q=%20").reply(&api).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_walking_route() {
        let api = test_api(test_config());
        let res = request()
            .method("GET")
            .path("/route?start=1.28037,103.85035&end=1.2826,103.8529")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res.body());
        assert_eq!(body["segments"].as_array().unwrap().len(), 1);
        assert_eq!(body["segments"][0]["mode"], "WALK");
        assert_eq!(body["segments"][0]["style"]["dashed"], true);
        assert_eq!(body["distance_m"], 380.0);
        assert_eq!(body["start"]["location"], json!([1.28037, 103.85035]));
        assert!(body["bounds"].is_object());
    }

    #[tokio::test]
    async fn test_transit_route_as_geojson() {
        let api = test_api(test_config());
        let res = request()
            .method("GET")
            .path("/route?start=1.3,103.85&end=1.31,103.86&type=pt&format=geojson")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res.body());
        assert_eq!(body["type"], "FeatureCollection");
        let features = body["features"].as_array().unwrap();
        // Two legs plus start and destination markers.
        assert_eq!(features.len(), 4);
        assert_eq!(features[0]["geometry"]["type"], "LineString");
        assert_eq!(features[1]["properties"]["mode"], "BUS");
        assert_eq!(features[3]["geometry"]["type"], "Point");
    }

    #[tokio::test]
    async fn test_route_by_place_names() {
        let api = test_api(test_config());
        let res = request()
            .method("GET")
            .path("/route?from=raffles%20place&to=chulia")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = request()
            .method("GET")
            .path("/route?from=raffles%20place&to=atlantis")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_route_rejects_bad_input() {
        let api = test_api(test_config());
        for path in [
            "/route?start=91,103.8&end=1.2826,103.8529",
            "/route?start=abc&end=1.2826,103.8529",
            "/route?start=1.28037,103.85035",
            "/route?start=1.28037,103.85035&end=1.2826,103.8529&precision=11",
        ] {
            let res = request().method("GET").path(path).reply(&api).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{}", path);
        }

        let res = request()
            .method("GET")
            .path("/route?start=91,103.8&end=1.2826,103.8529")
            .reply(&api)
            .await;
        assert_eq!(res.body(), "Invalid Latitude or Longitude");
    }

    #[tokio::test]
    async fn test_encode() {
        let api = test_api(test_config());
        let res = request()
            .method("POST")
            .path("/polyline/encode")
            .json(&json!({
                "coordinates": [[38.5, -120.2], [40.7, -120.95], [43.252, -126.453]]
            }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body())["polyline"], "_p~iF~ps|U_ulLnnqC_mqNvxq`@");

        let res = request()
            .method("POST")
            .path("/polyline/encode")
            .json(&json!({
                "geometry": { "type": "LineString", "coordinates": [[2.0, 1.0]] }
            }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body())["polyline"], "_ibE_seK");

        let res = request()
            .method("POST")
            .path("/polyline/encode")
            .json(&json!({ "coordinates": [[38.5, -120.2]], "precision": 2.5 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_decode() {
        let api = test_api(test_config());
        let res = request()
            .method("POST")
            .path("/polyline/decode")
            .json(&json!({ "polylines": ["_p~iF~ps|U_ulLnnqC", "_ibE_seK"] }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res.body());
        assert_eq!(body["paths"].as_array().unwrap().len(), 2);
        assert_eq!(body["path"].as_array().unwrap().len(), 3);
        assert_eq!(body["path"][2], json!([1.0, 2.0]));
        assert_eq!(body["bounds"]["north"], 40.7);

        let res = request()
            .method("POST")
            .path("/polyline/decode")
            .json(&json!({ "polylines": ["_ibE_seK"], "format": "geojson" }))
            .reply(&api)
            .await;
        let body = body_json(res.body());
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(
            body["features"][0]["geometry"]["coordinates"],
            json!([[2.0, 1.0]])
        );

        let res = request()
            .method("POST")
            .path("/polyline/decode")
            .json(&json!({ "polylines": ["_p~iF~ps|"] }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_navigation_steps() {
        let api = test_api(test_config());
        let res = request()
            .method("GET")
            .path("/navigation/steps")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res.body());
        assert_eq!(body.as_array().unwrap().len(), 5);
        assert_eq!(body[4]["maneuver"], "arrive");
    }

    const BOUNDARY: &str = "X-AUDIO-BOUNDARY";

    fn audio_upload(content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio_file\"; filename=\"clip\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post_upload(path: &str, body: Vec<u8>) -> warp::test::RequestBuilder {
        request()
            .method("POST")
            .path(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(body)
    }

    #[tokio::test]
    async fn test_transcription_not_configured() {
        let api = test_api(test_config());
        let res = post_upload("/transcribe", audio_upload("audio/webm", b"not really audio"))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let res = post_upload(
            "/transcribe/raw",
            audio_upload("application/octet-stream", &[0u8; 320]),
        )
        .reply(&api)
        .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_transcription_requires_audio_field() {
        let api = test_api(test_config());
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        );
        let res = post_upload("/transcribe", body.into_bytes())
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_silent_raw_upload_is_answered_locally() {
        let config = test_config();
        let provider = Arc::new(RouteProviderWithCache::new(config.provider_options()).unwrap());
        // Port 9 is discard; forwarding would fail the request.
        let transcriber = Arc::new(
            Transcriber::new(Some(String::from("http://127.0.0.1:9")), 0.01).unwrap(),
        );
        let api = api(config, provider, transcriber);

        let silence: Vec<u8> = [0i16, 3, -3, 0]
            .iter()
            .cycle()
            .take(1600)
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let res = post_upload(
            "/transcribe/raw",
            audio_upload("application/octet-stream", &silence),
        )
        .reply(&api)
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body()), json!({ "text": "", "success": true }));
    }

    #[tokio::test]
    async fn test_body_size_limit() {
        let config = Config {
            max_post_size: Byte::from_u64(16),
            ..test_config()
        };
        let api = test_api(config);
        let res = request()
            .method("POST")
            .path("/polyline/decode")
            .json(&json!({ "polylines": ["_p~iF~ps|U_ulLnnqC_mqNvxq`@"] }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let api = test_api(test_config());
        let res = request().method("GET").path("/elevation").reply(&api).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
