use futures::TryStreamExt;
use serde_json::Map;
use std::sync::Arc;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::hyper::body::{Buf, Bytes};
use warp::multipart::{FormData, Part};
use warp::reply::Response;
use warp::{Rejection, Reply, reply};

use crate::{
    config::Config,
    navigation,
    polyline::{
        self, Precision, PolylineError,
        geojson::{self, Entity},
    },
    provider::{ProviderError, RouteProviderWithCache, RouteRequest},
    route::{self, BoundingBox},
    transcribe::{AUDIO_FIELD, TranscribeError, Transcriber},
    types::{
        DecodeRequest, DecodeResponse, EncodeRequest, EncodeResponse, HealthResponse, LatLng,
        OutputFormat, RouteQuery, SearchQuery,
    },
};

const INVALID_LAT_LNG: &str = "Invalid Latitude or Longitude";

fn with_status(message: impl Into<String>, status: StatusCode) -> Response {
    reply::with_status(message.into(), status).into_response()
}

fn provider_error_reply(err: &ProviderError) -> Response {
    let status = match err {
        ProviderError::NoRoute(_) | ProviderError::NotFound(_) => StatusCode::NOT_FOUND,
        ProviderError::Io(_) | ProviderError::InvalidConfig(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ProviderError::Http(_)
        | ProviderError::Json(_)
        | ProviderError::Upstream { .. }
        | ProviderError::Polyline(_) => StatusCode::BAD_GATEWAY,
    };
    if status != StatusCode::NOT_FOUND {
        error!("Route provider failed: {}", err);
    }
    with_status(err.to_string(), status)
}

fn transcribe_error_reply(err: &TranscribeError) -> Response {
    match err {
        TranscribeError::NotConfigured => {
            with_status(err.to_string(), StatusCode::SERVICE_UNAVAILABLE)
        }
        _ => {
            error!("Transcription failed: {}", err);
            with_status(
                format!("Transcription failed: {}", err),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

/// Round trips a random coordinate through the codec.
pub async fn get_status(precision: Precision) -> Result<impl Reply, Rejection> {
    let random_lat = rand::random::<f64>() * 180.0 - 90.0;
    let random_lng = rand::random::<f64>() * 360.0 - 180.0;
    let point = LatLng::new(random_lat, random_lng);
    let tolerance = 0.5 / precision.factor() + 1e-9;

    let round_trip = polyline::encode(&[point], precision)
        .and_then(|encoded| polyline::decode(&encoded, precision));
    match round_trip {
        Ok(decoded)
            if decoded.len() == 1
                && (decoded[0].lat - point.lat).abs() <= tolerance
                && (decoded[0].lng - point.lng).abs() <= tolerance =>
        {
            Ok(reply::with_status("Ok", StatusCode::OK))
        }
        _ => Ok(reply::with_status(
            "Error",
            StatusCode::INTERNAL_SERVER_ERROR,
        )),
    }
}

pub async fn get_health(
    provider: Arc<RouteProviderWithCache>,
    transcriber: Arc<Transcriber>,
) -> Result<impl Reply, Rejection> {
    Ok(reply::json(&HealthResponse {
        status: String::from("healthy"),
        provider: provider.describe().to_string(),
        transcription_configured: transcriber.is_configured(),
    }))
}

pub async fn get_search(
    query: SearchQuery,
    provider: Arc<RouteProviderWithCache>,
) -> Result<impl Reply, Rejection> {
    if query.q.trim().is_empty() {
        return Ok(with_status("Missing search text", StatusCode::BAD_REQUEST));
    }

    match provider.search(&query.q).await {
        Ok(places) => Ok(reply::json(&*places).into_response()),
        Err(err) => Ok(provider_error_reply(&err)),
    }
}

fn parse_endpoint(raw: &str) -> Result<LatLng, String> {
    let location = raw.parse::<LatLng>()?;
    if !location.is_valid() {
        return Err(INVALID_LAT_LNG.to_string());
    }
    Ok(location)
}

pub async fn get_route(
    query: RouteQuery,
    provider: Arc<RouteProviderWithCache>,
    config: Config,
) -> Result<impl Reply, Rejection> {
    let precision = match polyline::resolve_precision(query.precision, config.polyline_precision) {
        Ok(precision) => precision,
        Err(err) => return Ok(polyline_error_reply(err)),
    };

    let (start, end) = match (&query.start, &query.end, &query.from, &query.to) {
        (Some(start), Some(end), _, _) => match (parse_endpoint(start), parse_endpoint(end)) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(message), _) | (_, Err(message)) => {
                return Ok(with_status(message, StatusCode::BAD_REQUEST));
            }
        },
        (_, _, Some(from), Some(to)) => {
            if from.trim().is_empty() || to.trim().is_empty() {
                return Ok(with_status("Missing search text", StatusCode::BAD_REQUEST));
            }
            match futures::try_join!(provider.resolve(from), provider.resolve(to)) {
                Ok((from, to)) => (from.location, to.location),
                Err(err) => return Ok(provider_error_reply(&err)),
            }
        }
        _ => {
            return Ok(with_status(
                "Expected either start and end or from and to",
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    let request = RouteRequest {
        start,
        end,
        route_type: query.route_type.unwrap_or_default(),
    };
    let plan = match provider.route(request).await {
        Ok(plan) => plan,
        Err(err) => return Ok(provider_error_reply(&err)),
    };

    let rendered = match route::render_route(&plan, precision) {
        Ok(rendered) => rendered,
        Err(err) => {
            warn!("Discarding route {} -> {}", start, end);
            return Ok(provider_error_reply(&ProviderError::from(err)));
        }
    };

    match query.format.unwrap_or_default() {
        OutputFormat::Json => Ok(reply::json(&rendered).into_response()),
        OutputFormat::Geojson => Ok(reply::json(&rendered.to_geojson()).into_response()),
    }
}

fn polyline_error_reply(err: PolylineError) -> Response {
    with_status(err.to_string(), StatusCode::BAD_REQUEST)
}

pub async fn post_encode(body: EncodeRequest, config: Config) -> Result<impl Reply, Rejection> {
    let encoded = polyline::resolve_precision(body.precision, config.polyline_precision).and_then(
        |precision| match &body.geometry {
            Some(geometry) => geojson::from_geojson(geometry, precision),
            None => polyline::encode(&body.coordinates, precision),
        },
    );
    match encoded {
        Ok(polyline) => Ok(reply::json(&EncodeResponse { polyline }).into_response()),
        Err(err) => Ok(polyline_error_reply(err)),
    }
}

pub async fn post_decode(body: DecodeRequest, config: Config) -> Result<impl Reply, Rejection> {
    let precision = match polyline::resolve_precision(body.precision, config.polyline_precision) {
        Ok(precision) => precision,
        Err(err) => return Ok(polyline_error_reply(err)),
    };
    match body.format.unwrap_or_default() {
        OutputFormat::Json => {
            let joined = match route::concatenate_paths(&body.polylines, precision) {
                Ok(joined) => joined,
                Err(err) => return Ok(polyline_error_reply(err)),
            };
            Ok(reply::json(&DecodeResponse {
                bounds: BoundingBox::from_points(&joined.path),
                paths: joined.legs,
                path: joined.path,
            })
            .into_response())
        }
        OutputFormat::Geojson => {
            let geometries: Result<Vec<_>, _> = body
                .polylines
                .iter()
                .map(|encoded| geojson::to_geojson(encoded, precision))
                .collect();
            let features = match geometries {
                Ok(geometries) => geometries
                    .into_iter()
                    .map(|geometry| Entity::Feature {
                        properties: Map::new(),
                        geometry,
                    })
                    .collect(),
                Err(err) => return Ok(polyline_error_reply(err)),
            };
            Ok(reply::json(&Entity::FeatureCollection { features }).into_response())
        }
    }
}

pub async fn get_navigation_steps() -> Result<impl Reply, Rejection> {
    let steps = navigation::announced_steps(&navigation::demo_steps());
    Ok(reply::json(&steps))
}

/// Pulls the uploaded audio out of a multipart form.
async fn audio_part(form: FormData) -> Result<Option<AudioUpload>, warp::Error> {
    let parts: Vec<Part> = form.try_collect().await?;
    let Some(part) = parts.into_iter().find(|part| part.name() == AUDIO_FIELD) else {
        return Ok(None);
    };
    let content_type = part.content_type().map(String::from);
    let data = part
        .stream()
        .try_fold(Vec::new(), |mut data, mut chunk| async move {
            data.extend_from_slice(&chunk.copy_to_bytes(chunk.remaining()));
            Ok(data)
        })
        .await?;
    Ok(Some(AudioUpload {
        data: Bytes::from(data),
        content_type,
    }))
}

struct AudioUpload {
    data: Bytes,
    content_type: Option<String>,
}

async fn read_upload(form: FormData) -> Result<AudioUpload, Response> {
    match audio_part(form).await {
        Ok(Some(upload)) if !upload.data.is_empty() => Ok(upload),
        Ok(Some(_)) => Err(with_status("Empty audio upload", StatusCode::BAD_REQUEST)),
        Ok(None) => Err(with_status(
            format!("Missing '{}' upload", AUDIO_FIELD),
            StatusCode::BAD_REQUEST,
        )),
        Err(err) => {
            warn!("Unreadable multipart upload: {}", err);
            Err(with_status(
                format!("Unreadable upload: {}", err),
                StatusCode::BAD_REQUEST,
            ))
        }
    }
}

pub async fn post_transcribe(
    form: FormData,
    transcriber: Arc<Transcriber>,
) -> Result<impl Reply, Rejection> {
    let upload = match read_upload(form).await {
        Ok(upload) => upload,
        Err(response) => return Ok(response),
    };
    match transcriber
        .transcribe(upload.data, upload.content_type.as_deref())
        .await
    {
        Ok(response) => Ok(reply::json(&response).into_response()),
        Err(err) => Ok(transcribe_error_reply(&err)),
    }
}

pub async fn post_transcribe_raw(
    form: FormData,
    transcriber: Arc<Transcriber>,
) -> Result<impl Reply, Rejection> {
    let upload = match read_upload(form).await {
        Ok(upload) => upload,
        Err(response) => return Ok(response),
    };
    match transcriber.transcribe_raw(upload.data).await {
        Ok(response) => Ok(reply::json(&response).into_response()),
        Err(err) => Ok(transcribe_error_reply(&err)),
    }
}
