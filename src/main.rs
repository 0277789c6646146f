mod config;
mod handlers;
mod navigation;
mod polyline;
mod provider;
mod route;
mod routes;
mod telemetry;
mod transcribe;
mod types;

use std::error::Error;
use std::sync::Arc;
use tracing::info;

use crate::provider::RouteProviderWithCache;
use crate::transcribe::Transcriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    telemetry::init_telemetry()?;

    let config = config::CONFIG.clone();
    info!("Route source: {}", config.route_source);
    info!("Cache size: {} entries, ttl {:?}", config.cache_size, config.cache_ttl);
    info!("Max post size: {}", config.max_post_size);
    info!("Polyline precision: {}", config.polyline_precision);
    if config.transcribe_url.is_none() {
        info!("TRANSCRIBE_URL not set, transcription endpoints answer 503");
    }

    let provider = Arc::new(RouteProviderWithCache::new(config.provider_options())?);
    let transcriber = Arc::new(Transcriber::new(
        config.transcribe_url.clone(),
        config.silence_threshold,
    )?);

    let (bind, port) = (config.bind, config.port);
    let api = routes::api(config, provider, transcriber);

    info!("Listening on {}:{}", bind, port);
    warp::serve(api).run((bind, port)).await;

    Ok(())
}
