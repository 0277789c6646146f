use tracing::info;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan, prelude::*};

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");
const DEFAULT_FILTER: &str = "walking_route_service=info,warp=info";

pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialize tracing: {}", e))?;

    info!(
        "Tracing initialized for {} {}",
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION")
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_comes_from_the_package() {
        assert_eq!(SERVICE_NAME, "walking-route-service");
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
